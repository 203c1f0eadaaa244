//! Auth flow controller.
//!
//! `Unauthenticated -> (credential exchange) -> Authenticated(token)`. The
//! controller is the only writer of the capability token; scenarios read it
//! through `authorize`.
use crate::error::HarnessError;
use crate::http::{ApiRequest, ApiResponse, AUTHORIZATION, AUTH_TOKEN_HEADER};
use crate::session::SessionClient;
use anyhow::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Username and secret presented to the credential exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// `Authorization` value for the Basic scheme.
    pub fn basic_authorization(&self) -> String {
        let pair = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(pair))
    }

    /// Same username with a secret that cannot be right.
    pub fn corrupted(&self) -> Self {
        Self::new(self.username.clone(), format!("{}d", self.password))
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new("admin", "password")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated { token: String },
}

/// The two equally valid ways of presenting a capability token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `X-AUTH-TOKEN: <token>`
    TokenHeader,
    /// `Authorization: Bearer <token>`
    Bearer,
}

impl AuthScheme {
    pub fn apply(&self, request: ApiRequest, token: &str) -> ApiRequest {
        match self {
            AuthScheme::TokenHeader => request.header(AUTH_TOKEN_HEADER, token),
            AuthScheme::Bearer => request.header(AUTHORIZATION, format!("Bearer {token}")),
        }
    }
}

/// Why a protected call was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// No credential was presented.
    Authentication,
    /// A credential was presented and rejected.
    Authorization,
}

impl Denial {
    pub fn status(&self) -> u16 {
        match self {
            Denial::Authentication => 401,
            Denial::Authorization => 403,
        }
    }

    pub fn classify(status: u16) -> Option<Denial> {
        match status {
            401 => Some(Denial::Authentication),
            403 => Some(Denial::Authorization),
            _ => None,
        }
    }
}

pub struct AuthController {
    credentials: Credentials,
    state: AuthState,
}

impl AuthController {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            state: AuthState::Unauthenticated,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn token(&self) -> Option<&str> {
        match &self.state {
            AuthState::Authenticated { token } => Some(token),
            AuthState::Unauthenticated => None,
        }
    }

    /// Run one credential exchange and advance the state from its outcome.
    ///
    /// Only a 201 carrying a token moves the controller to `Authenticated`; a
    /// refused exchange leaves the current state alone.
    pub fn exchange(
        &mut self,
        client: &SessionClient<'_>,
        credentials: &Credentials,
    ) -> Result<ApiResponse> {
        let request = ApiRequest::post("secret/token")
            .header(AUTHORIZATION, credentials.basic_authorization());
        let response = client.send(request)?;
        let token = response
            .header(AUTH_TOKEN_HEADER)
            .map(str::trim)
            .filter(|token| !token.is_empty());
        match (response.status, token) {
            (201, Some(token)) => {
                tracing::info!(username = %credentials.username, "capability token minted");
                self.state = AuthState::Authenticated {
                    token: token.to_string(),
                };
            }
            (status, _) => {
                tracing::debug!(
                    username = %credentials.username,
                    status,
                    "credential exchange refused"
                );
            }
        }
        Ok(response)
    }

    /// Current token, minting one with the configured credentials if needed.
    pub fn ensure_token(&mut self, client: &SessionClient<'_>) -> Result<String> {
        if let Some(token) = self.token() {
            return Ok(token.to_string());
        }
        let credentials = self.credentials.clone();
        let response = self.exchange(client, &credentials)?;
        self.token().map(str::to_string).ok_or_else(|| {
            HarnessError::Precondition(format!(
                "credential exchange answered {} without a token",
                response.status
            ))
            .into()
        })
    }

    /// Attach the held token to `request` using `scheme`.
    pub fn authorize(&self, request: ApiRequest, scheme: AuthScheme) -> Result<ApiRequest> {
        let token = self.token().ok_or_else(|| {
            HarnessError::Precondition("no capability token has been minted".to_string())
        })?;
        Ok(scheme.apply(request, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Transport;
    use crate::session::Session;
    use std::cell::RefCell;

    struct TokenDesk {
        calls: RefCell<usize>,
    }

    impl Transport for TokenDesk {
        fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
            *self.calls.borrow_mut() += 1;
            let good = Credentials::default().basic_authorization();
            if request.header_value(AUTHORIZATION) == Some(good.as_str()) {
                Ok(ApiResponse::new(201).with_header("X-AUTH-TOKEN", "tok-1"))
            } else {
                Ok(ApiResponse::new(401))
            }
        }
    }

    #[test]
    fn basic_authorization_encodes_pair() {
        assert_eq!(
            Credentials::default().basic_authorization(),
            "Basic YWRtaW46cGFzc3dvcmQ="
        );
        assert_eq!(
            Credentials::default().corrupted().basic_authorization(),
            "Basic YWRtaW46cGFzc3dvcmRk"
        );
    }

    #[test]
    fn wrong_secret_keeps_controller_unauthenticated() {
        let desk = TokenDesk {
            calls: RefCell::new(0),
        };
        let client = SessionClient::new(&desk, Session::existing("s"));
        let mut auth = AuthController::new(Credentials::default());
        let wrong = auth.credentials().corrupted();
        let response = auth.exchange(&client, &wrong).expect("exchange");
        assert_eq!(response.status, 401);
        assert_eq!(auth.state(), &AuthState::Unauthenticated);
    }

    #[test]
    fn ensure_token_mints_once_and_reuses() {
        let desk = TokenDesk {
            calls: RefCell::new(0),
        };
        let client = SessionClient::new(&desk, Session::existing("s"));
        let mut auth = AuthController::new(Credentials::default());
        assert_eq!(auth.ensure_token(&client).expect("token"), "tok-1");
        assert_eq!(auth.ensure_token(&client).expect("token"), "tok-1");
        assert_eq!(*desk.calls.borrow(), 1);
    }

    #[test]
    fn schemes_place_token_in_different_headers() {
        let desk = TokenDesk {
            calls: RefCell::new(0),
        };
        let client = SessionClient::new(&desk, Session::existing("s"));
        let mut auth = AuthController::new(Credentials::default());
        auth.ensure_token(&client).expect("token");

        let custom = auth
            .authorize(ApiRequest::get("secret/note"), AuthScheme::TokenHeader)
            .expect("authorize");
        assert_eq!(custom.header_value(AUTH_TOKEN_HEADER), Some("tok-1"));
        assert_eq!(custom.header_value(AUTHORIZATION), None);

        let bearer = auth
            .authorize(ApiRequest::get("secret/note"), AuthScheme::Bearer)
            .expect("authorize");
        assert_eq!(bearer.header_value(AUTHORIZATION), Some("Bearer tok-1"));
        assert_eq!(bearer.header_value(AUTH_TOKEN_HEADER), None);
    }

    #[test]
    fn authorize_without_token_is_precondition_error() {
        let auth = AuthController::new(Credentials::default());
        let err = auth
            .authorize(ApiRequest::get("secret/note"), AuthScheme::Bearer)
            .expect_err("no token");
        assert_eq!(
            crate::error::harness_error(&err).map(|e| e.kind()),
            Some("precondition")
        );
    }

    #[test]
    fn denials_map_to_distinct_statuses() {
        assert_eq!(Denial::classify(401), Some(Denial::Authentication));
        assert_eq!(Denial::classify(403), Some(Denial::Authorization));
        assert_eq!(Denial::classify(200), None);
        assert_eq!(Denial::Authorization.status(), 403);
    }
}
