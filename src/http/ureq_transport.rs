use super::{ApiRequest, ApiResponse, Method, Transport};
use crate::error::HarnessError;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use url::Url;

/// Blocking transport backed by a shared `ureq` agent.
///
/// Status codes are data here, so the agent is configured never to turn a 4xx
/// or 5xx into an error; only connection-level failures surface as
/// `HarnessError::Transport`.
pub struct UreqTransport {
    agent: ureq::Agent,
    base_url: Url,
}

impl UreqTransport {
    pub fn new(base_url: Url, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            base_url,
        }
    }

    fn resolve(&self, request: &ApiRequest) -> Result<Url> {
        let mut url = self
            .base_url
            .join(&request.path)
            .map_err(|err| HarnessError::Setup(format!("join {:?}: {err}", request.path)))?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn dispatch(
        &self,
        request: &ApiRequest,
        url: &str,
    ) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
        let body = request.body.as_deref();
        match request.method {
            Method::Get => with_headers(self.agent.get(url), request).call(),
            Method::Head => with_headers(self.agent.head(url), request).call(),
            Method::Delete => with_headers(self.agent.delete(url), request).call(),
            Method::Options => with_headers(self.agent.options(url), request).call(),
            Method::Trace => with_headers(self.agent.trace(url), request).call(),
            Method::Post => send_with_body(with_headers(self.agent.post(url), request), body),
            Method::Put => send_with_body(with_headers(self.agent.put(url), request), body),
            Method::Patch => send_with_body(with_headers(self.agent.patch(url), request), body),
        }
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = self.resolve(request)?;
        let started = Instant::now();
        let mut response =
            self.dispatch(request, url.as_str())
                .map_err(|err| HarnessError::Transport {
                    method: request.method.to_string(),
                    url: url.to_string(),
                    detail: err.to_string(),
                })?;

        let status = response.status().as_u16();
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            match headers.get_mut(name.as_str()) {
                Some(existing) => {
                    existing.push_str(", ");
                    existing.push_str(&value);
                }
                None => {
                    headers.insert(name.as_str().to_string(), value);
                }
            }
        }
        let body = if request.method == Method::Head {
            Vec::new()
        } else {
            response
                .body_mut()
                .read_to_vec()
                .map_err(|err| HarnessError::Transport {
                    method: request.method.to_string(),
                    url: url.to_string(),
                    detail: format!("read body: {err}"),
                })
                .with_context(|| format!("read response for {}", request.target()))?
        };

        tracing::trace!(
            method = %request.method,
            url = %url,
            status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            response_bytes = body.len(),
            "http exchange"
        );

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    request: &ApiRequest,
) -> ureq::RequestBuilder<B> {
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn send_with_body(
    builder: ureq::RequestBuilder<ureq::typestate::WithBody>,
    body: Option<&[u8]>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(bytes) if !bytes.is_empty() => builder.send(bytes),
        _ => builder.send_empty(),
    }
}
