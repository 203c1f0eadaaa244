//! Response assertions.
//!
//! An `Expect` is a declarative list of checks. `check` never errors: every
//! mismatch becomes one failure line, so a scenario reports all of them.
use crate::codec::{self, Format};
use crate::http::{ApiResponse, SESSION_HEADER};
use crate::util::snippet;
use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct Expect {
    statuses: Vec<u16>,
    headers_present: Vec<String>,
    headers_equal: Vec<(String, String)>,
    headers_contain: Vec<(String, String)>,
    media_type: Option<Format>,
    text_regex: Vec<String>,
    body: Vec<BodyCheck>,
}

#[derive(Debug, Clone)]
enum BodyCheck {
    HasKey(String),
    Field { pointer: String, value: Value },
    ErrorMessage(String),
    ArrayLen { pointer: String, len: usize },
    Subset(Value),
    AnyItem { pointer: String, subset: Value },
    EveryItem { pointer: String, subset: Value },
}

impl Expect {
    pub fn status(status: u16) -> Self {
        Self {
            statuses: vec![status],
            ..Default::default()
        }
    }

    /// Accept any of `statuses`; used where service state decides the answer.
    pub fn status_in(statuses: &[u16]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            ..Default::default()
        }
    }

    pub fn header_present(mut self, name: &str) -> Self {
        self.headers_present.push(name.to_ascii_lowercase());
        self
    }

    pub fn header_eq(mut self, name: &str, value: &str) -> Self {
        self.headers_equal
            .push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn header_contains(mut self, name: &str, needle: &str) -> Self {
        self.headers_contain
            .push((name.to_ascii_lowercase(), needle.to_string()));
        self
    }

    pub fn session(self, id: &str) -> Self {
        self.header_eq(SESSION_HEADER, id)
    }

    /// The `content-type` header must name `format` (parameters ignored).
    pub fn content_type(mut self, format: Format) -> Self {
        self.media_type = Some(format);
        self
    }

    pub fn text_matches(mut self, pattern: &str) -> Self {
        self.text_regex.push(pattern.to_string());
        self
    }

    pub fn body_key(mut self, key: &str) -> Self {
        self.body.push(BodyCheck::HasKey(key.to_string()));
        self
    }

    /// `pointer` is a JSON pointer into the decoded body, e.g. `/todos/0/id`.
    pub fn body_field(mut self, pointer: &str, value: Value) -> Self {
        self.body.push(BodyCheck::Field {
            pointer: pointer.to_string(),
            value,
        });
        self
    }

    pub fn error_message(mut self, message: &str) -> Self {
        self.body.push(BodyCheck::ErrorMessage(message.to_string()));
        self
    }

    pub fn array_len(mut self, pointer: &str, len: usize) -> Self {
        self.body.push(BodyCheck::ArrayLen {
            pointer: pointer.to_string(),
            len,
        });
        self
    }

    /// Every key in `subset` must be present in the body with an equal value.
    pub fn body_subset(mut self, subset: Value) -> Self {
        self.body.push(BodyCheck::Subset(subset));
        self
    }

    pub fn any_item(mut self, pointer: &str, subset: Value) -> Self {
        self.body.push(BodyCheck::AnyItem {
            pointer: pointer.to_string(),
            subset,
        });
        self
    }

    pub fn every_item(mut self, pointer: &str, subset: Value) -> Self {
        self.body.push(BodyCheck::EveryItem {
            pointer: pointer.to_string(),
            subset,
        });
        self
    }

    pub fn check(&self, response: &ApiResponse) -> Vec<String> {
        let mut failures = Vec::new();

        if !self.statuses.is_empty() && !self.statuses.contains(&response.status) {
            let expected = match self.statuses.as_slice() {
                [single] => single.to_string(),
                many => format!("one of {many:?}"),
            };
            let body = snippet(&response.text());
            if body.is_empty() {
                failures.push(format!(
                    "expected status {expected}, observed {}",
                    response.status
                ));
            } else {
                failures.push(format!(
                    "expected status {expected}, observed {} (body: {body})",
                    response.status
                ));
            }
        }

        for name in &self.headers_present {
            if response.header(name).is_none() {
                failures.push(format!("missing header {name}"));
            }
        }
        for (name, expected) in &self.headers_equal {
            let observed = response.header(name);
            if observed != Some(expected.as_str()) {
                failures.push(format!(
                    "expected header {name} {expected:?}, observed {observed:?}"
                ));
            }
        }
        for (name, needle) in &self.headers_contain {
            match response.header(name) {
                Some(value) if value.contains(needle.as_str()) => {}
                Some(value) => failures.push(format!(
                    "header {name} {value:?} missing substring {needle:?}"
                )),
                None => failures.push(format!("missing header {name}")),
            }
        }
        if let Some(format) = self.media_type {
            let observed = response.content_type();
            if observed.and_then(Format::from_media_type) != Some(format) {
                failures.push(format!(
                    "expected content-type {}, observed {observed:?}",
                    format.mime()
                ));
            }
        }

        if !self.text_regex.is_empty() {
            let text = response.text();
            for pattern in &self.text_regex {
                match Regex::new(pattern) {
                    Ok(re) => {
                        if !re.is_match(&text) {
                            failures.push(format!("body missing regex match {pattern:?}"));
                        }
                    }
                    Err(err) => failures.push(format!("invalid body regex {pattern:?}: {err}")),
                }
            }
        }

        if self.body.is_empty() {
            return failures;
        }
        let document = match codec::decode(&response.body, response.content_type()) {
            Ok(document) => document,
            Err(err) => {
                failures.push(format!("body not decodable: {err:#}"));
                return failures;
            }
        };
        for check in &self.body {
            check_body(check, &document, &mut failures);
        }
        failures
    }
}

fn check_body(check: &BodyCheck, document: &Value, failures: &mut Vec<String>) {
    match check {
        BodyCheck::HasKey(key) => {
            if document.get(key).is_none() {
                failures.push(format!("body missing key {key:?}"));
            }
        }
        BodyCheck::Field { pointer, value } => match document.pointer(pointer) {
            Some(observed) if observed == value => {}
            observed => failures.push(format!(
                "expected body {pointer} = {value}, observed {}",
                describe(observed)
            )),
        },
        BodyCheck::ErrorMessage(message) => {
            let messages = document.get("errorMessages").and_then(Value::as_array);
            let found = messages
                .map(|items| items.iter().any(|item| item.as_str() == Some(message.as_str())))
                .unwrap_or(false);
            if !found {
                failures.push(format!(
                    "errorMessages missing {message:?}, observed {}",
                    describe(document.get("errorMessages"))
                ));
            }
        }
        BodyCheck::ArrayLen { pointer, len } => {
            match document.pointer(pointer).and_then(Value::as_array) {
                Some(items) if items.len() == *len => {}
                Some(items) => failures.push(format!(
                    "expected {len} items at {pointer}, observed {}",
                    items.len()
                )),
                None => failures.push(format!("body has no array at {pointer}")),
            }
        }
        BodyCheck::Subset(subset) => failures.extend(subset_mismatches(subset, document)),
        BodyCheck::AnyItem { pointer, subset } => {
            match document.pointer(pointer).and_then(Value::as_array) {
                Some(items)
                    if items
                        .iter()
                        .any(|item| subset_mismatches(subset, item).is_empty()) => {}
                Some(_) => failures.push(format!("no item at {pointer} contains {subset}")),
                None => failures.push(format!("body has no array at {pointer}")),
            }
        }
        BodyCheck::EveryItem { pointer, subset } => {
            match document.pointer(pointer).and_then(Value::as_array) {
                Some(items) => {
                    for (index, item) in items.iter().enumerate() {
                        if !subset_mismatches(subset, item).is_empty() {
                            failures.push(format!(
                                "item {pointer}/{index} does not contain {subset}: {item}"
                            ));
                        }
                    }
                }
                None => failures.push(format!("body has no array at {pointer}")),
            }
        }
    }
}

/// Differences between `expected` and the matching part of `actual`. Objects
/// match structurally on the keys of `expected`; anything else must be equal.
pub fn subset_mismatches(expected: &Value, actual: &Value) -> Vec<String> {
    let mut mismatches = Vec::new();
    collect_mismatches(expected, actual, "", &mut mismatches);
    mismatches
}

fn collect_mismatches(expected: &Value, actual: &Value, path: &str, out: &mut Vec<String>) {
    match (expected, actual) {
        (Value::Object(expected_fields), Value::Object(actual_fields)) => {
            for (key, expected_value) in expected_fields {
                let child = format!("{path}/{key}");
                match actual_fields.get(key) {
                    Some(actual_value) => {
                        collect_mismatches(expected_value, actual_value, &child, out)
                    }
                    None => out.push(format!("body missing {child}")),
                }
            }
        }
        _ if expected == actual => {}
        _ => {
            let at = if path.is_empty() { "/" } else { path };
            out.push(format!("expected body {at} = {expected}, observed {actual}"));
        }
    }
}

fn describe(value: Option<&Value>) -> String {
    value
        .map(Value::to_string)
        .unwrap_or_else(|| "nothing".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn json_response(status: u16, body: Value) -> ApiResponse {
        ApiResponse::new(status)
            .with_header(SESSION_HEADER, "s1")
            .with_body("application/json", body.to_string().into_bytes())
    }

    #[test]
    fn matching_response_has_no_failures() {
        let response = json_response(201, json!({"id": 3, "title": "t", "doneStatus": true}));
        let failures = Expect::status(201)
            .session("s1")
            .content_type(Format::Json)
            .body_subset(json!({"title": "t", "doneStatus": true}))
            .body_field("/id", json!(3))
            .check(&response);
        assert!(failures.is_empty(), "{failures:?}");
    }

    #[test]
    fn every_mismatch_is_reported() {
        let response = json_response(400, json!({"errorMessages": ["other"]}));
        let failures = Expect::status(201)
            .session("s2")
            .content_type(Format::Xml)
            .error_message("wanted")
            .check(&response);
        assert_eq!(failures.len(), 4, "{failures:?}");
        assert!(failures[0].starts_with("expected status 201, observed 400"));
        assert!(failures[1].contains("x-challenger"));
    }

    #[test]
    fn status_in_accepts_either_outcome() {
        let expect = Expect::status_in(&[201, 400]);
        assert!(expect.check(&ApiResponse::new(400)).is_empty());
        let failures = expect.check(&ApiResponse::new(500));
        assert_eq!(failures, vec!["expected status one of [201, 400], observed 500"]);
    }

    #[test]
    fn item_checks_cover_any_and_every() {
        let response = json_response(
            200,
            json!({"todos": [{"id": 1, "doneStatus": true}, {"id": 2, "doneStatus": false}]}),
        );
        let any = Expect::status(200)
            .any_item("/todos", json!({"doneStatus": true}))
            .check(&response);
        assert!(any.is_empty(), "{any:?}");
        let every = Expect::status(200)
            .every_item("/todos", json!({"doneStatus": true}))
            .check(&response);
        assert_eq!(every.len(), 1, "{every:?}");
        assert!(every[0].contains("/todos/1"));
    }

    #[test]
    fn header_substring_and_regex_checks() {
        let response = ApiResponse::new(200)
            .with_header("Allow", "OPTIONS, GET, HEAD, POST")
            .with_body("application/xml", b"<todos><todo><id>1</id></todo></todos>".to_vec());
        let failures = Expect::status(200)
            .header_contains("allow", "OPTIONS, GET, HEAD, POST")
            .text_matches("^<todos><todo>")
            .array_len("/todos", 1)
            .check(&response);
        assert!(failures.is_empty(), "{failures:?}");
    }

    #[test]
    fn undecodable_body_is_a_failure_not_an_error() {
        let response = ApiResponse::new(200).with_body("application/json", b"{oops".to_vec());
        let failures = Expect::status(200).body_key("todos").check(&response);
        assert_eq!(failures.len(), 1);
        assert!(failures[0].starts_with("body not decodable"));
    }

    #[test]
    fn subset_reports_nested_paths() {
        let mismatches = subset_mismatches(
            &json!({"challengeStatus": {"GET_TODOS": true}}),
            &json!({"challengeStatus": {"GET_TODOS": false}}),
        );
        assert_eq!(
            mismatches,
            vec!["expected body /challengeStatus/GET_TODOS = true, observed false"]
        );
    }
}
