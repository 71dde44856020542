//! API case adapter
//!
//! Issues one HTTP request and evaluates the case's assertion rules against
//! the response. Transport failures produce a failed outcome, never an error.

use probe_core::domain::definition::{ApiCaseDefinition, AssertionRules};
use probe_core::domain::job::JobHandle;
use probe_core::domain::outcome::{ApiCaseResult, ExecutionOutcome, OutcomePayload};
use reqwest::{Client, Method};
use serde_json::{Value as JsonValue, json};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::service::ProgressReporter;

/// Executes API test cases over HTTP
#[derive(Clone)]
pub struct ApiCaseAdapter {
    client: Client,
    request_timeout: Duration,
}

impl ApiCaseAdapter {
    /// Creates an adapter whose requests give up after `request_timeout`
    pub fn new(request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            request_timeout,
        })
    }

    /// Runs one case and reports progress for it
    pub async fn run(
        &self,
        handle: JobHandle,
        case: &ApiCaseDefinition,
        progress: &dyn ProgressReporter,
    ) -> ExecutionOutcome {
        progress
            .report(
                handle,
                30,
                "request",
                &format!("sending {} {}", case.method.to_ascii_uppercase(), case.url),
            )
            .await;

        let outcome = self.execute(case).await;

        progress
            .report(handle, 90, "assertions", "response evaluated")
            .await;

        outcome
    }

    /// Runs one case without progress reporting
    pub async fn execute(&self, case: &ApiCaseDefinition) -> ExecutionOutcome {
        let started = Instant::now();

        let method = match Method::from_bytes(case.method.to_ascii_uppercase().as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                return transport_failure(
                    started,
                    format!("Request failed: invalid HTTP method '{}'", case.method),
                );
            }
        };

        let mut request = self.client.request(method, &case.url).query(&case.params);
        for (name, value) in &case.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if case.sends_body() {
            if let Some(body) = &case.body {
                request = request.json(body);
            }
        }

        debug!("Sending {} {}", case.method, case.url);

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return transport_failure(started, self.describe(&e)),
        };

        let status_code = response.status().as_u16();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return transport_failure(started, self.describe(&e)),
        };

        let parsed: Option<JsonValue> = serde_json::from_str(&text).ok();
        let assertion_errors =
            evaluate_assertions(&case.assertions, status_code, &text, parsed.as_ref());
        let response_data = parsed.unwrap_or_else(|| json!({ "text": text }));

        let elapsed = started.elapsed().as_secs_f64();
        let result = ApiCaseResult {
            status_code: Some(status_code),
            response_data: Some(response_data),
            assertion_errors,
        };

        info!(
            "API case '{}' returned {} with {} failed assertion(s)",
            case.name,
            status_code,
            result.assertion_errors.len()
        );

        if result.assertion_errors.is_empty() {
            ExecutionOutcome::succeeded(elapsed, OutcomePayload::ApiCase(result))
        } else {
            let message = result.assertion_errors.join("; ");
            ExecutionOutcome::failed(elapsed, OutcomePayload::ApiCase(result), message)
        }
    }

    fn describe(&self, err: &reqwest::Error) -> String {
        if err.is_timeout() {
            format!(
                "Request failed: timed out after {}s",
                self.request_timeout.as_secs()
            )
        } else {
            format!("Request failed: {}", err)
        }
    }
}

fn transport_failure(started: Instant, message: String) -> ExecutionOutcome {
    let result = ApiCaseResult {
        status_code: None,
        response_data: None,
        assertion_errors: vec![message.clone()],
    };
    ExecutionOutcome::failed(
        started.elapsed().as_secs_f64(),
        OutcomePayload::ApiCase(result),
        message,
    )
}

/// Evaluates assertion rules against a response
///
/// # Returns
/// One message per failed assertion, empty when everything passed
pub fn evaluate_assertions(
    rules: &AssertionRules,
    status_code: u16,
    body: &str,
    json_body: Option<&JsonValue>,
) -> Vec<String> {
    let mut errors = Vec::new();

    if let Some(expected) = rules.status_code {
        if expected != status_code {
            errors.push(format!(
                "Status code assertion failed: expected {}, got {}",
                expected, status_code
            ));
        }
    }

    if let Some(needle) = &rules.response_contains {
        if !body.contains(needle.as_str()) {
            errors.push(format!(
                "Response contains assertion failed: expected '{}' not found in response",
                needle
            ));
        }
    }

    if let Some(expectations) = &rules.response_json {
        for (path, expected) in expectations {
            let actual = json_body
                .and_then(|root| lookup_path(root, path))
                .cloned()
                .unwrap_or(JsonValue::Null);
            if &actual != expected {
                errors.push(format!(
                    "JSON assertion failed for '{}': expected {}, got {}",
                    path, expected, actual
                ));
            }
        }
    }

    errors
}

/// Resolves a dotted path such as `data.items.0.id`
///
/// Numeric segments index into arrays.
pub fn lookup_path<'a>(root: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    path.split('.').try_fold(root, |value, segment| match value {
        JsonValue::Object(map) => map.get(segment),
        JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
