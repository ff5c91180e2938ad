// Hypervisor adapter executor
// reason: reqwest for the adapter's REST control plane
use async_trait::async_trait;
use reqwest::Method;
use std::time::Duration;
use tracing::{debug, info};

use chaos_core::domain::CommandResult;
use chaos_core::port::remote_executor::{ExecutionError, RemoteExecutor};

/// A parsed adapter command: `METHOD PATH [BODY]`
#[derive(Debug, Clone, PartialEq, Eq)]
struct AdapterRequest {
    method: Method,
    path: String,
    body: Option<String>,
}

fn parse_request(command: &str) -> Result<AdapterRequest, ExecutionError> {
    let command = command.trim();
    let (method, rest) = command
        .split_once(char::is_whitespace)
        .ok_or_else(|| ExecutionError::InvalidCommand(format!("expected 'METHOD PATH': {}", command)))?;

    let method = match method.to_ascii_uppercase().as_str() {
        "GET" => Method::GET,
        "POST" => Method::POST,
        "PUT" => Method::PUT,
        "PATCH" => Method::PATCH,
        "DELETE" => Method::DELETE,
        other => {
            return Err(ExecutionError::InvalidCommand(format!(
                "unsupported method '{}'",
                other
            )))
        }
    };

    let rest = rest.trim_start();
    let (path, body) = match rest.split_once(char::is_whitespace) {
        Some((path, body)) => (path, Some(body.trim()).filter(|b| !b.is_empty())),
        None => (rest, None),
    };
    if !path.starts_with('/') {
        return Err(ExecutionError::InvalidCommand(format!(
            "path must be absolute: {}",
            path
        )));
    }

    Ok(AdapterRequest {
        method,
        path: path.to_string(),
        body: body.map(str::to_string),
    })
}

/// Executor for the hypervisor adapter
///
/// A 2xx response maps to exit code 0, any other status to its numeric code.
/// The response body is the raw output.
pub struct AdapterExecutor {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    default_timeout: Duration,
}

impl AdapterExecutor {
    pub fn new(base_url: impl Into<String>, token: Option<String>, default_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            default_timeout,
        }
    }

    fn map_error(&self, e: reqwest::Error, limit: Duration) -> ExecutionError {
        if e.is_timeout() {
            ExecutionError::Timeout(limit.as_secs())
        } else if e.is_connect() {
            ExecutionError::Unreachable(format!("{}: {}", self.base_url, e))
        } else {
            ExecutionError::Io(e.to_string())
        }
    }
}

#[async_trait]
impl RemoteExecutor for AdapterExecutor {
    async fn execute(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, ExecutionError> {
        let request = parse_request(command)?;
        let limit = timeout.unwrap_or(self.default_timeout);
        let url = format!("{}{}", self.base_url, request.path);

        debug!(method = %request.method, url = %url, "Calling hypervisor adapter");

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .timeout(limit);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = builder.send().await.map_err(|e| self.map_error(e, limit))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_error(e, limit))?;

        info!(
            method = %request.method,
            path = %request.path,
            status = status.as_u16(),
            "Hypervisor adapter responded"
        );

        let exit_code = if status.is_success() {
            0
        } else {
            i32::from(status.as_u16())
        };
        Ok(CommandResult::new(exit_code, text))
    }
}
