//! HTTP plumbing shared by the feeds, the engines and the summarizer.
//!
//! Every adapter owns its own [`Client`], built here with the run's timeout
//! so no call can hang forever.

use std::time::Duration;

use log::{debug, trace};
use reqwest::{Client, Response};

use crate::error::{AdapterError, ConfigError};

/// The User-Agent sent with every request.
pub const USER_AGENT: &str = concat!("cvescout/", env!("CARGO_PKG_VERSION"));

/// How many bytes of an error body are kept in the error message.
const ERROR_BODY_MAX_CHARS: usize = 200;

/// Creates an HTTP client with the given timeout.
pub fn build_client(timeout: Duration) -> Result<Client, ConfigError> {
    trace!("Running http::build_client()");
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(ConfigError::HttpClient)
}

/// Returns the response if its status is a success, an [`AdapterError::Status`]
/// holding the beginning of the body otherwise.
pub async fn ensure_success(response: Response) -> Result<Response, AdapterError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    debug!("Got HTTP status {} from {}", status, response.url());
    let body = response.text().await.unwrap_or_default();
    Err(AdapterError::Status {
        status: status.as_u16(),
        body: body.chars().take(ERROR_BODY_MAX_CHARS).collect(),
    })
}
