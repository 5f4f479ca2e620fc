//! Client for the forum site's REST web-service endpoint.
//!
//! Every call is a form-encoded POST to `{site}/webservice/rest/server.php`
//! naming the web-service function. The site reports its own failures with a
//! 200 response carrying `exception`/`errorcode`/`message` (or `error` for
//! token problems), so those are decoded before the typed payload.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::Config;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("{message} ({errorcode})")]
    Remote { errorcode: String, message: String },
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl WsError {
    /// True when the site itself answered with an error, as opposed to being unreachable.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// True when the site refused the session itself (bad token, maintenance,
    /// login required) rather than the particular request. Bodies without an
    /// error code count as session failures.
    #[must_use]
    pub fn is_session_error(&self) -> bool {
        match self {
            Self::Remote { errorcode, .. } => {
                errorcode.is_empty() || SESSION_ERROR_CODES.contains(&errorcode.as_str())
            }
            _ => false,
        }
    }
}

const SESSION_ERROR_CODES: &[&str] = &[
    "invalidtoken",
    "accessexception",
    "servicerequireslogin",
    "sitemaintenance",
    "requireloginerror",
    "usernotfullysetup",
    "forcepasswordchangenotice",
    "webservicesnotenabled",
    "servicenotavailable",
    "invalidlogin",
];

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    exception: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    errorcode: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Authenticated web-service client for one site.
#[derive(Debug, Clone)]
pub struct WsClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl WsClient {
    /// Build a client for the configured site.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self, WsError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("forum-discussion-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            endpoint: format!(
                "{}/webservice/rest/server.php",
                config.site_url.trim_end_matches('/')
            ),
            token: config.ws_token.clone(),
        })
    }

    /// Call a web-service function and decode its JSON response.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Remote`] when the site reports an exception, and the
    /// other variants when the site cannot be reached or answers garbage.
    pub async fn call<T: DeserializeOwned>(
        &self,
        function: &str,
        params: &[(&str, String)],
    ) -> Result<T, WsError> {
        let mut form: Vec<(&str, String)> = Vec::with_capacity(params.len() + 3);
        form.push(("wstoken", self.token.clone()));
        form.push(("wsfunction", function.to_string()));
        form.push(("moodlewsrestformat", "json".to_string()));
        form.extend(params.iter().cloned());

        trace!(function, "Calling web service");

        let response = self.http.post(&self.endpoint).form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            debug!(function, status = status.as_u16(), "Web service returned error status");
            return Err(WsError::Status(status.as_u16()));
        }

        let body: serde_json::Value = response.json().await?;
        if let Some(err) = remote_error(&body) {
            debug!(function, error = %err, "Web service raised an exception");
            return Err(err);
        }

        Ok(serde_json::from_value(body)?)
    }
}

fn remote_error(body: &serde_json::Value) -> Option<WsError> {
    if !body.is_object() {
        return None;
    }
    let parsed: ErrorBody = serde_json::from_value(body.clone()).ok()?;
    if parsed.exception.is_none() && parsed.error.is_none() {
        return None;
    }
    Some(WsError::Remote {
        errorcode: parsed.errorcode.unwrap_or_default(),
        message: parsed.message.or(parsed.error).unwrap_or_default(),
    })
}
