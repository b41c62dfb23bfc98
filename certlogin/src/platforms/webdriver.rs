use super::{AutomationSession, SessionConfig, SessionConnector, WindowHandle};
use crate::keys::KeyInput;
use crate::LoginError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// WebDriver error codes that mean the window or session is gone
const GONE_ERRORS: &[&str] = &["no such window", "invalid session id", "no such session"];

/// Legacy JSON wire protocol status codes with the same meaning
/// (6 = NoSuchDriver, 23 = NoSuchWindow)
const GONE_LEGACY_STATUS: &[i64] = &[6, 23];

/// Default upper bound on a single driver request. Opening a session starts
/// the application, so this is generous.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Lightweight W3C WebDriver client for Appium / WinAppDriver servers
#[derive(Debug, Clone)]
pub struct WebDriverClient {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

/// Readiness report from `GET /status`
#[derive(Debug, Clone, Deserialize)]
pub struct DriverStatus {
    #[serde(default)]
    pub ready: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub build: Option<Value>,
}

impl WebDriverClient {
    pub fn new(driver_url: &str) -> Self {
        Self::with_timeout(driver_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Client whose requests fail with a transport error after `timeout`
    pub fn with_timeout(driver_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout: {}", e);
                reqwest::Client::new()
            });
        Self {
            base_url: driver_url.trim_end_matches('/').to_string(),
            timeout,
            client,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Query whether the driver server is up and accepting sessions
    pub async fn status(&self) -> Result<DriverStatus, LoginError> {
        let value = self.request(Method::GET, "/status", None).await?;
        serde_json::from_value(value)
            .map_err(|e| LoginError::Transport(format!("Failed to parse status: {e}")))
    }

    /// Create a new session with the given `alwaysMatch` capabilities
    #[instrument(skip(self, capabilities), fields(driver = %self.base_url))]
    pub async fn new_session(
        &self,
        capabilities: &serde_json::Map<String, Value>,
    ) -> Result<WebDriverSession, LoginError> {
        let body = json!({
            "capabilities": {
                "alwaysMatch": capabilities,
                "firstMatch": [{}],
            }
        });

        let response = self.send(Method::POST, "/session", Some(body)).await?;

        // W3C servers nest the id under `value`, legacy servers put it at the top level
        let session_id = response
            .get("value")
            .and_then(|v| v.get("sessionId"))
            .or_else(|| response.get("sessionId"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                LoginError::Transport("New session response carried no sessionId".to_string())
            })?
            .to_string();

        debug!("Opened WebDriver session {}", session_id);
        Ok(WebDriverSession {
            client: self.clone(),
            session_id,
        })
    }

    /// Send a request and return the `value` member of the response body
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, LoginError> {
        let mut response = self.send(method, path, body).await?;
        Ok(response
            .get_mut("value")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, LoginError> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            builder = builder.json(&body);
        } else if method == Method::POST {
            builder = builder.json(&json!({}));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LoginError::Transport(format!("{method} {path} failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LoginError::Transport(format!("Failed to read response: {e}")))?;
        let payload: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| {
                LoginError::Transport(format!("Failed to parse response to {path}: {e}"))
            })?
        };

        if let Some(err) = classify_response(status.as_u16(), &payload) {
            debug!("{} {} returned {}: {}", method, path, status, err);
            return Err(err);
        }
        Ok(payload)
    }
}

/// Turn an error response into a [`LoginError`]; `None` means success.
pub(crate) fn classify_response(status: u16, payload: &Value) -> Option<LoginError> {
    let value = payload.get("value");
    let error = value.and_then(|v| v.get("error")).and_then(Value::as_str);
    let message = value
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let legacy_status = payload
        .get("status")
        .and_then(Value::as_i64)
        .filter(|s| *s != 0);

    if let Some(error) = error {
        if GONE_ERRORS.contains(&error) {
            return Some(LoginError::SessionUnavailable(format!("{error}: {message}")));
        }
        return Some(LoginError::Driver {
            error: error.to_string(),
            message,
        });
    }

    if let Some(code) = legacy_status {
        if GONE_LEGACY_STATUS.contains(&code) {
            return Some(LoginError::SessionUnavailable(format!(
                "status {code}: {message}"
            )));
        }
        return Some(LoginError::Driver {
            error: format!("status {code}"),
            message,
        });
    }

    if !(200..300).contains(&status) {
        return Some(LoginError::Driver {
            error: format!("http {status}"),
            message,
        });
    }

    None
}

#[async_trait::async_trait]
impl SessionConnector for WebDriverClient {
    async fn open_session(
        &self,
        config: &SessionConfig,
    ) -> Result<Arc<dyn AutomationSession>, LoginError> {
        let client = if config.driver_url.trim_end_matches('/') == self.base_url {
            self.clone()
        } else {
            WebDriverClient::with_timeout(&config.driver_url, self.timeout)
        };
        let session = client.new_session(&config.capabilities).await?;
        Ok(Arc::new(session))
    }
}

/// An open WebDriver session. Dropping it leaves the remote session running.
#[derive(Debug, Clone)]
pub struct WebDriverSession {
    client: WebDriverClient,
    session_id: String,
}

impl WebDriverSession {
    fn path(&self, suffix: &str) -> String {
        format!("/session/{}{}", self.session_id, suffix)
    }
}

#[async_trait::async_trait]
impl AutomationSession for WebDriverSession {
    fn id(&self) -> &str {
        &self.session_id
    }

    async fn window_handles(&self) -> Result<Vec<WindowHandle>, LoginError> {
        let value = self
            .client
            .request(Method::GET, &self.path("/window/handles"), None)
            .await?;
        let handles: Vec<String> = serde_json::from_value(value)
            .map_err(|e| LoginError::Transport(format!("Failed to parse window handles: {e}")))?;
        Ok(handles.into_iter().map(WindowHandle).collect())
    }

    #[instrument(level = "debug", skip(self))]
    async fn switch_window(&self, handle: &WindowHandle) -> Result<(), LoginError> {
        // `name` is what JSON wire protocol servers such as WinAppDriver read
        let body = json!({ "handle": handle.as_str(), "name": handle.as_str() });
        self.client
            .request(Method::POST, &self.path("/window"), Some(body))
            .await?;
        Ok(())
    }

    async fn send_keys(&self, keys: &[KeyInput]) -> Result<(), LoginError> {
        if keys.is_empty() {
            return Ok(());
        }
        let actions: Vec<Value> = keys
            .iter()
            .flat_map(|key| {
                let value = key.wire_value();
                [
                    json!({ "type": "keyDown", "value": value }),
                    json!({ "type": "keyUp", "value": value }),
                ]
            })
            .collect();
        let body = json!({
            "actions": [{
                "type": "key",
                "id": "keyboard",
                "actions": actions,
            }]
        });
        debug!("Sending {} key actions", keys.len());
        self.client
            .request(Method::POST, &self.path("/actions"), Some(body))
            .await?;
        Ok(())
    }

    async fn save_screenshot(&self, path: &Path) -> Result<(), LoginError> {
        let value = self
            .client
            .request(Method::GET, &self.path("/screenshot"), None)
            .await?;
        let encoded = value.as_str().ok_or_else(|| {
            LoginError::Transport("Screenshot response was not a string".to_string())
        })?;
        let png = STANDARD
            .decode(encoded.trim())
            .map_err(|e| LoginError::Transport(format!("Failed to decode screenshot: {e}")))?;
        tokio::fs::write(path, png).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), LoginError> {
        match self
            .client
            .request(Method::DELETE, &self.path(""), None)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_session_unavailable() => {
                warn!("Session {} was already gone", self.session_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
