use crate::keys::KeyInput;
use crate::LoginError;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub mod webdriver;

pub use webdriver::{WebDriverClient, WebDriverSession};

/// Identifier of one top-level window of the automated application
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub String);

impl WindowHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WindowHandle {
    fn from(value: &str) -> Self {
        WindowHandle(value.to_string())
    }
}

/// Settings needed to open a new automation session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL of the driver server, e.g. `http://127.0.0.1:4723`
    pub driver_url: String,
    /// `alwaysMatch` capabilities sent with the new-session request
    pub capabilities: Map<String, Value>,
}

/// The capability set an active automation session must expose.
///
/// Every call fails with [`LoginError::SessionUnavailable`] once the target
/// window or the session itself is gone.
#[async_trait::async_trait]
pub trait AutomationSession: Send + Sync {
    /// Driver-assigned session id
    fn id(&self) -> &str;

    /// Top-level window handles, in the order the driver reports them
    async fn window_handles(&self) -> Result<Vec<WindowHandle>, LoginError>;

    /// Move focus to the given window
    async fn switch_window(&self, handle: &WindowHandle) -> Result<(), LoginError>;

    /// Press each input in order, one key action per entry
    async fn send_keys(&self, keys: &[KeyInput]) -> Result<(), LoginError>;

    /// Write a PNG screenshot of the current window to `path`
    async fn save_screenshot(&self, path: &Path) -> Result<(), LoginError>;

    /// End the session on the driver side
    async fn close(&self) -> Result<(), LoginError>;
}

/// Opens automation sessions
#[async_trait::async_trait]
pub trait SessionConnector: Send + Sync {
    async fn open_session(
        &self,
        config: &SessionConfig,
    ) -> Result<Arc<dyn AutomationSession>, LoginError>;
}
