//! Automated login for the SimplySign Desktop certificate client.
//!
//! A run opens a WebDriver session against an Appium-compatible driver,
//! optionally clears an out-of-box overlay, relaunches the client, types the
//! configured identifier and a freshly generated one-time code, and treats
//! the login window disappearing as success. The session is left open by
//! default so the client's tray indicator keeps running.

pub mod config;
pub mod credentials;
pub mod duration;
pub mod errors;
pub mod executor;
pub mod flow;
pub mod keys;
pub mod launcher;
pub mod logging;
pub mod overlay;
pub mod platforms;
#[cfg(test)]
mod tests;
pub mod totp;

pub use config::LoginConfig;
pub use credentials::{CredentialProvider, SharedSecret};
pub use errors::{ErrorCategory, LoginError};
pub use executor::{Action, ActionExecutor, ScreenshotPolicy};
pub use flow::{FlowOptions, FlowTiming, LoginFlow, LoginOutcome, LoginReport, LoginState};
pub use keys::{Key, KeyInput};
pub use launcher::{execute_command, ProcessLauncher, SystemLauncher};
pub use overlay::{OverlayDismissal, PlatformFlag};
pub use platforms::{
    AutomationSession, SessionConfig, SessionConnector, WebDriverClient, WebDriverSession,
    WindowHandle,
};
pub use totp::{SecretEncoding, Totp, TotpAlgorithm};
