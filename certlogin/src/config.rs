use crate::credentials::{CredentialProvider, SharedSecret};
use crate::duration::serde_duration;
use crate::executor::ScreenshotPolicy;
use crate::flow::{FlowOptions, FlowTiming};
use crate::overlay::{OverlayDismissal, PlatformFlag};
use crate::platforms::webdriver::DEFAULT_REQUEST_TIMEOUT;
use crate::platforms::SessionConfig;
use crate::totp::{unix_now, SecretEncoding, Totp, TotpAlgorithm};
use crate::LoginError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_DRIVER_URL: &str = "http://127.0.0.1:4723";
pub const DEFAULT_APP_PATH: &str =
    r"C:\Program Files\Certum\SimplySign Desktop\SimplySignDesktop.exe";

/// Environment overrides applied on top of the config file
pub const ENV_IDENTIFIER: &str = "CERTLOGIN_IDENTIFIER";
pub const ENV_DRIVER_URL: &str = "CERTLOGIN_DRIVER_URL";
pub const ENV_APP_PATH: &str = "CERTLOGIN_APP";

/// Settings for one login run, loaded from YAML with every field optional
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoginConfig {
    pub driver_url: String,
    pub app_path: String,
    /// Extra capabilities merged over the defaults
    pub capabilities: Map<String, Value>,
    pub identifier: Option<String>,
    pub totp: TotpConfig,
    pub platform: PlatformConfig,
    pub overlay: OverlayConfig,
    pub timing: TimingConfig,
    pub screenshots_dir: Option<PathBuf>,
    /// Upper bound on any single driver request
    #[serde(with = "serde_duration")]
    pub request_timeout: Duration,
    pub detach_session_on_exit: bool,
    pub before_login: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TotpConfig {
    /// Environment variable holding the shared secret
    pub secret_env: String,
    pub algorithm: TotpAlgorithm,
    pub digits: u32,
    #[serde(with = "serde_duration")]
    pub period: Duration,
    pub encoding: SecretEncoding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlatformConfig {
    /// Environment variable naming the runner architecture
    pub env_var: String,
    /// Value that turns on overlay dismissal
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OverlayConfig {
    pub cycles: u32,
    #[serde(with = "serde_duration")]
    pub interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    #[serde(with = "serde_duration")]
    pub launch_settle: Duration,
    #[serde(with = "serde_duration")]
    pub action_settle: Duration,
    pub trailing_waits: u32,
    #[serde(with = "serde_duration")]
    pub trailing_interval: Duration,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            driver_url: DEFAULT_DRIVER_URL.to_string(),
            app_path: DEFAULT_APP_PATH.to_string(),
            capabilities: Map::new(),
            identifier: None,
            totp: TotpConfig::default(),
            platform: PlatformConfig::default(),
            overlay: OverlayConfig::default(),
            timing: TimingConfig::default(),
            screenshots_dir: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            detach_session_on_exit: true,
            before_login: Vec::new(),
        }
    }
}

impl Default for TotpConfig {
    fn default() -> Self {
        let totp = Totp::default();
        Self {
            secret_env: "TOTP_SECRET".to_string(),
            algorithm: totp.algorithm(),
            digits: totp.digits(),
            period: totp.period(),
            encoding: SecretEncoding::Base32,
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            env_var: "RUNNER_ARCH".to_string(),
            value: "ARM64".to_string(),
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        let overlay = OverlayDismissal::default();
        Self {
            cycles: overlay.cycles,
            interval: overlay.interval,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        let timing = FlowTiming::default();
        Self {
            launch_settle: timing.launch_settle,
            action_settle: timing.action_settle,
            trailing_waits: timing.trailing_waits,
            trailing_interval: timing.trailing_interval,
        }
    }
}

impl LoginConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, LoginError> {
        serde_yaml::from_str(text).map_err(|e| LoginError::InvalidConfig(e.to_string()))
    }

    /// Read a YAML config file
    pub fn load(path: &Path) -> Result<Self, LoginError> {
        debug!("Loading config from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Apply `CERTLOGIN_*` overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let present = |name: &str| lookup(name).filter(|v: &String| !v.trim().is_empty());
        if let Some(identifier) = present(ENV_IDENTIFIER) {
            self.identifier = Some(identifier);
        }
        if let Some(url) = present(ENV_DRIVER_URL) {
            self.driver_url = url;
        }
        if let Some(app) = present(ENV_APP_PATH) {
            self.app_path = app;
        }
    }

    pub fn validate(&self) -> Result<(), LoginError> {
        if self.driver_url.trim().is_empty() {
            return Err(LoginError::InvalidConfig("driver_url is empty".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(LoginError::InvalidConfig(
                "request_timeout must be greater than zero".to_string(),
            ));
        }
        if self.app_path.trim().is_empty() {
            return Err(LoginError::InvalidConfig("app_path is empty".to_string()));
        }
        match &self.identifier {
            Some(id) if !id.is_empty() => {}
            _ => {
                return Err(LoginError::InvalidConfig(format!(
                    "identifier is not set (config file or {ENV_IDENTIFIER})"
                )))
            }
        }
        self.totp_params()?;
        Ok(())
    }

    /// Capabilities for the new-session request
    pub fn session_config(&self) -> SessionConfig {
        let mut capabilities = Map::new();
        capabilities.insert("platformName".to_string(), Value::from("Windows"));
        capabilities.insert("appium:app".to_string(), Value::from(self.app_path.clone()));
        capabilities.insert(
            "appium:automationName".to_string(),
            Value::from("Windows"),
        );
        for (key, value) in &self.capabilities {
            capabilities.insert(key.clone(), value.clone());
        }
        SessionConfig {
            driver_url: self.driver_url.clone(),
            capabilities,
        }
    }

    pub fn totp_params(&self) -> Result<Totp, LoginError> {
        Totp::new(self.totp.algorithm, self.totp.digits, self.totp.period)
    }

    /// Build the credential provider, reading the secret from its
    /// environment variable
    pub fn credential_provider(&self) -> Result<CredentialProvider, LoginError> {
        let identifier = self.identifier.clone().unwrap_or_default();
        let secret = SharedSecret::from_env(&self.totp.secret_env)?;
        CredentialProvider::new(identifier, secret, self.totp.encoding, self.totp_params()?)
    }

    /// Confirm `secret` decodes under the configured encoding and return the
    /// seconds left in the period containing `unix_secs`. No code is derived.
    pub fn check_secret(&self, secret: &SharedSecret, unix_secs: u64) -> Result<u64, LoginError> {
        let totp = self.totp_params()?;
        self.totp.encoding.decode(secret.expose())?;
        Ok(totp.remaining_at(unix_secs))
    }

    /// [`check_secret`](Self::check_secret) against the configured
    /// environment variable and the wall clock
    pub fn check_secret_from_env(&self) -> Result<u64, LoginError> {
        let secret = SharedSecret::from_env(&self.totp.secret_env)?;
        self.check_secret(&secret, unix_now()?)
    }

    /// Flow settings. The platform flag is read from the environment here,
    /// once per run.
    pub fn flow_options(&self) -> FlowOptions {
        FlowOptions {
            session: self.session_config(),
            app_path: self.app_path.clone(),
            platform: PlatformFlag::from_env(&self.platform.env_var, &self.platform.value),
            overlay: OverlayDismissal {
                cycles: self.overlay.cycles,
                interval: self.overlay.interval,
            },
            timing: FlowTiming {
                launch_settle: self.timing.launch_settle,
                action_settle: self.timing.action_settle,
                trailing_waits: self.timing.trailing_waits,
                trailing_interval: self.timing.trailing_interval,
            },
            screenshots: match &self.screenshots_dir {
                Some(dir) => ScreenshotPolicy::into_dir(dir.clone()),
                None => ScreenshotPolicy::disabled(),
            },
            detach_session_on_exit: self.detach_session_on_exit,
            before_login: self.before_login.clone(),
        }
    }
}
