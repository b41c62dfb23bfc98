use crate::keys::{Key, KeyInput};
use crate::platforms::{AutomationSession, WindowHandle};
use crate::LoginError;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// A single UI action against the active session
#[derive(Clone, PartialEq, Eq)]
pub enum Action {
    /// Press each input in order
    Keys(Vec<KeyInput>),
    /// Move focus to a window
    SwitchWindow(WindowHandle),
}

impl Action {
    pub fn key(key: Key) -> Self {
        Action::Keys(vec![KeyInput::Key(key)])
    }

    /// One key action per character of `text`
    pub fn type_text(text: &str) -> Self {
        Action::Keys(KeyInput::chars(text))
    }
}

// Typed characters may be credentials, so only their count is ever shown
impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Keys(keys) => match keys.as_slice() {
                [KeyInput::Key(key)] => write!(f, "Key({key})"),
                _ => write!(f, "Keys({} inputs)", keys.len()),
            },
            Action::SwitchWindow(handle) => write!(f, "SwitchWindow({handle})"),
        }
    }
}

/// Where checkpoint screenshots go; `None` turns checkpoints into no-ops
#[derive(Debug, Clone, Default)]
pub struct ScreenshotPolicy {
    pub dir: Option<PathBuf>,
}

impl ScreenshotPolicy {
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn into_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }
}

/// Sends one action at a time and then holds the caller for a fixed settle
/// delay. Nothing is retried and nothing is verified.
#[derive(Clone)]
pub struct ActionExecutor {
    session: Arc<dyn AutomationSession>,
    screenshots: ScreenshotPolicy,
}

impl ActionExecutor {
    pub fn new(session: Arc<dyn AutomationSession>, screenshots: ScreenshotPolicy) -> Self {
        Self {
            session,
            screenshots,
        }
    }

    pub fn session(&self) -> &Arc<dyn AutomationSession> {
        &self.session
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn perform(&self, action: Action, settle: Duration) -> Result<(), LoginError> {
        match &action {
            Action::Keys(keys) => self.session.send_keys(keys).await?,
            Action::SwitchWindow(handle) => self.session.switch_window(handle).await?,
        }
        self.wait(settle).await;
        Ok(())
    }

    /// Unconditional pause
    pub async fn wait(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }

    /// Save a screenshot named after `label` when screenshots are enabled
    pub async fn checkpoint(&self, label: &str) -> Result<(), LoginError> {
        let Some(dir) = &self.screenshots.dir else {
            return Ok(());
        };
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{label}.png"));
        debug!("Saving screenshot {}", path.display());
        self.session.save_screenshot(&path).await
    }
}
