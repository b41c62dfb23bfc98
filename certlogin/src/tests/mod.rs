mod flow_tests;

use crate::keys::{Key, KeyInput};
use crate::launcher::ProcessLauncher;
use crate::platforms::{AutomationSession, SessionConfig, SessionConnector, WindowHandle};
use crate::LoginError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .with_target(true)
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    WindowHandles,
    SwitchWindow(String),
    Keys(Vec<KeyInput>),
    Screenshot(PathBuf),
    Close,
}

/// When the mock's login window goes away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseBehavior {
    Never,
    /// Gone right after the n-th Enter press was delivered
    AfterEnter(usize),
    /// Gone while the n-th Enter press is in flight, so that call fails
    DuringEnter(usize),
}

/// Recording stand-in for a driver session
pub struct MockSession {
    handles: Vec<WindowHandle>,
    handles_after_close: Option<Vec<WindowHandle>>,
    close: CloseBehavior,
    enters: AtomicUsize,
    gone: AtomicBool,
    events: Mutex<Vec<(Instant, SessionEvent)>>,
}

impl MockSession {
    pub fn new(handles: Vec<&str>) -> Self {
        Self {
            handles: handles.into_iter().map(WindowHandle::from).collect(),
            handles_after_close: None,
            close: CloseBehavior::Never,
            enters: AtomicUsize::new(0),
            gone: AtomicBool::new(false),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn closing(mut self, close: CloseBehavior) -> Self {
        self.close = close;
        self
    }

    /// After closing, list these handles instead of failing
    pub fn listing_after_close(mut self, handles: Vec<&str>) -> Self {
        self.handles_after_close = Some(handles.into_iter().map(WindowHandle::from).collect());
        self
    }

    fn record(&self, event: SessionEvent) {
        self.events.lock().unwrap().push((Instant::now(), event));
    }

    fn check_alive(&self) -> Result<(), LoginError> {
        if self.gone.load(Ordering::SeqCst) {
            Err(LoginError::SessionUnavailable(
                "no such window: window was closed".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn timeline(&self) -> Vec<(Instant, SessionEvent)> {
        self.events.lock().unwrap().clone()
    }

    /// Every key delivered, flattened in order
    pub fn keys(&self) -> Vec<KeyInput> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::Keys(keys) => Some(keys),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn count(&self, matcher: impl Fn(&SessionEvent) -> bool) -> usize {
        self.events().iter().filter(|e| matcher(e)).count()
    }
}

#[async_trait::async_trait]
impl AutomationSession for MockSession {
    fn id(&self) -> &str {
        "mock-session"
    }

    async fn window_handles(&self) -> Result<Vec<WindowHandle>, LoginError> {
        self.record(SessionEvent::WindowHandles);
        if self.gone.load(Ordering::SeqCst) {
            if let Some(handles) = &self.handles_after_close {
                return Ok(handles.clone());
            }
        }
        self.check_alive()?;
        Ok(self.handles.clone())
    }

    async fn switch_window(&self, handle: &WindowHandle) -> Result<(), LoginError> {
        self.check_alive()?;
        self.record(SessionEvent::SwitchWindow(handle.to_string()));
        Ok(())
    }

    async fn send_keys(&self, keys: &[KeyInput]) -> Result<(), LoginError> {
        self.check_alive()?;
        self.record(SessionEvent::Keys(keys.to_vec()));

        let enters = keys
            .iter()
            .filter(|k| **k == KeyInput::Key(Key::Enter))
            .count();
        if enters == 0 {
            return Ok(());
        }
        let total = self.enters.fetch_add(enters, Ordering::SeqCst) + enters;
        match self.close {
            CloseBehavior::AfterEnter(n) if total >= n => {
                self.gone.store(true, Ordering::SeqCst);
                Ok(())
            }
            CloseBehavior::DuringEnter(n) if total >= n => {
                self.gone.store(true, Ordering::SeqCst);
                self.check_alive()
            }
            _ => Ok(()),
        }
    }

    async fn save_screenshot(&self, path: &Path) -> Result<(), LoginError> {
        self.check_alive()?;
        std::fs::write(path, b"\x89PNG\r\n\x1a\n")?;
        self.record(SessionEvent::Screenshot(path.to_path_buf()));
        Ok(())
    }

    async fn close(&self) -> Result<(), LoginError> {
        self.record(SessionEvent::Close);
        Ok(())
    }
}

/// Hands out one prepared session
pub struct MockConnector {
    session: Option<Arc<MockSession>>,
    pub opened: Mutex<Vec<SessionConfig>>,
}

impl MockConnector {
    pub fn new(session: Arc<MockSession>) -> Self {
        Self {
            session: Some(session),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn refusing() -> Self {
        Self {
            session: None,
            opened: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl SessionConnector for MockConnector {
    async fn open_session(
        &self,
        config: &SessionConfig,
    ) -> Result<Arc<dyn AutomationSession>, LoginError> {
        self.opened.lock().unwrap().push(config.clone());
        match &self.session {
            Some(session) => Ok(session.clone()),
            None => Err(LoginError::Transport("connection refused".to_string())),
        }
    }
}

#[derive(Default)]
pub struct MockLauncher {
    pub fail: bool,
    pub launched: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl ProcessLauncher for MockLauncher {
    async fn launch(&self, path: &str) -> Result<(), LoginError> {
        self.launched.lock().unwrap().push(path.to_string());
        if self.fail {
            return Err(LoginError::ProcessLaunchFailure {
                path: path.to_string(),
                message: "The system cannot find the file specified".to_string(),
            });
        }
        Ok(())
    }
}
