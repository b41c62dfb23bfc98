//! The login sequence: relaunch the client, focus its window, type the
//! identifier and a fresh one-time code, submit, then watch for the window to
//! go away.

use crate::credentials::CredentialProvider;
use crate::executor::{Action, ActionExecutor, ScreenshotPolicy};
use crate::keys::Key;
use crate::launcher::{execute_command, ProcessLauncher};
use crate::overlay::{OverlayDismissal, PlatformFlag};
use crate::platforms::{AutomationSession, SessionConfig, SessionConnector, WindowHandle};
use crate::LoginError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Where a login run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Init,
    AppLaunched,
    WindowFocused,
    IdentifierEntered,
    CodeEntered,
    Submitted,
    /// The login window disappeared after submit
    Closed,
    /// The login window was still there when observation ended
    Stuck,
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How a login run ended
#[derive(Debug)]
pub enum LoginOutcome {
    /// The window closed after submit, which is the only success signal
    LoggedIn,
    /// The window stayed open; a wrong code and a slow client look the same
    Stuck,
    /// Something failed before the run could reach a terminal state
    Error { at: LoginState, error: LoginError },
}

impl LoginOutcome {
    pub fn is_logged_in(&self) -> bool {
        matches!(self, LoginOutcome::LoggedIn)
    }
}

/// Result of [`LoginFlow::run`]
#[derive(Debug)]
pub struct LoginReport {
    pub outcome: LoginOutcome,
    /// Last state the run reached
    pub state: LoginState,
    /// Driver session id, when one was opened
    pub session_id: Option<String>,
    /// Whether the session was left running on the driver
    pub session_left_open: bool,
}

/// Fixed delays of the flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowTiming {
    /// Pause after relaunching the client
    pub launch_settle: Duration,
    /// Pause after each window switch or typed sequence
    pub action_settle: Duration,
    /// Number of fixed waits after submit
    pub trailing_waits: u32,
    /// Length of each trailing wait
    pub trailing_interval: Duration,
}

impl Default for FlowTiming {
    fn default() -> Self {
        Self {
            launch_settle: Duration::from_millis(3000),
            action_settle: Duration::ZERO,
            trailing_waits: 7,
            trailing_interval: Duration::from_millis(500),
        }
    }
}

/// Everything a [`LoginFlow`] needs besides its collaborators
#[derive(Debug, Clone)]
pub struct FlowOptions {
    pub session: SessionConfig,
    pub app_path: String,
    pub platform: PlatformFlag,
    pub overlay: OverlayDismissal,
    pub timing: FlowTiming,
    pub screenshots: ScreenshotPolicy,
    /// Keep the driver session alive after the run so the client's tray
    /// indicator survives
    pub detach_session_on_exit: bool,
    /// Shell commands run before the session is opened
    pub before_login: Vec<String>,
}

pub struct LoginFlow {
    options: FlowOptions,
    connector: Arc<dyn SessionConnector>,
    launcher: Arc<dyn ProcessLauncher>,
    credentials: CredentialProvider,
}

impl LoginFlow {
    pub fn new(
        options: FlowOptions,
        connector: Arc<dyn SessionConnector>,
        launcher: Arc<dyn ProcessLauncher>,
        credentials: CredentialProvider,
    ) -> Self {
        Self {
            options,
            connector,
            launcher,
            credentials,
        }
    }

    pub fn options(&self) -> &FlowOptions {
        &self.options
    }

    /// Run one login. Never fails: every error ends up in the report's
    /// outcome and is logged by category only.
    pub async fn run(&self) -> LoginReport {
        let mut state = LoginState::Init;

        for command in &self.options.before_login {
            if let Err(e) = execute_command(command).await {
                return self.failed(state, e);
            }
        }

        let session = match self.connector.open_session(&self.options.session).await {
            Ok(session) => session,
            Err(e) => return self.failed(state, e),
        };
        info!("Opened automation session {}", session.id());

        let executor = ActionExecutor::new(session.clone(), self.options.screenshots.clone());
        let outcome = match self.drive(&executor, &mut state).await {
            Ok(closed) => {
                if closed {
                    transition(&mut state, LoginState::Closed);
                    info!("Login window closed, login succeeded");
                    LoginOutcome::LoggedIn
                } else {
                    transition(&mut state, LoginState::Stuck);
                    warn!("Login window is still open after submit");
                    LoginOutcome::Stuck
                }
            }
            Err(e) => {
                error!(category = %e.category(), %state, "Error during login run");
                LoginOutcome::Error { at: state, error: e }
            }
        };

        let session_left_open = self.finish_session(session.as_ref()).await;
        LoginReport {
            outcome,
            state,
            session_id: Some(session.id().to_string()),
            session_left_open,
        }
    }

    /// Walks the state machine up to `Submitted` and observes the window.
    /// Returns whether the login window closed.
    async fn drive(
        &self,
        executor: &ActionExecutor,
        state: &mut LoginState,
    ) -> Result<bool, LoginError> {
        let timing = &self.options.timing;

        self.options
            .overlay
            .dismiss_overlay_if_needed(self.options.platform, executor)
            .await?;

        // Relaunching a running client brings up its login dialog
        self.launcher.launch(&self.options.app_path).await?;
        executor.wait(timing.launch_settle).await;
        transition(state, LoginState::AppLaunched);

        let login_window = executor
            .session()
            .window_handles()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                LoginError::SessionUnavailable("application exposes no windows".to_string())
            })?;
        executor
            .perform(
                Action::SwitchWindow(login_window.clone()),
                timing.action_settle,
            )
            .await?;
        executor.checkpoint("login01").await?;
        transition(state, LoginState::WindowFocused);

        executor
            .perform(
                Action::type_text(self.credentials.identifier()),
                timing.action_settle,
            )
            .await?;
        executor.checkpoint("login02").await?;
        executor
            .perform(Action::key(Key::Tab), timing.action_settle)
            .await?;
        transition(state, LoginState::IdentifierEntered);

        // Generated at the last moment so it cannot expire before it is sent
        let code = self.credentials.one_time_code()?;
        executor
            .perform(Action::type_text(&code), timing.action_settle)
            .await?;
        drop(code);
        executor.checkpoint("login03").await?;
        transition(state, LoginState::CodeEntered);

        let closed_on_submit = match executor
            .perform(Action::key(Key::Enter), Duration::ZERO)
            .await
        {
            Ok(()) => false,
            Err(e) if e.is_session_unavailable() => {
                debug!("Window went away while submitting: {}", e);
                true
            }
            Err(e) => return Err(e),
        };
        transition(state, LoginState::Submitted);

        self.observe_after_submit(executor, &login_window, closed_on_submit)
            .await
    }

    /// Sits through the fixed trailing waits, probing the login window before
    /// each one. The waits always run in full; probing stops once the window
    /// is gone.
    async fn observe_after_submit(
        &self,
        executor: &ActionExecutor,
        login_window: &WindowHandle,
        mut closed: bool,
    ) -> Result<bool, LoginError> {
        let timing = &self.options.timing;
        let mut label = 4;

        for _ in 0..timing.trailing_waits {
            if !closed {
                closed = probe_closed(executor, login_window, label).await?;
                label += 1;
            }
            executor.wait(timing.trailing_interval).await;
        }
        if !closed {
            closed = probe_closed(executor, login_window, label).await?;
        }
        Ok(closed)
    }

    /// Returns whether the session was left open
    async fn finish_session(&self, session: &dyn AutomationSession) -> bool {
        if self.options.detach_session_on_exit {
            info!("Leaving session {} open", session.id());
            return true;
        }
        match session.close().await {
            Ok(()) => info!("Closed session {}", session.id()),
            Err(e) => warn!(category = %e.category(), "Failed to close session"),
        }
        false
    }

    /// Report for a run that failed before a session existed
    fn failed(&self, state: LoginState, error: LoginError) -> LoginReport {
        error!(category = %error.category(), %state, "Error during login run");
        LoginReport {
            outcome: LoginOutcome::Error { at: state, error },
            state,
            session_id: None,
            session_left_open: false,
        }
    }
}

fn transition(state: &mut LoginState, next: LoginState) {
    info!(from = %state, to = %next, "Login state changed");
    *state = next;
}

/// One observation of the login window. A vanished session, a failed
/// screenshot of a vanished window, or the handle dropping out of the window
/// list all count as closed.
async fn probe_closed(
    executor: &ActionExecutor,
    login_window: &WindowHandle,
    label: u32,
) -> Result<bool, LoginError> {
    match executor.checkpoint(&format!("login{label:02}")).await {
        Ok(()) => {}
        Err(e) if e.is_session_unavailable() => return Ok(true),
        Err(e) => return Err(e),
    }
    match executor.session().window_handles().await {
        Ok(handles) => Ok(!handles.contains(login_window)),
        Err(e) if e.is_session_unavailable() => Ok(true),
        Err(e) => Err(e),
    }
}
