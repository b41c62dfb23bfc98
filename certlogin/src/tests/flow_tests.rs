use super::{init_tracing, CloseBehavior, MockConnector, MockLauncher, MockSession, SessionEvent};
use crate::credentials::{CredentialProvider, SharedSecret};
use crate::executor::ScreenshotPolicy;
use crate::flow::{FlowOptions, FlowTiming, LoginFlow, LoginOutcome, LoginState};
use crate::keys::{Key, KeyInput};
use crate::overlay::{OverlayDismissal, PlatformFlag};
use crate::platforms::SessionConfig;
use crate::totp::{SecretEncoding, Totp, TotpAlgorithm};
use crate::LoginError;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

const IDENTIFIER: &str = "user@example.com";
const NOW: u64 = 1_700_000_010;
const APP: &str = r"C:\Program Files\Certum\SimplySign Desktop\SimplySignDesktop.exe";

fn options(platform_value: Option<&str>) -> FlowOptions {
    FlowOptions {
        session: SessionConfig {
            driver_url: "http://127.0.0.1:4723".to_string(),
            capabilities: serde_json::Map::new(),
        },
        app_path: APP.to_string(),
        platform: PlatformFlag::from_value(platform_value, "ARM64"),
        overlay: OverlayDismissal::default(),
        timing: FlowTiming::default(),
        screenshots: ScreenshotPolicy::disabled(),
        detach_session_on_exit: true,
        before_login: Vec::new(),
    }
}

/// Provider whose clock records how many session events had happened each
/// time a code was generated
fn provider(session: Arc<MockSession>, calls: Arc<Mutex<Vec<usize>>>) -> CredentialProvider {
    CredentialProvider::new(
        IDENTIFIER,
        SharedSecret::new("SECRET123"),
        SecretEncoding::Ascii,
        Totp::new(TotpAlgorithm::Sha256, 6, Duration::from_secs(30)).unwrap(),
    )
    .unwrap()
    .with_clock(Arc::new(move || {
        calls.lock().unwrap().push(session.events().len());
        Ok(NOW)
    }))
}

fn expected_code() -> String {
    Totp::default().generate_at(b"SECRET123", NOW).unwrap()
}

struct Harness {
    session: Arc<MockSession>,
    launcher: Arc<MockLauncher>,
    code_calls: Arc<Mutex<Vec<usize>>>,
    flow: LoginFlow,
}

fn harness(session: MockSession, options: FlowOptions) -> Harness {
    harness_with_launcher(session, options, MockLauncher::default())
}

fn harness_with_launcher(
    session: MockSession,
    options: FlowOptions,
    launcher: MockLauncher,
) -> Harness {
    init_tracing();
    let session = Arc::new(session);
    let launcher = Arc::new(launcher);
    let code_calls = Arc::new(Mutex::new(Vec::new()));
    let flow = LoginFlow::new(
        options,
        Arc::new(MockConnector::new(session.clone())),
        launcher.clone(),
        provider(session.clone(), code_calls.clone()),
    );
    Harness {
        session,
        launcher,
        code_calls,
        flow,
    }
}

fn login_keys(code: &str) -> Vec<KeyInput> {
    let mut keys = KeyInput::chars(IDENTIFIER);
    keys.push(KeyInput::Key(Key::Tab));
    keys.extend(KeyInput::chars(code));
    keys.push(KeyInput::Key(Key::Enter));
    keys
}

#[tokio::test(start_paused = true)]
async fn test_scenario_window_closes_after_submit() {
    let h = harness(
        MockSession::new(vec!["login", "tray"]).closing(CloseBehavior::AfterEnter(1)),
        options(None),
    );
    let started = Instant::now();

    let report = h.flow.run().await;

    assert!(matches!(report.outcome, LoginOutcome::LoggedIn), "{report:?}");
    assert_eq!(report.state, LoginState::Closed);
    assert!(report.session_left_open);
    assert_eq!(report.session_id.as_deref(), Some("mock-session"));

    // No overlay keys, identifier, Tab, code, Enter and nothing else
    let code = expected_code();
    let keys = h.session.keys();
    assert_eq!(keys, login_keys(&code));
    assert!(keys[..16]
        .iter()
        .zip(IDENTIFIER.chars())
        .all(|(k, c)| *k == KeyInput::Char(c)));
    assert_eq!(keys[16], KeyInput::Key(Key::Tab));

    // Every typed character went out as its own key input
    let events = h.session.events();
    assert_eq!(events[0], SessionEvent::WindowHandles);
    assert_eq!(events[1], SessionEvent::SwitchWindow("login".to_string()));
    assert_eq!(events[2], SessionEvent::Keys(KeyInput::chars(IDENTIFIER)));
    assert_eq!(events[3], SessionEvent::Keys(vec![KeyInput::Key(Key::Tab)]));
    assert_eq!(events[4], SessionEvent::Keys(KeyInput::chars(&code)));
    assert_eq!(events[5], SessionEvent::Keys(vec![KeyInput::Key(Key::Enter)]));

    // One code, generated after Tab went out and before the digits did
    assert_eq!(*h.code_calls.lock().unwrap(), vec![4]);

    // Launch settle plus seven trailing waits of 500ms
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(3000 + 7 * 500), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(3000 + 8 * 500), "{elapsed:?}");

    assert_eq!(*h.launcher.launched.lock().unwrap(), vec![APP.to_string()]);
    assert_eq!(h.session.count(|e| *e == SessionEvent::Close), 0);
}

#[tokio::test(start_paused = true)]
async fn test_trailing_waits_follow_submit() {
    let h = harness(
        MockSession::new(vec!["login"]).closing(CloseBehavior::AfterEnter(1)),
        options(None),
    );
    let started = Instant::now();
    let report = h.flow.run().await;
    assert!(report.outcome.is_logged_in());

    let timeline = h.session.timeline();
    let (submitted_at, _) = timeline
        .iter()
        .find(|(_, e)| *e == SessionEvent::Keys(vec![KeyInput::Key(Key::Enter)]))
        .cloned()
        .unwrap();
    // The relaunch settle happens before anything is sent to the window
    assert!(timeline[0].0 - started >= Duration::from_millis(3000));
    assert!(started.elapsed() - (submitted_at - started) >= Duration::from_millis(3500));
}

#[tokio::test(start_paused = true)]
async fn test_submit_failure_counts_as_closed() {
    let h = harness(
        MockSession::new(vec!["login"]).closing(CloseBehavior::DuringEnter(1)),
        options(None),
    );

    let report = h.flow.run().await;

    assert!(matches!(report.outcome, LoginOutcome::LoggedIn), "{report:?}");
    assert_eq!(report.state, LoginState::Closed);
    // Nothing was probed once the window was known to be gone
    let probes_after_submit = h.session.count(|e| *e == SessionEvent::WindowHandles);
    assert_eq!(probes_after_submit, 1);
}

#[tokio::test(start_paused = true)]
async fn test_handle_dropping_out_of_list_counts_as_closed() {
    let h = harness(
        MockSession::new(vec!["login"])
            .closing(CloseBehavior::AfterEnter(1))
            .listing_after_close(vec!["tray"]),
        options(None),
    );

    let report = h.flow.run().await;

    assert!(report.outcome.is_logged_in(), "{report:?}");
    assert_eq!(report.state, LoginState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_window_that_stays_open_is_stuck() {
    let h = harness(MockSession::new(vec!["login"]), options(None));
    let started = Instant::now();

    let report = h.flow.run().await;

    assert!(matches!(report.outcome, LoginOutcome::Stuck), "{report:?}");
    assert_eq!(report.state, LoginState::Stuck);
    assert!(report.session_left_open);

    // One lookup to focus, then a probe before each trailing wait and one after
    assert_eq!(h.session.count(|e| *e == SessionEvent::WindowHandles), 1 + 8);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(6500), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(7000), "{elapsed:?}");
    assert_eq!(h.session.keys(), login_keys(&expected_code()));
}

#[tokio::test(start_paused = true)]
async fn test_overlay_dismissal_runs_before_relaunch_on_flagged_platform() {
    let h = harness(
        // Three overlay Enters come first, the login submit is the fourth
        MockSession::new(vec!["login"]).closing(CloseBehavior::AfterEnter(4)),
        options(Some("ARM64")),
    );
    let started = Instant::now();

    let report = h.flow.run().await;

    assert!(report.outcome.is_logged_in(), "{report:?}");
    let mut expected = vec![
        KeyInput::Key(Key::Enter),
        KeyInput::Key(Key::Enter),
        KeyInput::Key(Key::Enter),
        KeyInput::Key(Key::Escape),
    ];
    expected.extend(login_keys(&expected_code()));
    assert_eq!(h.session.keys(), expected);

    // 3 x 3s overlay, 3s relaunch settle, 7 x 500ms trailing
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(9000 + 3000 + 3500), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(9000 + 3000 + 4000), "{elapsed:?}");
    assert_eq!(*h.code_calls.lock().unwrap(), vec![8]);
}

#[tokio::test(start_paused = true)]
async fn test_other_platform_values_never_dismiss() {
    for value in [Some("X64"), Some("arm64"), Some("ARM"), None] {
        let h = harness(
            MockSession::new(vec!["login"]).closing(CloseBehavior::AfterEnter(1)),
            options(value),
        );
        let report = h.flow.run().await;
        assert!(report.outcome.is_logged_in());
        assert!(!h.session.keys().contains(&KeyInput::Key(Key::Escape)));
        assert_eq!(h.session.keys(), login_keys(&expected_code()));
    }
}

#[tokio::test(start_paused = true)]
async fn test_no_windows_fails_before_typing() {
    let h = harness(MockSession::new(vec![]), options(None));

    let report = h.flow.run().await;

    match report.outcome {
        LoginOutcome::Error { at, error } => {
            assert_eq!(at, LoginState::AppLaunched);
            assert!(error.is_session_unavailable());
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(h.session.keys().is_empty());
    assert!(h.code_calls.lock().unwrap().is_empty());
    assert!(report.session_left_open);
}

#[tokio::test(start_paused = true)]
async fn test_launch_failure_aborts() {
    let h = harness_with_launcher(
        MockSession::new(vec!["login"]),
        options(None),
        MockLauncher {
            fail: true,
            ..Default::default()
        },
    );

    let report = h.flow.run().await;

    assert!(matches!(
        report.outcome,
        LoginOutcome::Error {
            at: LoginState::Init,
            error: LoginError::ProcessLaunchFailure { .. }
        }
    ));
    assert!(h.session.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_driver_is_reported() {
    let session = Arc::new(MockSession::new(vec!["login"]));
    let flow = LoginFlow::new(
        options(None),
        Arc::new(MockConnector::refusing()),
        Arc::new(MockLauncher::default()),
        provider(session, Arc::new(Mutex::new(Vec::new()))),
    );

    let report = flow.run().await;

    assert!(matches!(
        report.outcome,
        LoginOutcome::Error {
            at: LoginState::Init,
            error: LoginError::Transport(_)
        }
    ));
    assert_eq!(report.session_id, None);
    assert!(!report.session_left_open);
}

#[tokio::test(start_paused = true)]
async fn test_session_closed_when_not_detached() {
    let mut opts = options(None);
    opts.detach_session_on_exit = false;
    let h = harness(MockSession::new(vec!["login"]), opts);

    let report = h.flow.run().await;

    assert!(matches!(report.outcome, LoginOutcome::Stuck));
    assert!(!report.session_left_open);
    assert_eq!(h.session.events().last(), Some(&SessionEvent::Close));
}

#[tokio::test(start_paused = true)]
async fn test_screenshots_stop_once_window_is_gone() {
    let dir = tempfile::tempdir().unwrap();
    let mut opts = options(None);
    opts.screenshots = ScreenshotPolicy::into_dir(dir.path().join("shots"));
    let h = harness(
        MockSession::new(vec!["login"]).closing(CloseBehavior::AfterEnter(1)),
        opts,
    );

    let report = h.flow.run().await;

    assert!(report.outcome.is_logged_in());
    let shots = dir.path().join("shots");
    for label in ["login01", "login02", "login03"] {
        assert!(shots.join(format!("{label}.png")).exists(), "{label}");
    }
    assert!(!shots.join("login04.png").exists());
    assert!(!shots.join("oob1.png").exists());
}

#[tokio::test(start_paused = true)]
async fn test_failing_before_login_command_aborts() {
    let mut opts = options(None);
    opts.before_login = vec!["exit 1".to_string()];
    let h = harness(MockSession::new(vec!["login"]), opts);

    let report = h.flow.run().await;

    assert!(matches!(
        report.outcome,
        LoginOutcome::Error {
            error: LoginError::CommandExecutionFailure { .. },
            ..
        }
    ));
    assert!(h.session.events().is_empty());
    assert!(h.launcher.launched.lock().unwrap().is_empty());
}
