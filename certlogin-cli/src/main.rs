//! certlogin CLI
//!
//! Logs a user into SimplySign Desktop through an Appium-compatible driver so
//! that code signing tools can use the cloud certificate afterwards.
//!
//! Usage:
//!   certlogin login --identifier user@example.com   # TOTP secret in $TOTP_SECRET
//!   certlogin secret                                # check the TOTP secret decodes
//!   certlogin status                                # check the driver is up

use anyhow::{Context, Result};
use certlogin::logging::init_logging;
use certlogin::{LoginConfig, LoginFlow, LoginOutcome, SystemLauncher, WebDriverClient};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "certlogin")]
#[command(about = "Automated SimplySign Desktop login with a time-based one-time code")]
struct Cli {
    /// Verbose output
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser, Debug)]
struct ConfigArgs {
    /// YAML config file
    #[arg(long, short = 'c', env = "CERTLOGIN_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct LoginArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Login identifier typed into the first field
    #[arg(long, short = 'i')]
    identifier: Option<String>,

    /// Driver server URL (e.g., http://127.0.0.1:4723)
    #[arg(long, short = 'u')]
    driver_url: Option<String>,

    /// Path of the client executable
    #[arg(long)]
    app: Option<PathBuf>,

    /// Save checkpoint screenshots into this directory
    #[arg(long)]
    screenshots: Option<PathBuf>,

    /// End the driver session afterwards (this also ends the client's tray icon)
    #[arg(long)]
    close_session: bool,

    /// Exit with 1 on error and 2 when the login window never closed
    #[arg(long)]
    strict_exit: bool,
}

#[derive(Parser, Debug)]
struct StatusArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Driver server URL
    #[arg(long, short = 'u')]
    driver_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the login flow once
    Login(LoginArgs),
    /// Check the TOTP secret decodes and show how long the current code lasts
    Secret(ConfigArgs),
    /// Check whether the driver server is ready
    Status(StatusArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(if cli.verbose { "debug" } else { "info" });

    let result = match cli.command {
        Commands::Login(args) => run_login(args).await,
        Commands::Secret(args) => check_secret(args).map(|_| ExitCode::SUCCESS),
        Commands::Status(args) => show_status(args).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &ConfigArgs) -> Result<LoginConfig> {
    let mut config = match &args.config {
        Some(path) => LoginConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => LoginConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

async fn run_login(args: LoginArgs) -> Result<ExitCode> {
    let mut config = load_config(&args.config)?;
    if let Some(identifier) = args.identifier {
        config.identifier = Some(identifier);
    }
    if let Some(url) = args.driver_url {
        config.driver_url = url;
    }
    if let Some(app) = args.app {
        config.app_path = app.to_string_lossy().to_string();
    }
    if let Some(dir) = args.screenshots {
        config.screenshots_dir = Some(dir);
    }
    if args.close_session {
        config.detach_session_on_exit = false;
    }
    config.validate().context("Invalid configuration")?;

    // A missing or broken secret is a failed run, not a usage error
    let credentials = match config.credential_provider() {
        Ok(credentials) => credentials,
        Err(e) => {
            error!(category = %e.category(), "Error during login run");
            return Ok(exit_for(args.strict_exit, 1));
        }
    };

    info!(driver = %config.driver_url, "Starting login");
    let flow = LoginFlow::new(
        config.flow_options(),
        Arc::new(WebDriverClient::with_timeout(
            &config.driver_url,
            config.request_timeout,
        )),
        Arc::new(SystemLauncher),
        credentials,
    );
    let report = flow.run().await;

    let status = match &report.outcome {
        LoginOutcome::LoggedIn => {
            info!("Logged in");
            0
        }
        LoginOutcome::Stuck => {
            warn!("Login window did not close; the login may have failed");
            2
        }
        LoginOutcome::Error { at, error } => {
            error!(category = %error.category(), state = %at, "Login failed");
            1
        }
    };
    if report.session_left_open {
        if let Some(id) = &report.session_id {
            info!("Session {} left open", id);
        }
    }
    Ok(exit_for(args.strict_exit, status))
}

fn exit_for(strict: bool, status: u8) -> ExitCode {
    if strict {
        ExitCode::from(status)
    } else {
        ExitCode::SUCCESS
    }
}

fn check_secret(args: ConfigArgs) -> Result<()> {
    let config = load_config(&args)?;
    let remaining = config
        .check_secret_from_env()
        .with_context(|| format!("Secret in {} is not usable", config.totp.secret_env))?;
    // Never print the code itself; CI logs are kept
    println!(
        "{}: ok ({:?}, {} digits, {}s period); current code valid for {}s",
        config.totp.secret_env,
        config.totp.algorithm,
        config.totp.digits,
        config.totp.period.as_secs(),
        remaining
    );
    Ok(())
}

async fn show_status(args: StatusArgs) -> Result<ExitCode> {
    let mut config = load_config(&args.config)?;
    if let Some(url) = args.driver_url {
        config.driver_url = url;
    }
    let client = WebDriverClient::with_timeout(&config.driver_url, config.request_timeout);
    let status = client
        .status()
        .await
        .with_context(|| format!("Driver at {} is not reachable", client.base_url()))?;

    let ready = status.ready.unwrap_or(true);
    println!(
        "{}: {}{}",
        client.base_url(),
        if ready { "ready" } else { "not ready" },
        status
            .message
            .map(|m| format!(" ({m})"))
            .unwrap_or_default()
    );
    Ok(if ready {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
