use crate::LoginError;
use std::process::Stdio;
use tracing::{debug, error, instrument};

/// Starts external programs
#[async_trait::async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Start `path` and return as soon as it is running. A failure to start is
    /// returned; anything the program does afterwards is only logged.
    async fn launch(&self, path: &str) -> Result<(), LoginError>;
}

/// Launches programs with `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

#[async_trait::async_trait]
impl ProcessLauncher for SystemLauncher {
    #[instrument(skip(self))]
    async fn launch(&self, path: &str) -> Result<(), LoginError> {
        let mut child = tokio::process::Command::new(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                error!("exec error: {}", e);
                LoginError::ProcessLaunchFailure {
                    path: path.to_string(),
                    message: e.to_string(),
                }
            })?;

        debug!("Started {} (pid {:?})", path, child.id());

        // Fire and forget; the watcher only reports a bad exit
        let path = path.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!("{} exited", path),
                Ok(status) => error!("exec error: {} exited with {}", path, status),
                Err(e) => error!("exec error: waiting on {} failed: {}", path, e),
            }
        });
        Ok(())
    }
}

/// Run an auxiliary shell command and return its stdout.
///
/// On failure the command and the error detail are logged and the error is
/// passed back to the caller.
#[instrument]
pub async fn execute_command(command: &str) -> Result<String, LoginError> {
    let mut shell = if cfg!(target_os = "windows") {
        let mut cmd = tokio::process::Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    } else {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    };

    let result = match shell.stdin(Stdio::null()).output().await {
        Ok(output) if output.status.success() => {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        }
        Ok(output) => Err(format!(
            "{}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )),
        Err(e) => Err(e.to_string()),
    };

    result.map_err(|message| {
        error!("Error executing command: {}", command);
        error!("Error details: {}", message);
        LoginError::CommandExecutionFailure {
            command: command.to_string(),
            message,
        }
    })
}
