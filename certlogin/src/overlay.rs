//! Blind dismissal of the out-of-box overlay some runner images show.
//!
//! The overlay steals focus from the login dialog and there is no reliable
//! way to detect it, so the handler fires a fixed number of key presses and
//! never checks whether anything was actually dismissed.

use crate::executor::{Action, ActionExecutor};
use crate::keys::Key;
use crate::LoginError;
use std::time::Duration;
use tracing::info;

/// Whether the run happens on the platform that shows the overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformFlag(bool);

impl PlatformFlag {
    pub fn new(set: bool) -> Self {
        Self(set)
    }

    /// Set only when `value` equals `expected` exactly
    pub fn from_value(value: Option<&str>, expected: &str) -> Self {
        Self(value == Some(expected))
    }

    /// Read `var` once and compare it against `expected`
    pub fn from_env(var: &str, expected: &str) -> Self {
        Self::from_value(std::env::var(var).ok().as_deref(), expected)
    }

    pub fn is_set(self) -> bool {
        self.0
    }
}

/// How many blind Enter presses to fire and how long to wait before each
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayDismissal {
    pub cycles: u32,
    pub interval: Duration,
}

impl Default for OverlayDismissal {
    fn default() -> Self {
        Self {
            cycles: 3,
            interval: Duration::from_millis(3000),
        }
    }
}

impl OverlayDismissal {
    /// Runs `cycles` rounds of (wait, Enter) and then one Escape when `flag`
    /// is set. Does nothing otherwise.
    pub async fn dismiss_overlay_if_needed(
        &self,
        flag: PlatformFlag,
        executor: &ActionExecutor,
    ) -> Result<(), LoginError> {
        if !flag.is_set() {
            info!("Overlay platform flag not set, skipping dismissal");
            return Ok(());
        }

        info!(cycles = self.cycles, "Dismissing out-of-box overlay");
        for cycle in 1..=self.cycles {
            executor.wait(self.interval).await;
            executor.checkpoint(&format!("oob{cycle}")).await?;
            executor
                .perform(Action::key(Key::Enter), Duration::ZERO)
                .await?;
        }
        executor
            .perform(Action::key(Key::Escape), Duration::ZERO)
            .await?;
        executor.checkpoint("oob-done").await?;
        Ok(())
    }
}
