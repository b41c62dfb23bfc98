use crate::totp::{unix_now, SecretEncoding, Totp};
use crate::LoginError;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use zeroize::Zeroizing;

/// Shared TOTP secret. Wiped on drop and never printed.
#[derive(Clone)]
pub struct SharedSecret(Zeroizing<String>);

impl SharedSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Zeroizing::new(secret.into()))
    }

    /// Read the secret from an environment variable
    pub fn from_env(var: &str) -> Result<Self, LoginError> {
        match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => Ok(Self::new(value)),
            _ => Err(LoginError::InvalidSecret(format!(
                "environment variable {var} is not set"
            ))),
        }
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

/// Clock used for code generation, in unix seconds
pub type Clock = Arc<dyn Fn() -> Result<u64, LoginError> + Send + Sync>;

/// Supplies the login identifier and fresh one-time codes.
///
/// Codes are derived on every call and never cached, so callers must ask for
/// one immediately before typing it.
#[derive(Clone)]
pub struct CredentialProvider {
    identifier: String,
    secret: SharedSecret,
    encoding: SecretEncoding,
    totp: Totp,
    clock: Clock,
}

impl fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialProvider")
            .field("identifier", &self.identifier)
            .field("secret", &self.secret)
            .field("encoding", &self.encoding)
            .field("totp", &self.totp)
            .finish()
    }
}

impl CredentialProvider {
    pub fn new(
        identifier: impl Into<String>,
        secret: SharedSecret,
        encoding: SecretEncoding,
        totp: Totp,
    ) -> Result<Self, LoginError> {
        let identifier = identifier.into();
        if identifier.is_empty() {
            return Err(LoginError::InvalidConfig(
                "login identifier is empty".to_string(),
            ));
        }
        // Fail on an undecodable secret now rather than halfway through typing
        encoding.decode(secret.expose())?;
        Ok(Self {
            identifier,
            secret,
            encoding,
            totp,
            clock: Arc::new(unix_now),
        })
    }

    /// Replace the wall clock, mostly for tests
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn totp(&self) -> &Totp {
        &self.totp
    }

    /// A code for the current time step
    pub fn one_time_code(&self) -> Result<Zeroizing<String>, LoginError> {
        let now = (self.clock)()?;
        let key = self.encoding.decode(self.secret.expose())?;
        let code = self.totp.generate_at(&key, now)?;
        debug!(
            remaining_secs = self.totp.remaining_at(now),
            "Generated one-time code"
        );
        Ok(Zeroizing::new(code))
    }

    /// Seconds until the current code expires
    pub fn seconds_remaining(&self) -> Result<u64, LoginError> {
        Ok(self.totp.remaining_at((self.clock)()?))
    }
}
