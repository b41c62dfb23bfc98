//! Time-based one-time passwords (RFC 6238) on top of HOTP (RFC 4226).

use crate::LoginError;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use zeroize::Zeroizing;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// HMAC hash used to derive codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotpAlgorithm {
    #[serde(alias = "sha-1")]
    Sha1,
    #[default]
    #[serde(alias = "sha-256")]
    Sha256,
    #[serde(alias = "sha-512")]
    Sha512,
}

/// How the shared secret string is turned into key bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretEncoding {
    /// RFC 4648 base32, as printed by authenticator enrolment screens
    #[default]
    Base32,
    /// The UTF-8 bytes of the string, used as-is
    Ascii,
}

impl SecretEncoding {
    pub fn decode(self, secret: &str) -> Result<Zeroizing<Vec<u8>>, LoginError> {
        let key = match self {
            SecretEncoding::Base32 => decode_base32(secret)?,
            SecretEncoding::Ascii => Zeroizing::new(secret.as_bytes().to_vec()),
        };
        if key.is_empty() {
            return Err(LoginError::InvalidSecret("secret is empty".to_string()));
        }
        Ok(key)
    }
}

/// Decode RFC 4648 base32, ignoring case, padding, spaces and dashes.
pub fn decode_base32(input: &str) -> Result<Zeroizing<Vec<u8>>, LoginError> {
    let mut out = Zeroizing::new(Vec::with_capacity(input.len() * 5 / 8));
    let mut buffer: u64 = 0;
    let mut bits = 0u32;

    for ch in input.chars() {
        if ch == '=' || ch == '-' || ch.is_whitespace() {
            continue;
        }
        let upper = ch.to_ascii_uppercase();
        let index = BASE32_ALPHABET
            .iter()
            .position(|&b| char::from(b) == upper)
            .ok_or_else(|| {
                // Never echo the secret back, only the offending character class
                LoginError::InvalidSecret("secret contains a non-base32 character".to_string())
            })?;

        buffer = (buffer << 5) | index as u64;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }

    Ok(out)
}

/// Parameters of a TOTP generator. Only built through [`Totp::new`] or
/// [`Totp::default`], so the parameters are always in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totp {
    algorithm: TotpAlgorithm,
    digits: u32,
    period: Duration,
}

impl Default for Totp {
    fn default() -> Self {
        Self {
            algorithm: TotpAlgorithm::Sha256,
            digits: 6,
            period: Duration::from_secs(30),
        }
    }
}

impl Totp {
    pub fn new(algorithm: TotpAlgorithm, digits: u32, period: Duration) -> Result<Self, LoginError> {
        let totp = Self {
            algorithm,
            digits,
            period,
        };
        totp.check()?;
        Ok(totp)
    }

    fn check(&self) -> Result<(), LoginError> {
        if !(6..=10).contains(&self.digits) {
            return Err(LoginError::InvalidConfig(format!(
                "TOTP digits must be between 6 and 10, got {}",
                self.digits
            )));
        }
        if self.period.as_secs() == 0 {
            return Err(LoginError::InvalidConfig(
                "TOTP period must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn algorithm(&self) -> TotpAlgorithm {
        self.algorithm
    }

    pub fn digits(&self) -> u32 {
        self.digits
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    // Never zero, even for parameters that failed `check`
    fn period_secs(&self) -> u64 {
        self.period.as_secs().max(1)
    }

    /// Time step counter for a unix timestamp
    pub fn counter_at(&self, unix_secs: u64) -> u64 {
        unix_secs / self.period_secs()
    }

    /// Seconds until the code for `unix_secs` expires
    pub fn remaining_at(&self, unix_secs: u64) -> u64 {
        let period = self.period_secs();
        period - unix_secs % period
    }

    /// Code valid at the given unix timestamp
    pub fn generate_at(&self, key: &[u8], unix_secs: u64) -> Result<String, LoginError> {
        self.check()?;
        self.hotp(key, self.counter_at(unix_secs))
    }

    /// Code valid right now
    pub fn generate_now(&self, key: &[u8]) -> Result<String, LoginError> {
        self.generate_at(key, unix_now()?)
    }

    fn hotp(&self, key: &[u8], counter: u64) -> Result<String, LoginError> {
        let digest = hmac_digest(self.algorithm, key, &counter.to_be_bytes())?;

        // Dynamic truncation, RFC 4226 section 5.3
        let offset = (digest[digest.len() - 1] & 0x0f) as usize;
        let binary = (u32::from(digest[offset] & 0x7f) << 24)
            | (u32::from(digest[offset + 1]) << 16)
            | (u32::from(digest[offset + 2]) << 8)
            | u32::from(digest[offset + 3]);

        let code = u64::from(binary) % 10u64.pow(self.digits);
        Ok(format!("{:0width$}", code, width = self.digits as usize))
    }
}

pub(crate) fn unix_now() -> Result<u64, LoginError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| LoginError::InvalidConfig(format!("System clock is before 1970: {e}")))
}

fn hmac_digest(
    algorithm: TotpAlgorithm,
    key: &[u8],
    message: &[u8],
) -> Result<Vec<u8>, LoginError> {
    let invalid = |_| LoginError::InvalidSecret("key rejected by HMAC".to_string());
    let digest = match algorithm {
        TotpAlgorithm::Sha1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(key).map_err(invalid)?;
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
        TotpAlgorithm::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(invalid)?;
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
        TotpAlgorithm::Sha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(key).map_err(invalid)?;
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
    };
    Ok(digest)
}
