use crate::LoginError;
use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Parse human-readable duration strings.
/// Supports formats like: "1s", "500ms", "2m", "1.5s", "30"; plain numbers are milliseconds.
pub fn parse_duration(input: &str) -> Result<Duration, LoginError> {
    let input = input.trim();

    if let Ok(ms) = input.parse::<u64>() {
        return Ok(Duration::from_millis(ms));
    }

    let (number_part, unit_part) = split_number_and_unit(input)?;
    let value: f64 = number_part.trim().parse().map_err(|_| {
        LoginError::InvalidConfig(format!("Invalid number in duration: {number_part}"))
    })?;
    if !value.is_finite() || value < 0.0 {
        return Err(LoginError::InvalidConfig(format!(
            "Duration must be a non-negative number: {input}"
        )));
    }

    let multiplier = match unit_part.trim() {
        "ms" | "milliseconds" | "millisecond" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => 1000.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60_000.0,
        "" => 1.0,
        other => {
            return Err(LoginError::InvalidConfig(format!(
                "Unknown time unit: {other}"
            )))
        }
    };

    Ok(Duration::from_millis((value * multiplier).round() as u64))
}

fn split_number_and_unit(input: &str) -> Result<(&str, &str), LoginError> {
    let split_pos = input
        .char_indices()
        .find(|(_, ch)| ch.is_alphabetic())
        .map(|(i, _)| i)
        .unwrap_or(input.len());

    let number_part = &input[..split_pos];
    let unit_part = &input[split_pos..];

    if number_part.trim().is_empty() {
        return Err(LoginError::InvalidConfig(format!(
            "No numeric value in duration: {input}"
        )));
    }

    Ok((number_part, unit_part))
}

/// Serde adapter so config files can say `interval: 3s` or `interval: 3000`.
pub mod serde_duration {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
            Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
        }
    }

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", value.as_millis()))
    }
}
