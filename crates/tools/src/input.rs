//! Parsing helpers for structured tool inputs.
//!
//! Models are sloppy about JSON types: a ticket id shows up as `42` as
//! often as `"42"`. Argument structs use [`flexible_id`] so both work.

use serde::{Deserialize, Deserializer};

/// Deserialize an unsigned id written either as a number or a numeric string.
pub fn flexible_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(u64),
        Text(String),
    }

    match Id::deserialize(deserializer)? {
        Id::Number(n) => Ok(n),
        Id::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("'{s}' is not a numeric id"))),
    }
}

/// Deserialize a boolean written either as `true` or `"true"`.
pub fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Ok(true),
            "false" | "no" => Ok(false),
            other => Err(serde::de::Error::custom(format!("'{other}' is not a boolean"))),
        },
    }
}
