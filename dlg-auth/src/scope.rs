//! Permission scopes
//!
//! A grant carries a fixed set of scope strings such as `calendar.view`;
//! a delegated action names the single scope it requires.

use crate::error::{GrantError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Scope required to read calendar availability
pub const CALENDAR_VIEW: &str = "calendar.view";

/// Scope required to change calendar entries
pub const CALENDAR_EDIT: &str = "calendar.edit";

/// Set of permission strings
///
/// Kept ordered so that serialization is deterministic, which the credential
/// signature relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Scope(BTreeSet<String>);

impl Scope {
    /// Build a scope set, rejecting empty sets and malformed entries
    pub fn new<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for entry in entries {
            let entry = entry.into();
            validate_entry(&entry)?;
            set.insert(entry);
        }

        if set.is_empty() {
            return Err(GrantError::InvalidScope(
                "scope set must not be empty".to_string(),
            ));
        }

        Ok(Self(set))
    }

    /// Parse an OAuth-style space-delimited scope string
    pub fn parse(raw: &str) -> Result<Self> {
        Self::new(raw.split_whitespace())
    }

    /// Check if a single scope is covered
    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    /// Iterate over scope entries in order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the set holds no entries
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn validate_entry(entry: &str) -> Result<()> {
    if entry.is_empty() {
        return Err(GrantError::InvalidScope(
            "scope entries must not be empty".to_string(),
        ));
    }

    if entry.chars().any(char::is_whitespace) {
        return Err(GrantError::InvalidScope(format!(
            "scope entry '{}' contains whitespace",
            entry
        )));
    }

    Ok(())
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        f.write_str(&joined.join(" "))
    }
}

impl FromStr for Scope {
    type Err = GrantError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Accepts either `["a", "b"]` or `"a b"`
impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawScope {
            List(Vec<String>),
            Delimited(String),
        }

        match RawScope::deserialize(deserializer)? {
            RawScope::List(entries) => Scope::new(entries),
            RawScope::Delimited(raw) => Scope::parse(&raw),
        }
        .map_err(serde::de::Error::custom)
    }
}
