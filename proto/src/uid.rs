use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Identifier of a single model instance.
///
/// Uids are opaque strings on the wire. Locally minted ids are ULIDs, but any non-empty string a
/// backend hands out is accepted.
#[derive(PartialEq, Eq, Hash, Clone, Ord, PartialOrd, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    pub fn new(value: impl Into<String>) -> Self { Uid(value.into()) }

    pub fn generate() -> Self { Uid(Ulid::new().to_string()) }

    pub fn as_str(&self) -> &str { &self.0 }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn into_string(self) -> String { self.0 }

    /// Last six characters, for log lines
    pub fn short(&self) -> &str {
        let start = self.0.char_indices().rev().nth(5).map(|(i, _)| i).unwrap_or(0);
        &self.0[start..]
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write!(f, "{}", self.short())
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Uid({})", self.0) }
}

impl From<&str> for Uid {
    fn from(value: &str) -> Self { Uid(value.to_string()) }
}

impl From<String> for Uid {
    fn from(value: String) -> Self { Uid(value) }
}

impl From<Ulid> for Uid {
    fn from(value: Ulid) -> Self { Uid(value.to_string()) }
}

impl AsRef<str> for Uid {
    fn as_ref(&self) -> &str { &self.0 }
}

impl PartialEq<str> for Uid {
    fn eq(&self, other: &str) -> bool { self.0 == other }
}

impl PartialEq<&str> for Uid {
    fn eq(&self, other: &&str) -> bool { self.0 == *other }
}
