use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Unique, lexicographically sortable identifier.
///
/// Backed by a ULID so that identifiers generated later sort after earlier
/// ones, which the store relies on when ordering entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id(String);

impl Id {
    /// Create a new ID from a string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the string representation of the ID
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to owned string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<Ulid> for Id {
    fn from(ulid: Ulid) -> Self {
        Self(ulid.to_string())
    }
}

/// Generate a new unique ID
pub fn generate_id() -> Id {
    Id(Ulid::new().to_string())
}

/// Generate a new unique ID with a prefix
pub fn generate_id_with_prefix(prefix: &str) -> Id {
    Id(format!("{}_{}", prefix, Ulid::new()))
}
