//! Primary key values.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Serialize, Serializer};

use crate::value::Value;

/// Identity of a record within its table.
///
/// Holds the values of the declared primary-key columns in declared order.
/// Equality, ordering and hashing use the canonical form
/// `[part0,part1,...]`, where each part is the value's default text form.
#[derive(Debug, Clone)]
pub struct PrimaryKeyValue {
    parts: Vec<Value>,
    canonical: String,
}

impl PrimaryKeyValue {
    /// Creates a key from its component values.
    pub fn new(parts: Vec<Value>) -> Self {
        let canonical = format!(
            "[{}]",
            parts
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(",")
        );
        Self { parts, canonical }
    }

    /// Creates a single-column key.
    pub fn single(value: impl Into<Value>) -> Self {
        Self::new(vec![value.into()])
    }

    /// Returns the key components in declared order.
    pub fn parts(&self) -> &[Value] {
        &self.parts
    }

    /// Returns the canonical string form.
    pub fn canonical_form(&self) -> &str {
        &self.canonical
    }
}

impl PartialEq for PrimaryKeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for PrimaryKeyValue {}

impl Hash for PrimaryKeyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for PrimaryKeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrimaryKeyValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl fmt::Display for PrimaryKeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl Serialize for PrimaryKeyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical)
    }
}
