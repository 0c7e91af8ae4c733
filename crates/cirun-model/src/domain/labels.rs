use std::fmt;

use serde::{Deserialize, Serialize};

/// User-defined runner labels, kept in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunnerLabels(pub Vec<String>);

impl RunnerLabels {
    /// Parse a comma-delimited label list, dropping empty items.
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Comma-joined form accepted by runner registration commands.
    pub fn joined(&self) -> String {
        self.0.join(",")
    }

    /// True when every label in `self` is present in `other`.
    pub fn is_subset_of<S: AsRef<str>>(&self, other: &[S]) -> bool {
        self.iter()
            .all(|label| other.iter().any(|o| o.as_ref() == label))
    }
}

impl fmt::Display for RunnerLabels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}
