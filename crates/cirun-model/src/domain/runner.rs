use serde::{Deserialize, Serialize};

/// A runner as reported by the CI platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub online: bool,
    pub busy: bool,
}

impl RunnerInfo {
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.online && !self.busy
    }
}
