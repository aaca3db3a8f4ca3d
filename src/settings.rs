use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssignmentSettings {
    pub max_recursion_depth: usize,
    pub parallel_samples: bool,
    pub top_matches_only: bool,
}

impl Default for AssignmentSettings {
    fn default() -> Self {
        Self {
            max_recursion_depth: 256,
            parallel_samples: true,
            top_matches_only: false,
        }
    }
}

impl AssignmentSettings {
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read settings file '{}'", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Could not parse settings JSON '{}'", path.display()))
    }
}
