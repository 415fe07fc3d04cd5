use crate::error::ConfigError;
use crate::models::PolicyNote;
use crate::traits::PolicyDirectory;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A `PolicyDirectory` held in memory, loadable from a JSON snapshot:
///
/// ```json
/// {"notes": [{"record_id": 1, "note": "...", "created_at": "2024-01-01T00:00:00Z"}],
///  "buildings": ["Harbor Tower"], "agents": ["Dana Reyes"]}
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryDirectory {
    #[serde(default)]
    pub notes: Vec<PolicyNote>,
    #[serde(default)]
    pub buildings: Vec<String>,
    #[serde(default)]
    pub agents: Vec<String>,
}

impl InMemoryDirectory {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: display,
            source,
        })
    }
}

impl PolicyDirectory for InMemoryDirectory {
    fn notes(&self) -> Vec<PolicyNote> {
        self.notes.clone()
    }

    fn building_names(&self) -> Vec<String> {
        self.buildings.clone()
    }

    fn agent_names(&self) -> Vec<String> {
        self.agents.clone()
    }
}
