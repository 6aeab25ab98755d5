//! The plan artifact bridging the planning and execution phases.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One variation to render: the base description with a planner patch
/// merged in, plus a derived seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanItem {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    pub structured_description: Value,
}

/// Owned by the orchestrator for the duration of one pipeline run; never a
/// source of truth beyond the job's in-memory lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub plan_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_seed: Option<i64>,
    pub prompt: String,
    pub items: Vec<PlanItem>,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(prompt: &str, base_seed: Option<i64>, items: Vec<PlanItem>) -> Self {
        let plan_id = format!("plan_{}", &uuid::Uuid::new_v4().simple().to_string()[..10]);
        Self {
            plan_id,
            base_seed,
            prompt: prompt.to_string(),
            items,
            created_at: Utc::now(),
        }
    }

    /// Best-effort snapshot to disk for debugging; callers log failures and
    /// move on.
    pub fn write_snapshot(&self, dir: &Path) -> io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", self.plan_id));
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}
