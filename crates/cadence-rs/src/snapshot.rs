//! Optional periodic quota snapshots.
//!
//! When a snapshot path is configured, the runner writes each account's
//! quota position after every successful interaction and restores it at
//! startup, so a restart mid-period doesn't forget interactions already
//! spent. Snapshots are best-effort: a read or write failure is logged and
//! absorbed, never fatal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// One account's saved quota position.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct QuotaSnapshot {
    pub address: String,
    pub interactions_used: u32,
    pub period_end: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// On-disk snapshot file: one entry per account.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct SnapshotFile {
    pub accounts: Vec<QuotaSnapshot>,
}

impl SnapshotFile {
    /// Load a snapshot file, or an empty one if it doesn't exist yet.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read snapshot {}: {e}", path.display()))?;
        serde_json::from_str(&data)
            .map_err(|e| format!("failed to parse snapshot {}: {e}", path.display()))
    }

    /// Save the snapshot file, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create snapshot dir: {e}"))?;
        }
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| format!("failed to serialize snapshot: {e}"))?;
        std::fs::write(path, data)
            .map_err(|e| format!("failed to write snapshot {}: {e}", path.display()))?;
        debug!("Saved quota snapshot ({} account(s))", self.accounts.len());
        Ok(())
    }

    pub fn find(&self, address: &str) -> Option<&QuotaSnapshot> {
        self.accounts.iter().find(|s| s.address == address)
    }

    /// Insert or replace an account's entry.
    pub fn upsert(&mut self, snapshot: QuotaSnapshot) {
        if let Some(existing) = self
            .accounts
            .iter_mut()
            .find(|s| s.address == snapshot.address)
        {
            *existing = snapshot;
        } else {
            self.accounts.push(snapshot);
        }
    }
}
