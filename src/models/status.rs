use chrono::{DateTime, Utc};
use serde::Serialize;

use super::candidate::Candidate;

/// Snapshot of the supervisor published to the admin API
#[derive(Debug, Clone, Default, Serialize)]
pub struct SupervisorStatus {
    /// Candidate the engine is currently configured with
    pub active: Option<Candidate>,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_cycle: Option<CycleReport>,
    pub successful_cycles: u64,
    pub failed_cycles: u64,
}

impl SupervisorStatus {
    /// True once any cycle has brought up a working engine
    pub fn ever_succeeded(&self) -> bool {
        self.successful_cycles > 0
    }
}

/// Result of the most recent resolution cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    /// Display name of the accepted candidate, or the failure reason
    pub detail: String,
}
