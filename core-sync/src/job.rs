//! # Sync Run State Machine
//!
//! Tracks one cross-library sync run through its phases with validated
//! transitions.
//!
//! ## State Machine
//!
//! ```text
//! ComputingDelta → Exporting → Importing → ReconcilingPlaylists → Done
//!        ↓             ↓           ↓                ↓
//!        └─────────────┴───────────┴────────────────┴──────→ Failed
//! ```
//!
//! Export and import overlap in time; the run is `Importing` once the last
//! export has finished and only imports remain in flight.

use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncRunId(Uuid);

impl SyncRunId {
    /// Create a new random run ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a run ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(
            Uuid::parse_str(s).map_err(|e| SyncError::InvalidRunId(e.to_string()))?,
        ))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SyncRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SyncRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SyncRunId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Phases
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    ComputingDelta,
    Exporting,
    Importing,
    ReconcilingPlaylists,
    Done,
    Failed,
}

impl SyncPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncPhase::Done | SyncPhase::Failed)
    }

    /// The string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::ComputingDelta => "computing_delta",
            SyncPhase::Exporting => "exporting",
            SyncPhase::Importing => "importing",
            SyncPhase::ReconcilingPlaylists => "reconciling_playlists",
            SyncPhase::Done => "done",
            SyncPhase::Failed => "failed",
        }
    }

    fn can_advance_to(&self, to: SyncPhase) -> bool {
        match (self, to) {
            (from, SyncPhase::Failed) => !from.is_terminal(),
            (SyncPhase::ComputingDelta, SyncPhase::Exporting) => true,
            (SyncPhase::Exporting, SyncPhase::Importing) => true,
            (SyncPhase::Importing, SyncPhase::ReconcilingPlaylists) => true,
            (SyncPhase::ReconcilingPlaylists, SyncPhase::Done) => true,
            _ => false,
        }
    }
}

impl FromStr for SyncPhase {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "computing_delta" => Ok(SyncPhase::ComputingDelta),
            "exporting" => Ok(SyncPhase::Exporting),
            "importing" => Ok(SyncPhase::Importing),
            "reconciling_playlists" => Ok(SyncPhase::ReconcilingPlaylists),
            "done" => Ok(SyncPhase::Done),
            "failed" => Ok(SyncPhase::Failed),
            _ => Err(SyncError::InvalidPhase(s.to_string())),
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Counters reported at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    /// Distinct source tracks examined
    pub tracks_considered: u64,
    pub tracks_exported: u64,
    pub tracks_imported: u64,
    /// Left out on purpose: no interchange code, duplicate code, unplayable
    pub tracks_skipped: u64,
    /// Export or import gave up
    pub tracks_failed: u64,
    pub playlists_updated: u64,
    pub playlists_unchanged: u64,
    pub playlists_failed: u64,
    pub elapsed_ms: u64,
}

// ============================================================================
// Sync Run Entity
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: SyncRunId,
    pub source: String,
    pub target: String,
    pub phase: SyncPhase,
    pub summary: SyncSummary,
    pub error_message: Option<String>,
    pub started_at: i64,
    pub completed_at: Option<i64>,
}

impl SyncRun {
    /// Create a run in `ComputingDelta`
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: SyncRunId::new(),
            source: source.into(),
            target: target.into(),
            phase: SyncPhase::ComputingDelta,
            summary: SyncSummary::default(),
            error_message: None,
            started_at: current_timestamp(),
            completed_at: None,
        }
    }

    /// Move to the next phase
    ///
    /// # Errors
    ///
    /// Returns an error if `to` does not follow the current phase
    pub fn advance(&mut self, to: SyncPhase) -> Result<()> {
        if to == SyncPhase::Failed {
            return Err(SyncError::InvalidStateTransition {
                from: self.phase.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: "Use fail() to record the error".to_string(),
            });
        }
        self.validate_transition(to)?;
        self.phase = to;
        if to == SyncPhase::Done {
            self.completed_at = Some(current_timestamp());
        }
        Ok(())
    }

    /// Mark the run as failed
    ///
    /// # Errors
    ///
    /// Returns an error if the run already ended
    pub fn fail(&mut self, error_message: impl Into<String>) -> Result<()> {
        self.validate_transition(SyncPhase::Failed)?;
        self.phase = SyncPhase::Failed;
        self.error_message = Some(error_message.into());
        self.completed_at = Some(current_timestamp());
        Ok(())
    }

    fn validate_transition(&self, to: SyncPhase) -> Result<()> {
        if !self.phase.can_advance_to(to) {
            return Err(SyncError::InvalidStateTransition {
                from: self.phase.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!(
                    "Cannot transition from {} to {}",
                    self.phase.as_str(),
                    to.as_str()
                ),
            });
        }
        Ok(())
    }
}

fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
