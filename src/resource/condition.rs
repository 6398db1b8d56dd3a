//! Named status conditions with upsert-by-type semantics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health condition reported on every resource.
pub const CONDITION_AVAILABLE: &str = "Available";

/// Seeded before the first full pass completes.
pub const REASON_PENDING: &str = "Pending";
/// Provider resolution (config, credentials, or login) failed.
pub const REASON_INIT_FAILED: &str = "InitFailed";
/// Provider resolved and ready to serve the pass.
pub const REASON_INIT_FINISHED: &str = "InitFinished";
/// Forecast artifact create/delete failed.
pub const REASON_ARTIFACT_SYNC_FAILED: &str = "ArtifactSyncFailed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// One named condition on a resource's status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: ConditionStatus,
    /// Short machine-readable token.
    pub reason: String,
    /// Human-readable detail.
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn new(
        kind: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}

/// Upsert `condition` into `conditions` by type.
///
/// An existing condition with an unchanged status keeps its transition time and
/// only takes the new reason/message. A status change refreshes the
/// transition time.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions.iter_mut().find(|c| c.kind == condition.kind) {
        Some(existing) => {
            if existing.status == condition.status {
                existing.reason = condition.reason;
                existing.message = condition.message;
            } else {
                *existing = condition;
            }
        }
        None => conditions.push(condition),
    }
}

/// Look up a condition by type.
pub fn find_condition<'a>(conditions: &'a [Condition], kind: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.kind == kind)
}
