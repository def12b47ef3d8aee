//! SnapshotStore trait definition

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{ActiveSessionInfo, ChargerTarget, MerchantTarget, PendingEvent, SessionState};

/// Well-known storage key for the snapshot
pub const SNAPSHOT_KEY: &str = "session_state_snapshot_v1";

/// Everything needed to recover the state machine after process death.
///
/// Geofence registrations and live timers are deliberately absent: they are
/// rebuilt from `state`, the targets and the deadlines on every restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    #[serde(default)]
    pub targeted_charger: Option<ChargerTarget>,
    #[serde(default)]
    pub merchant_target: Option<MerchantTarget>,
    #[serde(default)]
    pub active_session: Option<ActiveSessionInfo>,
    #[serde(default)]
    pub grace_period_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hard_timeout_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pending_event: Option<PendingEvent>,
    pub saved_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn idle(saved_at: DateTime<Utc>) -> Self {
        Self {
            state: SessionState::Idle,
            targeted_charger: None,
            merchant_target: None,
            active_session: None,
            grace_period_deadline: None,
            hard_timeout_deadline: None,
            pending_event: None,
            saved_at,
        }
    }
}

/// Instruction for one persisted field on a snapshot write
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Persist<T> {
    /// Leave the current value alone
    #[default]
    Keep,
    /// Remove the current value
    Clear,
    /// Replace the current value
    SetTo(T),
}

impl<T> Persist<T> {
    /// Apply this instruction to a slot
    pub fn apply_to(self, slot: &mut Option<T>) {
        match self {
            Self::Keep => {}
            Self::Clear => *slot = None,
            Self::SetTo(value) => *slot = Some(value),
        }
    }
}

/// Durable storage for the single session snapshot.
///
/// Reads happen once at startup; writes only from the state machine's
/// serialized control path.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the snapshot. `Ok(None)` means a fresh install.
    async fn load(&self) -> Result<Option<SessionSnapshot>, StoreError>;

    /// Overwrite the snapshot
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), StoreError>;

    /// Remove the snapshot
    async fn clear(&self) -> Result<(), StoreError>;
}
