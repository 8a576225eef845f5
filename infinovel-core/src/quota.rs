//! Manual save/load quotas.
//!
//! Only player-initiated saves and loads count. Auto-saves after each
//! chapter and the silent load on startup bypass both the check and the
//! counters.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const DEFAULT_LOAD_LIMIT: u32 = 5;
pub const DEFAULT_SAVE_LIMIT: u32 = 3;
pub const VIP_LOAD_LIMIT: u32 = 20;
pub const VIP_SAVE_LIMIT: u32 = 10;

/// Which counted operation a quota applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaKind {
    Save,
    Load,
}

impl fmt::Display for QuotaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaKind::Save => f.write_str("save"),
            QuotaKind::Load => f.write_str("load"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuotaError {
    #[error("{kind} limit of {limit} reached")]
    QuotaExceeded { kind: QuotaKind, limit: u32 },
}

/// Per-account limits on manual saves and loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    pub loads: u32,
    pub saves: u32,
}

impl QuotaLimits {
    pub fn for_account(is_vip: bool) -> Self {
        if is_vip {
            Self {
                loads: VIP_LOAD_LIMIT,
                saves: VIP_SAVE_LIMIT,
            }
        } else {
            Self {
                loads: DEFAULT_LOAD_LIMIT,
                saves: DEFAULT_SAVE_LIMIT,
            }
        }
    }

    pub fn limit(&self, kind: QuotaKind) -> u32 {
        match kind {
            QuotaKind::Save => self.saves,
            QuotaKind::Load => self.loads,
        }
    }

    /// Fails once `used` has reached the limit for `kind`.
    pub fn check(&self, kind: QuotaKind, used: u32) -> Result<(), QuotaError> {
        let limit = self.limit(kind);
        if used >= limit {
            Err(QuotaError::QuotaExceeded { kind, limit })
        } else {
            Ok(())
        }
    }

    pub fn remaining(&self, kind: QuotaKind, used: u32) -> u32 {
        self.limit(kind).saturating_sub(used)
    }
}
