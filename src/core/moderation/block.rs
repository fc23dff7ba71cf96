// Block entity - a unilateral relationship block from one user toward another.
//
// Active <-> Revoked, toggled with revoke()/restore().

use super::moderation_models::{BlockId, DomainError, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_BLOCK_REASON_LEN: usize = 500;

/// Blocks younger than this count as recent.
pub const RECENT_BLOCK_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub(crate) id: BlockId,
    pub(crate) blocker_id: UserId,
    pub(crate) blocked_user_id: UserId,
    pub(crate) reason: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) revoked_at: Option<DateTime<Utc>>,
    pub(crate) is_active: bool,
    pub(crate) version: u64,
}

impl Block {
    pub fn new(
        blocker_id: UserId,
        blocked_user_id: UserId,
        reason: Option<String>,
    ) -> Result<Self, DomainError> {
        if blocker_id == blocked_user_id {
            return Err(DomainError::state("users cannot block themselves"));
        }

        let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        if let Some(text) = &reason {
            if text.chars().count() > MAX_BLOCK_REASON_LEN {
                return Err(DomainError::argument(format!(
                    "block reason must be at most {} characters",
                    MAX_BLOCK_REASON_LEN
                )));
            }
        }

        Ok(Self {
            id: BlockId::UNSAVED,
            blocker_id,
            blocked_user_id,
            reason,
            created_at: Utc::now(),
            revoked_at: None,
            is_active: true,
            version: 0,
        })
    }

    pub fn revoke(&mut self) -> Result<(), DomainError> {
        if !self.is_active {
            return Err(DomainError::state(format!("block {} is already revoked", self.id)));
        }
        self.is_active = false;
        self.revoked_at = Some(Utc::now());
        Ok(())
    }

    pub fn restore(&mut self) -> Result<(), DomainError> {
        if self.is_active {
            return Err(DomainError::state(format!("block {} is already active", self.id)));
        }
        self.is_active = true;
        self.revoked_at = None;
        Ok(())
    }

    pub fn is_revoked(&self) -> bool {
        !self.is_active
    }

    pub fn duration(&self) -> Duration {
        self.duration_at(Utc::now())
    }

    /// Time the block has been in force: up to `now`, or up to revocation.
    pub fn duration_at(&self, now: DateTime<Utc>) -> Duration {
        match self.revoked_at {
            Some(revoked_at) if !self.is_active => revoked_at - self.created_at,
            _ => now - self.created_at,
        }
    }

    pub fn is_recent_block(&self) -> bool {
        self.is_recent_block_at(Utc::now())
    }

    pub fn is_recent_block_at(&self, now: DateTime<Utc>) -> bool {
        self.duration_at(now) < Duration::hours(RECENT_BLOCK_HOURS)
    }

    /// True if this block sits between `a` and `b`, in either direction.
    pub fn involves(&self, a: UserId, b: UserId) -> bool {
        (self.blocker_id == a && self.blocked_user_id == b)
            || (self.blocker_id == b && self.blocked_user_id == a)
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn blocker_id(&self) -> UserId {
        self.blocker_id
    }

    pub fn blocked_user_id(&self) -> UserId {
        self.blocked_user_id
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn revoked_at(&self) -> Option<DateTime<Utc>> {
        self.revoked_at
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn mark_stored(&mut self, id: BlockId, version: u64) {
        self.id = id;
        self.version = version;
    }
}
