// Storage ports for the moderation engine.
//
// The core defines WHAT it needs from persistence; `infra` provides the SQLite
// and in-memory implementations. Repositories are only reachable through a
// unit of work so every multi-entity write shares one transaction.

use super::block::Block;
use super::moderation_case::{CasePriority, CaseStatus, ModerationCase};
use super::moderation_models::{BlockId, CaseId, ReportId, UserId};
use super::report::{Report, ReportStatus};
use async_trait::async_trait;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// The stored row changed since the entity was loaded.
    #[error("Concurrent update conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ============================================================================
// REPOSITORIES
// ============================================================================

#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn get_by_id(&self, id: ReportId) -> Result<Option<Report>, StoreError>;

    /// Every report filed against `reported_user_id`, newest first.
    async fn get_reports_for_user(&self, reported_user_id: UserId)
        -> Result<Vec<Report>, StoreError>;

    async fn get_reports_by_status(&self, status: ReportStatus) -> Result<Vec<Report>, StoreError>;

    /// Pending reports, oldest first.
    async fn get_pending_reports(&self) -> Result<Vec<Report>, StoreError>;

    /// Persist a new report. Assigns its id and resets its version.
    async fn add(&self, report: &mut Report) -> Result<(), StoreError>;

    /// Persist changes. Fails with `Conflict` if the stored version moved on.
    async fn update(&self, report: &mut Report) -> Result<(), StoreError>;

    /// Reports against the user that were not dismissed.
    async fn get_active_reports_count_for_user(
        &self,
        reported_user_id: UserId,
    ) -> Result<u64, StoreError>;

    /// Same as above, restricted to serious reasons.
    async fn get_serious_active_reports_count_for_user(
        &self,
        reported_user_id: UserId,
    ) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait BlockRepository: Send + Sync {
    async fn get_by_id(&self, id: BlockId) -> Result<Option<Block>, StoreError>;

    async fn get_active_block(
        &self,
        blocker_id: UserId,
        blocked_user_id: UserId,
    ) -> Result<Option<Block>, StoreError>;

    /// Blocks created by `blocker_id`.
    async fn get_blocks_by_user(&self, blocker_id: UserId) -> Result<Vec<Block>, StoreError>;

    /// Blocks targeting `blocked_user_id`.
    async fn get_blocks_for_user(&self, blocked_user_id: UserId) -> Result<Vec<Block>, StoreError>;

    async fn add(&self, block: &mut Block) -> Result<(), StoreError>;

    async fn update(&self, block: &mut Block) -> Result<(), StoreError>;

    async fn exists_active_block(
        &self,
        blocker_id: UserId,
        blocked_user_id: UserId,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait ModerationCaseRepository: Send + Sync {
    async fn get_by_id(&self, id: CaseId) -> Result<Option<ModerationCase>, StoreError>;

    async fn get_cases_for_user(
        &self,
        target_user_id: UserId,
    ) -> Result<Vec<ModerationCase>, StoreError>;

    async fn get_cases_by_status(&self, status: CaseStatus)
        -> Result<Vec<ModerationCase>, StoreError>;

    async fn get_assigned_cases(&self, moderator_id: UserId)
        -> Result<Vec<ModerationCase>, StoreError>;

    async fn get_cases_by_priority(
        &self,
        priority: CasePriority,
    ) -> Result<Vec<ModerationCase>, StoreError>;

    async fn add(&self, case: &mut ModerationCase) -> Result<(), StoreError>;

    async fn update(&self, case: &mut ModerationCase) -> Result<(), StoreError>;
}

// ============================================================================
// UNIT OF WORK
// ============================================================================

/// Transactional boundary around the three repositories.
///
/// Writes made between `begin_transaction` and `commit` become visible together
/// or not at all.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    fn reports(&self) -> &dyn ReportRepository;
    fn blocks(&self) -> &dyn BlockRepository;
    fn cases(&self) -> &dyn ModerationCaseRepository;

    /// Number of rows written since the previous call.
    async fn save_changes(&self) -> Result<u64, StoreError>;

    async fn begin_transaction(&self) -> Result<(), StoreError>;
    async fn commit(&self) -> Result<(), StoreError>;
    async fn rollback(&self) -> Result<(), StoreError>;
}

/// Hands out one fresh unit of work per logical operation.
#[async_trait]
pub trait UnitOfWorkFactory: Send + Sync {
    type Work: UnitOfWork;

    async fn create(&self) -> Result<Self::Work, StoreError>;
}
