// Moderation service - orchestrates entities, the policy engine and storage.
//
// This service handles:
// - Filing reports and attaching them to moderation cases
// - Blocking and unblocking users
// - Moderator review actions on reports and cases
// - The periodic escalation sweep over in-progress cases
//
// Each public operation runs in its own unit of work: begin, write, commit.
// Any failure rolls the whole operation back.

use super::block::Block;
use super::moderation_case::{CasePriority, CaseStatus, ModerationCase};
use super::moderation_models::{
    CaseId, DomainError, ModerationAction, ReportId, ReportReason, UserId, ViolationHistory,
};
use super::moderation_policy::ModerationPolicyService;
use super::moderation_store::{StoreError, UnitOfWork, UnitOfWorkFactory};
use super::report::Report;
use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ModerationError {
    /// Malformed request; surfaced to callers as a rejected request.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, ModerationError::Domain(DomainError::InvalidArgument(_)))
    }

    /// Lifecycle or concurrency clash; surfaced to callers as a conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ModerationError::Domain(DomainError::InvalidState(_))
                | ModerationError::Store(StoreError::Conflict(_))
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ModerationError::NotFound(_) | ModerationError::Store(StoreError::NotFound(_))
        )
    }
}

// ============================================================================
// RESULTS
// ============================================================================

/// Outcome of filing a report.
#[derive(Debug, Clone)]
pub struct ReportSubmission {
    pub report: Report,
    /// What the policy engine recommends doing to the reported user.
    pub recommended_action: ModerationAction,
    /// Active history of the reported user, including this report.
    pub history: ViolationHistory,
    /// The case the report was attached to, if one was needed.
    pub case: Option<ModerationCase>,
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct ModerationService<F: UnitOfWorkFactory> {
    factory: F,
    policy: ModerationPolicyService,
}

impl<F: UnitOfWorkFactory> ModerationService<F> {
    pub fn new(factory: F, policy: ModerationPolicyService) -> Self {
        Self { factory, policy }
    }

    pub fn policy(&self) -> &ModerationPolicyService {
        &self.policy
    }

    /// Commit `result`'s unit of work on success, roll it back on failure.
    async fn finish<T>(
        &self,
        work: &F::Work,
        result: Result<T, ModerationError>,
        operation: &'static str,
    ) -> Result<T, ModerationError> {
        let result = match result {
            Ok(value) => match work.save_changes().await {
                Ok(rows) => match work.commit().await {
                    Ok(()) => {
                        tracing::debug!(operation, rows, "Unit of work committed");
                        return Ok(value);
                    }
                    Err(e) => Err(ModerationError::from(e)),
                },
                Err(e) => Err(ModerationError::from(e)),
            },
            Err(e) => Err(e),
        };

        if let Err(rollback_err) = work.rollback().await {
            tracing::error!(operation, "Rollback failed: {}", rollback_err);
        }
        if let Err(err) = &result {
            tracing::warn!(operation, "Unit of work rolled back: {}", err);
        }
        result
    }

    async fn begin(&self) -> Result<F::Work, ModerationError> {
        let work = self.factory.create().await?;
        work.begin_transaction().await?;
        Ok(work)
    }

    // ------------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------------

    /// File a report, decide the recommended action, and open or extend a case.
    pub async fn submit_report(
        &self,
        reporter_id: UserId,
        reported_user_id: UserId,
        reason: ReportReason,
        description: Option<String>,
    ) -> Result<ReportSubmission, ModerationError> {
        let mut report = Report::new(reporter_id, reported_user_id, reason, description)?;

        let work = self.begin().await?;
        let result = self.file_report(&work, &mut report).await;
        let (recommended_action, history, case) =
            self.finish(&work, result, "submit_report").await?;

        tracing::info!(
            report_id = report.id().get(),
            reporter_id = reporter_id.get(),
            reported_user_id = reported_user_id.get(),
            reason = %reason,
            recommended_action = %recommended_action,
            case_id = case.as_ref().map(|c| c.id().get()),
            "Report filed"
        );

        Ok(ReportSubmission {
            report,
            recommended_action,
            history,
            case,
        })
    }

    async fn file_report(
        &self,
        work: &F::Work,
        report: &mut Report,
    ) -> Result<(ModerationAction, ViolationHistory, Option<ModerationCase>), ModerationError> {
        work.reports().add(report).await?;

        // Counts include the report just added.
        let target = report.reported_user_id();
        let history = ViolationHistory::new(
            work.reports().get_active_reports_count_for_user(target).await?,
            work.reports()
                .get_serious_active_reports_count_for_user(target)
                .await?,
        );

        let action = self.policy.determine_action(report, history);
        if !self.policy.should_create_moderation_case(report, history) {
            return Ok((action, history, None));
        }

        let mut case = work
            .cases()
            .get_cases_for_user(target)
            .await?
            .into_iter()
            .find(|c| c.status() == CaseStatus::Open)
            .unwrap_or_else(|| ModerationCase::new(target, CasePriority::Low));

        case.add_report(report.id())?;
        let related = usize::try_from(history.report_count).unwrap_or(usize::MAX);
        case.raise_priority(self.policy.determine_case_priority(report, related));

        if case.id().is_unsaved() {
            work.cases().add(&mut case).await?;
            tracing::info!(
                case_id = case.id().get(),
                target_user_id = target.get(),
                priority = %case.priority(),
                "Moderation case opened"
            );
        } else {
            work.cases().update(&mut case).await?;
        }

        Ok((action, history, Some(case)))
    }

    async fn change_report<M>(
        &self,
        report_id: ReportId,
        operation: &'static str,
        mutate: M,
    ) -> Result<Report, ModerationError>
    where
        M: FnOnce(&mut Report) -> Result<(), DomainError> + Send,
    {
        let work = self.begin().await?;
        let result = async {
            let mut report = work
                .reports()
                .get_by_id(report_id)
                .await?
                .ok_or_else(|| ModerationError::NotFound(format!("report {}", report_id)))?;
            mutate(&mut report)?;
            work.reports().update(&mut report).await?;
            Ok::<_, ModerationError>(report)
        }
        .await;
        let report = self.finish(&work, result, operation).await?;

        tracing::info!(
            report_id = report_id.get(),
            status = %report.status(),
            operation,
            "Report updated"
        );
        Ok(report)
    }

    pub async fn start_review(
        &self,
        report_id: ReportId,
        reviewer_id: UserId,
    ) -> Result<Report, ModerationError> {
        self.change_report(report_id, "start_review", |r| r.start_review(reviewer_id))
            .await
    }

    pub async fn resolve_report(
        &self,
        report_id: ReportId,
        action: ModerationAction,
        notes: Option<String>,
    ) -> Result<Report, ModerationError> {
        self.change_report(report_id, "resolve_report", |r| r.resolve(action, notes))
            .await
    }

    pub async fn dismiss_report(
        &self,
        report_id: ReportId,
        notes: Option<String>,
    ) -> Result<Report, ModerationError> {
        self.change_report(report_id, "dismiss_report", |r| r.dismiss(notes))
            .await
    }

    pub async fn escalate_report(
        &self,
        report_id: ReportId,
        notes: Option<String>,
    ) -> Result<Report, ModerationError> {
        self.change_report(report_id, "escalate_report", |r| r.escalate(notes))
            .await
    }

    pub async fn get_report(&self, report_id: ReportId) -> Result<Option<Report>, ModerationError> {
        let work = self.factory.create().await?;
        Ok(work.reports().get_by_id(report_id).await?)
    }

    /// Pending reports that have waited longer than three days as of `now`.
    pub async fn overdue_reports(&self, now: DateTime<Utc>) -> Result<Vec<Report>, ModerationError> {
        let work = self.factory.create().await?;
        let pending = work.reports().get_pending_reports().await?;
        Ok(pending.into_iter().filter(|r| r.is_overdue_at(now)).collect())
    }

    pub async fn reports_requiring_immediate_attention(&self) -> Result<Vec<Report>, ModerationError> {
        let work = self.factory.create().await?;
        let pending = work.reports().get_pending_reports().await?;
        Ok(pending
            .into_iter()
            .filter(|r| r.requires_immediate_attention())
            .collect())
    }

    // ------------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------------

    pub async fn block_user(
        &self,
        blocker_id: UserId,
        blocked_user_id: UserId,
        reason: Option<String>,
    ) -> Result<Block, ModerationError> {
        let mut block = Block::new(blocker_id, blocked_user_id, reason)?;

        let work = self.begin().await?;
        let result = async {
            if work
                .blocks()
                .exists_active_block(blocker_id, blocked_user_id)
                .await?
            {
                return Err(ModerationError::Domain(DomainError::state(format!(
                    "user {} has already blocked user {}",
                    blocker_id, blocked_user_id
                ))));
            }
            work.blocks().add(&mut block).await?;
            Ok::<_, ModerationError>(())
        }
        .await;
        self.finish(&work, result, "block_user").await?;

        tracing::info!(
            block_id = block.id().get(),
            blocker_id = blocker_id.get(),
            blocked_user_id = blocked_user_id.get(),
            "User blocked"
        );
        Ok(block)
    }

    pub async fn unblock_user(
        &self,
        blocker_id: UserId,
        blocked_user_id: UserId,
    ) -> Result<Block, ModerationError> {
        let work = self.begin().await?;
        let result = async {
            let mut block = work
                .blocks()
                .get_active_block(blocker_id, blocked_user_id)
                .await?
                .ok_or_else(|| {
                    ModerationError::NotFound(format!(
                        "active block from {} to {}",
                        blocker_id, blocked_user_id
                    ))
                })?;
            block.revoke()?;
            work.blocks().update(&mut block).await?;
            Ok::<_, ModerationError>(block)
        }
        .await;
        let block = self.finish(&work, result, "unblock_user").await?;

        tracing::info!(
            block_id = block.id().get(),
            blocker_id = blocker_id.get(),
            blocked_user_id = blocked_user_id.get(),
            "User unblocked"
        );
        Ok(block)
    }

    /// True if either user has an active block on the other.
    pub async fn is_blocked(&self, a: UserId, b: UserId) -> Result<bool, ModerationError> {
        let work = self.factory.create().await?;
        Ok(work.blocks().exists_active_block(a, b).await?
            || work.blocks().exists_active_block(b, a).await?)
    }

    pub async fn blocks_by_user(&self, blocker_id: UserId) -> Result<Vec<Block>, ModerationError> {
        let work = self.factory.create().await?;
        Ok(work.blocks().get_blocks_by_user(blocker_id).await?)
    }

    // ------------------------------------------------------------------------
    // Cases
    // ------------------------------------------------------------------------

    async fn change_case<M>(
        &self,
        case_id: CaseId,
        operation: &'static str,
        mutate: M,
    ) -> Result<ModerationCase, ModerationError>
    where
        M: FnOnce(&mut ModerationCase) -> Result<(), DomainError> + Send,
    {
        let work = self.begin().await?;
        let result = async {
            let mut case = work
                .cases()
                .get_by_id(case_id)
                .await?
                .ok_or_else(|| ModerationError::NotFound(format!("case {}", case_id)))?;
            mutate(&mut case)?;
            work.cases().update(&mut case).await?;
            Ok::<_, ModerationError>(case)
        }
        .await;
        let case = self.finish(&work, result, operation).await?;

        tracing::info!(
            case_id = case_id.get(),
            status = %case.status(),
            priority = %case.priority(),
            operation,
            "Moderation case updated"
        );
        Ok(case)
    }

    pub async fn assign_case(
        &self,
        case_id: CaseId,
        moderator_id: UserId,
    ) -> Result<ModerationCase, ModerationError> {
        self.change_case(case_id, "assign_case", |c| c.assign_to(moderator_id))
            .await
    }

    pub async fn escalate_case(&self, case_id: CaseId) -> Result<ModerationCase, ModerationError> {
        self.change_case(case_id, "escalate_case", |c| c.escalate())
            .await
    }

    pub async fn resolve_case(
        &self,
        case_id: CaseId,
        action: ModerationAction,
        resolution: String,
    ) -> Result<ModerationCase, ModerationError> {
        self.change_case(case_id, "resolve_case", |c| c.resolve(action, resolution))
            .await
    }

    pub async fn get_case(&self, case_id: CaseId) -> Result<Option<ModerationCase>, ModerationError> {
        let work = self.factory.create().await?;
        Ok(work.cases().get_by_id(case_id).await?)
    }

    pub async fn cases_for_user(
        &self,
        target_user_id: UserId,
    ) -> Result<Vec<ModerationCase>, ModerationError> {
        let work = self.factory.create().await?;
        Ok(work.cases().get_cases_for_user(target_user_id).await?)
    }

    pub async fn assigned_cases(
        &self,
        moderator_id: UserId,
    ) -> Result<Vec<ModerationCase>, ModerationError> {
        let work = self.factory.create().await?;
        Ok(work.cases().get_assigned_cases(moderator_id).await?)
    }

    /// Escalate every in-progress case the policy flags as of `now`.
    ///
    /// Each case is escalated in its own unit of work, so a conflict on one case
    /// (a moderator acting on it concurrently) does not hold back the rest.
    pub async fn sweep_escalations(&self, now: DateTime<Utc>) -> Result<Vec<CaseId>, ModerationError> {
        let candidates: Vec<CaseId> = {
            let work = self.factory.create().await?;
            work.cases()
                .get_cases_by_status(CaseStatus::InProgress)
                .await?
                .into_iter()
                .filter(|c| self.policy.should_escalate_case_at(c, now))
                .map(|c| c.id())
                .collect()
        };

        tracing::debug!(candidates = candidates.len(), "Escalation sweep starting");

        let mut escalated = Vec::new();
        for case_id in candidates {
            match self.escalate_case(case_id).await {
                Ok(_) => escalated.push(case_id),
                Err(e) if e.is_conflict() || e.is_not_found() => {
                    tracing::warn!(case_id = case_id.get(), "Skipping case in sweep: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(escalated = escalated.len(), "Escalation sweep completed");
        Ok(escalated)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::moderation_policy::PolicyConfig;
    use crate::core::moderation::moderation_store::{
        BlockRepository, ModerationCaseRepository, ReportRepository,
    };
    use crate::core::moderation::report::ReportStatus;
    use crate::infra::moderation::{InMemoryModerationStore, InMemoryUnitOfWork};
    use async_trait::async_trait;
    use chrono::Duration;

    fn uid(v: i64) -> UserId {
        UserId::new(v).unwrap()
    }

    fn service() -> ModerationService<InMemoryModerationStore> {
        ModerationService::new(
            InMemoryModerationStore::new(),
            ModerationPolicyService::default(),
        )
    }

    #[tokio::test]
    async fn test_single_spam_report_gets_warning_without_case() {
        let service = service();
        let submission = service
            .submit_report(uid(1), uid(2), ReportReason::Spam, None)
            .await
            .unwrap();

        assert!(!submission.report.id().is_unsaved());
        assert_eq!(submission.report.status(), ReportStatus::Pending);
        assert_eq!(submission.history, ViolationHistory::new(1, 0));
        assert_eq!(submission.recommended_action, ModerationAction::Warning);
        assert!(submission.case.is_none());
    }

    #[tokio::test]
    async fn test_violence_report_opens_critical_case() {
        let service = service();
        let submission = service
            .submit_report(uid(1), uid(2), ReportReason::Violence, Some("threats".into()))
            .await
            .unwrap();

        assert_eq!(submission.recommended_action, ModerationAction::AccountSuspension);
        let case = submission.case.expect("case should be opened");
        assert_eq!(case.priority(), CasePriority::Critical);
        assert_eq!(case.status(), CaseStatus::Open);
        assert!(case.contains_report(submission.report.id()));

        let stored = service.get_case(case.id()).await.unwrap().unwrap();
        assert_eq!(stored, case);
    }

    #[tokio::test]
    async fn test_third_report_opens_case_and_later_reports_join_it() {
        let service = service();
        for reporter in 10..12 {
            let s = service
                .submit_report(uid(reporter), uid(2), ReportReason::Spam, None)
                .await
                .unwrap();
            assert!(s.case.is_none());
        }

        let third = service
            .submit_report(uid(12), uid(2), ReportReason::Spam, None)
            .await
            .unwrap();
        assert_eq!(third.history.report_count, 3);
        assert_eq!(third.recommended_action, ModerationAction::TemporaryRestriction);
        let case = third.case.unwrap();
        assert_eq!(case.priority(), CasePriority::Medium);

        let fourth = service
            .submit_report(uid(13), uid(2), ReportReason::Spam, None)
            .await
            .unwrap();
        let joined = fourth.case.unwrap();
        assert_eq!(joined.id(), case.id());
        assert_eq!(joined.report_count(), 2);
        assert_eq!(service.cases_for_user(uid(2)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_case_priority_follows_user_history_not_case_size() {
        let service = service();
        let mut first_case = None;
        for reporter in 10..13 {
            first_case = service
                .submit_report(uid(reporter), uid(2), ReportReason::Spam, None)
                .await
                .unwrap()
                .case;
        }
        let first_case = first_case.unwrap();
        service.assign_case(first_case.id(), uid(50)).await.unwrap();
        service
            .resolve_case(first_case.id(), ModerationAction::Warning, "warned".into())
            .await
            .unwrap();

        // Fresh case holding one report, ranked on the four active reports.
        let fourth = service
            .submit_report(uid(13), uid(2), ReportReason::Spam, None)
            .await
            .unwrap();
        assert_eq!(fourth.history.report_count, 4);
        let reopened = fourth.case.unwrap();
        assert_ne!(reopened.id(), first_case.id());
        assert_eq!(reopened.report_count(), 1);
        assert_eq!(reopened.priority(), CasePriority::Medium);

        let fifth = service
            .submit_report(uid(14), uid(2), ReportReason::Spam, None)
            .await
            .unwrap();
        let joined = fifth.case.unwrap();
        assert_eq!(joined.id(), reopened.id());
        assert_eq!(joined.report_count(), 2);
        assert_eq!(joined.priority(), CasePriority::High);
    }

    #[tokio::test]
    async fn test_dismissed_reports_leave_history() {
        let service = service();
        let first = service
            .submit_report(uid(10), uid(2), ReportReason::Spam, None)
            .await
            .unwrap();
        service.start_review(first.report.id(), uid(99)).await.unwrap();
        service.dismiss_report(first.report.id(), None).await.unwrap();

        let second = service
            .submit_report(uid(11), uid(2), ReportReason::Spam, None)
            .await
            .unwrap();
        assert_eq!(second.history, ViolationHistory::new(1, 0));
    }

    #[tokio::test]
    async fn test_self_report_rejected_before_storage() {
        let service = service();
        let err = service
            .submit_report(uid(1), uid(1), ReportReason::Spam, None)
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(service.overdue_reports(Utc::now() + Duration::days(10)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_review_lifecycle_through_service() {
        let service = service();
        let report_id = service
            .submit_report(uid(1), uid(2), ReportReason::Harassment, None)
            .await
            .unwrap()
            .report
            .id();

        let err = service
            .resolve_report(report_id, ModerationAction::Warning, None)
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        service.start_review(report_id, uid(7)).await.unwrap();
        let resolved = service
            .resolve_report(report_id, ModerationAction::Warning, Some("ok".into()))
            .await
            .unwrap();
        assert_eq!(resolved.status(), ReportStatus::Resolved);

        let stored = service.get_report(report_id).await.unwrap().unwrap();
        assert_eq!(stored.status(), ReportStatus::Resolved);
        assert_eq!(stored.resolved_action(), Some(ModerationAction::Warning));
    }

    #[tokio::test]
    async fn test_missing_report_is_not_found() {
        let err = service().start_review(ReportId(404), uid(7)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_block_and_unblock() {
        let service = service();
        let block = service
            .block_user(uid(1), uid(2), Some("spam DMs".into()))
            .await
            .unwrap();
        assert!(block.is_active());
        assert!(service.is_blocked(uid(1), uid(2)).await.unwrap());
        assert!(service.is_blocked(uid(2), uid(1)).await.unwrap());

        let err = service.block_user(uid(1), uid(2), None).await.unwrap_err();
        assert!(err.is_conflict());

        let revoked = service.unblock_user(uid(1), uid(2)).await.unwrap();
        assert!(revoked.is_revoked());
        assert!(!service.is_blocked(uid(1), uid(2)).await.unwrap());

        let err = service.unblock_user(uid(1), uid(2)).await.unwrap_err();
        assert!(err.is_not_found());

        // Blocking again after an unblock creates a fresh block.
        let again = service.block_user(uid(1), uid(2), None).await.unwrap();
        assert_ne!(again.id(), block.id());
        assert_eq!(service.blocks_by_user(uid(1)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_case_workflow() {
        let service = service();
        let case_id = service
            .submit_report(uid(1), uid(2), ReportReason::HateSpeech, None)
            .await
            .unwrap()
            .case
            .unwrap()
            .id();

        let err = service.escalate_case(case_id).await.unwrap_err();
        assert!(err.is_conflict());

        let assigned = service.assign_case(case_id, uid(77)).await.unwrap();
        assert_eq!(assigned.status(), CaseStatus::InProgress);
        assert_eq!(service.assigned_cases(uid(77)).await.unwrap().len(), 1);

        let escalated = service.escalate_case(case_id).await.unwrap();
        assert_eq!(escalated.status(), CaseStatus::Escalated);
        assert_eq!(escalated.priority(), CasePriority::Critical);

        let err = service
            .resolve_case(case_id, ModerationAction::PermanentBan, String::new())
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());

        let resolved = service
            .resolve_case(case_id, ModerationAction::PermanentBan, "banned".into())
            .await
            .unwrap();
        assert_eq!(resolved.status(), CaseStatus::Resolved);
        assert_eq!(resolved.final_action(), Some(ModerationAction::PermanentBan));
    }

    #[tokio::test]
    async fn test_new_reports_open_second_case_once_first_is_assigned() {
        let service = service();
        let first = service
            .submit_report(uid(1), uid(2), ReportReason::Harassment, None)
            .await
            .unwrap()
            .case
            .unwrap();
        service.assign_case(first.id(), uid(50)).await.unwrap();

        let second = service
            .submit_report(uid(3), uid(2), ReportReason::Harassment, None)
            .await
            .unwrap()
            .case
            .unwrap();
        assert_ne!(second.id(), first.id());
        assert_eq!(service.cases_for_user(uid(2)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sweep_escalates_busy_cases_only() {
        let service = ModerationService::new(
            InMemoryModerationStore::new(),
            ModerationPolicyService::new(PolicyConfig {
                escalation_report_threshold: 2,
                ..PolicyConfig::default()
            }),
        );

        let busy = service
            .submit_report(uid(1), uid(2), ReportReason::Harassment, None)
            .await
            .unwrap()
            .case
            .unwrap();
        service
            .submit_report(uid(3), uid(2), ReportReason::Harassment, None)
            .await
            .unwrap();
        let quiet = service
            .submit_report(uid(1), uid(4), ReportReason::Harassment, None)
            .await
            .unwrap()
            .case
            .unwrap();
        service.assign_case(busy.id(), uid(90)).await.unwrap();
        service.assign_case(quiet.id(), uid(90)).await.unwrap();

        let escalated = service.sweep_escalations(Utc::now()).await.unwrap();
        assert_eq!(escalated, vec![busy.id()]);
        let busy = service.get_case(busy.id()).await.unwrap().unwrap();
        assert_eq!(busy.status(), CaseStatus::Escalated);
        let quiet = service.get_case(quiet.id()).await.unwrap().unwrap();
        assert_eq!(quiet.status(), CaseStatus::InProgress);

        // A week later the quiet case is overdue too.
        let later = Utc::now() + Duration::days(8);
        assert_eq!(service.sweep_escalations(later).await.unwrap(), vec![quiet.id()]);
    }

    #[tokio::test]
    async fn test_report_queries() {
        let service = service();
        service
            .submit_report(uid(1), uid(2), ReportReason::UnderAge, None)
            .await
            .unwrap();
        service
            .submit_report(uid(1), uid(3), ReportReason::Spam, None)
            .await
            .unwrap();

        let urgent = service.reports_requiring_immediate_attention().await.unwrap();
        assert_eq!(urgent.len(), 1);
        assert_eq!(urgent[0].reason(), ReportReason::UnderAge);

        assert!(service.overdue_reports(Utc::now()).await.unwrap().is_empty());
        let later = Utc::now() + Duration::days(4);
        assert_eq!(service.overdue_reports(later).await.unwrap().len(), 2);
    }

    // ------------------------------------------------------------------------
    // Atomicity: a failing case write must take the report down with it.
    // ------------------------------------------------------------------------

    struct BrokenCaseRepository;

    #[async_trait]
    impl ModerationCaseRepository for BrokenCaseRepository {
        async fn get_by_id(&self, _id: CaseId) -> Result<Option<ModerationCase>, StoreError> {
            Ok(None)
        }

        async fn get_cases_for_user(
            &self,
            _target_user_id: UserId,
        ) -> Result<Vec<ModerationCase>, StoreError> {
            Ok(Vec::new())
        }

        async fn get_cases_by_status(
            &self,
            _status: CaseStatus,
        ) -> Result<Vec<ModerationCase>, StoreError> {
            Ok(Vec::new())
        }

        async fn get_assigned_cases(
            &self,
            _moderator_id: UserId,
        ) -> Result<Vec<ModerationCase>, StoreError> {
            Ok(Vec::new())
        }

        async fn get_cases_by_priority(
            &self,
            _priority: CasePriority,
        ) -> Result<Vec<ModerationCase>, StoreError> {
            Ok(Vec::new())
        }

        async fn add(&self, _case: &mut ModerationCase) -> Result<(), StoreError> {
            Err(StoreError::Storage("disk full".into()))
        }

        async fn update(&self, _case: &mut ModerationCase) -> Result<(), StoreError> {
            Err(StoreError::Storage("disk full".into()))
        }
    }

    struct BrokenCaseWork {
        inner: InMemoryUnitOfWork,
        cases: BrokenCaseRepository,
    }

    #[async_trait]
    impl UnitOfWork for BrokenCaseWork {
        fn reports(&self) -> &dyn ReportRepository {
            self.inner.reports()
        }

        fn blocks(&self) -> &dyn BlockRepository {
            self.inner.blocks()
        }

        fn cases(&self) -> &dyn ModerationCaseRepository {
            &self.cases
        }

        async fn save_changes(&self) -> Result<u64, StoreError> {
            self.inner.save_changes().await
        }

        async fn begin_transaction(&self) -> Result<(), StoreError> {
            self.inner.begin_transaction().await
        }

        async fn commit(&self) -> Result<(), StoreError> {
            self.inner.commit().await
        }

        async fn rollback(&self) -> Result<(), StoreError> {
            self.inner.rollback().await
        }
    }

    struct BrokenCaseFactory {
        store: InMemoryModerationStore,
    }

    #[async_trait]
    impl UnitOfWorkFactory for BrokenCaseFactory {
        type Work = BrokenCaseWork;

        async fn create(&self) -> Result<BrokenCaseWork, StoreError> {
            Ok(BrokenCaseWork {
                inner: self.store.create().await?,
                cases: BrokenCaseRepository,
            })
        }
    }

    #[tokio::test]
    async fn test_failed_case_write_rolls_back_report() {
        let store = InMemoryModerationStore::new();
        let service = ModerationService::new(
            BrokenCaseFactory {
                store: store.clone(),
            },
            ModerationPolicyService::default(),
        );

        // Spam does not need a case, so it commits.
        service
            .submit_report(uid(1), uid(2), ReportReason::Spam, None)
            .await
            .unwrap();

        // Violence needs a case; the case write fails and the report must vanish.
        let err = service
            .submit_report(uid(3), uid(2), ReportReason::Violence, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::Store(StoreError::Storage(_))));

        let work = store.create().await.unwrap();
        let reports = work.reports().get_reports_for_user(uid(2)).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].reason(), ReportReason::Spam);
    }
}
