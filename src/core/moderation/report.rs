// Report entity - one user's complaint against another and its review lifecycle.
//
// Pending -> UnderReview -> { Resolved | Dismissed | Escalated }
//
// The lifecycle methods below are the only way to change a report's status.

use super::moderation_models::{DomainError, ModerationAction, ReportId, ReportReason, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MAX_DESCRIPTION_LEN: usize = 1000;

/// Pending reports older than this are overdue.
pub const REPORT_OVERDUE_AFTER_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    UnderReview,
    Resolved,
    Dismissed,
    Escalated,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::UnderReview => "under_review",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Dismissed => "dismissed",
            ReportStatus::Escalated => "escalated",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReportStatus::Resolved | ReportStatus::Dismissed | ReportStatus::Escalated
        )
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReportStatus::Pending),
            "under_review" => Ok(ReportStatus::UnderReview),
            "resolved" => Ok(ReportStatus::Resolved),
            "dismissed" => Ok(ReportStatus::Dismissed),
            "escalated" => Ok(ReportStatus::Escalated),
            other => Err(DomainError::argument(format!("unknown report status '{}'", other))),
        }
    }
}

/// A user-submitted complaint against another user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub(crate) id: ReportId,
    pub(crate) reporter_id: UserId,
    pub(crate) reported_user_id: UserId,
    pub(crate) reason: ReportReason,
    pub(crate) description: Option<String>,
    pub(crate) status: ReportStatus,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) reviewed_at: Option<DateTime<Utc>>,
    pub(crate) reviewed_by: Option<UserId>,
    pub(crate) resolved_action: Option<ModerationAction>,
    pub(crate) review_notes: Option<String>,
    pub(crate) version: u64,
}

impl Report {
    /// File a new pending report.
    ///
    /// Fails with `InvalidArgument` when a user reports themselves or the
    /// description is longer than [`MAX_DESCRIPTION_LEN`] characters.
    pub fn new(
        reporter_id: UserId,
        reported_user_id: UserId,
        reason: ReportReason,
        description: Option<String>,
    ) -> Result<Self, DomainError> {
        if reporter_id == reported_user_id {
            return Err(DomainError::argument("users cannot report themselves"));
        }

        let description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        if let Some(text) = &description {
            if text.chars().count() > MAX_DESCRIPTION_LEN {
                return Err(DomainError::argument(format!(
                    "report description must be at most {} characters",
                    MAX_DESCRIPTION_LEN
                )));
            }
        }

        Ok(Self {
            id: ReportId::UNSAVED,
            reporter_id,
            reported_user_id,
            reason,
            description,
            status: ReportStatus::Pending,
            created_at: Utc::now(),
            reviewed_at: None,
            reviewed_by: None,
            resolved_action: None,
            review_notes: None,
            version: 0,
        })
    }

    /// Same as [`Report::new`] but from raw ids, as they arrive from callers.
    pub fn from_raw(
        reporter_id: i64,
        reported_user_id: i64,
        reason: ReportReason,
        description: Option<String>,
    ) -> Result<Self, DomainError> {
        Self::new(
            UserId::new(reporter_id)?,
            UserId::new(reported_user_id)?,
            reason,
            description,
        )
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    fn require_status(&self, expected: ReportStatus, operation: &str) -> Result<(), DomainError> {
        if self.status != expected {
            return Err(DomainError::state(format!(
                "cannot {} report {} while it is {} (expected {})",
                operation, self.id, self.status, expected
            )));
        }
        Ok(())
    }

    /// Pending -> UnderReview.
    pub fn start_review(&mut self, reviewer_id: UserId) -> Result<(), DomainError> {
        self.require_status(ReportStatus::Pending, "start review of")?;
        self.status = ReportStatus::UnderReview;
        self.reviewed_by = Some(reviewer_id);
        Ok(())
    }

    /// UnderReview -> Resolved with the enforcement action taken.
    pub fn resolve(
        &mut self,
        action: ModerationAction,
        notes: Option<String>,
    ) -> Result<(), DomainError> {
        self.require_status(ReportStatus::UnderReview, "resolve")?;
        self.finish(ReportStatus::Resolved, Some(action), notes);
        Ok(())
    }

    /// UnderReview -> Dismissed. Records `NoAction`.
    pub fn dismiss(&mut self, notes: Option<String>) -> Result<(), DomainError> {
        self.require_status(ReportStatus::UnderReview, "dismiss")?;
        self.finish(ReportStatus::Dismissed, Some(ModerationAction::NoAction), notes);
        Ok(())
    }

    /// UnderReview -> Escalated. No action is recorded; the report moves up a tier.
    pub fn escalate(&mut self, notes: Option<String>) -> Result<(), DomainError> {
        self.require_status(ReportStatus::UnderReview, "escalate")?;
        self.finish(ReportStatus::Escalated, None, notes);
        Ok(())
    }

    fn finish(
        &mut self,
        status: ReportStatus,
        action: Option<ModerationAction>,
        notes: Option<String>,
    ) {
        self.status = status;
        self.reviewed_at = Some(Utc::now());
        self.resolved_action = action;
        self.review_notes = notes.filter(|n| !n.trim().is_empty());
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn is_overdue(&self) -> bool {
        self.is_overdue_at(Utc::now())
    }

    /// Pending for more than three days as of `now`.
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ReportStatus::Pending
            && now - self.created_at > Duration::days(REPORT_OVERDUE_AFTER_DAYS)
    }

    pub fn requires_immediate_attention(&self) -> bool {
        self.status == ReportStatus::Pending && self.reason.requires_immediate_action()
    }

    pub fn id(&self) -> ReportId {
        self.id
    }

    pub fn reporter_id(&self) -> UserId {
        self.reporter_id
    }

    pub fn reported_user_id(&self) -> UserId {
        self.reported_user_id
    }

    pub fn reason(&self) -> ReportReason {
        self.reason
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn status(&self) -> ReportStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn reviewed_at(&self) -> Option<DateTime<Utc>> {
        self.reviewed_at
    }

    pub fn reviewed_by(&self) -> Option<UserId> {
        self.reviewed_by
    }

    pub fn resolved_action(&self) -> Option<ModerationAction> {
        self.resolved_action
    }

    pub fn review_notes(&self) -> Option<&str> {
        self.review_notes.as_deref()
    }

    /// Row stamp used for optimistic concurrency on update.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn mark_stored(&mut self, id: ReportId, version: u64) {
        self.id = id;
        self.version = version;
    }
}
