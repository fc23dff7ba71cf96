// ModerationCase aggregate - clusters reports against one target user and carries
// the investigation workflow.
//
// Open -> InProgress -> Escalated -> Resolved, and Resolved is reachable from any
// state that is not already Resolved.
//
// A case only references reports by id. It never drives a report's lifecycle.

use super::moderation_models::{CaseId, DomainError, ModerationAction, ReportId, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub const CRITICAL_CASE_OVERDUE_HOURS: i64 = 24;
pub const CASE_OVERDUE_DAYS: i64 = 7;

// ============================================================================
// PRIORITY & STATUS
// ============================================================================

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CasePriority {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl CasePriority {
    /// One step up the ladder. Critical stays Critical.
    pub fn escalated(self) -> Self {
        match self {
            CasePriority::Low => CasePriority::Medium,
            CasePriority::Medium => CasePriority::High,
            CasePriority::High | CasePriority::Critical => CasePriority::Critical,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CasePriority::Low => "low",
            CasePriority::Medium => "medium",
            CasePriority::High => "high",
            CasePriority::Critical => "critical",
        }
    }
}

impl fmt::Display for CasePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CasePriority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(CasePriority::Low),
            "medium" => Ok(CasePriority::Medium),
            "high" => Ok(CasePriority::High),
            "critical" => Ok(CasePriority::Critical),
            other => Err(DomainError::argument(format!("unknown case priority '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Open,
    InProgress,
    Escalated,
    Resolved,
}

impl CaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CaseStatus::Open => "open",
            CaseStatus::InProgress => "in_progress",
            CaseStatus::Escalated => "escalated",
            CaseStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaseStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(CaseStatus::Open),
            "in_progress" => Ok(CaseStatus::InProgress),
            "escalated" => Ok(CaseStatus::Escalated),
            "resolved" => Ok(CaseStatus::Resolved),
            other => Err(DomainError::argument(format!("unknown case status '{}'", other))),
        }
    }
}

// ============================================================================
// AGGREGATE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationCase {
    pub(crate) id: CaseId,
    pub(crate) target_user_id: UserId,
    pub(crate) report_ids: BTreeSet<ReportId>,
    pub(crate) priority: CasePriority,
    pub(crate) status: CaseStatus,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) assigned_at: Option<DateTime<Utc>>,
    pub(crate) assigned_to: Option<UserId>,
    pub(crate) resolved_at: Option<DateTime<Utc>>,
    pub(crate) final_action: Option<ModerationAction>,
    pub(crate) resolution: Option<String>,
    pub(crate) version: u64,
}

impl ModerationCase {
    /// Open a new case against `target_user_id`.
    pub fn new(target_user_id: UserId, priority: CasePriority) -> Self {
        Self {
            id: CaseId::UNSAVED,
            target_user_id,
            report_ids: BTreeSet::new(),
            priority,
            status: CaseStatus::Open,
            created_at: Utc::now(),
            assigned_at: None,
            assigned_to: None,
            resolved_at: None,
            final_action: None,
            resolution: None,
            version: 0,
        }
    }

    /// Attach a report. Only allowed while Open; attaching twice is a no-op.
    pub fn add_report(&mut self, report_id: ReportId) -> Result<(), DomainError> {
        if self.status != CaseStatus::Open {
            return Err(DomainError::state(format!(
                "cannot add reports to case {} while it is {}",
                self.id, self.status
            )));
        }
        self.report_ids.insert(report_id);
        Ok(())
    }

    pub fn assign_to(&mut self, moderator_id: UserId) -> Result<(), DomainError> {
        if self.status != CaseStatus::Open {
            return Err(DomainError::state(format!(
                "cannot assign case {} while it is {}",
                self.id, self.status
            )));
        }
        self.assigned_to = Some(moderator_id);
        self.assigned_at = Some(Utc::now());
        self.status = CaseStatus::InProgress;
        Ok(())
    }

    /// Bump priority one step (saturating at Critical) and mark the case Escalated.
    pub fn escalate(&mut self) -> Result<(), DomainError> {
        if self.status != CaseStatus::InProgress {
            return Err(DomainError::state(format!(
                "cannot escalate case {} while it is {}",
                self.id, self.status
            )));
        }
        self.priority = self.priority.escalated();
        self.status = CaseStatus::Escalated;
        Ok(())
    }

    /// Raise priority to at least `priority`. Never lowers it.
    pub fn raise_priority(&mut self, priority: CasePriority) {
        self.priority = self.priority.max(priority);
    }

    pub fn resolve(
        &mut self,
        action: ModerationAction,
        resolution: impl Into<String>,
    ) -> Result<(), DomainError> {
        if self.status == CaseStatus::Resolved {
            return Err(DomainError::state(format!("case {} is already resolved", self.id)));
        }
        let resolution = resolution.into();
        if resolution.trim().is_empty() {
            return Err(DomainError::argument("case resolution text is required"));
        }

        self.status = CaseStatus::Resolved;
        self.resolved_at = Some(Utc::now());
        self.final_action = Some(action);
        self.resolution = Some(resolution.trim().to_string());
        Ok(())
    }

    pub fn is_overdue(&self) -> bool {
        self.is_overdue_at(Utc::now())
    }

    /// In progress for over a day (Critical) or over a week (everything else).
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        if self.status != CaseStatus::InProgress {
            return false;
        }
        let limit = match self.priority {
            CasePriority::Critical => Duration::hours(CRITICAL_CASE_OVERDUE_HOURS),
            _ => Duration::days(CASE_OVERDUE_DAYS),
        };
        now - self.created_at > limit
    }

    pub fn id(&self) -> CaseId {
        self.id
    }

    pub fn target_user_id(&self) -> UserId {
        self.target_user_id
    }

    pub fn report_ids(&self) -> &BTreeSet<ReportId> {
        &self.report_ids
    }

    pub fn report_count(&self) -> usize {
        self.report_ids.len()
    }

    pub fn contains_report(&self, report_id: ReportId) -> bool {
        self.report_ids.contains(&report_id)
    }

    pub fn priority(&self) -> CasePriority {
        self.priority
    }

    pub fn status(&self) -> CaseStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn assigned_at(&self) -> Option<DateTime<Utc>> {
        self.assigned_at
    }

    pub fn assigned_to(&self) -> Option<UserId> {
        self.assigned_to
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    pub fn final_action(&self) -> Option<ModerationAction> {
        self.final_action
    }

    pub fn resolution(&self) -> Option<&str> {
        self.resolution.as_deref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn mark_stored(&mut self, id: CaseId, version: u64) {
        self.id = id;
        self.version = version;
    }
}
