// Moderation policy engine - the graduated enforcement rules.
//
// Every function here is a pure function of its inputs: no storage, no clock
// (callers pass `now`), no errors. Given a report and the reported user's
// aggregated history it decides:
// - which enforcement action fits
// - how urgent a case is
// - whether a case should be opened at all
// - whether an in-progress case needs escalating

use super::moderation_case::{CasePriority, CaseStatus, ModerationCase};
use super::moderation_models::{ModerationAction, ReportReason, ViolationHistory};
use super::report::Report;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Thresholds for case management. Action bands are fixed and not configurable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Open a case once the reported user has this many active reports.
    pub case_report_threshold: u64,
    /// Escalate an in-progress case once it references this many reports.
    pub escalation_report_threshold: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            case_report_threshold: 3,
            escalation_report_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModerationPolicyService {
    config: PolicyConfig,
}

impl ModerationPolicyService {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Pick the enforcement action for `report`.
    ///
    /// Immediate-action reasons map straight to an action and ignore history.
    /// Everything else is banded on `history`, which includes `report` itself.
    pub fn determine_action(&self, report: &Report, history: ViolationHistory) -> ModerationAction {
        let reason = report.reason();
        if reason.requires_immediate_action() {
            return Self::immediate_action(reason);
        }
        Self::action_for_history(history)
    }

    fn immediate_action(reason: ReportReason) -> ModerationAction {
        match reason {
            ReportReason::Violence => ModerationAction::AccountSuspension,
            ReportReason::UnderAge => ModerationAction::PermanentBan,
            ReportReason::HateSpeech => ModerationAction::AccountSuspension,
            _ => ModerationAction::TemporaryRestriction,
        }
    }

    /// History bands, first match wins.
    pub fn action_for_history(history: ViolationHistory) -> ModerationAction {
        match (history.report_count, history.serious_report_count) {
            (1, 0) => ModerationAction::Warning,
            (count, 0) if count < 3 => ModerationAction::Warning,
            (count, serious) if count < 5 && serious < 2 => ModerationAction::TemporaryRestriction,
            (count, serious) if count < 10 && serious < 5 => ModerationAction::AccountSuspension,
            _ => ModerationAction::PermanentBan,
        }
    }

    /// How urgently a case holding `report` should be worked.
    ///
    /// `related_report_count` is the number of reports the case references.
    pub fn determine_case_priority(
        &self,
        report: &Report,
        related_report_count: usize,
    ) -> CasePriority {
        let reason = report.reason();
        if reason.requires_immediate_action() {
            CasePriority::Critical
        } else if reason.is_serious() {
            CasePriority::High
        } else if related_report_count >= 5 {
            CasePriority::High
        } else if related_report_count >= 2 {
            CasePriority::Medium
        } else {
            CasePriority::Low
        }
    }

    pub fn should_create_moderation_case(&self, report: &Report, history: ViolationHistory) -> bool {
        report.reason().is_serious() || history.report_count >= self.config.case_report_threshold
    }

    pub fn should_escalate_case(&self, case: &ModerationCase) -> bool {
        self.should_escalate_case_at(case, Utc::now())
    }

    pub fn should_escalate_case_at(&self, case: &ModerationCase, now: DateTime<Utc>) -> bool {
        case.is_overdue_at(now) || case.report_count() >= self.config.escalation_report_threshold
    }

    /// Only in-progress cases are candidates for the periodic sweep.
    pub fn is_sweep_candidate(case: &ModerationCase) -> bool {
        case.status() == CaseStatus::InProgress
    }
}
