// Moderation value objects - the small immutable types every other part of the
// trust & safety engine is built from.
//
// These are pure domain types with no storage dependencies. Each one validates
// itself on construction, so an invalid UserId or severity never exists.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Longest accepted textual form of a report reason.
pub const MAX_REASON_LEN: usize = 100;

// ============================================================================
// ERRORS
// ============================================================================

/// Failures raised by value objects and entity lifecycle methods.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Malformed input: non-positive ids, empty required text, self-reports.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The entity's lifecycle state forbids the requested transition.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl DomainError {
    pub(crate) fn argument(msg: impl Into<String>) -> Self {
        DomainError::InvalidArgument(msg.into())
    }

    pub(crate) fn state(msg: impl Into<String>) -> Self {
        DomainError::InvalidState(msg.into())
    }
}

// ============================================================================
// IDENTITIES
// ============================================================================

/// Identity of a user. Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct UserId(i64);

impl UserId {
    pub fn new(value: i64) -> Result<Self, DomainError> {
        if value <= 0 {
            return Err(DomainError::argument(format!(
                "user id must be positive, got {}",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for UserId {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        UserId::new(value)
    }
}

impl From<UserId> for i64 {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Placeholder carried by entities that have not been stored yet.
            pub const UNSAVED: $name = $name(0);

            pub fn get(self) -> i64 {
                self.0
            }

            pub fn is_unsaved(self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Repository-assigned identity of a [`Report`](super::Report).
    ReportId
);
entity_id!(
    /// Repository-assigned identity of a [`Block`](super::Block).
    BlockId
);
entity_id!(
    /// Repository-assigned identity of a [`ModerationCase`](super::ModerationCase).
    CaseId
);

// ============================================================================
// REPORT REASON
// ============================================================================

/// Why a user was reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportReason {
    Spam,
    InappropriateContent,
    Harassment,
    FakeProfile,
    UnderAge,
    Violence,
    HateSpeech,
    Impersonation,
    IntellectualProperty,
    Other,
}

/// Severity flags attached to each reason.
#[derive(Debug, Clone, Copy)]
struct ReasonTraits {
    name: &'static str,
    serious: bool,
    immediate: bool,
}

// Immediate reasons must also be serious.
const REASON_TABLE: [(ReportReason, ReasonTraits); 10] = [
    (ReportReason::Spam, ReasonTraits { name: "spam", serious: false, immediate: false }),
    (
        ReportReason::InappropriateContent,
        ReasonTraits { name: "inappropriate_content", serious: false, immediate: false },
    ),
    (ReportReason::Harassment, ReasonTraits { name: "harassment", serious: true, immediate: false }),
    (ReportReason::FakeProfile, ReasonTraits { name: "fake_profile", serious: false, immediate: false }),
    (ReportReason::UnderAge, ReasonTraits { name: "under_age", serious: true, immediate: true }),
    (ReportReason::Violence, ReasonTraits { name: "violence", serious: true, immediate: true }),
    (ReportReason::HateSpeech, ReasonTraits { name: "hate_speech", serious: true, immediate: true }),
    (ReportReason::Impersonation, ReasonTraits { name: "impersonation", serious: false, immediate: false }),
    (
        ReportReason::IntellectualProperty,
        ReasonTraits { name: "intellectual_property", serious: false, immediate: false },
    ),
    (ReportReason::Other, ReasonTraits { name: "other", serious: false, immediate: false }),
];

impl ReportReason {
    pub const ALL: [ReportReason; 10] = [
        ReportReason::Spam,
        ReportReason::InappropriateContent,
        ReportReason::Harassment,
        ReportReason::FakeProfile,
        ReportReason::UnderAge,
        ReportReason::Violence,
        ReportReason::HateSpeech,
        ReportReason::Impersonation,
        ReportReason::IntellectualProperty,
        ReportReason::Other,
    ];

    fn traits(self) -> ReasonTraits {
        REASON_TABLE[self as usize].1
    }

    /// Harassment, violence, hate speech and underage reports.
    pub fn is_serious(self) -> bool {
        self.traits().serious
    }

    /// Reasons that bypass history and map straight to an enforcement action.
    pub fn requires_immediate_action(self) -> bool {
        self.traits().immediate
    }

    pub fn as_str(self) -> &'static str {
        self.traits().name
    }
}

impl fmt::Display for ReportReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportReason {
    type Err = DomainError;

    /// Accepts `hate_speech`, `hate-speech`, `HateSpeech` and any casing of those.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(DomainError::argument("report reason is required"));
        }
        if trimmed.chars().count() > MAX_REASON_LEN {
            return Err(DomainError::argument(format!(
                "report reason must be at most {} characters",
                MAX_REASON_LEN
            )));
        }

        let key: String = trimmed
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();

        REASON_TABLE
            .iter()
            .find(|(_, traits)| traits.name.replace('_', "") == key)
            .map(|(reason, _)| *reason)
            .ok_or_else(|| DomainError::argument(format!("unknown report reason '{}'", trimmed)))
    }
}

// ============================================================================
// MODERATION ACTION
// ============================================================================

/// Enforcement actions, ordered by severity (0 = nothing, 5 = permanent ban).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ModerationAction {
    NoAction = 0,
    Warning = 1,
    TemporaryRestriction = 2,
    ContentRemoval = 3,
    AccountSuspension = 4,
    PermanentBan = 5,
}

impl ModerationAction {
    pub fn severity(self) -> u8 {
        self as u8
    }

    pub fn from_severity(severity: u8) -> Result<Self, DomainError> {
        match severity {
            0 => Ok(ModerationAction::NoAction),
            1 => Ok(ModerationAction::Warning),
            2 => Ok(ModerationAction::TemporaryRestriction),
            3 => Ok(ModerationAction::ContentRemoval),
            4 => Ok(ModerationAction::AccountSuspension),
            5 => Ok(ModerationAction::PermanentBan),
            other => Err(DomainError::argument(format!(
                "moderation severity must be between 0 and 5, got {}",
                other
            ))),
        }
    }

    /// Content removal and above.
    pub fn is_serious(self) -> bool {
        self.severity() >= 3
    }

    pub fn is_permanent(self) -> bool {
        self == ModerationAction::PermanentBan
    }
}

impl fmt::Display for ModerationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModerationAction::NoAction => write!(f, "No Action"),
            ModerationAction::Warning => write!(f, "Warning"),
            ModerationAction::TemporaryRestriction => write!(f, "Temporary Restriction"),
            ModerationAction::ContentRemoval => write!(f, "Content Removal"),
            ModerationAction::AccountSuspension => write!(f, "Account Suspension"),
            ModerationAction::PermanentBan => write!(f, "Permanent Ban"),
        }
    }
}

// ============================================================================
// HISTORY
// ============================================================================

/// Aggregated report history for a reported user.
///
/// Both counts include the report currently being judged and skip dismissed reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationHistory {
    pub report_count: u64,
    pub serious_report_count: u64,
}

impl ViolationHistory {
    pub fn new(report_count: u64, serious_report_count: u64) -> Self {
        Self {
            report_count,
            serious_report_count,
        }
    }
}
