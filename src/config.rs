// Runtime configuration for the sweeper binary, read from the environment.

use crate::core::moderation::PolicyConfig;
use anyhow::{bail, Context};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "data/moderation.db";
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: String,
    pub sweep_interval: Duration,
    pub policy: PolicyConfig,
}

impl AppConfig {
    /// Load `.env` (if present) and read settings from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Missing keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("MODERATION_DATABASE_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let interval_secs: u64 = parse_var(
            &lookup,
            "MODERATION_SWEEP_INTERVAL_SECS",
            DEFAULT_SWEEP_INTERVAL_SECS,
        )?;
        if interval_secs == 0 {
            bail!("MODERATION_SWEEP_INTERVAL_SECS must be greater than zero");
        }

        let defaults = PolicyConfig::default();
        let case_report_threshold = parse_var(
            &lookup,
            "MODERATION_CASE_REPORT_THRESHOLD",
            defaults.case_report_threshold,
        )?;
        let escalation_report_threshold = parse_var(
            &lookup,
            "MODERATION_ESCALATION_REPORT_THRESHOLD",
            defaults.escalation_report_threshold,
        )?;
        if case_report_threshold == 0 || escalation_report_threshold == 0 {
            bail!("moderation report thresholds must be greater than zero");
        }

        Ok(Self {
            database_url,
            sweep_interval: Duration::from_secs(interval_secs),
            policy: PolicyConfig {
                case_report_threshold,
                escalation_report_threshold,
            },
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid value '{}' for {}", raw, key)),
        _ => Ok(default),
    }
}
