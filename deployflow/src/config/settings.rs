//! Runtime settings for assembling and running a pipeline.
//!
//! Loaded from environment variables with defaults for everything except
//! the account and region, which identify where the pipeline lives.

use crate::approval::{ApprovalDecision, ApprovalTimeout};
use anyhow::{anyhow, Context};
use std::time::Duration;

/// Default offset used when rendering times in chat messages (JST).
pub const DEFAULT_NOTIFY_UTC_OFFSET_HOURS: i32 = 9;

/// Runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Account id the pipeline runs in; passed to the build as `AWS_ACCOUNT`.
    pub account_id: String,

    /// Region the pipeline runs in; passed to the build as `AWS_REGION`.
    pub region: String,

    /// Optional bound on the approval wait. `None` waits indefinitely.
    pub approval_timeout: Option<ApprovalTimeout>,

    /// UTC offset, in hours, for times shown in chat.
    pub notify_utc_offset_hours: i32,
}

impl RunnerSettings {
    /// Creates settings with defaults.
    #[must_use]
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
            approval_timeout: None,
            notify_utc_offset_hours: DEFAULT_NOTIFY_UTC_OFFSET_HOURS,
        }
    }

    /// Bounds the approval wait.
    #[must_use]
    pub fn with_approval_timeout(mut self, after: Duration, outcome: ApprovalDecision) -> Self {
        self.approval_timeout = Some(ApprovalTimeout { after, outcome });
        self
    }

    /// Creates settings from environment variables.
    ///
    /// Expected environment variables:
    /// - DEPLOYFLOW_ACCOUNT_ID (required)
    /// - DEPLOYFLOW_REGION (required)
    /// - DEPLOYFLOW_APPROVAL_TIMEOUT_SECS (optional, unset = no timeout)
    /// - DEPLOYFLOW_APPROVAL_TIMEOUT_OUTCOME (optional, `approve` or `reject`, default: reject)
    /// - DEPLOYFLOW_NOTIFY_UTC_OFFSET_HOURS (optional, default: 9)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let account_id = lookup("DEPLOYFLOW_ACCOUNT_ID")
            .ok_or_else(|| anyhow!("DEPLOYFLOW_ACCOUNT_ID environment variable not set"))?;
        let region = lookup("DEPLOYFLOW_REGION")
            .ok_or_else(|| anyhow!("DEPLOYFLOW_REGION environment variable not set"))?;

        let outcome = match lookup("DEPLOYFLOW_APPROVAL_TIMEOUT_OUTCOME") {
            Some(raw) => raw
                .parse::<ApprovalDecision>()
                .map_err(|e| anyhow!(e))
                .context("DEPLOYFLOW_APPROVAL_TIMEOUT_OUTCOME")?,
            None => ApprovalDecision::Reject,
        };

        let approval_timeout = lookup("DEPLOYFLOW_APPROVAL_TIMEOUT_SECS")
            .map(|raw| {
                raw.parse::<u64>()
                    .with_context(|| format!("DEPLOYFLOW_APPROVAL_TIMEOUT_SECS is not a number: {raw}"))
            })
            .transpose()?
            .map(|secs| ApprovalTimeout {
                after: Duration::from_secs(secs),
                outcome,
            });

        let notify_utc_offset_hours = lookup("DEPLOYFLOW_NOTIFY_UTC_OFFSET_HOURS")
            .map(|raw| {
                raw.parse::<i32>()
                    .with_context(|| format!("DEPLOYFLOW_NOTIFY_UTC_OFFSET_HOURS is not a number: {raw}"))
            })
            .transpose()?
            .unwrap_or(DEFAULT_NOTIFY_UTC_OFFSET_HOURS);

        Ok(Self {
            account_id,
            region,
            approval_timeout,
            notify_utc_offset_hours,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = RunnerSettings::from_lookup(lookup(&[
            ("DEPLOYFLOW_ACCOUNT_ID", "123456789012"),
            ("DEPLOYFLOW_REGION", "ap-northeast-1"),
        ]))
        .unwrap();

        assert_eq!(settings, RunnerSettings::new("123456789012", "ap-northeast-1"));
        assert!(settings.approval_timeout.is_none());
        assert_eq!(settings.notify_utc_offset_hours, 9);
    }

    #[test]
    fn test_missing_account_is_error() {
        let err = RunnerSettings::from_lookup(lookup(&[("DEPLOYFLOW_REGION", "x")])).unwrap_err();
        assert!(err.to_string().contains("DEPLOYFLOW_ACCOUNT_ID"));
    }

    #[test]
    fn test_approval_timeout() {
        let settings = RunnerSettings::from_lookup(lookup(&[
            ("DEPLOYFLOW_ACCOUNT_ID", "1"),
            ("DEPLOYFLOW_REGION", "r"),
            ("DEPLOYFLOW_APPROVAL_TIMEOUT_SECS", "3600"),
            ("DEPLOYFLOW_APPROVAL_TIMEOUT_OUTCOME", "approve"),
            ("DEPLOYFLOW_NOTIFY_UTC_OFFSET_HOURS", "0"),
        ]))
        .unwrap();

        assert_eq!(
            settings.approval_timeout,
            Some(ApprovalTimeout {
                after: Duration::from_secs(3600),
                outcome: ApprovalDecision::Approve,
            })
        );
        assert_eq!(settings.notify_utc_offset_hours, 0);
    }

    #[test]
    fn test_bad_numbers_are_errors() {
        let result = RunnerSettings::from_lookup(lookup(&[
            ("DEPLOYFLOW_ACCOUNT_ID", "1"),
            ("DEPLOYFLOW_REGION", "r"),
            ("DEPLOYFLOW_APPROVAL_TIMEOUT_SECS", "soon"),
        ]));
        assert!(result.is_err());
    }
}
