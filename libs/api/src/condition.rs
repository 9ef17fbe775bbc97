//! Status conditions and their merge rules.
//!
//! A condition list holds at most one entry per [`ConditionType`]. Updates
//! go through [`merge_conditions`], a pure function over immutable lists, so
//! callers can compare before/after values to detect no-op reconciles.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    Ready,
    #[serde(rename = "IntegrationPlatformAvailable")]
    PlatformAvailable,
    #[serde(rename = "IntegrationKitAvailable")]
    KitAvailable,
    DeploymentAvailable,
    BuildScheduled,
}

impl ConditionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::Ready => "Ready",
            ConditionType::PlatformAvailable => "IntegrationPlatformAvailable",
            ConditionType::KitAvailable => "IntegrationKitAvailable",
            ConditionType::DeploymentAvailable => "DeploymentAvailable",
            ConditionType::BuildScheduled => "BuildScheduled",
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: ConditionType,
    pub status: ConditionStatus,
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub last_update_time: DateTime<Utc>,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// A condition observed at `now`.
    pub fn new(
        kind: ConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            status,
            reason: reason.into(),
            message: message.into(),
            last_update_time: now,
            last_transition_time: now,
        }
    }
}

/// Ordered condition list with at most one entry per type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    pub fn get(&self, kind: ConditionType) -> Option<&Condition> {
        self.0.iter().find(|c| c.kind == kind)
    }

    pub fn is_true(&self, kind: ConditionType) -> bool {
        self.get(kind)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a copy with `incoming` merged in.
    pub fn merged(&self, incoming: Condition) -> Conditions {
        merge_conditions(self, incoming)
    }

    /// Returns a copy without any condition of type `kind`.
    pub fn without(&self, kind: ConditionType) -> Conditions {
        Conditions(self.0.iter().filter(|c| c.kind != kind).cloned().collect())
    }
}

impl FromIterator<Condition> for Conditions {
    fn from_iter<I: IntoIterator<Item = Condition>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Conditions::default(), |acc, c| acc.merged(c))
    }
}

/// Merges `incoming` into `existing`.
///
/// - same type, status and reason: `existing` is returned unchanged
/// - same status, different reason: the transition time is kept and the
///   update time advances
/// - otherwise the entry is replaced wholesale
///
/// Replaced entries move to the end of the list.
pub fn merge_conditions(existing: &Conditions, incoming: Condition) -> Conditions {
    let Some(current) = existing.get(incoming.kind) else {
        let mut out = existing.0.clone();
        out.push(incoming);
        return Conditions(out);
    };

    if current.status == incoming.status && current.reason == incoming.reason {
        return existing.clone();
    }

    let mut replacement = incoming;
    if current.status == replacement.status {
        replacement.last_transition_time = current.last_transition_time;
    }

    let mut out: Vec<Condition> = existing
        .0
        .iter()
        .filter(|c| c.kind != replacement.kind)
        .cloned()
        .collect();
    out.push(replacement);
    Conditions(out)
}

/// Status types that carry a condition list.
pub trait HasConditions {
    fn conditions(&self) -> &Conditions;
    fn conditions_mut(&mut self) -> &mut Conditions;

    fn condition(&self, kind: ConditionType) -> Option<&Condition> {
        self.conditions().get(kind)
    }

    fn set_condition(
        &mut self,
        kind: ConditionType,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        let merged = self
            .conditions()
            .merged(Condition::new(kind, status, reason, message, now));
        *self.conditions_mut() = merged;
    }

    fn set_error_condition(
        &mut self,
        kind: ConditionType,
        reason: &str,
        err: &dyn std::error::Error,
        now: DateTime<Utc>,
    ) {
        self.set_condition(kind, ConditionStatus::False, reason, err.to_string(), now);
    }

    fn remove_condition(&mut self, kind: ConditionType) {
        let remaining = self.conditions().without(kind);
        *self.conditions_mut() = remaining;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rstest::rstest;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn ready(status: ConditionStatus, reason: &str, at: i64) -> Condition {
        Condition::new(ConditionType::Ready, status, reason, "", t(at))
    }

    #[test]
    fn identical_condition_is_a_no_op() {
        let base = Conditions::default().merged(ready(ConditionStatus::True, "Up", 0));
        let merged = base.merged(ready(ConditionStatus::True, "Up", 30));
        assert_eq!(merged, base);
        assert_eq!(merged.get(ConditionType::Ready).unwrap().last_update_time, t(0));
    }

    #[test]
    fn same_status_new_reason_keeps_transition_time() {
        let base = Conditions::default().merged(ready(ConditionStatus::False, "Waiting", 0));
        let merged = base.merged(ready(ConditionStatus::False, "Building", 10));
        let cond = merged.get(ConditionType::Ready).unwrap();
        assert_eq!(cond.reason, "Building");
        assert_eq!(cond.last_transition_time, t(0));
        assert_eq!(cond.last_update_time, t(10));
    }

    #[test]
    fn status_change_replaces_entry() {
        let base = Conditions::default().merged(ready(ConditionStatus::False, "Waiting", 0));
        let merged = base.merged(ready(ConditionStatus::True, "Up", 10));
        let cond = merged.get(ConditionType::Ready).unwrap();
        assert_eq!(cond.last_transition_time, t(10));
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn merge_does_not_mutate_input() {
        let base = Conditions::default().merged(ready(ConditionStatus::False, "Waiting", 0));
        let snapshot = base.clone();
        let _ = base.merged(ready(ConditionStatus::True, "Up", 10));
        assert_eq!(base, snapshot);
    }

    #[rstest]
    #[case(ConditionType::PlatformAvailable, "IntegrationPlatformAvailable")]
    #[case(ConditionType::KitAvailable, "IntegrationKitAvailable")]
    #[case(ConditionType::Ready, "Ready")]
    fn condition_type_wire_names(#[case] kind: ConditionType, #[case] expected: &str) {
        assert_eq!(kind.as_str(), expected);
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, format!("\"{expected}\""));
    }

    #[test]
    fn collecting_merges_duplicates() {
        let conds: Conditions = vec![
            ready(ConditionStatus::False, "Waiting", 0),
            Condition::new(
                ConditionType::KitAvailable,
                ConditionStatus::True,
                "Ready",
                "",
                t(1),
            ),
            ready(ConditionStatus::True, "Up", 2),
        ]
        .into_iter()
        .collect();

        assert_eq!(conds.len(), 2);
        assert!(conds.is_true(ConditionType::Ready));
        assert_eq!(conds.iter().last().unwrap().kind, ConditionType::Ready);
    }
}
