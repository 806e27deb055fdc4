use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Schedule,
    WorkflowDispatch,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerKind::Schedule => write!(f, "schedule"),
            TriggerKind::WorkflowDispatch => write!(f, "workflow_dispatch"),
        }
    }
}

/// What started a run, with its fully resolved inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub kind: TriggerKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    pub inputs: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl TriggerEvent {
    pub fn schedule(cron: &str, scheduled_for: DateTime<Utc>, inputs: BTreeMap<String, String>) -> Self {
        Self {
            kind: TriggerKind::Schedule,
            cron: Some(cron.to_string()),
            scheduled_for: Some(scheduled_for),
            inputs,
            created_at: Utc::now(),
        }
    }

    pub fn workflow_dispatch(inputs: BTreeMap<String, String>) -> Self {
        Self {
            kind: TriggerKind::WorkflowDispatch,
            cron: None,
            scheduled_for: None,
            inputs,
            created_at: Utc::now(),
        }
    }

    pub fn input(&self, name: &str) -> Option<&str> {
        self.inputs.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_kind_in_workflow_style() {
        let event = TriggerEvent::workflow_dispatch(BTreeMap::from([(
            "test_mode".to_string(),
            "true".to_string(),
        )]));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "workflow_dispatch");
        assert!(json.get("cron").is_none());
        assert_eq!(event.input("test_mode"), Some("true"));
        assert_eq!(event.kind.to_string(), "workflow_dispatch");
    }

    #[test]
    fn schedule_carries_cron_and_instant() {
        let at = "2026-10-19T09:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let event = TriggerEvent::schedule("0 9 * * 1", at, BTreeMap::new());
        assert_eq!(event.kind, TriggerKind::Schedule);
        assert_eq!(event.cron.as_deref(), Some("0 9 * * 1"));
        assert_eq!(event.scheduled_for, Some(at));
    }
}
