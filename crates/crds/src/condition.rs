//! Lifecycle conditions for the IPPool resource.
//!
//! A pool carries four conditions, each a tri-state with a machine-readable
//! reason and a human-readable message. Conditions are keyed by type; setting
//! a condition that already exists overwrites it in place, so a status never
//! holds two conditions of the same type.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The four lifecycle conditions of an IPPool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum IPPoolConditionType {
    /// The agent workload for the pool has been launched.
    Registered,
    /// The IPAM subnet and the MAC/IP binding cache have been built.
    CacheReady,
    /// The agent workload reports ready.
    AgentReady,
    /// Reconciliation is paused via `spec.paused`.
    Disabled,
}

impl IPPoolConditionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "Registered",
            Self::CacheReady => "CacheReady",
            Self::AgentReady => "AgentReady",
            Self::Disabled => "Disabled",
        }
    }
}

impl std::fmt::Display for IPPoolConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition status following Kubernetes conventions.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One condition entry in IPPool status.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: IPPoolConditionType,

    pub status: ConditionStatus,

    /// Machine-readable reason, drawn from a small fixed vocabulary.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    /// Human-readable message.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl Condition {
    pub fn new(
        type_: IPPoolConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_,
            status,
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// Finds a condition by type.
pub fn find_condition(conditions: &[Condition], type_: IPPoolConditionType) -> Option<&Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Sets a condition, overwriting an existing entry of the same type.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => *existing = condition,
        None => conditions.push(condition),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_condition_overwrites_same_type() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            Condition::new(
                IPPoolConditionType::CacheReady,
                ConditionStatus::False,
                "NotInitialized",
                "",
            ),
        );
        set_condition(
            &mut conditions,
            Condition::new(
                IPPoolConditionType::CacheReady,
                ConditionStatus::True,
                "",
                "",
            ),
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, ConditionStatus::True);
        assert!(conditions[0].reason.is_empty());
    }

    #[test]
    fn test_conditions_of_different_types_coexist() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            Condition::new(
                IPPoolConditionType::Registered,
                ConditionStatus::True,
                "",
                "",
            ),
        );
        set_condition(
            &mut conditions,
            Condition::new(
                IPPoolConditionType::AgentReady,
                ConditionStatus::False,
                "",
                "agent is starting",
            ),
        );
        assert_eq!(conditions.len(), 2);
        let agent = find_condition(&conditions, IPPoolConditionType::AgentReady).unwrap();
        assert_eq!(agent.message, "agent is starting");
        assert!(find_condition(&conditions, IPPoolConditionType::Disabled).is_none());
    }

    #[test]
    fn test_condition_serialization_uses_kubernetes_shape() {
        let condition = Condition::new(
            IPPoolConditionType::CacheReady,
            ConditionStatus::True,
            "",
            "",
        );
        let json = serde_json::to_value(&condition).unwrap();
        assert_eq!(json["type"], "CacheReady");
        assert_eq!(json["status"], "True");
        assert!(json.get("reason").is_none());
    }
}
