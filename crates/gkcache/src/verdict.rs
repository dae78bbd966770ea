//! Cached policy decisions

use serde::{Deserialize, Serialize};

/// Action decided by the policy service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// No decision, fall through to local policy
    #[default]
    None,
    /// Let the traffic through
    Allow,
    /// Drop or redirect the traffic
    Block,
}

/// Verdict returned by the resolver and remembered by the cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Decided action
    pub action: Action,
    /// Content category
    #[serde(default)]
    pub category_id: u32,
    /// Confidence level of the categorisation
    #[serde(default)]
    pub confidence_level: u32,
    /// Name of the policy that matched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
}

impl Verdict {
    /// Verdict with only an action set
    pub fn new(action: Action) -> Self {
        Self {
            action,
            ..Self::default()
        }
    }

    /// Set the category id
    pub fn with_category(mut self, category_id: u32) -> Self {
        self.category_id = category_id;
        self
    }

    /// Set the confidence level
    pub fn with_confidence(mut self, confidence_level: u32) -> Self {
        self.confidence_level = confidence_level;
        self
    }

    /// Set the matching policy name
    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = Some(policy.into());
        self
    }

    /// True if the action blocks the traffic
    pub fn is_blocked(&self) -> bool {
        self.action == Action::Block
    }
}
