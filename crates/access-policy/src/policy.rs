//! Rule evaluation.
//!
//! For one `(principal, path, action)` the candidate rules are those whose
//! pattern matches the path, whose scope requirement the principal meets
//! and whose action list names the action. Candidates are ranked by
//! pattern specificity and only the most specific tier decides:
//!
//! ```text
//! tier has a deny rule   -> Deny
//! tier has only allows   -> Allow, or AllowWithRedaction(union of redactions)
//! no candidates          -> Deny
//! ```

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use tree_common::{DataError, DataResult, NodePath};

use crate::auth::Principal;
use crate::pattern::PathPattern;
use crate::redaction::RedactionRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ReadMetadata,
    ReadData,
    Search,
    Write,
    Create,
    Delete,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::ReadMetadata,
        Action::ReadData,
        Action::Search,
        Action::Write,
        Action::Create,
        Action::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ReadMetadata => "read_metadata",
            Action::ReadData => "read_data",
            Action::Search => "search",
            Action::Write => "write",
            Action::Create => "create",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    #[default]
    Allow,
    Deny,
}

/// One entry of the `policy` configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub pattern: PathPattern,
    /// The principal must hold at least one of these. Empty means any
    /// authenticated principal, including the anonymous one.
    #[serde(default)]
    pub scopes: Vec<String>,
    pub actions: BTreeSet<Action>,
    #[serde(default)]
    pub effect: Effect,
    /// Written as single-key maps, e.g. `- column: pressure`.
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub redact: Vec<RedactionRule>,
}

impl PolicyRule {
    pub fn allow<I>(pattern: PathPattern, actions: I) -> Self
    where
        I: IntoIterator<Item = Action>,
    {
        Self {
            pattern,
            scopes: Vec::new(),
            actions: actions.into_iter().collect(),
            effect: Effect::Allow,
            redact: Vec::new(),
        }
    }

    pub fn deny<I>(pattern: PathPattern, actions: I) -> Self
    where
        I: IntoIterator<Item = Action>,
    {
        Self {
            effect: Effect::Deny,
            ..Self::allow(pattern, actions)
        }
    }

    pub fn for_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn redacting(mut self, rules: Vec<RedactionRule>) -> Self {
        self.redact = rules;
        self
    }

    fn applies(&self, principal: &Principal, path: &NodePath, action: Action) -> bool {
        self.actions.contains(&action)
            && (self.scopes.is_empty() || self.scopes.iter().any(|s| principal.has_scope(s)))
            && self.pattern.matches(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
    AllowWithRedaction(Vec<RedactionRule>),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Decision::Deny(_))
    }

    pub fn redactions(&self) -> &[RedactionRule] {
        match self {
            Decision::AllowWithRedaction(rules) => rules,
            _ => &[],
        }
    }

    /// Redactions to apply, or `Forbidden` for a deny.
    pub fn into_result(self, path: &NodePath, action: Action) -> DataResult<Vec<RedactionRule>> {
        match self {
            Decision::Allow => Ok(Vec::new()),
            Decision::AllowWithRedaction(rules) => Ok(rules),
            Decision::Deny(reason) => {
                debug!(path = %path, action = %action, reason = %reason, "Access denied");
                Err(DataError::forbidden(path, action))
            }
        }
    }
}

/// Ordered rule set, read-only after startup.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    rules: Vec<PolicyRule>,
}

impl AccessPolicy {
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self { rules }
    }

    /// Every action everywhere, for any authenticated principal.
    pub fn allow_all() -> Self {
        Self::new(vec![PolicyRule::allow(PathPattern::everything(), Action::ALL)])
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn authorize(&self, principal: &Principal, path: &NodePath, action: Action) -> Decision {
        let candidates: Vec<&PolicyRule> = self
            .rules
            .iter()
            .filter(|r| r.applies(principal, path, action))
            .collect();

        let Some(top) = candidates.iter().map(|r| r.pattern.specificity()).max() else {
            return Decision::Deny(format!("no rule grants {} on {}", action, path));
        };
        let tier: Vec<&PolicyRule> = candidates
            .into_iter()
            .filter(|r| r.pattern.specificity() == top)
            .collect();

        if let Some(rule) = tier.iter().find(|r| r.effect == Effect::Deny) {
            return Decision::Deny(format!("{} on {} denied by rule {}", action, path, rule.pattern));
        }

        let redactions: BTreeSet<RedactionRule> = tier
            .iter()
            .flat_map(|r| r.redact.iter().cloned())
            .collect();
        if redactions.is_empty() {
            Decision::Allow
        } else {
            Decision::AllowWithRedaction(redactions.into_iter().collect())
        }
    }

    pub fn permits(&self, principal: &Principal, path: &NodePath, action: Action) -> bool {
        self.authorize(principal, path, action).is_allowed()
    }

    /// Keep the items whose path the principal may read metadata for.
    pub fn filter_visible<T, F>(&self, principal: &Principal, items: Vec<T>, path_of: F) -> Vec<T>
    where
        F: Fn(&T) -> &NodePath,
    {
        items
            .into_iter()
            .filter(|item| self.permits(principal, path_of(item), Action::ReadMetadata))
            .collect()
    }
}
