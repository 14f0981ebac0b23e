//! API access rules for collections.

use serde::{Deserialize, Serialize};

/// A single access rule slot.
///
/// The three states are semantically distinct on the wire: an absent slot is
/// `Unset` (defaults to locked), an explicit `null` is `Locked` (privileged
/// access only), and a string is a filter expression where the empty string
/// grants unrestricted access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rule {
    /// Slot was never specified. Behaves as locked.
    #[default]
    Unset,
    /// Locked to privileged access.
    Locked,
    /// Filter expression; the empty string permits everyone.
    Filter(String),
}

impl Rule {
    /// Create a filter rule.
    pub fn filter(expr: impl Into<String>) -> Self {
        Self::Filter(expr.into())
    }

    /// An empty filter, permitting unrestricted access.
    pub fn open() -> Self {
        Self::Filter(String::new())
    }

    /// Whether the slot was left unspecified.
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    /// Whether the slot denies non-privileged access (locked or unset).
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked | Self::Unset)
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unset => write!(f, "unset"),
            Self::Locked => write!(f, "locked"),
            Self::Filter(expr) if expr.is_empty() => write!(f, "open"),
            Self::Filter(expr) => write!(f, "{}", expr),
        }
    }
}

/// Identifies one of the six rule slots of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSlot {
    List,
    View,
    Create,
    Update,
    Delete,
    Manage,
}

impl RuleSlot {
    /// All slots in declaration order.
    pub const ALL: [RuleSlot; 6] = [
        RuleSlot::List,
        RuleSlot::View,
        RuleSlot::Create,
        RuleSlot::Update,
        RuleSlot::Delete,
        RuleSlot::Manage,
    ];

    /// The canonical lowercase name of the slot.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::View => "view",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Manage => "manage",
        }
    }

    /// Parse a slot from its canonical name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "list" => Some(Self::List),
            "view" => Some(Self::View),
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            "manage" => Some(Self::Manage),
            _ => None,
        }
    }
}

impl std::fmt::Display for RuleSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The full access-rule record of a collection.
///
/// Serializes in the collection's wire form: each slot becomes a
/// `<slot>Rule` key holding `null` or a filter string, and unset slots are
/// omitted entirely so that absence survives a round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rules {
    #[serde(default, skip_serializing_if = "Rule::is_unset", with = "rule_repr")]
    pub list_rule: Rule,
    #[serde(default, skip_serializing_if = "Rule::is_unset", with = "rule_repr")]
    pub view_rule: Rule,
    #[serde(default, skip_serializing_if = "Rule::is_unset", with = "rule_repr")]
    pub create_rule: Rule,
    #[serde(default, skip_serializing_if = "Rule::is_unset", with = "rule_repr")]
    pub update_rule: Rule,
    #[serde(default, skip_serializing_if = "Rule::is_unset", with = "rule_repr")]
    pub delete_rule: Rule,
    #[serde(default, skip_serializing_if = "Rule::is_unset", with = "rule_repr")]
    pub manage_rule: Rule,
}

impl Rules {
    /// Create a record with every slot unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the rule held in a slot.
    pub fn get(&self, slot: RuleSlot) -> &Rule {
        match slot {
            RuleSlot::List => &self.list_rule,
            RuleSlot::View => &self.view_rule,
            RuleSlot::Create => &self.create_rule,
            RuleSlot::Update => &self.update_rule,
            RuleSlot::Delete => &self.delete_rule,
            RuleSlot::Manage => &self.manage_rule,
        }
    }

    /// Set the rule held in a slot.
    pub fn set(&mut self, slot: RuleSlot, rule: Rule) {
        match slot {
            RuleSlot::List => self.list_rule = rule,
            RuleSlot::View => self.view_rule = rule,
            RuleSlot::Create => self.create_rule = rule,
            RuleSlot::Update => self.update_rule = rule,
            RuleSlot::Delete => self.delete_rule = rule,
            RuleSlot::Manage => self.manage_rule = rule,
        }
    }

    /// Whether every slot is unset.
    pub fn is_default(&self) -> bool {
        RuleSlot::ALL.iter().all(|slot| self.get(*slot).is_unset())
    }

    /// Iterate over the non-unset slots and their rules.
    pub fn specified(&self) -> impl Iterator<Item = (RuleSlot, &Rule)> {
        RuleSlot::ALL
            .iter()
            .map(|slot| (*slot, self.get(*slot)))
            .filter(|(_, rule)| !rule.is_unset())
    }
}

/// Wire representation of a present slot: `null` is locked, a string is a
/// filter. `Unset` never reaches this module because the field is skipped.
mod rule_repr {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Rule;

    pub fn serialize<S>(rule: &Rule, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match rule {
            Rule::Unset | Rule::Locked => serializer.serialize_none(),
            Rule::Filter(expr) => serializer.serialize_some(expr),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Rule, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(match value {
            None => Rule::Locked,
            Some(expr) => Rule::Filter(expr),
        })
    }
}
