//! Declarative label rule set: the desired state of every repository.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigurationError;
use crate::domain::label::normalize_color;

/// Required color and description for one label name.
///
/// The color is kept as written (with or without `#`) so the persisted file
/// round-trips; every comparison goes through [`normalize_color`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRule {
    pub color: String,
    #[serde(default)]
    pub description: String,
}

impl LabelRule {
    /// Build a rule, rejecting colors that are not six hex digits.
    pub fn new(
        name: &str,
        color: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        let rule = Self {
            color: color.into(),
            description: description.into(),
        };
        rule.validate(name)?;
        Ok(rule)
    }

    pub fn validate(&self, name: &str) -> Result<(), ConfigurationError> {
        let hex = self.color.strip_prefix('#').unwrap_or(&self.color);
        if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(())
        } else {
            Err(ConfigurationError::InvalidColor {
                label: name.to_string(),
                color: self.color.clone(),
            })
        }
    }

    /// Color in canonical form.
    pub fn normalized_color(&self) -> String {
        normalize_color(&self.color)
    }
}

/// Mapping from label name to [`LabelRule`], ordered by name.
///
/// Treated as an immutable value: the editing methods consume `&self` and
/// return a new set, so a pass holding an `Arc<RuleSet>` never observes a
/// concurrent edit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: BTreeMap<String, LabelRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a rule set, validating every rule.
    pub fn from_rules(
        rules: impl IntoIterator<Item = (String, LabelRule)>,
    ) -> Result<Self, ConfigurationError> {
        let mut map = BTreeMap::new();
        for (name, rule) in rules {
            rule.validate(&name)?;
            if map.insert(name.clone(), rule).is_some() {
                return Err(ConfigurationError::DuplicateRule(name));
            }
        }
        Ok(Self { rules: map })
    }

    pub fn get(&self, name: &str) -> Option<&LabelRule> {
        self.rules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Iterate rules sorted by label name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LabelRule)> {
        self.rules.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// New set with `rule` added under `name`. Fails if the name is taken.
    pub fn with_rule(&self, name: &str, rule: LabelRule) -> Result<Self, ConfigurationError> {
        if self.contains(name) {
            return Err(ConfigurationError::DuplicateRule(name.to_string()));
        }
        rule.validate(name)?;
        let mut rules = self.rules.clone();
        rules.insert(name.to_string(), rule);
        Ok(Self { rules })
    }

    /// New set where `old_name` is replaced by `new_name` with `rule`.
    pub fn with_replaced(
        &self,
        old_name: &str,
        new_name: &str,
        rule: LabelRule,
    ) -> Result<Self, ConfigurationError> {
        if !self.contains(old_name) {
            return Err(ConfigurationError::UnknownRule(old_name.to_string()));
        }
        if old_name != new_name && self.contains(new_name) {
            return Err(ConfigurationError::DuplicateRule(new_name.to_string()));
        }
        rule.validate(new_name)?;
        let mut rules = self.rules.clone();
        rules.remove(old_name);
        rules.insert(new_name.to_string(), rule);
        Ok(Self { rules })
    }

    /// New set without `name`.
    pub fn without(&self, name: &str) -> Result<Self, ConfigurationError> {
        if !self.contains(name) {
            return Err(ConfigurationError::UnknownRule(name.to_string()));
        }
        let mut rules = self.rules.clone();
        rules.remove(name);
        Ok(Self { rules })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(color: &str, description: &str) -> LabelRule {
        LabelRule {
            color: color.to_string(),
            description: description.to_string(),
        }
    }

    #[test]
    fn test_rule_color_validation() {
        assert!(LabelRule::new("bug", "#d73a4a", "").is_ok());
        assert!(LabelRule::new("bug", "D73A4A", "").is_ok());
        let err = LabelRule::new("bug", "#d73a4", "").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidColor { .. }));
        assert!(LabelRule::new("bug", "red", "").is_err());
    }

    #[test]
    fn test_iteration_is_sorted_by_name() {
        let set = RuleSet::from_rules(vec![
            ("wontfix".to_string(), rule("#ffffff", "")),
            ("bug".to_string(), rule("#d73a4a", "")),
            ("question".to_string(), rule("#d876e3", "")),
        ])
        .unwrap();
        let names: Vec<&str> = set.names().collect();
        assert_eq!(names, vec!["bug", "question", "wontfix"]);
    }

    #[test]
    fn test_editing_returns_new_set_and_leaves_original() {
        let original = RuleSet::new().with_rule("bug", rule("#d73a4a", "")).unwrap();
        let edited = original
            .with_replaced("bug", "defect", rule("#000000", "renamed"))
            .unwrap();

        assert!(original.contains("bug"));
        assert!(!edited.contains("bug"));
        assert_eq!(edited.get("defect").unwrap().description, "renamed");
    }

    #[test]
    fn test_duplicate_and_unknown_rules_rejected() {
        let set = RuleSet::new().with_rule("bug", rule("#d73a4a", "")).unwrap();
        assert!(matches!(
            set.with_rule("bug", rule("#000000", "")),
            Err(ConfigurationError::DuplicateRule(_))
        ));
        assert!(matches!(
            set.without("todo"),
            Err(ConfigurationError::UnknownRule(_))
        ));
        assert!(set.without("bug").unwrap().is_empty());
    }

    #[test]
    fn test_serializes_sorted_by_name() {
        let set = RuleSet::from_rules(vec![
            ("zeta".to_string(), rule("#000000", "z")),
            ("alpha".to_string(), rule("#ffffff", "a")),
        ])
        .unwrap();
        let json = serde_json::to_string(&set).unwrap();
        assert!(json.find("alpha").unwrap() < json.find("zeta").unwrap());
    }
}
