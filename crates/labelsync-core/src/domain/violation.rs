//! Discrepancies between a repository's labels and the rule set.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::label::Label;
use crate::domain::rules::LabelRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Label exists with the wrong color.
    Color,
    /// Label exists with the wrong description.
    Description,
    /// Label exists but no rule names it.
    Extra,
    /// A rule names a label the repository does not have.
    Missing,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ViolationKind::Color => "color",
            ViolationKind::Description => "description",
            ViolationKind::Extra => "extra",
            ViolationKind::Missing => "missing",
        };
        f.write_str(s)
    }
}

/// One detected discrepancy. Created fresh on every pass, never persisted.
///
/// For [`ViolationKind::Missing`] the `label` is built from the rule, so the
/// resolver has everything it needs to create it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub label: Label,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<String>,
}

impl Violation {
    pub fn color(label: Label, rule: &LabelRule) -> Self {
        Self {
            kind: ViolationKind::Color,
            found: Some(label.color.clone()),
            required: Some(rule.color.clone()),
            label,
        }
    }

    pub fn description(label: Label, rule: &LabelRule) -> Self {
        Self {
            kind: ViolationKind::Description,
            found: Some(label.description.clone()),
            required: Some(rule.description.clone()),
            label,
        }
    }

    pub fn extra(label: Label) -> Self {
        Self {
            kind: ViolationKind::Extra,
            found: Some(label.name.clone()),
            required: None,
            label,
        }
    }

    pub fn missing(name: &str, rule: &LabelRule) -> Self {
        Self {
            kind: ViolationKind::Missing,
            label: Label::from_rule(name, rule),
            found: None,
            required: Some(name.to_string()),
        }
    }

    /// Name of the label this violation is about.
    pub fn label_name(&self) -> &str {
        &self.label.name
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ViolationKind::Color | ViolationKind::Description => write!(
                f,
                "{} '{}': found {:?}, required {:?}",
                self.kind,
                self.label.name,
                self.found.as_deref().unwrap_or_default(),
                self.required.as_deref().unwrap_or_default(),
            ),
            ViolationKind::Extra | ViolationKind::Missing => {
                write!(f, "{} '{}'", self.kind, self.label.name)
            }
        }
    }
}
