//! The label entity as seen on a hosting service.

use serde::{Deserialize, Serialize};

use crate::domain::rules::LabelRule;

/// Canonical form of a label color: leading `#` removed if present, lowercase.
///
/// Anything else (empty strings, short values) passes through untouched.
pub fn normalize_color(color: &str) -> String {
    color
        .strip_prefix('#')
        .unwrap_or(color)
        .to_ascii_lowercase()
}

/// An issue label in one repository.
///
/// `previous_name` is the identity the label currently has remotely. It differs
/// from `name` only while a rename is pending; update calls address the label
/// by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub color: String,
    pub description: String,
    #[serde(skip)]
    previous_name: Option<String>,
}

impl Label {
    pub fn new(
        name: impl Into<String>,
        color: impl AsRef<str>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            color: normalize_color(color.as_ref()),
            description: description.into(),
            previous_name: None,
        }
    }

    /// The desired label a rule describes.
    pub fn from_rule(name: impl Into<String>, rule: &LabelRule) -> Self {
        Self::new(name, &rule.color, rule.description.clone())
    }

    /// Name under which the label exists on the service right now.
    pub fn remote_name(&self) -> &str {
        self.previous_name.as_deref().unwrap_or(&self.name)
    }

    /// Change the local name; the remote identity stays until [`Label::mark_synced`].
    pub fn rename(&mut self, new_name: impl Into<String>) {
        if self.previous_name.is_none() {
            self.previous_name = Some(self.name.clone());
        }
        self.name = new_name.into();
    }

    pub fn set_color(&mut self, color: &str) {
        self.color = normalize_color(color);
    }

    pub fn is_rename_pending(&self) -> bool {
        self.remote_name() != self.name
    }

    /// Record that the service now knows the label under its current name.
    pub fn mark_synced(&mut self) {
        self.previous_name = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_hash_only_when_present() {
        assert_eq!(normalize_color("#D73A4A"), "d73a4a");
        assert_eq!(normalize_color("d73a4a"), "d73a4a");
        assert_eq!(normalize_color(""), "");
        assert_eq!(normalize_color("##abc"), "#abc");
    }

    #[test]
    fn test_new_label_normalizes_color() {
        let label = Label::new("bug", "#FF0000", "broken");
        assert_eq!(label.color, "ff0000");
        assert_eq!(label.remote_name(), "bug");
        assert!(!label.is_rename_pending());
    }

    #[test]
    fn test_rename_keeps_remote_identity_until_synced() {
        let mut label = Label::new("bug", "ff0000", "");
        label.rename("defect");
        label.rename("kind/defect");
        assert_eq!(label.name, "kind/defect");
        assert_eq!(label.remote_name(), "bug");
        assert!(label.is_rename_pending());

        label.mark_synced();
        assert_eq!(label.remote_name(), "kind/defect");
        assert!(!label.is_rename_pending());
    }

    #[test]
    fn test_previous_name_is_not_serialized() {
        let mut label = Label::new("bug", "ff0000", "d");
        label.rename("defect");
        let json = serde_json::to_value(&label).expect("serialize");
        assert_eq!(json["name"], "defect");
        assert!(json.get("previous_name").is_none());
    }
}
