//! Violation classification: diff actual labels against the rule set.
//!
//! Pure computation; nothing here suspends or touches the network.

use std::collections::BTreeMap;

use crate::domain::{normalize_color, Label, LabelRule, RuleSet, Violation};
use crate::webhook::{LabelAction, LabelEvent};

/// Classify every discrepancy between `labels` and `rules`.
///
/// Each rule is consumed at most once: a label matched by name checks its rule
/// off whether or not it complies. Rules left unconsumed become `missing`
/// violations, in name order.
pub fn classify(labels: &[Label], rules: &RuleSet) -> Vec<Violation> {
    let mut pending: BTreeMap<&str, &LabelRule> = rules.iter().collect();
    let mut violations = Vec::new();

    for label in labels {
        match pending.remove(label.name.as_str()) {
            Some(rule) => check_attributes(label, rule, true, true, &mut violations),
            None => violations.push(Violation::extra(label.clone())),
        }
    }

    violations.extend(
        pending
            .into_iter()
            .map(|(name, rule)| Violation::missing(name, rule)),
    );
    violations
}

/// Classify a single label reported by a webhook, without listing the
/// repository.
///
/// A deletion of a ruled label yields a `missing` violation first, followed by
/// the attribute checks for whatever fields the payload still carried. A
/// deletion of an unruled label needs nothing: it is already gone.
pub fn classify_event(event: &LabelEvent, rules: &RuleSet) -> Vec<Violation> {
    let label = &event.label;
    let deleted = event.action == LabelAction::Deleted;
    let mut violations = Vec::new();

    match rules.get(&label.name) {
        Some(rule) => {
            if deleted {
                violations.push(Violation::missing(&label.name, rule));
            }
            check_attributes(
                label,
                rule,
                event.color_present,
                event.description_present,
                &mut violations,
            );
        }
        None if deleted => {}
        None => violations.push(Violation::extra(label.clone())),
    }

    violations
}

fn check_attributes(
    label: &Label,
    rule: &LabelRule,
    check_color: bool,
    check_description: bool,
    out: &mut Vec<Violation>,
) {
    if check_color && normalize_color(&label.color) != rule.normalized_color() {
        out.push(Violation::color(label.clone(), rule));
    }
    if check_description && label.description != rule.description {
        out.push(Violation::description(label.clone(), rule));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RepoSlug, ViolationKind};

    fn rules(entries: &[(&str, &str, &str)]) -> RuleSet {
        RuleSet::from_rules(entries.iter().map(|(name, color, description)| {
            (
                name.to_string(),
                LabelRule {
                    color: color.to_string(),
                    description: description.to_string(),
                },
            )
        }))
        .expect("valid rules")
    }

    fn kinds(violations: &[Violation]) -> Vec<ViolationKind> {
        violations.iter().map(|v| v.kind).collect()
    }

    fn event(action: LabelAction, label: Label) -> LabelEvent {
        LabelEvent {
            repo: RepoSlug::parse("octo/widgets").unwrap(),
            action,
            label,
            color_present: true,
            description_present: true,
        }
    }

    #[test]
    fn test_compliant_label_yields_nothing() {
        let labels = vec![Label::new("bug", "d73a4a", "desc")];
        let violations = classify(&labels, &rules(&[("bug", "#d73a4a", "desc")]));
        assert!(violations.is_empty());
    }

    #[test]
    fn test_color_mismatch_reports_normalized_found_and_rule_required() {
        let labels = vec![Label::new("bug", "ffffff", "desc")];
        let violations = classify(&labels, &rules(&[("bug", "#d73a4a", "desc")]));
        assert_eq!(kinds(&violations), vec![ViolationKind::Color]);
        assert_eq!(violations[0].found.as_deref(), Some("ffffff"));
        assert_eq!(violations[0].required.as_deref(), Some("#d73a4a"));
    }

    #[test]
    fn test_missing_rule_for_empty_repo() {
        let violations = classify(&[], &rules(&[("todo", "#00ff00", "d")]));
        assert_eq!(kinds(&violations), vec![ViolationKind::Missing]);
        assert_eq!(violations[0].required.as_deref(), Some("todo"));
        assert_eq!(violations[0].label.color, "00ff00");
    }

    #[test]
    fn test_extra_label_without_rule() {
        let labels = vec![Label::new("stale", "#000000", "old")];
        let violations = classify(&labels, &RuleSet::new());
        assert_eq!(kinds(&violations), vec![ViolationKind::Extra]);
        assert_eq!(violations[0].found.as_deref(), Some("stale"));
        assert!(violations[0].required.is_none());
    }

    #[test]
    fn test_hash_prefix_insensitive_on_both_sides() {
        let labels = vec![
            Label::new("a", "#ff0000", ""),
            Label::new("b", "#ff0000", ""),
            Label::new("c", "ff0000", ""),
        ];
        let set = rules(&[("a", "#ff0000", ""), ("b", "ff0000", ""), ("c", "#FF0000", "")]);
        assert!(classify(&labels, &set).is_empty());
    }

    #[test]
    fn test_empty_color_is_accepted_and_flagged() {
        let labels = vec![Label::new("bug", "", "desc")];
        let violations = classify(&labels, &rules(&[("bug", "#d73a4a", "desc")]));
        assert_eq!(kinds(&violations), vec![ViolationKind::Color]);
        assert_eq!(violations[0].found.as_deref(), Some(""));
    }

    #[test]
    fn test_color_and_description_both_reported() {
        let labels = vec![Label::new("bug", "ffffff", "wrong")];
        let violations = classify(&labels, &rules(&[("bug", "#d73a4a", "right")]));
        assert_eq!(
            kinds(&violations),
            vec![ViolationKind::Color, ViolationKind::Description]
        );
        assert_eq!(violations[1].found.as_deref(), Some("wrong"));
        assert_eq!(violations[1].required.as_deref(), Some("right"));
    }

    #[test]
    fn test_matched_rule_is_never_missing() {
        let labels = vec![Label::new("bug", "ffffff", "")];
        let violations = classify(&labels, &rules(&[("bug", "#d73a4a", ""), ("todo", "#00ff00", "")]));
        let missing: Vec<&str> = violations
            .iter()
            .filter(|v| v.kind == ViolationKind::Missing)
            .map(Violation::label_name)
            .collect();
        assert_eq!(missing, vec!["todo"]);
    }

    #[test]
    fn test_duplicate_actual_name_consumes_rule_once() {
        let labels = vec![Label::new("bug", "d73a4a", ""), Label::new("bug", "d73a4a", "")];
        let violations = classify(&labels, &rules(&[("bug", "#d73a4a", "")]));
        assert_eq!(kinds(&violations), vec![ViolationKind::Extra]);
    }

    #[test]
    fn test_rule_set_untouched_by_classification() {
        let set = rules(&[("bug", "#d73a4a", "")]);
        let before = set.clone();
        let _ = classify(&[Label::new("bug", "d73a4a", "")], &set);
        assert_eq!(set, before);
    }

    #[test]
    fn test_event_deleted_ruled_label_synthesizes_missing_first() {
        let set = rules(&[("bug", "#d73a4a", "desc")]);
        let violations = classify_event(
            &event(LabelAction::Deleted, Label::new("bug", "ffffff", "desc")),
            &set,
        );
        assert_eq!(
            kinds(&violations),
            vec![ViolationKind::Missing, ViolationKind::Color]
        );
        assert_eq!(violations[0].label.color, "d73a4a");
    }

    #[test]
    fn test_event_deleted_unruled_label_needs_nothing() {
        let violations = classify_event(
            &event(LabelAction::Deleted, Label::new("stale", "000000", "")),
            &RuleSet::new(),
        );
        assert!(violations.is_empty());
    }

    #[test]
    fn test_event_created_unruled_label_is_extra() {
        let violations = classify_event(
            &event(LabelAction::Created, Label::new("stale", "000000", "")),
            &RuleSet::new(),
        );
        assert_eq!(kinds(&violations), vec![ViolationKind::Extra]);
    }

    #[test]
    fn test_event_skips_absent_fields() {
        let set = rules(&[("bug", "#d73a4a", "desc")]);
        let mut ev = event(LabelAction::Edited, Label::new("bug", "", ""));
        ev.color_present = false;
        ev.description_present = false;
        assert!(classify_event(&ev, &set).is_empty());

        ev.description_present = true;
        assert_eq!(
            kinds(&classify_event(&ev, &set)),
            vec![ViolationKind::Description]
        );
    }
}
