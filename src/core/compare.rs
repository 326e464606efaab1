//! Classifies parsed directives against what the store already holds.

use serde_json::Value;
use tracing::{debug, warn};

use crate::core::document;
use crate::core::hash::deep_equal;
use crate::core::store::VariableStore;
use crate::schema::directive::Directive;
use crate::schema::scope::MessageScope;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Comparison {
    /// Paths with no stored value.
    pub new: Vec<Directive>,
    /// Paths whose stored value differs.
    pub changed: Vec<Directive>,
    pub unchanged: Vec<Directive>,
}

impl Comparison {
    pub fn has_changes(&self) -> bool {
        !self.new.is_empty() || !self.changed.is_empty()
    }
}

/// Compare each directive with the value at its path in the scoped document.
/// An unreadable store is treated as empty, so everything counts as new.
pub fn compare_directives_with_store(
    store: &dyn VariableStore,
    scope: MessageScope,
    directives: &[Directive],
) -> Comparison {
    let doc = match store.document(scope) {
        Ok(doc) => doc,
        Err(err) => {
            warn!(scope = %scope, error = %err, "cannot read store for comparison");
            None
        }
    };
    let comparison = compare_with_document(doc.as_ref(), directives);
    debug!(
        new = comparison.new.len(),
        changed = comparison.changed.len(),
        unchanged = comparison.unchanged.len(),
        "compared directives with store"
    );
    comparison
}

pub fn compare_with_document(doc: Option<&Value>, directives: &[Directive]) -> Comparison {
    let mut comparison = Comparison::default();
    for directive in directives {
        let stored = doc.and_then(|doc| document::get(doc, &directive.path));
        match stored {
            None => comparison.new.push(directive.clone()),
            Some(stored) if deep_equal(Some(stored), Some(&directive.value)) => {
                comparison.unchanged.push(directive.clone())
            }
            Some(_) => comparison.changed.push(directive.clone()),
        }
    }
    comparison
}

/// Directives that would change the store, in their original order.
pub fn filter_changed(
    store: &dyn VariableStore,
    scope: MessageScope,
    directives: &[Directive],
) -> Vec<Directive> {
    let doc = store.document(scope).ok().flatten();
    directives
        .iter()
        .filter(|d| {
            let stored = doc.as_ref().and_then(|doc| document::get(doc, &d.path));
            !deep_equal(stored, Some(&d.value))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;
    use crate::schema::path::KeyPath;
    use serde_json::json;

    fn directive(path: &str, value: Value) -> Directive {
        Directive::new(KeyPath::parse(path).unwrap(), value)
    }

    fn seeded() -> MemoryStore {
        let mut store = MemoryStore::with_messages(1);
        store
            .set(
                &KeyPath::parse("p").unwrap(),
                json!({ "a": 1, "b": "x", "n": null }),
                MessageScope::Latest,
            )
            .unwrap();
        store
    }

    #[test]
    fn classifies_new_changed_unchanged() {
        let store = seeded();
        let directives = vec![
            directive("p.a", json!(1.0)),
            directive("p.b", json!("y")),
            directive("p.c", json!(3)),
        ];
        let comparison = compare_directives_with_store(&store, MessageScope::Latest, &directives);
        assert_eq!(comparison.unchanged, vec![directives[0].clone()]);
        assert_eq!(comparison.changed, vec![directives[1].clone()]);
        assert_eq!(comparison.new, vec![directives[2].clone()]);
        assert!(comparison.has_changes());
    }

    #[test]
    fn stored_null_is_not_absent() {
        let store = seeded();
        let directives = vec![directive("p.n", Value::Null)];
        let comparison = compare_directives_with_store(&store, MessageScope::Latest, &directives);
        assert_eq!(comparison.unchanged.len(), 1);
        assert!(!comparison.has_changes());
    }

    #[test]
    fn unreadable_store_makes_everything_new() {
        let store = MemoryStore::new();
        let directives = vec![directive("p.a", json!(1))];
        let comparison = compare_directives_with_store(&store, MessageScope::Message(4), &directives);
        assert_eq!(comparison.new.len(), 1);
    }

    #[test]
    fn filter_changed_keeps_order() {
        let store = seeded();
        let directives = vec![
            directive("p.z", json!(0)),
            directive("p.a", json!(1)),
            directive("p.b", json!("changed")),
        ];
        let kept = filter_changed(&store, MessageScope::Latest, &directives);
        assert_eq!(kept, vec![directives[0].clone(), directives[2].clone()]);
    }

    #[test]
    fn repeated_scenario_is_unchanged() {
        let mut store = MemoryStore::with_messages(1);
        let directives = vec![directive("p.scenario.current", json!("city"))];
        let first = compare_directives_with_store(&store, MessageScope::Latest, &directives);
        assert_eq!(first.new.len(), 1);
        store
            .set(&directives[0].path, directives[0].value.clone(), MessageScope::Latest)
            .unwrap();
        let second = compare_directives_with_store(&store, MessageScope::Latest, &directives);
        assert_eq!(second.unchanged.len(), 1);
    }
}
