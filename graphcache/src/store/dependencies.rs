use std::collections::HashMap;
use std::collections::HashSet;

use crate::store::keys::EntityField;
use crate::store::keys::OperationKey;

/// Which operations' last read touched which entity fields.
///
/// An operation's recorded set is replaced wholesale on every read, so the
/// index always reflects exactly what the latest walk visited.
#[derive(Debug, Default)]
pub(crate) struct DependencyIndex {
    forward: HashMap<OperationKey, HashSet<EntityField>>,
    reverse: HashMap<EntityField, HashSet<OperationKey>>,
}

impl DependencyIndex {
    pub(crate) fn record(&mut self, operation: OperationKey, dependencies: HashSet<EntityField>) {
        self.forget(&operation);
        for field in &dependencies {
            self.reverse
                .entry(field.clone())
                .or_default()
                .insert(operation.clone());
        }
        self.forward.insert(operation, dependencies);
    }

    pub(crate) fn forget(&mut self, operation: &OperationKey) {
        if let Some(previous) = self.forward.remove(operation) {
            for field in previous {
                if let Some(operations) = self.reverse.get_mut(&field) {
                    operations.remove(operation);
                    if operations.is_empty() {
                        self.reverse.remove(&field);
                    }
                }
            }
        }
    }

    /// Operations whose recorded dependencies intersect the touched set.
    pub(crate) fn affected_operations(
        &self,
        touched: &HashSet<EntityField>,
    ) -> HashSet<OperationKey> {
        let mut affected = HashSet::new();
        for field in touched {
            if let Some(operations) = self.reverse.get(field) {
                affected.extend(operations.iter().cloned());
            }
        }
        affected
    }

    #[cfg(test)]
    pub(crate) fn dependencies_of(&self, operation: &OperationKey) -> Option<&HashSet<EntityField>> {
        self.forward.get(operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json_ext::Object;
    use crate::store::keys::EntityKey;
    use crate::store::keys::FieldKey;

    fn operation(name: &str) -> OperationKey {
        OperationKey::new(name, None, &Object::default())
    }

    fn field(entity: &str, name: &str) -> EntityField {
        EntityField::new(EntityKey::from(entity), FieldKey::bare(name))
    }

    #[test]
    fn intersecting_operations_are_affected_and_others_are_not() {
        let mut index = DependencyIndex::default();
        index.record(
            operation("a"),
            [field("User:1", "name"), field("User:1", "id")].into(),
        );
        index.record(operation("b"), [field("User:2", "name")].into());

        let touched = [field("User:1", "name")].into();
        let affected = index.affected_operations(&touched);
        assert!(affected.contains(&operation("a")));
        assert!(!affected.contains(&operation("b")));
    }

    #[test]
    fn recording_replaces_the_previous_set_wholesale() {
        let mut index = DependencyIndex::default();
        index.record(operation("a"), [field("User:1", "name")].into());
        index.record(operation("a"), [field("User:2", "name")].into());

        let stale = [field("User:1", "name")].into();
        assert!(index.affected_operations(&stale).is_empty());

        let current = [field("User:2", "name")].into();
        assert!(index.affected_operations(&current).contains(&operation("a")));
    }

    #[test]
    fn forgotten_operations_no_longer_match() {
        let mut index = DependencyIndex::default();
        index.record(operation("a"), [field("User:1", "name")].into());
        index.forget(&operation("a"));

        let touched = [field("User:1", "name")].into();
        assert!(index.affected_operations(&touched).is_empty());
        assert!(index.dependencies_of(&operation("a")).is_none());
    }
}
