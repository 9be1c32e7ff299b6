use std::collections::HashMap;
use std::collections::HashSet;

use serde::Deserialize;
use serde::Serialize;

use crate::json_ext::Value;
use crate::store::keys::EntityField;
use crate::store::keys::EntityKey;
use crate::store::keys::FieldKey;
use crate::store::keys::OperationKey;

/// What one entity field holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum StoredValue {
    /// Verbatim value of a leaf field, nulls and lists included.
    Scalar(Value),
    /// Where a composite field points.
    Link(Link),
}

/// Destination of a composite field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum Link {
    Null,
    /// A normalized entity, stored under its own key.
    Ref(EntityKey),
    /// A keyless object, stored as a plain value of its parent. Its fields
    /// are not addressable on their own.
    Embedded(Value),
    /// One entry per element, preserving order and null positions.
    List(Vec<Link>),
}

pub(crate) type EntityRecord = HashMap<FieldKey, StoredValue>;

/// Record of one optimistic layer. `None` marks a field deleted by the
/// layer, shadowing whatever sits below.
type LayerRecord = HashMap<FieldKey, Option<StoredValue>>;

/// Entity records plus the optimistic layers stacked on top of them.
///
/// Lookups go through the layers newest first, then the base maps. Root
/// records (`Query` and friends) are kept apart from normalized entities
/// and are keyed by their type name alone.
#[derive(Debug)]
pub(crate) struct InMemoryData {
    root_names: HashSet<String>,
    entities: HashMap<EntityKey, EntityRecord>,
    roots: HashMap<String, EntityRecord>,
    layers: Vec<Layer>,
}

#[derive(Debug)]
struct Layer {
    key: OperationKey,
    entities: HashMap<EntityKey, LayerRecord>,
    roots: HashMap<String, LayerRecord>,
}

impl InMemoryData {
    pub(crate) fn new(root_names: HashSet<String>) -> Self {
        Self {
            root_names,
            entities: HashMap::new(),
            roots: HashMap::new(),
            layers: Vec::new(),
        }
    }

    pub(crate) fn restore(
        root_names: HashSet<String>,
        entities: HashMap<EntityKey, EntityRecord>,
        roots: HashMap<String, EntityRecord>,
    ) -> Self {
        Self {
            root_names,
            entities,
            roots,
            layers: Vec::new(),
        }
    }

    fn is_root(&self, entity: &EntityKey) -> bool {
        self.root_names.contains(entity.as_str())
    }

    pub(crate) fn read_field(&self, entity: &EntityKey, field: &FieldKey) -> Option<&StoredValue> {
        let root = self.is_root(entity);
        for layer in self.layers.iter().rev() {
            let record = if root {
                layer.roots.get(entity.as_str())
            } else {
                layer.entities.get(entity)
            };
            if let Some(value) = record.and_then(|record| record.get(field)) {
                // A tombstone hides anything below it.
                return value.as_ref();
            }
        }
        let record = if root {
            self.roots.get(entity.as_str())
        } else {
            self.entities.get(entity)
        };
        record.and_then(|record| record.get(field))
    }

    /// Upsert one field. Writing `None` to the base removes the field;
    /// writing `None` to a layer records a deletion that shadows the base.
    pub(crate) fn write_field(
        &mut self,
        layer: Option<&OperationKey>,
        entity: &EntityKey,
        field: FieldKey,
        value: Option<StoredValue>,
    ) {
        let root = self.is_root(entity);
        match layer {
            Some(key) => {
                let Some(layer) = self.layers.iter_mut().rev().find(|layer| &layer.key == key)
                else {
                    failfast_error!("optimistic write to unknown layer {key}");
                    return;
                };
                let record = if root {
                    layer.roots.entry(entity.as_str().to_owned()).or_default()
                } else {
                    layer.entities.entry(entity.clone()).or_default()
                };
                record.insert(field, value);
            }
            None => {
                let record = if root {
                    self.roots.entry(entity.as_str().to_owned()).or_default()
                } else {
                    self.entities.entry(entity.clone()).or_default()
                };
                match value {
                    Some(value) => {
                        record.insert(field, value);
                    }
                    None => {
                        record.remove(&field);
                    }
                }
            }
        }
    }

    /// Open a fresh layer for an operation, on top of every existing one.
    ///
    /// Re-running an operation's optimistic write replaces its previous
    /// layer; the fields the old layer held are returned so readers that saw
    /// them can be recomputed.
    pub(crate) fn push_layer(&mut self, key: OperationKey) -> HashSet<EntityField> {
        let mut touched = HashSet::new();
        self.layers.retain(|layer| {
            if layer.key == key {
                collect_layer_fields(layer, &mut touched);
                false
            } else {
                true
            }
        });
        self.layers.push(Layer {
            key,
            entities: HashMap::new(),
            roots: HashMap::new(),
        });
        touched
    }

    /// Drop a layer without applying it, returning the fields it shadowed.
    pub(crate) fn clear_layer(&mut self, key: &OperationKey) -> HashSet<EntityField> {
        let mut touched = HashSet::new();
        self.layers.retain(|layer| {
            if &layer.key == key {
                collect_layer_fields(layer, &mut touched);
                false
            } else {
                true
            }
        });
        touched
    }

    /// Fold a layer into the base maps, returning the fields it carried.
    pub(crate) fn commit_layer(&mut self, key: &OperationKey) -> HashSet<EntityField> {
        let mut touched = HashSet::new();
        let Some(index) = self.layers.iter().position(|layer| &layer.key == key) else {
            return touched;
        };
        let layer = self.layers.remove(index);
        for (entity, record) in layer.entities {
            let base = self.entities.entry(entity.clone()).or_default();
            for (field, value) in record {
                touched.insert(EntityField::new(entity.clone(), field.clone()));
                match value {
                    Some(value) => {
                        base.insert(field, value);
                    }
                    None => {
                        base.remove(&field);
                    }
                }
            }
        }
        for (root, record) in layer.roots {
            let base = self.roots.entry(root.clone()).or_default();
            for (field, value) in record {
                touched.insert(EntityField::new(EntityKey::root(&root), field.clone()));
                match value {
                    Some(value) => {
                        base.insert(field, value);
                    }
                    None => {
                        base.remove(&field);
                    }
                }
            }
        }
        touched
    }

    /// Remove one field everywhere it is stored, layers included. Returns
    /// whether anything was removed.
    pub(crate) fn invalidate_field(&mut self, entity: &EntityKey, field: &FieldKey) -> bool {
        let root = self.is_root(entity);
        let mut removed = false;
        for layer in &mut self.layers {
            let record = if root {
                layer.roots.get_mut(entity.as_str())
            } else {
                layer.entities.get_mut(entity)
            };
            if let Some(record) = record {
                removed |= record.remove(field).is_some();
            }
        }
        let record = if root {
            self.roots.get_mut(entity.as_str())
        } else {
            self.entities.get_mut(entity)
        };
        if let Some(record) = record {
            removed |= record.remove(field).is_some();
        }
        removed
    }

    /// Every stored field key of the entity whose response name matches,
    /// across base and layers.
    pub(crate) fn field_keys_named(&self, entity: &EntityKey, name: &str) -> Vec<FieldKey> {
        let root = self.is_root(entity);
        let mut keys = HashSet::new();
        let base = if root {
            self.roots.get(entity.as_str()).map(EntityRecord::keys)
        } else {
            self.entities.get(entity).map(EntityRecord::keys)
        };
        for key in base.into_iter().flatten() {
            if key.response_name() == name {
                keys.insert(key.clone());
            }
        }
        for layer in &self.layers {
            let record = if root {
                layer.roots.get(entity.as_str())
            } else {
                layer.entities.get(entity)
            };
            for key in record.into_iter().flat_map(LayerRecord::keys) {
                if key.response_name() == name {
                    keys.insert(key.clone());
                }
            }
        }
        keys.into_iter().collect()
    }

    pub(crate) fn base_entities(&self) -> &HashMap<EntityKey, EntityRecord> {
        &self.entities
    }

    pub(crate) fn base_roots(&self) -> &HashMap<String, EntityRecord> {
        &self.roots
    }
}

fn collect_layer_fields(layer: &Layer, out: &mut HashSet<EntityField>) {
    for (entity, record) in &layer.entities {
        for field in record.keys() {
            out.insert(EntityField::new(entity.clone(), field.clone()));
        }
    }
    for (root, record) in &layer.roots {
        for field in record.keys() {
            out.insert(EntityField::new(EntityKey::root(root), field.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::json_ext::Object;

    fn data() -> InMemoryData {
        InMemoryData::new(std::iter::once("Query".to_owned()).collect())
    }

    fn scalar(value: Value) -> StoredValue {
        StoredValue::Scalar(value)
    }

    fn user(id: u32) -> EntityKey {
        EntityKey::new("User", id)
    }

    fn name() -> FieldKey {
        FieldKey::bare("name")
    }

    #[test]
    fn layers_shadow_the_base_newest_first() {
        let mut data = data();
        data.write_field(None, &user(1), name(), Some(scalar(json!("base"))));

        let first = OperationKey::new("a", None, &Object::default());
        let second = OperationKey::new("b", None, &Object::default());
        data.push_layer(first.clone());
        data.push_layer(second.clone());
        data.write_field(Some(&first), &user(1), name(), Some(scalar(json!("old"))));
        data.write_field(Some(&second), &user(1), name(), Some(scalar(json!("new"))));

        assert_eq!(
            data.read_field(&user(1), &name()),
            Some(&scalar(json!("new")))
        );

        data.clear_layer(&second);
        assert_eq!(
            data.read_field(&user(1), &name()),
            Some(&scalar(json!("old")))
        );

        data.clear_layer(&first);
        assert_eq!(
            data.read_field(&user(1), &name()),
            Some(&scalar(json!("base")))
        );
    }

    #[test]
    fn layer_tombstones_hide_base_values() {
        let mut data = data();
        data.write_field(None, &user(1), name(), Some(scalar(json!("base"))));

        let layer = OperationKey::new("a", None, &Object::default());
        data.push_layer(layer.clone());
        data.write_field(Some(&layer), &user(1), name(), None);

        assert_eq!(data.read_field(&user(1), &name()), None);

        let touched = data.clear_layer(&layer);
        assert!(touched.contains(&EntityField::new(user(1), name())));
        assert_eq!(
            data.read_field(&user(1), &name()),
            Some(&scalar(json!("base")))
        );
    }

    #[test]
    fn committing_a_layer_folds_it_into_the_base() {
        let mut data = data();
        data.write_field(None, &user(1), name(), Some(scalar(json!("base"))));
        data.write_field(None, &user(1), FieldKey::bare("age"), Some(scalar(json!(40))));

        let layer = OperationKey::new("a", None, &Object::default());
        data.push_layer(layer.clone());
        data.write_field(Some(&layer), &user(1), name(), Some(scalar(json!("patched"))));
        data.write_field(Some(&layer), &user(1), FieldKey::bare("age"), None);

        let touched = data.commit_layer(&layer);
        assert_eq!(touched.len(), 2);
        assert_eq!(
            data.read_field(&user(1), &name()),
            Some(&scalar(json!("patched")))
        );
        assert_eq!(data.read_field(&user(1), &FieldKey::bare("age")), None);
    }

    #[test]
    fn repushing_a_layer_reports_its_old_fields() {
        let mut data = data();
        let layer = OperationKey::new("a", None, &Object::default());
        data.push_layer(layer.clone());
        data.write_field(Some(&layer), &user(1), name(), Some(scalar(json!("first"))));

        let touched = data.push_layer(layer.clone());
        assert!(touched.contains(&EntityField::new(user(1), name())));
        // The fresh layer starts empty.
        assert_eq!(data.read_field(&user(1), &name()), None);
    }

    #[test]
    fn roots_live_apart_from_entities() {
        let mut data = data();
        let root = EntityKey::root("Query");
        let field = FieldKey::new(
            "user",
            json!({ "id": "1" }).as_object().unwrap(),
        );
        data.write_field(None, &root, field.clone(), Some(StoredValue::Link(Link::Ref(user(1)))));

        assert_eq!(
            data.read_field(&root, &field),
            Some(&StoredValue::Link(Link::Ref(user(1))))
        );
        assert!(data.base_entities().is_empty());
        assert_eq!(data.base_roots().len(), 1);
    }

    #[test]
    fn invalidation_reaches_layers_too() {
        let mut data = data();
        data.write_field(None, &user(1), name(), Some(scalar(json!("base"))));
        let layer = OperationKey::new("a", None, &Object::default());
        data.push_layer(layer.clone());
        data.write_field(Some(&layer), &user(1), name(), Some(scalar(json!("patched"))));

        assert!(data.invalidate_field(&user(1), &name()));
        assert_eq!(data.read_field(&user(1), &name()), None);
        assert!(!data.invalidate_field(&user(1), &name()));
    }

    #[test]
    fn field_keys_named_matches_across_arguments() {
        let mut data = data();
        let first = FieldKey::new("friends", json!({ "first": 1 }).as_object().unwrap());
        let second = FieldKey::new("friends", json!({ "first": 2 }).as_object().unwrap());
        data.write_field(None, &user(1), first.clone(), Some(scalar(json!(null))));
        data.write_field(None, &user(1), second.clone(), Some(scalar(json!(null))));
        data.write_field(None, &user(1), name(), Some(scalar(json!("x"))));

        let mut keys = data.field_keys_named(&user(1), "friends");
        keys.sort();
        let mut expected = vec![first, second];
        expected.sort();
        assert_eq!(keys, expected);
    }
}
