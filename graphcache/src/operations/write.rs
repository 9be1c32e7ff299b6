//! Normalizing writer.
//!
//! Walks a field plan and a response payload side by side, splitting the
//! payload into per-entity records. Keyable objects become linked records of
//! their own, keyless objects stay inline on the parent field.

use std::collections::HashSet;

use crate::configuration::CacheConfig;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::spec::FieldBucket;
use crate::spec::FieldPlan;
use crate::spec::FieldType;
use crate::spec::PlannedField;
use crate::spec::Schema;
use crate::spec::TYPENAME;
use crate::store::data::InMemoryData;
use crate::store::data::Link;
use crate::store::data::StoredValue;
use crate::store::keys::key_of_entity;
use crate::store::keys::EntityField;
use crate::store::keys::EntityKey;
use crate::store::keys::FieldKey;
use crate::store::keys::OperationKey;

/// Outcome of one write.
#[derive(Debug, Clone)]
pub struct WriteResult {
    /// Identity of the operation whose payload was written.
    pub operation: OperationKey,
    /// Every entity field the write stored or cleared.
    pub touched: HashSet<EntityField>,
}

pub(crate) struct Writer<'a> {
    data: &'a mut InMemoryData,
    config: &'a CacheConfig,
    schema: &'a Schema,
    layer: Option<&'a OperationKey>,
    touched: HashSet<EntityField>,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(
        data: &'a mut InMemoryData,
        config: &'a CacheConfig,
        schema: &'a Schema,
        layer: Option<&'a OperationKey>,
    ) -> Self {
        Self {
            data,
            config,
            schema,
            layer,
            touched: HashSet::new(),
        }
    }

    /// Store one payload, starting from the root record of the operation
    /// type. Writes go to the base data or, when `layer` was given, to that
    /// optimistic layer.
    pub(crate) fn write_operation(&mut self, type_name: &str, plan: &FieldPlan, payload: &Object) {
        let root = EntityKey::root(type_name);
        if let Some(bucket) = plan.bucket_for(None, type_name) {
            self.write_bucket(&root, bucket, payload);
        }
    }

    pub(crate) fn into_touched(self) -> HashSet<EntityField> {
        self.touched
    }

    fn write_bucket(&mut self, entity: &EntityKey, bucket: &FieldBucket, object: &Object) {
        for (response_key, planned) in bucket {
            if planned.name.as_str() == TYPENAME {
                continue;
            }
            let field = FieldKey::new(response_key.as_str(), &planned.arguments);
            match object.get(response_key.as_str()) {
                None => {
                    // The response dropped a selected field, so whatever was
                    // cached for it is no longer trustworthy.
                    self.data.write_field(self.layer, entity, field.clone(), None);
                    self.touched.insert(EntityField::new(entity.clone(), field));
                }
                Some(value) => match self.write_field_value(planned, value) {
                    Some(stored) => {
                        self.data
                            .write_field(self.layer, entity, field.clone(), Some(stored));
                        self.touched.insert(EntityField::new(entity.clone(), field));
                    }
                    None => {
                        failfast_debug!(
                            "value of '{}' on {} does not match its selection, skipping",
                            response_key.as_str(),
                            entity,
                        );
                    }
                },
            }
        }
    }

    /// Leaf fields keep their JSON verbatim, custom scalars included.
    /// Composite fields become links. `None` means the value contradicts the
    /// selection shape and the field must be left as it was.
    fn write_field_value(&mut self, planned: &PlannedField, value: &Value) -> Option<StoredValue> {
        match &planned.selections {
            None => Some(StoredValue::Scalar(value.clone())),
            Some(plan) => {
                let declared = planned.field_type.inner_type_name();
                self.write_link(&planned.field_type, plan, declared, value)
                    .map(StoredValue::Link)
            }
        }
    }

    fn write_link(
        &mut self,
        field_type: &FieldType,
        plan: &FieldPlan,
        declared: &str,
        value: &Value,
    ) -> Option<Link> {
        match (field_type, value) {
            (FieldType::NonNull(inner), value) => self.write_link(inner, plan, declared, value),
            (_, Value::Null) => Some(Link::Null),
            (FieldType::List(inner), Value::Array(values)) => {
                let mut links = Vec::with_capacity(values.len());
                for element in values {
                    links.push(self.write_link(inner, plan, declared, element)?);
                }
                Some(Link::List(links))
            }
            (FieldType::Named(_), Value::Object(object)) => {
                Some(self.write_object(plan, declared, object, value))
            }
            _ => None,
        }
    }

    fn write_object(
        &mut self,
        plan: &FieldPlan,
        declared: &str,
        object: &Object,
        raw: &Value,
    ) -> Link {
        let typename = match object.get(TYPENAME).and_then(Value::as_str) {
            Some(typename) => typename,
            None if self.schema.is_object(declared) => declared,
            None => {
                failfast_debug!(
                    "value of abstract type {declared} carries no __typename, storing it inline"
                );
                return Link::Embedded(raw.clone());
            }
        };
        match key_of_entity(self.config, typename, object) {
            Some(entity) => {
                // The record keeps its type name so later reads can pick the
                // right bucket without consulting the response again.
                self.data.write_field(
                    self.layer,
                    &entity,
                    FieldKey::bare(TYPENAME),
                    Some(StoredValue::Scalar(Value::String(typename.into()))),
                );
                if let Some(bucket) = plan.bucket_for(Some(typename), declared) {
                    self.write_bucket(&entity, bucket, object);
                }
                Link::Ref(entity)
            }
            None => Link::Embedded(raw.clone()),
        }
    }
}
