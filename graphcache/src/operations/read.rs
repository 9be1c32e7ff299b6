//! Cache reader.
//!
//! Rebuilds a response object from the store by walking a field plan,
//! recording every entity field it consults whether the lookup succeeds or
//! not. Missing fields are left out of the result and flag the read as
//! incomplete, traversal never stops early.

use std::collections::HashSet;

use crate::configuration::CacheConfig;
use crate::configuration::ResolverContext;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::spec::FieldBucket;
use crate::spec::FieldPlan;
use crate::spec::FieldType;
use crate::spec::TYPENAME;
use crate::store::data::InMemoryData;
use crate::store::data::Link;
use crate::store::data::StoredValue;
use crate::store::keys::EntityField;
use crate::store::keys::EntityKey;
use crate::store::keys::FieldKey;
use crate::store::keys::OperationKey;

/// How much of the requested selection a read could serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Every selected field was served from the store.
    Hit,
    /// Some fields were served, others were missing.
    Partial,
    /// Nothing useful was stored.
    Miss,
}

/// Outcome of one read.
#[derive(Debug, Clone)]
pub struct ReadResult {
    /// Identity of the operation that was read.
    pub operation: OperationKey,
    /// The rebuilt response data, absent when nothing could be served.
    pub data: Option<Value>,
    /// Whether every selected field was served.
    pub complete: bool,
    /// Every entity field the read consulted, found or not.
    pub dependencies: HashSet<EntityField>,
}

impl ReadResult {
    pub fn outcome(&self) -> ReadOutcome {
        match (&self.data, self.complete) {
            (Some(_), true) => ReadOutcome::Hit,
            (Some(_), false) => ReadOutcome::Partial,
            (None, _) => ReadOutcome::Miss,
        }
    }
}

pub(crate) struct Reader<'a> {
    data: &'a InMemoryData,
    config: &'a CacheConfig,
    dependencies: HashSet<EntityField>,
    complete: bool,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a InMemoryData, config: &'a CacheConfig) -> Self {
        Self {
            data,
            config,
            dependencies: HashSet::new(),
            complete: true,
        }
    }

    /// Rebuild the response of one operation, starting from the root record
    /// of the operation type. The result object is best effort and may be
    /// missing fields, [`Self::into_parts`] says whether it is complete.
    pub(crate) fn read_operation(&mut self, type_name: &str, plan: &FieldPlan) -> Object {
        let root = EntityKey::root(type_name);
        match plan.bucket_for(None, type_name) {
            Some(bucket) => self.read_bucket(&root, type_name, bucket),
            None => Object::default(),
        }
    }

    pub(crate) fn into_parts(self) -> (HashSet<EntityField>, bool) {
        (self.dependencies, self.complete)
    }

    fn read_object(&mut self, entity: &EntityKey, plan: &FieldPlan, declared: &str) -> Object {
        let typename = match self.data.read_field(entity, &FieldKey::bare(TYPENAME)) {
            Some(StoredValue::Scalar(Value::String(name))) => name.as_str(),
            _ => entity.typename(),
        };
        match plan.bucket_for(Some(typename), declared) {
            Some(bucket) => self.read_bucket(entity, typename, bucket),
            None => Object::default(),
        }
    }

    fn read_bucket(&mut self, entity: &EntityKey, typename: &str, bucket: &FieldBucket) -> Object {
        let mut result = Object::with_capacity(bucket.len());
        for (response_key, planned) in bucket {
            if planned.name.as_str() == TYPENAME {
                // Served from the record itself, never from a stored field.
                result.insert(response_key.clone(), Value::String(typename.into()));
                continue;
            }
            let field = FieldKey::new(response_key.as_str(), &planned.arguments);
            self.dependencies
                .insert(EntityField::new(entity.clone(), field.clone()));
            if planned.selections.is_none() {
                if let Some(resolver) = self.config.field_resolver(typename, planned.name.as_str())
                {
                    let context = ResolverContext {
                        entity,
                        typename,
                        field_name: planned.name.as_str(),
                        arguments: &planned.arguments,
                    };
                    if let Some(value) = resolver.resolve(&context) {
                        result.insert(response_key.clone(), value);
                        continue;
                    }
                }
            }
            match self.data.read_field(entity, &field) {
                None => self.complete = false,
                Some(StoredValue::Scalar(value)) => match &planned.selections {
                    None => {
                        result.insert(response_key.clone(), value.clone());
                    }
                    Some(_) => {
                        failfast_debug!(
                            "field '{field}' of {entity} holds a scalar but objects were selected"
                        );
                        self.complete = false;
                    }
                },
                Some(StoredValue::Link(link)) => match &planned.selections {
                    Some(nested) => {
                        let declared = planned.field_type.inner_type_name();
                        let value = self.read_link(link, nested, declared);
                        result.insert(response_key.clone(), value);
                    }
                    None => {
                        failfast_debug!(
                            "field '{field}' of {entity} holds a link but a scalar was selected"
                        );
                        self.complete = false;
                    }
                },
            }
        }
        result
    }

    fn read_link(&mut self, link: &Link, plan: &FieldPlan, declared: &str) -> Value {
        match link {
            Link::Null => Value::Null,
            Link::Ref(entity) => Value::Object(self.read_object(entity, plan, declared)),
            Link::Embedded(value) => self.read_embedded(value, plan, declared),
            Link::List(links) => Value::Array(
                links
                    .iter()
                    .map(|link| self.read_link(link, plan, declared))
                    .collect(),
            ),
        }
    }

    /// Inline values were stored verbatim, so their fields are read straight
    /// off the stored JSON instead of through per-entity records.
    fn read_embedded(&mut self, stored: &Value, plan: &FieldPlan, declared: &str) -> Value {
        let Some(object) = stored.as_object() else {
            failfast_error!("inline value of type {declared} is not an object");
            self.complete = false;
            return Value::Null;
        };
        let typename = object
            .get(TYPENAME)
            .and_then(Value::as_str)
            .unwrap_or(declared);
        let Some(bucket) = plan.bucket_for(Some(typename), declared) else {
            return Value::Object(Object::default());
        };
        let mut result = Object::with_capacity(bucket.len());
        for (response_key, planned) in bucket {
            if planned.name.as_str() == TYPENAME {
                result.insert(response_key.clone(), Value::String(typename.into()));
                continue;
            }
            match object.get(response_key.as_str()) {
                None => self.complete = false,
                Some(value) => match &planned.selections {
                    None => {
                        result.insert(response_key.clone(), value.clone());
                    }
                    Some(nested) => {
                        let value = self.read_embedded_value(&planned.field_type, nested, value);
                        result.insert(response_key.clone(), value);
                    }
                },
            }
        }
        Value::Object(result)
    }

    fn read_embedded_value(
        &mut self,
        field_type: &FieldType,
        plan: &FieldPlan,
        value: &Value,
    ) -> Value {
        match (field_type, value) {
            (FieldType::NonNull(inner), value) => self.read_embedded_value(inner, plan, value),
            (_, Value::Null) => Value::Null,
            (FieldType::List(inner), Value::Array(values)) => Value::Array(
                values
                    .iter()
                    .map(|value| self.read_embedded_value(inner, plan, value))
                    .collect(),
            ),
            (FieldType::Named(name), value) => self.read_embedded(value, plan, name),
            _ => {
                self.complete = false;
                Value::Null
            }
        }
    }
}
