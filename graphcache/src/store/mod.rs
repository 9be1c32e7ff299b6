//! The store ties the pieces together: parsed documents, normalized records,
//! optimistic layers and the dependency index.

pub(crate) mod data;
pub(crate) mod dependencies;
pub(crate) mod keys;

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use lru::LruCache;
use serde::Deserialize;
use serde::Serialize;

use crate::configuration::CacheConfig;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::operations::read::ReadResult;
use crate::operations::read::Reader;
use crate::operations::write::WriteResult;
use crate::operations::write::Writer;
use crate::spec::FieldPlan;
use crate::spec::OperationKind;
use crate::spec::Query;
use crate::spec::Schema;
use crate::spec::SpecError;
use crate::store::data::EntityRecord;
use crate::store::data::InMemoryData;
use crate::store::dependencies::DependencyIndex;
use crate::store::keys::EntityField;
use crate::store::keys::EntityKey;
use crate::store::keys::FieldKey;
use crate::store::keys::OperationKey;

/// A normalized cache for GraphQL responses.
///
/// Writes split response payloads into per-entity records, reads rebuild
/// response objects from those records and report how complete they are.
/// Every read re-registers what its operation depends on, so after data
/// changes [`Store::affected_operations`] names the operations whose results
/// may have changed.
pub struct Store {
    schema: Schema,
    config: CacheConfig,
    data: InMemoryData,
    dependencies: DependencyIndex,
    documents: LruCache<String, Arc<Query>>,
    metadata: HashMap<OperationKey, OperationMetadata>,
}

/// Everything needed to run an operation again later: the raw document and
/// the variables it was invoked with.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OperationMetadata {
    query: String,
    operation_name: Option<String>,
    variables: Object,
}

/// The persistent shape of a [`Store`]: base records plus the operations it
/// knew about. Optimistic layers and the dependency index are not part of it,
/// the index is rebuilt on [`Store::restore`] by running every remembered
/// operation against the restored records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    entities: HashMap<EntityKey, EntityRecord>,
    roots: HashMap<String, EntityRecord>,
    operations: HashMap<OperationKey, OperationMetadata>,
}

impl Store {
    pub fn new(schema: Schema, config: CacheConfig) -> Self {
        let root_names = schema.root_type_names().map(str::to_owned).collect();
        Self {
            data: InMemoryData::new(root_names),
            dependencies: DependencyIndex::default(),
            documents: LruCache::new(config.document_cache_capacity()),
            metadata: HashMap::new(),
            schema,
            config,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Normalize one response payload into the store.
    ///
    /// Returns the identity of the writing operation and every entity field
    /// the write stored or cleared. Feed the touched set to
    /// [`Store::affected_operations`] to learn which reads went stale.
    pub fn write(
        &mut self,
        query: &str,
        operation_name: Option<&str>,
        variables: &Object,
        payload: &Object,
    ) -> Result<WriteResult, SpecError> {
        let operation = OperationKey::new(query, operation_name, variables);
        let (type_name, kind, plan) = self.plan(query, operation_name, variables)?;
        let mut writer = Writer::new(&mut self.data, &self.config, &self.schema, None);
        writer.write_operation(&type_name, &plan, payload);
        let touched = writer.into_touched();
        if kind != OperationKind::Mutation {
            self.metadata.insert(
                operation.clone(),
                OperationMetadata::new(query, operation_name, variables),
            );
        }
        Ok(WriteResult { operation, touched })
    }

    /// Rebuild the response of one operation from the store.
    ///
    /// The dependency entries of the operation are replaced wholesale with
    /// what this read consulted, hits and misses alike.
    pub fn read(
        &mut self,
        query: &str,
        operation_name: Option<&str>,
        variables: &Object,
    ) -> Result<ReadResult, SpecError> {
        let operation = OperationKey::new(query, operation_name, variables);
        let (type_name, kind, plan) = self.plan(query, operation_name, variables)?;
        let mut reader = Reader::new(&self.data, &self.config);
        let object = reader.read_operation(&type_name, &plan);
        let (dependencies, complete) = reader.into_parts();
        self.dependencies
            .record(operation.clone(), dependencies.clone());
        if kind != OperationKind::Mutation {
            self.metadata.insert(
                operation.clone(),
                OperationMetadata::new(query, operation_name, variables),
            );
        }
        let data = if object.is_empty() && !complete {
            None
        } else {
            Some(Value::Object(object))
        };
        Ok(ReadResult {
            operation,
            data,
            complete,
            dependencies,
        })
    }

    /// Like [`Store::write`] but into an optimistic layer keyed by the
    /// operation, leaving the base records untouched. Writing the same
    /// operation again replaces its previous layer. The layer shadows the
    /// base for every read until [`Store::commit_layer`] folds it in or
    /// [`Store::clear_layer`] drops it.
    pub fn write_optimistic(
        &mut self,
        query: &str,
        operation_name: Option<&str>,
        variables: &Object,
        payload: &Object,
    ) -> Result<WriteResult, SpecError> {
        let operation = OperationKey::new(query, operation_name, variables);
        let (type_name, _, plan) = self.plan(query, operation_name, variables)?;
        let mut touched = self.data.push_layer(operation.clone());
        let mut writer = Writer::new(
            &mut self.data,
            &self.config,
            &self.schema,
            Some(&operation),
        );
        writer.write_operation(&type_name, &plan, payload);
        touched.extend(writer.into_touched());
        Ok(WriteResult { operation, touched })
    }

    /// Fold an optimistic layer into the base records. Returns the fields the
    /// layer carried, they may all have changed.
    pub fn commit_layer(&mut self, operation: &OperationKey) -> HashSet<EntityField> {
        self.data.commit_layer(operation)
    }

    /// Drop an optimistic layer without applying it. Returns the fields the
    /// layer carried, reads that saw them must be run again.
    pub fn clear_layer(&mut self, operation: &OperationKey) -> HashSet<EntityField> {
        self.data.clear_layer(operation)
    }

    /// Drop the stored values of one field of one entity, in the base records
    /// and in every optimistic layer. With `arguments` only that exact
    /// argument combination is dropped, without, every stored combination of
    /// the field. Aliased selections are stored under their alias, so the
    /// alias is the name to invalidate.
    pub fn invalidate(
        &mut self,
        entity: &EntityKey,
        field_name: &str,
        arguments: Option<&Object>,
    ) -> HashSet<EntityField> {
        let fields = match arguments {
            Some(arguments) => vec![FieldKey::new(field_name, arguments)],
            None => self.data.field_keys_named(entity, field_name),
        };
        let mut touched = HashSet::new();
        for field in fields {
            if self.data.invalidate_field(entity, &field) {
                touched.insert(EntityField::new(entity.clone(), field));
            }
        }
        touched
    }

    /// The operations whose recorded dependencies intersect `touched`. Run
    /// their reads again to refresh both their data and their dependency
    /// entries.
    pub fn affected_operations(&self, touched: &HashSet<EntityField>) -> HashSet<OperationKey> {
        self.dependencies.affected_operations(touched)
    }

    /// Forget one operation: its dependency entries and its snapshot
    /// metadata. Entity data it wrote stays, other operations may share it.
    pub fn teardown(&mut self, operation: &OperationKey) {
        self.dependencies.forget(operation);
        self.metadata.remove(operation);
    }

    /// The persistent state of the store, optimistic layers excepted.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            entities: self.data.base_entities().clone(),
            roots: self.data.base_roots().clone(),
            operations: self.metadata.clone(),
        }
    }

    /// Rebuild a store from a snapshot. The dependency index is not
    /// persisted, it is reconstructed by running every remembered operation
    /// against the restored records. Operations that no longer parse against
    /// `schema` are dropped.
    pub fn restore(schema: Schema, config: CacheConfig, snapshot: StoreSnapshot) -> Self {
        let root_names = schema.root_type_names().map(str::to_owned).collect();
        let mut store = Self {
            data: InMemoryData::restore(root_names, snapshot.entities, snapshot.roots),
            dependencies: DependencyIndex::default(),
            documents: LruCache::new(config.document_cache_capacity()),
            metadata: HashMap::new(),
            schema,
            config,
        };
        for metadata in snapshot.operations.into_values() {
            if let Err(err) = store.read(
                &metadata.query,
                metadata.operation_name.as_deref(),
                &metadata.variables,
            ) {
                failfast_debug!("dropping a restored operation that no longer reads: {err}");
            }
        }
        store
    }

    fn plan(
        &mut self,
        query: &str,
        operation_name: Option<&str>,
        variables: &Object,
    ) -> Result<(String, OperationKind, FieldPlan), SpecError> {
        let document = self.document(query)?;
        let operation = document.operation(operation_name)?;
        let variables = operation.effective_variables(variables);
        let plan = FieldPlan::collect(operation, &document.fragments, &variables, &self.schema)?;
        Ok((operation.type_name.clone(), operation.kind, plan))
    }

    /// Documents are parsed once per store and reused across invocations with
    /// different variables.
    fn document(&mut self, query: &str) -> Result<Arc<Query>, SpecError> {
        if let Some(document) = self.documents.get(query) {
            return Ok(document.clone());
        }
        let document = Arc::new(Query::parse(query, &self.schema)?);
        self.documents.put(query.to_owned(), document.clone());
        Ok(document)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("entities", &self.data.base_entities().len())
            .field("operations", &self.metadata.len())
            .finish_non_exhaustive()
    }
}

impl OperationMetadata {
    fn new(query: &str, operation_name: Option<&str>, variables: &Object) -> Self {
        Self {
            query: query.to_owned(),
            operation_name: operation_name.map(str::to_owned),
            variables: variables.clone(),
        }
    }
}
