use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::store::keys::EntityKey;

const DEFAULT_DOCUMENT_CACHE_CAPACITY: NonZeroUsize = unsafe { NonZeroUsize::new_unchecked(512) };

/// Per-type key extraction policy.
///
/// Returns the id part of the entity key, or `None` to store objects of the
/// type embedded in their parent.
#[derive(Clone)]
pub struct KeyResolver(Arc<dyn Fn(&Object) -> Option<String> + Send + Sync>);

impl KeyResolver {
    pub(crate) fn resolve(&self, object: &Object) -> Option<String> {
        (self.0)(object)
    }
}

impl<F> From<F> for KeyResolver
where
    F: Fn(&Object) -> Option<String> + Send + Sync + 'static,
{
    fn from(resolve: F) -> Self {
        Self(Arc::new(resolve))
    }
}

impl fmt::Debug for KeyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyResolver(..)")
    }
}

/// Client-side computation of one field, consulted before the stored value
/// when the store reads that field.
///
/// Returning `None` falls back to whatever the store holds.
#[derive(Clone)]
pub struct FieldResolver(Arc<dyn Fn(&ResolverContext<'_>) -> Option<Value> + Send + Sync>);

impl FieldResolver {
    pub(crate) fn resolve(&self, context: &ResolverContext<'_>) -> Option<Value> {
        (self.0)(context)
    }
}

impl<F> From<F> for FieldResolver
where
    F: Fn(&ResolverContext<'_>) -> Option<Value> + Send + Sync + 'static,
{
    fn from(resolve: F) -> Self {
        Self(Arc::new(resolve))
    }
}

impl fmt::Debug for FieldResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldResolver(..)")
    }
}

/// What a [`FieldResolver`] gets to see about the field being read.
#[derive(Debug)]
pub struct ResolverContext<'a> {
    pub entity: &'a EntityKey,
    pub typename: &'a str,
    pub field_name: &'a str,
    pub arguments: &'a Object,
}

/// Names one field of one type, `Type.field` style.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldCoordinate {
    pub typename: String,
    pub field: String,
}

impl From<(&str, &str)> for FieldCoordinate {
    fn from((typename, field): (&str, &str)) -> Self {
        Self {
            typename: typename.to_owned(),
            field: field.to_owned(),
        }
    }
}

impl From<(String, String)> for FieldCoordinate {
    fn from((typename, field): (String, String)) -> Self {
        Self { typename, field }
    }
}

impl fmt::Display for FieldCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.typename, self.field)
    }
}

/// Tuning knobs of one store instance.
pub struct CacheConfig {
    keys: HashMap<String, KeyResolver>,
    resolvers: HashMap<String, HashMap<String, FieldResolver>>,
    document_cache_capacity: NonZeroUsize,
}

#[buildstructor::buildstructor]
impl CacheConfig {
    #[builder(visibility = "pub")]
    fn new(
        keys: HashMap<String, KeyResolver>,
        resolvers: HashMap<FieldCoordinate, FieldResolver>,
        document_cache_capacity: Option<NonZeroUsize>,
    ) -> Self {
        let resolvers = resolvers.into_iter().fold(
            HashMap::<String, HashMap<String, FieldResolver>>::new(),
            |mut map, (coordinate, resolver)| {
                map.entry(coordinate.typename)
                    .or_default()
                    .insert(coordinate.field, resolver);
                map
            },
        );
        Self {
            keys,
            resolvers,
            document_cache_capacity: document_cache_capacity
                .unwrap_or(DEFAULT_DOCUMENT_CACHE_CAPACITY),
        }
    }

    pub(crate) fn key_resolver(&self, typename: &str) -> Option<&KeyResolver> {
        self.keys.get(typename)
    }

    pub(crate) fn field_resolver(&self, typename: &str, field: &str) -> Option<&FieldResolver> {
        self.resolvers.get(typename)?.get(field)
    }

    pub(crate) fn document_cache_capacity(&self) -> NonZeroUsize {
        self.document_cache_capacity
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(HashMap::new(), HashMap::new(), None)
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut resolvers: Vec<String> = self
            .resolvers
            .iter()
            .flat_map(|(typename, fields)| {
                fields.keys().map(move |field| format!("{typename}.{field}"))
            })
            .collect();
        resolvers.sort();
        let mut keys: Vec<&String> = self.keys.keys().collect();
        keys.sort();
        f.debug_struct("CacheConfig")
            .field("keys", &keys)
            .field("resolvers", &resolvers)
            .field("document_cache_capacity", &self.document_cache_capacity)
            .finish()
    }
}
