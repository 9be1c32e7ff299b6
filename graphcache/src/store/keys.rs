use std::fmt;
use std::fmt::Display;

use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use sha2::Digest;
use sha2::Sha256;

use crate::configuration::CacheConfig;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// Key of one normalized entity: the type name and its rendered id, joined
/// by a colon, `Person:1` style. Root records use the bare root type name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn new(typename: &str, id: impl Display) -> Self {
        Self(format!("{typename}:{id}"))
    }

    pub(crate) fn root(type_name: &str) -> Self {
        Self(type_name.to_owned())
    }

    /// The type name encoded in the key.
    pub fn typename(&self) -> &str {
        self.0
            .split_once(':')
            .map_or(self.0.as_str(), |(typename, _)| typename)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityKey").field(&self.0).finish()
    }
}

impl From<&str> for EntityKey {
    fn from(key: &str) -> Self {
        Self(key.to_owned())
    }
}

impl From<String> for EntityKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Key of one field inside an entity record: the response name plus a stable
/// rendering of its arguments, if any. Distinct arguments must yield
/// distinct keys, so the rendering sorts object keys at every depth.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldKey(String);

impl FieldKey {
    pub(crate) fn new(response_key: &str, arguments: &Object) -> Self {
        if arguments.is_empty() {
            return Self(response_key.to_owned());
        }
        let stable = stable_value(&Value::Object(arguments.clone()));
        let serialized = serde_json::to_string(&stable)
            .expect("JSON serialization should not fail for argument values");
        Self(format!("{response_key}({serialized})"))
    }

    pub(crate) fn bare(response_key: &str) -> Self {
        Self(response_key.to_owned())
    }

    /// The response name without the argument rendering.
    pub fn response_name(&self) -> &str {
        self.0
            .split_once('(')
            .map_or(self.0.as_str(), |(name, _)| name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FieldKey").field(&self.0).finish()
    }
}

/// One addressable field of one entity, the unit of dependency tracking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityField {
    pub entity: EntityKey,
    pub field: FieldKey,
}

impl EntityField {
    pub(crate) fn new(entity: EntityKey, field: FieldKey) -> Self {
        Self { entity, field }
    }
}

impl Display for EntityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.field)
    }
}

/// Identity of one operation invocation, hashed over the document text, the
/// operation name and the stable rendering of its variables.
#[derive(Clone, Hash, PartialEq, Eq, Deserialize, Serialize)]
pub struct OperationKey(#[serde(with = "hex")] Vec<u8>);

impl OperationKey {
    pub(crate) fn new(query: &str, operation_name: Option<&str>, variables: &Object) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(query);
        // byte separator between each part that is hashed
        hasher.update(&[0xFF][..]);
        hasher.update(operation_name.unwrap_or("-"));
        hasher.update(&[0xFF][..]);
        hasher.update(stable_variables(variables));
        Self(hasher.finalize().as_slice().into())
    }
}

impl fmt::Debug for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OperationKey")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

impl Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// Key an object according to the type's key policy: a configured resolver
/// if one exists, otherwise `id` then `_id`.
///
/// `None` means the object has no identity of its own and is stored embedded
/// in its parent.
pub(crate) fn key_of_entity(
    config: &CacheConfig,
    typename: &str,
    object: &Object,
) -> Option<EntityKey> {
    if let Some(resolver) = config.key_resolver(typename) {
        return resolver.resolve(object).map(|id| EntityKey::new(typename, id));
    }
    let id = object
        .get("id")
        .filter(|id| !id.is_null())
        .or_else(|| object.get("_id"))?;
    match id {
        Value::String(id) => Some(EntityKey::new(typename, id.as_str())),
        Value::Number(id) => Some(EntityKey::new(typename, id)),
        _ => None,
    }
}

fn stable_variables(variables: &Object) -> String {
    if variables.is_empty() {
        return "{}".to_owned();
    }
    let stable = stable_value(&Value::Object(variables.clone()));
    serde_json::to_string(&stable).expect("JSON serialization should not fail for variables")
}

/// Rebuild a value with object keys sorted at every depth, so that rendering
/// it does not depend on the order arguments were written in.
fn stable_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&ByteString, &Value)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.clone(), stable_value(value)))
                    .collect(),
            )
        }
        Value::Array(values) => Value::Array(values.iter().map(stable_value).collect()),
        other => other.clone(),
    }
}
