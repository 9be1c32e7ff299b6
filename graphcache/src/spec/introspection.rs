//! Deserialization model for a standard schema introspection result.

use serde::Deserialize;

use crate::error::SchemaError;
use crate::spec::FieldType;

#[derive(Debug, Deserialize)]
pub(crate) struct IntrospectionResult {
    #[serde(rename = "__schema")]
    pub(crate) schema: IntrospectionSchema,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IntrospectionSchema {
    pub(crate) query_type: Option<RootTypeRef>,
    #[serde(default)]
    pub(crate) mutation_type: Option<RootTypeRef>,
    #[serde(default)]
    pub(crate) subscription_type: Option<RootTypeRef>,
    pub(crate) types: Vec<TypeDef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RootTypeRef {
    pub(crate) name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TypeDef {
    pub(crate) kind: TypeKind,
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) fields: Option<Vec<FieldDef>>,
    #[serde(default)]
    pub(crate) interfaces: Option<Vec<TypeRef>>,
    #[serde(default)]
    pub(crate) possible_types: Option<Vec<TypeRef>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FieldDef {
    pub(crate) name: String,
    #[serde(rename = "type")]
    pub(crate) ty: TypeRef,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TypeRef {
    pub(crate) kind: TypeKind,
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) of_type: Option<Box<TypeRef>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
    List,
    NonNull,
}

impl TypeRef {
    /// The name at the bottom of the `ofType` chain.
    pub(crate) fn inner_name(&self) -> Result<&str, SchemaError> {
        match (&self.name, &self.of_type) {
            (Some(name), _) => Ok(name.as_str()),
            (None, Some(inner)) => inner.inner_name(),
            (None, None) => Err(SchemaError::Introspection(
                "wrapper type reference without ofType".to_string(),
            )),
        }
    }
}

impl TryFrom<&'_ TypeRef> for FieldType {
    type Error = SchemaError;

    fn try_from(ty: &'_ TypeRef) -> Result<Self, Self::Error> {
        match ty.kind {
            TypeKind::List => {
                let inner = ty.of_type.as_deref().ok_or_else(|| {
                    SchemaError::Introspection("LIST type reference without ofType".to_string())
                })?;
                Ok(FieldType::List(Box::new(inner.try_into()?)))
            }
            TypeKind::NonNull => {
                let inner = ty.of_type.as_deref().ok_or_else(|| {
                    SchemaError::Introspection("NON_NULL type reference without ofType".to_string())
                })?;
                Ok(FieldType::NonNull(Box::new(inner.try_into()?)))
            }
            _ => {
                let name = ty.name.as_deref().ok_or_else(|| {
                    SchemaError::Introspection("named type reference without a name".to_string())
                })?;
                Ok(FieldType::named(name))
            }
        }
    }
}
