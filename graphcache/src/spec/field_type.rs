use apollo_compiler::ast;
use serde::Deserialize;
use serde::Serialize;

/// A type reference as written in a field definition.
// Spec: https://spec.graphql.org/draft/#sec-Type-References
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub(crate) enum FieldType {
    Named(String),
    List(Box<FieldType>),
    NonNull(Box<FieldType>),
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Named(ty) => write!(f, "{ty}"),
            FieldType::List(ty) => write!(f, "[{ty}]"),
            FieldType::NonNull(ty) => write!(f, "{ty}!"),
        }
    }
}

impl FieldType {
    pub(crate) fn named(name: impl Into<String>) -> Self {
        FieldType::Named(name.into())
    }

    /// return the name of the type on which selections happen
    ///
    /// Example if we get the field `list: [User!]!`, it will return "User"
    pub(crate) fn inner_type_name(&self) -> &str {
        match self {
            FieldType::Named(name) => name.as_str(),
            FieldType::List(inner) | FieldType::NonNull(inner) => inner.inner_type_name(),
        }
    }

    /// Unwrap one level of non-null wrapping, if any.
    pub(crate) fn nullable(&self) -> &FieldType {
        match self {
            FieldType::NonNull(inner) => inner,
            other => other,
        }
    }

    pub(crate) fn is_non_null(&self) -> bool {
        matches!(self, FieldType::NonNull(_))
    }
}

impl From<&'_ ast::Type> for FieldType {
    fn from(ty: &'_ ast::Type) -> Self {
        match ty {
            ast::Type::Named(name) => FieldType::Named(name.as_str().to_owned()),
            ast::Type::NonNullNamed(name) => {
                FieldType::NonNull(Box::new(FieldType::Named(name.as_str().to_owned())))
            }
            ast::Type::List(inner) => FieldType::List(Box::new(FieldType::from(&**inner))),
            ast::Type::NonNullList(inner) => FieldType::NonNull(Box::new(FieldType::List(
                Box::new(FieldType::from(&**inner)),
            ))),
        }
    }
}
