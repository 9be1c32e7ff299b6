use std::collections::HashMap;
use std::fmt::Display;

use apollo_compiler::ast;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Value;

use crate::json_ext::Object;
use crate::spec::ArgValue;
use crate::spec::FieldType;
use crate::spec::Fragments;
use crate::spec::Schema;
use crate::spec::Selection;
use crate::spec::SpecError;

pub(crate) const TYPENAME: &str = "__typename";

/// A parsed operation document: executable definitions only, resolved
/// against the schema index but not yet bound to variables.
#[derive(Debug)]
pub(crate) struct Query {
    pub(crate) fragments: Fragments,
    pub(crate) operations: Vec<Operation>,
}

impl Query {
    pub(crate) fn parse(query: &str, schema: &Schema) -> Result<Self, SpecError> {
        let mut parser = apollo_compiler::parser::Parser::new();
        let result = parser.parse_ast(query, "query.graphql");

        let recursion_limit = parser.recursion_reached();
        tracing::trace!(?recursion_limit, "recursion limit data");

        let document = result.map_err(|invalid| {
            let errors = invalid
                .errors
                .iter()
                .map(|error| error.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            failfast_debug!("parsing error(s): {}", errors);
            SpecError::ParsingError(errors)
        })?;

        let fragments = Fragments::from_ast(&document, schema)?;

        let operations = document
            .definitions
            .iter()
            .filter_map(|definition| {
                if let ast::Definition::OperationDefinition(operation) = definition {
                    Some(operation)
                } else {
                    None
                }
            })
            .map(|operation| Operation::from_ast(operation, schema))
            .collect::<Result<Vec<_>, SpecError>>()?;

        Ok(Query {
            fragments,
            operations,
        })
    }

    /// Select the operation a request refers to.
    pub(crate) fn operation(&self, operation_name: Option<&str>) -> Result<&Operation, SpecError> {
        match operation_name {
            Some(name) => self
                .operations
                .iter()
                .find(|operation| operation.name.as_deref() == Some(name))
                .ok_or_else(|| SpecError::UnknownOperation(name.to_owned())),
            None => {
                if self.operations.len() > 1 {
                    return Err(SpecError::MissingOperationName);
                }
                self.operations.first().ok_or_else(|| {
                    SpecError::ParsingError("the document defines no operation".to_owned())
                })
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct Operation {
    pub(crate) name: Option<String>,
    pub(crate) kind: OperationKind,
    /// Name of the root operation type this operation starts from.
    pub(crate) type_name: String,
    pub(crate) selection_set: Vec<Selection>,
    /// Variable name to its declared default, if any.
    pub(crate) variables: HashMap<ByteString, Option<Value>>,
}

impl Operation {
    // Spec: https://spec.graphql.org/draft/#sec-Language.Operations
    pub(crate) fn from_ast(
        operation: &ast::OperationDefinition,
        schema: &Schema,
    ) -> Result<Self, SpecError> {
        let name = operation.name.as_ref().map(|name| name.as_str().to_owned());
        let kind = OperationKind::from(operation.operation_type);

        let type_name = schema
            .root_operation_name(kind)
            .ok_or_else(|| SpecError::UnsupportedOperation(kind.to_string()))?
            .to_owned();

        let selection_set = operation
            .selection_set
            .iter()
            .map(|selection| Selection::from_ast(selection, &type_name, schema, 0))
            .collect::<Result<Vec<Option<_>>, _>>()?
            .into_iter()
            .flatten()
            .collect::<Vec<Selection>>();

        let variables = operation
            .variables
            .iter()
            .map(|definition| {
                (
                    ByteString::from(definition.name.as_str()),
                    definition
                        .default_value
                        .as_ref()
                        .map(|value| parse_default_value(value)),
                )
            })
            .collect();

        Ok(Operation {
            name,
            kind,
            type_name,
            selection_set,
            variables,
        })
    }

    /// The variables a walk should see: declared defaults overlaid with the
    /// caller's values.
    pub(crate) fn effective_variables(&self, variables: &Object) -> Object {
        if self.variables.is_empty() {
            return variables.clone();
        }
        self.variables
            .iter()
            .filter_map(|(name, default)| default.as_ref().map(|value| (name, value)))
            .chain(variables.iter())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

// Default values may not contain variables, so resolving against an empty
// set always produces a concrete value.
fn parse_default_value(value: &ast::Value) -> Value {
    ArgValue::from_ast(value).resolve(&Object::default())
}

/// GraphQL operation type.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum OperationKind {
    #[default]
    Query,
    Mutation,
    Subscription,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.default_type_name())
    }
}

impl OperationKind {
    pub(crate) const fn default_type_name(&self) -> &'static str {
        match self {
            OperationKind::Query => "Query",
            OperationKind::Mutation => "Mutation",
            OperationKind::Subscription => "Subscription",
        }
    }
}

impl From<ast::OperationType> for OperationKind {
    // Spec: https://spec.graphql.org/draft/#OperationType
    fn from(operation_type: ast::OperationType) -> Self {
        match operation_type {
            ast::OperationType::Query => Self::Query,
            ast::OperationType::Mutation => Self::Mutation,
            ast::OperationType::Subscription => Self::Subscription,
        }
    }
}
