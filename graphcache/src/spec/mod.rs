#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

mod field_type;
mod fragments;
mod introspection;
pub(crate) mod plan;
pub(crate) mod query;
mod schema;
mod selection;

use displaydoc::Display;
pub(crate) use field_type::*;
pub(crate) use fragments::*;
pub(crate) use plan::FieldBucket;
pub(crate) use plan::FieldPlan;
pub(crate) use plan::PlannedField;
pub(crate) use query::Operation;
pub(crate) use query::OperationKind;
pub(crate) use query::Query;
pub(crate) use query::TYPENAME;
pub use schema::Schema;
pub(crate) use selection::*;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// GraphQL parsing errors.
#[derive(Error, Debug, Display, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SpecError {
    /// selection processing recursion limit exceeded
    RecursionLimitExceeded,
    /// invalid type error, expected another type than '{0}'
    InvalidType(String),
    /// cannot query field '{0}' on type '{1}'
    InvalidField(String, String),
    /// parsing error: {0}
    ParsingError(String),
    /// Unknown operation named "{0}"
    UnknownOperation(String),
    /// must also provide an operation name when the document has several operations
    MissingOperationName,
    /// '{0}' operations are not supported by the schema
    UnsupportedOperation(String),
}
