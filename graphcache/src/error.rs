//! Errors raised while building the cache or handling operation documents.

use apollo_compiler::validation::DiagnosticList;
use apollo_compiler::validation::WithErrors;
use displaydoc::Display;
use thiserror::Error;

pub use crate::spec::SpecError;

/// Error in the schema the cache is indexed over.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum SchemaError {
    /// GraphQL parser error: {0}
    Parse(ParseErrors),
    /// GraphQL validation error: {0}
    Validate(ParseErrors),
    /// malformed introspection result: {0}
    Introspection(String),
    /// the schema does not define a query root operation type
    MissingQueryRoot,
}

/// Collection of schema parse or validation errors.
#[derive(Debug)]
pub struct ParseErrors {
    pub(crate) errors: DiagnosticList,
}

impl std::fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut errors = self.errors.iter();
        for (i, error) in errors.by_ref().take(5).enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", error)?;
        }
        let remaining = errors.count();
        if remaining > 0 {
            write!(f, "\n...and {remaining} other errors")?;
        }
        Ok(())
    }
}

impl From<DiagnosticList> for ParseErrors {
    fn from(errors: DiagnosticList) -> Self {
        Self { errors }
    }
}

impl<T> From<WithErrors<T>> for ParseErrors {
    fn from(WithErrors { errors, .. }: WithErrors<T>) -> Self {
        Self { errors }
    }
}
