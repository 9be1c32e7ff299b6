use apollo_compiler::ast;
use serde_json_bytes::ByteString;
use serde_json_bytes::Value;

use crate::json_ext::Object;
use crate::spec::FieldType;
use crate::spec::Schema;
use crate::spec::SpecError;
use crate::spec::TYPENAME;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Selection {
    Field {
        name: ByteString,
        alias: Option<ByteString>,
        field_type: FieldType,
        arguments: Vec<(ByteString, ArgValue)>,
        selection_set: Option<Vec<Selection>>,
        include_skip: IncludeSkip,
    },
    InlineFragment {
        // Optional in specs but we fill it with the current type if not specified
        type_condition: String,
        include_skip: IncludeSkip,
        selection_set: Vec<Selection>,
    },
    FragmentSpread {
        name: String,
        include_skip: IncludeSkip,
    },
}

impl Selection {
    pub(crate) fn from_ast(
        selection: &ast::Selection,
        current_type: &str,
        schema: &Schema,
        mut count: usize,
    ) -> Result<Option<Self>, SpecError> {
        // The RECURSION_LIMIT is chosen to be:
        //   < # expected to cause stack overflow &&
        //   > # expected in a legitimate query
        const RECURSION_LIMIT: usize = 512;
        if count > RECURSION_LIMIT {
            tracing::error!("selection processing recursion limit({RECURSION_LIMIT}) exceeded");
            return Err(SpecError::RecursionLimitExceeded);
        }
        count += 1;
        Ok(match selection {
            // Spec: https://spec.graphql.org/draft/#Field
            ast::Selection::Field(field) => {
                let include_skip = IncludeSkip::parse(&field.directives);
                if include_skip.statically_skipped() {
                    return Ok(None);
                }

                let field_type = if field.name.as_str() == TYPENAME {
                    FieldType::NonNull(Box::new(FieldType::named("String")))
                } else {
                    schema
                        .field_type(current_type, field.name.as_str())
                        .ok_or_else(|| {
                            SpecError::InvalidField(
                                field.name.as_str().to_owned(),
                                current_type.to_owned(),
                            )
                        })?
                        .clone()
                };

                let alias = field.alias.as_ref().map(|alias| alias.as_str().into());

                let arguments = field
                    .arguments
                    .iter()
                    .map(|argument| {
                        (
                            ByteString::from(argument.name.as_str()),
                            ArgValue::from_ast(&argument.value),
                        )
                    })
                    .collect();

                let selection_set = if field.selection_set.is_empty() {
                    None
                } else {
                    Some(
                        field
                            .selection_set
                            .iter()
                            .filter_map(|selection| {
                                Selection::from_ast(
                                    selection,
                                    field_type.inner_type_name(),
                                    schema,
                                    count,
                                )
                                .transpose()
                            })
                            .collect::<Result<_, _>>()?,
                    )
                };

                Some(Self::Field {
                    alias,
                    name: field.name.as_str().into(),
                    field_type,
                    arguments,
                    selection_set,
                    include_skip,
                })
            }
            // Spec: https://spec.graphql.org/draft/#InlineFragment
            ast::Selection::InlineFragment(inline_fragment) => {
                let include_skip = IncludeSkip::parse(&inline_fragment.directives);
                if include_skip.statically_skipped() {
                    return Ok(None);
                }

                let type_condition = inline_fragment
                    .type_condition
                    .as_deref()
                    .unwrap_or(current_type)
                    .to_owned();

                let selection_set: Vec<Selection> = inline_fragment
                    .selection_set
                    .iter()
                    .filter_map(|selection| {
                        Selection::from_ast(selection, &type_condition, schema, count).transpose()
                    })
                    .collect::<Result<_, _>>()?;

                // Can be empty with a statically skipped selection set
                if selection_set.is_empty() {
                    return Ok(None);
                }

                Some(Self::InlineFragment {
                    type_condition,
                    include_skip,
                    selection_set,
                })
            }
            // Spec: https://spec.graphql.org/draft/#FragmentSpread
            ast::Selection::FragmentSpread(fragment_spread) => {
                let include_skip = IncludeSkip::parse(&fragment_spread.directives);
                if include_skip.statically_skipped() {
                    return Ok(None);
                }

                Some(Self::FragmentSpread {
                    name: fragment_spread.fragment_name.as_str().to_owned(),
                    include_skip,
                })
            }
        })
    }
}

/// An argument value as written in the document, with variables still
/// unresolved.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ArgValue {
    Const(Value),
    Variable(String),
    List(Vec<ArgValue>),
    Object(Vec<(ByteString, ArgValue)>),
}

impl ArgValue {
    pub(crate) fn from_ast(value: &ast::Value) -> Self {
        match value {
            ast::Value::Variable(name) => ArgValue::Variable(name.as_str().to_owned()),
            ast::Value::List(items) => {
                ArgValue::List(items.iter().map(|item| ArgValue::from_ast(item)).collect())
            }
            ast::Value::Object(fields) => ArgValue::Object(
                fields
                    .iter()
                    .map(|(name, value)| {
                        (ByteString::from(name.as_str()), ArgValue::from_ast(value))
                    })
                    .collect(),
            ),
            ast::Value::Null => ArgValue::Const(Value::Null),
            ast::Value::Boolean(b) => ArgValue::Const(Value::Bool(*b)),
            ast::Value::Enum(name) => ArgValue::Const(name.as_str().into()),
            ast::Value::String(s) => ArgValue::Const(s.as_str().into()),
            ast::Value::Int(i) => {
                let s = i.to_string();
                ArgValue::Const(
                    s.parse::<i64>()
                        .ok()
                        .map(Into::into)
                        .or_else(|| s.parse::<u64>().ok().map(Into::into))
                        .unwrap_or(Value::Null),
                )
            }
            ast::Value::Float(f) => {
                ArgValue::Const(f.try_to_f64().ok().map(Into::into).unwrap_or(Value::Null))
            }
        }
    }

    /// Resolve to a concrete JSON value against the effective variables.
    /// An unbound variable resolves to `Null`.
    pub(crate) fn resolve(&self, variables: &Object) -> Value {
        match self {
            ArgValue::Const(value) => value.clone(),
            ArgValue::Variable(name) => variables
                .get(name.as_str())
                .cloned()
                .unwrap_or(Value::Null),
            ArgValue::List(items) => {
                Value::Array(items.iter().map(|item| item.resolve(variables)).collect())
            }
            ArgValue::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.resolve(variables)))
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct IncludeSkip {
    include: Condition,
    skip: Condition,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Condition {
    Yes,
    No,
    Variable(String),
}

impl IncludeSkip {
    pub(crate) fn parse(directives: &ast::DirectiveList) -> Self {
        let mut include = None;
        let mut skip = None;
        for directive in &directives.0 {
            if include.is_none() && directive.name == "include" {
                include = Condition::parse(directive)
            }
            if skip.is_none() && directive.name == "skip" {
                skip = Condition::parse(directive)
            }
        }
        Self {
            include: include.unwrap_or(Condition::Yes),
            skip: skip.unwrap_or(Condition::No),
        }
    }

    pub(crate) fn statically_skipped(&self) -> bool {
        matches!(self.skip, Condition::Yes) || matches!(self.include, Condition::No)
    }

    /// A variable that is missing from `variables` leaves the directive at
    /// its default behavior.
    pub(crate) fn should_skip(&self, variables: &Object) -> bool {
        self.skip.eval(variables).unwrap_or(false) || !self.include.eval(variables).unwrap_or(true)
    }
}

impl Condition {
    pub(crate) fn parse(directive: &ast::Directive) -> Option<Self> {
        let condition = directive
            .arguments
            .iter()
            .find(|argument| argument.name == "if")?;
        match condition.value.as_ref() {
            ast::Value::Boolean(true) => Some(Condition::Yes),
            ast::Value::Boolean(false) => Some(Condition::No),
            ast::Value::Variable(variable) => {
                Some(Condition::Variable(variable.as_str().to_owned()))
            }
            _ => None,
        }
    }

    pub(crate) fn eval(&self, variables: &Object) -> Option<bool> {
        match self {
            Condition::Yes => Some(true),
            Condition::No => Some(false),
            Condition::Variable(variable_name) => variables
                .get(variable_name.as_str())
                .and_then(|value| value.as_bool()),
        }
    }
}
