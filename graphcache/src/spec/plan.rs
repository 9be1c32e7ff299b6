use indexmap::IndexMap;
use serde_json_bytes::ByteString;

use crate::json_ext::Object;
use crate::spec::ArgValue;
use crate::spec::FieldType;
use crate::spec::Fragments;
use crate::spec::Operation;
use crate::spec::Schema;
use crate::spec::Selection;
use crate::spec::SpecError;

/// The selection plan of one nesting level, bucketed by type name.
///
/// Fragments narrow selections to a type condition, so the fields to store or
/// rebuild for an object depend on the concrete type it turns out to have.
/// Each bucket lists the fields applying to one such type, keyed by response
/// name.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct FieldPlan {
    buckets: IndexMap<String, FieldBucket>,
}

pub(crate) type FieldBucket = IndexMap<ByteString, PlannedField>;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlannedField {
    pub(crate) name: ByteString,
    pub(crate) field_type: FieldType,
    /// Argument values after variable substitution.
    pub(crate) arguments: Object,
    pub(crate) selections: Option<FieldPlan>,
}

impl FieldPlan {
    /// Build the plan for one operation invocation.
    ///
    /// `@include` and `@skip` are applied against `variables` here, so the
    /// plan holds for one set of variables only.
    pub(crate) fn collect(
        operation: &Operation,
        fragments: &Fragments,
        variables: &Object,
        schema: &Schema,
    ) -> Result<Self, SpecError> {
        let selections: Vec<&Selection> = operation.selection_set.iter().collect();
        collect_level(
            &selections,
            &operation.type_name,
            fragments,
            variables,
            schema,
            0,
        )
    }

    /// The bucket for a concrete type, falling back to the type the field was
    /// declared with when no concrete bucket exists.
    pub(crate) fn bucket_for(
        &self,
        typename: Option<&str>,
        declared: &str,
    ) -> Option<&FieldBucket> {
        typename
            .and_then(|name| self.buckets.get(name))
            .or_else(|| self.buckets.get(declared))
    }

    #[cfg(test)]
    pub(crate) fn bucket(&self, type_name: &str) -> Option<&FieldBucket> {
        self.buckets.get(type_name)
    }
}

/// Fields of one level before bucket propagation, borrowing from the
/// operation and fragment definitions.
#[derive(Default)]
struct Level<'a> {
    buckets: IndexMap<String, IndexMap<ByteString, Pending<'a>>>,
}

struct Pending<'a> {
    name: &'a ByteString,
    field_type: &'a FieldType,
    arguments: &'a [(ByteString, ArgValue)],
    selections: Option<Vec<&'a Selection>>,
}

fn collect_level(
    selections: &[&Selection],
    type_name: &str,
    fragments: &Fragments,
    variables: &Object,
    schema: &Schema,
    count: usize,
) -> Result<FieldPlan, SpecError> {
    let mut level = Level::default();
    visit(
        &mut level, selections, type_name, fragments, variables, schema, count,
    )?;

    let mut buckets: IndexMap<String, FieldBucket> = IndexMap::with_capacity(level.buckets.len());
    for (bucket_name, pending_fields) in level.buckets {
        let mut bucket = FieldBucket::with_capacity(pending_fields.len());
        for (response_key, pending) in pending_fields {
            let inner = pending.field_type.inner_type_name();
            let selections = match (pending.selections, schema.is_composite(inner)) {
                (Some(nested), true) => Some(collect_level(
                    &nested,
                    inner,
                    fragments,
                    variables,
                    schema,
                    count + 1,
                )?),
                (None, false) => None,
                (Some(_), false) | (None, true) => {
                    return Err(SpecError::InvalidType(inner.to_owned()));
                }
            };
            bucket.insert(
                response_key,
                PlannedField {
                    name: pending.name.clone(),
                    field_type: pending.field_type.clone(),
                    arguments: resolve_arguments(pending.arguments, variables),
                    selections,
                },
            );
        }
        buckets.insert(bucket_name, bucket);
    }

    // Share fields across related buckets so the right plan exists for
    // whichever concrete type an object reports. Inherited entries come from
    // a pre-propagation snapshot and never overwrite what a more specific
    // selection already put there, so a sibling cannot pick fields up
    // through a common supertype.
    let snapshot = buckets.clone();
    for (bucket_name, fields) in &snapshot {
        if let Some(possible) = schema.possible_types(bucket_name) {
            for concrete in possible {
                let target = buckets.entry(concrete.clone()).or_default();
                for (key, field) in fields {
                    target.entry(key.clone()).or_insert_with(|| field.clone());
                }
            }
        }
        for other in snapshot.keys() {
            if other != bucket_name
                && (schema.is_subtype(bucket_name, other) || schema.is_subtype(other, bucket_name))
            {
                let target = buckets.entry(other.clone()).or_default();
                for (key, field) in fields {
                    target.entry(key.clone()).or_insert_with(|| field.clone());
                }
            }
        }
    }

    Ok(FieldPlan { buckets })
}

fn visit<'a>(
    level: &mut Level<'a>,
    selections: &[&'a Selection],
    bucket_name: &str,
    fragments: &'a Fragments,
    variables: &Object,
    schema: &Schema,
    count: usize,
) -> Result<(), SpecError> {
    // Parsing bounds selection depth but not fragment expansion, so spread
    // cycles are only caught here.
    const RECURSION_LIMIT: usize = 512;
    if count > RECURSION_LIMIT {
        tracing::error!("field plan recursion limit({RECURSION_LIMIT}) exceeded");
        return Err(SpecError::RecursionLimitExceeded);
    }

    for selection in selections {
        match selection {
            Selection::Field {
                name,
                alias,
                field_type,
                arguments,
                selection_set,
                include_skip,
            } => {
                if include_skip.should_skip(variables) {
                    continue;
                }
                let response_key = alias.as_ref().unwrap_or(name);
                let bucket = level.buckets.entry(bucket_name.to_owned()).or_default();
                match bucket.entry(response_key.clone()) {
                    indexmap::map::Entry::Occupied(mut entry) => {
                        let pending = entry.get_mut();
                        if pending.name != name || pending.arguments != arguments.as_slice() {
                            failfast_debug!(
                                "response key '{}' selects conflicting fields",
                                response_key.as_str(),
                            );
                            continue;
                        }
                        match (pending.selections.as_mut(), selection_set.as_deref()) {
                            (Some(mine), Some(more)) => mine.extend(more),
                            (None, None) => {}
                            _ => {
                                failfast_debug!(
                                    "response key '{}' selects conflicting subselections",
                                    response_key.as_str(),
                                );
                            }
                        }
                    }
                    indexmap::map::Entry::Vacant(entry) => {
                        entry.insert(Pending {
                            name,
                            field_type,
                            arguments: arguments.as_slice(),
                            selections: selection_set
                                .as_ref()
                                .map(|selections| selections.iter().collect()),
                        });
                    }
                }
            }
            Selection::InlineFragment {
                type_condition,
                include_skip,
                selection_set,
            } => {
                if include_skip.should_skip(variables) {
                    continue;
                }
                let bucket = condition_bucket(type_condition, bucket_name, schema);
                let nested: Vec<&Selection> = selection_set.iter().collect();
                visit(
                    level,
                    &nested,
                    bucket,
                    fragments,
                    variables,
                    schema,
                    count + 1,
                )?;
            }
            Selection::FragmentSpread { name, include_skip } => {
                if include_skip.should_skip(variables) {
                    continue;
                }
                let Some(fragment) = fragments.get(name) else {
                    return Err(SpecError::ParsingError(format!(
                        "undefined fragment '{name}'"
                    )));
                };
                // Directives on the definition are re-evaluated for every
                // spread of the fragment.
                if fragment.include_skip.should_skip(variables) {
                    continue;
                }
                let bucket = condition_bucket(&fragment.type_condition, bucket_name, schema);
                let nested: Vec<&Selection> = fragment.selection_set.iter().collect();
                visit(
                    level,
                    &nested,
                    bucket,
                    fragments,
                    variables,
                    schema,
                    count + 1,
                )?;
            }
        }
    }
    Ok(())
}

/// A condition naming the enclosing type or one of its supertypes keeps
/// selecting on the enclosing type; anything narrower gets its own bucket.
fn condition_bucket<'a>(condition: &'a str, enclosing: &'a str, schema: &Schema) -> &'a str {
    if condition == enclosing || schema.is_subtype(condition, enclosing) {
        enclosing
    } else {
        condition
    }
}

fn resolve_arguments(arguments: &[(ByteString, ArgValue)], variables: &Object) -> Object {
    // An argument bound to an absent variable counts as not provided, which
    // is not the same as an explicit null.
    arguments
        .iter()
        .filter_map(|(name, value)| match value {
            ArgValue::Variable(variable) if !variables.contains_key(variable.as_str()) => None,
            value => Some((name.clone(), value.resolve(variables))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;
    use test_log::test;

    use super::*;
    use crate::spec::Query;

    fn plan(schema: &Schema, query: &str, variables: Object) -> FieldPlan {
        let query = Query::parse(query, schema).unwrap();
        let operation = query.operation(None).unwrap();
        let variables = operation.effective_variables(&variables);
        FieldPlan::collect(operation, &query.fragments, &variables, schema).unwrap()
    }

    fn person_schema() -> Schema {
        Schema::parse(
            r#"
            type Query {
              person: Person
            }
            union Person = Friend | Foe
            interface Node {
              id: ID!
            }
            type Friend implements Node {
              id: ID!
              name: String
            }
            type Foe implements Node {
              id: ID!
              age: Int
            }
            "#,
        )
        .unwrap()
    }

    fn user_schema() -> Schema {
        Schema::parse(
            r#"
            type Query {
              me: User
              user(id: ID!): User
            }
            type User {
              id: ID!
              name: String
              friends(first: Int): [User]
            }
            "#,
        )
        .unwrap()
    }

    #[test]
    fn fragment_fields_stay_on_their_type() {
        let schema = person_schema();
        let plan = plan(
            &schema,
            r#"
            {
              person {
                ... on Node { id }
                ... on Friend { name }
              }
            }
            "#,
            Object::default(),
        );

        let person = plan.bucket("Query").unwrap()["person"]
            .selections
            .as_ref()
            .unwrap();

        let friend = person.bucket("Friend").unwrap();
        assert!(friend.contains_key("id"));
        assert!(friend.contains_key("name"));

        let foe = person.bucket("Foe").unwrap();
        assert!(foe.contains_key("id"));
        assert!(!foe.contains_key("name"));
    }

    #[test]
    fn named_fragments_bucket_like_inline_ones() {
        let schema = person_schema();
        let plan = plan(
            &schema,
            r#"
            query People {
              person {
                ...NodeBits
                ...FriendBits
              }
            }
            fragment NodeBits on Node { id }
            fragment FriendBits on Friend { name }
            "#,
            Object::default(),
        );

        let person = plan.bucket("Query").unwrap()["person"]
            .selections
            .as_ref()
            .unwrap();
        assert!(person.bucket("Friend").unwrap().contains_key("name"));
        assert!(!person.bucket("Foe").unwrap().contains_key("name"));
    }

    #[test]
    fn reselected_fields_merge_their_subselections() {
        let schema = user_schema();
        let plan = plan(
            &schema,
            "{ me { id } me { name friends(first: 1) { id } } }",
            Object::default(),
        );

        let query = plan.bucket("Query").unwrap();
        let me = query["me"].selections.as_ref().unwrap();
        let user = me.bucket("User").unwrap();
        assert!(user.contains_key("id"));
        assert!(user.contains_key("name"));
        assert_eq!(
            user["friends"].arguments,
            json!({ "first": 1 }).as_object().unwrap().clone()
        );
    }

    #[test]
    fn aliases_keep_their_own_arguments() {
        let schema = user_schema();
        let plan = plan(
            &schema,
            r#"{ a: user(id: "1") { id } b: user(id: "2") { id } }"#,
            Object::default(),
        );

        let query = plan.bucket("Query").unwrap();
        assert_eq!(query["a"].name, ByteString::from("user"));
        assert_eq!(
            query["a"].arguments,
            json!({ "id": "1" }).as_object().unwrap().clone()
        );
        assert_eq!(
            query["b"].arguments,
            json!({ "id": "2" }).as_object().unwrap().clone()
        );
    }

    #[test]
    fn directives_follow_the_variables_of_the_invocation() {
        let schema = user_schema();
        let query = "query Q($on: Boolean!) { me { id name @include(if: $on) } }";

        let mut variables = Object::default();
        variables.insert("on", json!(true));
        let with = plan(&schema, query, variables);
        let user = with.bucket("Query").unwrap()["me"].selections.as_ref().unwrap();
        assert!(user.bucket("User").unwrap().contains_key("name"));

        let mut variables = Object::default();
        variables.insert("on", json!(false));
        let without = plan(&schema, query, variables);
        let user = without.bucket("Query").unwrap()["me"]
            .selections
            .as_ref()
            .unwrap();
        assert!(!user.bucket("User").unwrap().contains_key("name"));
    }

    #[test]
    fn variable_defaults_reach_arguments() {
        let schema = user_schema();
        let plan = plan(
            &schema,
            "query Q($first: Int = 2) { me { friends(first: $first) { id } } }",
            Object::default(),
        );

        let user = plan.bucket("Query").unwrap()["me"].selections.as_ref().unwrap();
        assert_eq!(
            user.bucket("User").unwrap()["friends"].arguments,
            json!({ "first": 2 }).as_object().unwrap().clone()
        );
    }

    #[test]
    fn unbound_variable_arguments_are_dropped() {
        let schema = user_schema();
        let plan = plan(
            &schema,
            "query Q($first: Int) { me { friends(first: $first) { id } } }",
            Object::default(),
        );

        let user = plan.bucket("Query").unwrap()["me"].selections.as_ref().unwrap();
        assert!(user.bucket("User").unwrap()["friends"].arguments.is_empty());
    }

    #[test]
    fn undefined_fragments_are_rejected() {
        let schema = user_schema();
        let query = Query::parse("{ me { ...Gone } }", &schema).unwrap();
        let operation = query.operation(None).unwrap();
        let err = FieldPlan::collect(operation, &query.fragments, &Object::default(), &schema)
            .unwrap_err();
        assert!(matches!(err, SpecError::ParsingError(_)));
    }

    #[test]
    fn fragment_cycles_are_rejected() {
        let schema = user_schema();
        let query = Query::parse(
            r#"
            { me { ...A } }
            fragment A on User { ...B }
            fragment B on User { ...A }
            "#,
            &schema,
        )
        .unwrap();
        let operation = query.operation(None).unwrap();
        let err = FieldPlan::collect(operation, &query.fragments, &Object::default(), &schema)
            .unwrap_err();
        assert!(matches!(err, SpecError::RecursionLimitExceeded));
    }
}
