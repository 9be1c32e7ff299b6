use std::collections::HashMap;
use std::collections::HashSet;

use apollo_compiler::ast;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::validation::Valid;
use serde_json_bytes::Value;

use crate::error::SchemaError;
use crate::spec::FieldType;
use crate::spec::OperationKind;
use crate::spec::introspection::IntrospectionResult;
use crate::spec::introspection::TypeDef;
use crate::spec::introspection::TypeKind;

/// Index over the service schema: field types per composite type, abstract
/// type membership and root operation names.
///
/// Built once, from SDL or from a standard introspection result, then shared
/// by every walk over operation documents.
#[derive(Debug)]
pub struct Schema {
    query_root: String,
    mutation_root: Option<String>,
    subscription_root: Option<String>,
    /// Composite type name to its field definitions.
    fields: HashMap<String, HashMap<String, FieldType>>,
    /// Abstract type name to the types declared to stand in for it.
    subtype_map: HashMap<String, HashSet<String>>,
    /// Abstract type name to every concrete object type it can resolve to.
    possible_types: HashMap<String, HashSet<String>>,
    /// Concrete object type names.
    objects: HashSet<String>,
}

impl Schema {
    /// Build the index from schema SDL.
    pub fn parse(sdl: &str) -> Result<Self, SchemaError> {
        let mut parser = apollo_compiler::parser::Parser::new();
        let result = parser.parse_ast(sdl, "schema.graphql");

        let recursion_limit = parser.recursion_reached();
        tracing::trace!(?recursion_limit, "recursion limit data");

        let definitions = result
            .map_err(|invalid| SchemaError::Parse(invalid.into()))?
            .to_schema_validate()
            .map_err(|invalid| SchemaError::Validate(invalid.into()))?;
        Self::from_definitions(&definitions)
    }

    /// Build the index from the JSON result of the standard introspection
    /// query. Both a bare `{"__schema": ...}` object and a full response
    /// with the usual `{"data": ...}` envelope are accepted.
    pub fn from_introspection(response: Value) -> Result<Self, SchemaError> {
        let response = match response {
            Value::Object(mut object) => match object.remove("data") {
                Some(data) => data,
                None => Value::Object(object),
            },
            other => other,
        };
        let introspection: IntrospectionResult = serde_json_bytes::from_value(response)
            .map_err(|err| SchemaError::Introspection(err.to_string()))?;

        let mut fields: HashMap<String, HashMap<String, FieldType>> = HashMap::new();
        let mut subtype_map: HashMap<String, HashSet<String>> = HashMap::new();
        let mut objects = HashSet::new();

        for ty in &introspection.schema.types {
            let Some(name) = ty.name.as_deref() else {
                continue;
            };
            if name.starts_with("__") {
                continue;
            }
            match ty.kind {
                TypeKind::Object => {
                    objects.insert(name.to_owned());
                    fields.insert(name.to_owned(), field_map(ty)?);
                    for interface in ty.interfaces.iter().flatten() {
                        subtype_map
                            .entry(interface.inner_name()?.to_owned())
                            .or_default()
                            .insert(name.to_owned());
                    }
                }
                TypeKind::Interface => {
                    fields.insert(name.to_owned(), field_map(ty)?);
                    let members = subtype_map.entry(name.to_owned()).or_default();
                    for possible in ty.possible_types.iter().flatten() {
                        members.insert(possible.inner_name()?.to_owned());
                    }
                    for interface in ty.interfaces.iter().flatten() {
                        subtype_map
                            .entry(interface.inner_name()?.to_owned())
                            .or_default()
                            .insert(name.to_owned());
                    }
                }
                TypeKind::Union => {
                    let members = subtype_map.entry(name.to_owned()).or_default();
                    for possible in ty.possible_types.iter().flatten() {
                        members.insert(possible.inner_name()?.to_owned());
                    }
                }
                TypeKind::Scalar
                | TypeKind::Enum
                | TypeKind::InputObject
                | TypeKind::List
                | TypeKind::NonNull => {}
            }
        }

        let query_root = introspection
            .schema
            .query_type
            .ok_or(SchemaError::MissingQueryRoot)?
            .name;

        let possible_types = close_possible_types(&subtype_map, &objects);
        Ok(Self {
            query_root,
            mutation_root: introspection.schema.mutation_type.map(|ty| ty.name),
            subscription_root: introspection.schema.subscription_type.map(|ty| ty.name),
            fields,
            subtype_map,
            possible_types,
            objects,
        })
    }

    fn from_definitions(definitions: &Valid<apollo_compiler::Schema>) -> Result<Self, SchemaError> {
        let mut fields: HashMap<String, HashMap<String, FieldType>> = HashMap::new();
        let mut subtype_map: HashMap<String, HashSet<String>> = HashMap::new();
        let mut objects = HashSet::new();

        for (name, ty) in &definitions.types {
            if name.as_str().starts_with("__") {
                continue;
            }
            match ty {
                ExtendedType::Object(object) => {
                    objects.insert(name.as_str().to_owned());
                    fields.insert(
                        name.as_str().to_owned(),
                        object
                            .fields
                            .iter()
                            .map(|(field_name, field)| {
                                (field_name.as_str().to_owned(), FieldType::from(&field.ty))
                            })
                            .collect(),
                    );
                    for interface in &object.implements_interfaces {
                        subtype_map
                            .entry(interface.as_str().to_owned())
                            .or_default()
                            .insert(name.as_str().to_owned());
                    }
                }
                ExtendedType::Interface(interface) => {
                    fields.insert(
                        name.as_str().to_owned(),
                        interface
                            .fields
                            .iter()
                            .map(|(field_name, field)| {
                                (field_name.as_str().to_owned(), FieldType::from(&field.ty))
                            })
                            .collect(),
                    );
                    subtype_map.entry(name.as_str().to_owned()).or_default();
                    for implemented in &interface.implements_interfaces {
                        subtype_map
                            .entry(implemented.as_str().to_owned())
                            .or_default()
                            .insert(name.as_str().to_owned());
                    }
                }
                ExtendedType::Union(union_) => {
                    subtype_map
                        .entry(name.as_str().to_owned())
                        .or_default()
                        .extend(union_.members.iter().map(|member| member.as_str().to_owned()));
                }
                ExtendedType::Scalar(_) | ExtendedType::Enum(_) | ExtendedType::InputObject(_) => {}
            }
        }

        let query_root = definitions
            .root_operation(ast::OperationType::Query)
            .map(|name| name.as_str().to_owned())
            .ok_or(SchemaError::MissingQueryRoot)?;

        let possible_types = close_possible_types(&subtype_map, &objects);
        Ok(Self {
            query_root,
            mutation_root: definitions
                .root_operation(ast::OperationType::Mutation)
                .map(|name| name.as_str().to_owned()),
            subscription_root: definitions
                .root_operation(ast::OperationType::Subscription)
                .map(|name| name.as_str().to_owned()),
            fields,
            subtype_map,
            possible_types,
            objects,
        })
    }

    pub(crate) fn field_type(&self, type_name: &str, field_name: &str) -> Option<&FieldType> {
        self.fields.get(type_name)?.get(field_name)
    }

    /// Whether every concrete type `maybe_subtype` can resolve to is also a
    /// possible type of `abstract_type`. A type is not a subtype of itself.
    pub(crate) fn is_subtype(&self, abstract_type: &str, maybe_subtype: &str) -> bool {
        if abstract_type == maybe_subtype {
            return false;
        }
        let Some(possible) = self.possible_types.get(abstract_type) else {
            return false;
        };
        if self.objects.contains(maybe_subtype) {
            return possible.contains(maybe_subtype);
        }
        self.possible_types
            .get(maybe_subtype)
            .is_some_and(|subtypes| !subtypes.is_empty() && subtypes.is_subset(possible))
    }

    pub(crate) fn is_abstract(&self, type_name: &str) -> bool {
        self.subtype_map.contains_key(type_name)
    }

    /// Concrete object types an abstract type can stand for.
    pub(crate) fn possible_types(&self, abstract_type: &str) -> Option<&HashSet<String>> {
        self.possible_types.get(abstract_type)
    }

    pub(crate) fn is_object(&self, type_name: &str) -> bool {
        self.objects.contains(type_name)
    }

    /// Whether the name is an object, interface or union type.
    pub(crate) fn is_composite(&self, type_name: &str) -> bool {
        self.fields.contains_key(type_name) || self.subtype_map.contains_key(type_name)
    }

    pub(crate) fn root_operation_name(&self, kind: OperationKind) -> Option<&str> {
        match kind {
            OperationKind::Query => Some(self.query_root.as_str()),
            OperationKind::Mutation => self.mutation_root.as_deref(),
            OperationKind::Subscription => self.subscription_root.as_deref(),
        }
    }

    pub(crate) fn root_type_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.query_root.as_str())
            .chain(self.mutation_root.as_deref())
            .chain(self.subscription_root.as_deref())
    }
}

fn field_map(ty: &TypeDef) -> Result<HashMap<String, FieldType>, SchemaError> {
    ty.fields
        .iter()
        .flatten()
        .map(|field| Ok((field.name.clone(), FieldType::try_from(&field.ty)?)))
        .collect()
}

/// Resolve each abstract type down to the concrete object types it can stand
/// for, following declared subtypes through intermediate interfaces.
fn close_possible_types(
    subtype_map: &HashMap<String, HashSet<String>>,
    objects: &HashSet<String>,
) -> HashMap<String, HashSet<String>> {
    subtype_map
        .keys()
        .map(|name| {
            let mut possible = HashSet::new();
            let mut seen = HashSet::new();
            let mut stack: Vec<&str> = vec![name];
            while let Some(current) = stack.pop() {
                if !seen.insert(current) {
                    continue;
                }
                if let Some(subtypes) = subtype_map.get(current) {
                    stack.extend(subtypes.iter().map(String::as_str));
                } else if objects.contains(current) {
                    possible.insert(current.to_owned());
                }
            }
            (name.clone(), possible)
        })
        .collect()
}
