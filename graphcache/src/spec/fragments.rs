use std::collections::HashMap;

use apollo_compiler::ast;

use crate::spec::IncludeSkip;
use crate::spec::Schema;
use crate::spec::Selection;
use crate::spec::SpecError;

#[derive(Debug, Default)]
pub(crate) struct Fragments {
    map: HashMap<String, Fragment>,
}

impl Fragments {
    pub(crate) fn from_ast(document: &ast::Document, schema: &Schema) -> Result<Self, SpecError> {
        let map = document
            .definitions
            .iter()
            .filter_map(|definition| match definition {
                // Spec: https://spec.graphql.org/draft/#FragmentDefinition
                ast::Definition::FragmentDefinition(fragment) => Some(fragment),
                _ => None,
            })
            .map(|fragment| {
                let type_condition = fragment.type_condition.as_str().to_owned();

                let selection_set = fragment
                    .selection_set
                    .iter()
                    .map(|selection| Selection::from_ast(selection, &type_condition, schema, 0))
                    .collect::<Result<Vec<Option<_>>, _>>()?
                    .into_iter()
                    .flatten()
                    .collect();

                Ok((
                    fragment.name.as_str().to_owned(),
                    Fragment {
                        type_condition,
                        selection_set,
                        include_skip: IncludeSkip::parse(&fragment.directives),
                    },
                ))
            })
            .collect::<Result<_, SpecError>>()?;
        Ok(Fragments { map })
    }

    pub(crate) fn get(&self, key: impl AsRef<str>) -> Option<&Fragment> {
        self.map.get(key.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Fragment {
    pub(crate) type_condition: String,
    pub(crate) selection_set: Vec<Selection>,
    pub(crate) include_skip: IncludeSkip,
}
