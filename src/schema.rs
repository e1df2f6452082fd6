//! Static inference of the data shape a template expects.
//!
//! The inferencer walks every operation once, both sides of every `if` and
//! the body of every `for`, and records each path the template touches. It
//! rewrites `this` and `with`-relative paths the same way the interpreter
//! resolves them, so `${this.name}` inside `${for:items}` lands on
//! `items[].name`.

use crate::ast::{absolute_path, Operation, Translations};
use indexmap::{IndexMap, IndexSet};
use serde_json::json;

#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    Scalar { attributes: Option<Vec<String>> },
    Sequence(Box<Schema>),
    /// Slots in first-seen order.
    Mapping(IndexMap<String, Schema>),
}

impl Schema {
    pub fn scalar() -> Self {
        Schema::Scalar { attributes: None }
    }

    pub fn sequence() -> Self {
        Schema::Sequence(Box::new(Schema::scalar()))
    }

    pub fn mapping() -> Self {
        Schema::Mapping(IndexMap::new())
    }

    /// Slot names of a mapping, in declaration order.
    pub fn order(&self) -> Vec<&str> {
        match self {
            Schema::Mapping(slots) => slots.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Navigate a dotted path; sequences are entered transparently.
    pub fn slot(&self, path: &str) -> Option<&Schema> {
        path.split('.').try_fold(self, |schema, name| {
            let mut current = schema;
            while let Schema::Sequence(element) = current {
                current = element;
            }
            match current {
                Schema::Mapping(slots) => slots.get(name),
                _ => None,
            }
        })
    }

    /// Declare `schema` at `path`, creating intermediate mappings.
    pub fn define(&mut self, path: &str, schema: Schema) {
        match self {
            Schema::Sequence(element) => {
                if matches!(**element, Schema::Scalar { .. }) {
                    **element = Schema::mapping();
                }
                element.define(path, schema);
            }
            Schema::Scalar { .. } => {
                *self = Schema::mapping();
                self.define(path, schema);
            }
            Schema::Mapping(slots) => match path.split_once('.') {
                None => match slots.get_mut(path) {
                    Some(existing) => existing.merge(schema),
                    None => {
                        slots.insert(path.to_string(), schema);
                    }
                },
                Some((name, rest)) => slots
                    .entry(name.to_string())
                    .or_insert_with(Schema::mapping)
                    .define(rest, schema),
            },
        }
    }

    /// Re-declaration augments: containers win over scalars, scalar
    /// attributes are unioned.
    fn merge(&mut self, incoming: Schema) {
        match incoming {
            Schema::Scalar { attributes: new } => {
                if let (Schema::Scalar { attributes }, Some(new)) = (self, new) {
                    let list = attributes.get_or_insert_with(Vec::new);
                    for attribute in new {
                        if !list.contains(&attribute) {
                            list.push(attribute);
                        }
                    }
                }
            }
            container => {
                if std::mem::discriminant(self) != std::mem::discriminant(&container) {
                    *self = container;
                }
            }
        }
    }

    /// JSON type signature: `"Any"` (or `{"value": "Any", "attributes": [..]}`)
    /// for scalars, `[element]` for sequences and
    /// `{"order": [..], "values": {..}}` for mappings.
    pub fn export(&self) -> serde_json::Value {
        match self {
            Schema::Scalar {
                attributes: Some(attributes),
            } if !attributes.is_empty() => json!({"value": "Any", "attributes": attributes}),
            Schema::Scalar { .. } => json!("Any"),
            Schema::Sequence(element) => json!([element.export()]),
            Schema::Mapping(slots) => {
                let values: serde_json::Map<String, serde_json::Value> = slots
                    .iter()
                    .map(|(name, schema)| (name.clone(), schema.export()))
                    .collect();
                json!({"order": self.order(), "values": values})
            }
        }
    }
}

struct Scope {
    this: String,
    context: String,
    is_loop: bool,
}

/// Infer the schema of every variable `program` reads.
pub fn infer(program: &[Operation]) -> Schema {
    let mut root = Schema::mapping();
    let mut this = String::new();
    let mut context = String::new();
    let mut stack: Vec<Scope> = Vec::new();
    let mut loops = 0usize;

    for operation in program {
        match operation {
            Operation::Resolve(resolve) => {
                // The loop index is bound by the loop, not read from data.
                if loops > 0 && resolve.path == "i" {
                    continue;
                }
                let name = absolute_path(&resolve.path, &this, &context);
                if !name.is_empty() {
                    root.define(
                        &name,
                        Schema::Scalar {
                            attributes: resolve.attributes.clone(),
                        },
                    );
                }
            }
            Operation::If(_) => stack.push(Scope {
                this: this.clone(),
                context: context.clone(),
                is_loop: false,
            }),
            Operation::For { path, .. } => {
                let name = absolute_path(path, &this, &context);
                if !name.is_empty() {
                    root.define(&name, Schema::sequence());
                }
                stack.push(Scope {
                    this: std::mem::replace(&mut this, name),
                    context: context.clone(),
                    is_loop: true,
                });
                loops += 1;
            }
            Operation::With { path } => {
                let name = absolute_path(path, &this, &context);
                if !name.is_empty() {
                    root.define(&name, Schema::mapping());
                }
                stack.push(Scope {
                    this: std::mem::replace(&mut this, name.clone()),
                    context: std::mem::replace(&mut context, name),
                    is_loop: false,
                });
            }
            Operation::End => {
                if let Some(scope) = stack.pop() {
                    this = scope.this;
                    context = scope.context;
                    if scope.is_loop {
                        loops -= 1;
                    }
                }
            }
            Operation::Literal(_) | Operation::Translate(_) | Operation::Else => {}
        }
    }
    root
}

/// Every resolved path as written, de-duplicated, in first-seen order.
pub fn required_variables(program: &[Operation]) -> Vec<&str> {
    program
        .iter()
        .filter_map(|operation| match operation {
            Operation::Resolve(resolve) => Some(resolve.path.as_str()),
            _ => None,
        })
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

/// Every translation map, in template order.
pub fn translations(program: &[Operation]) -> Vec<&Translations> {
    program
        .iter()
        .filter_map(|operation| match operation {
            Operation::Translate(translations) => Some(translations),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::decompose;

    fn schema_of(source: &str) -> Schema {
        infer(&decompose(source).unwrap())
    }

    #[test]
    fn both_branches_are_visited() {
        let program = decompose("${if:x}${resolve:a}${else}${resolve:b}${end}").unwrap();
        assert_eq!(required_variables(&program), vec!["a", "b"]);
        assert_eq!(infer(&program).order(), vec!["a", "b"]);
    }

    #[test]
    fn declaration_order_and_dedup() {
        let source = "${zeta} ${alpha.one} ${zeta} ${alpha.two} ${beta}";
        let schema = schema_of(source);
        assert_eq!(schema.order(), vec!["zeta", "alpha", "beta"]);
        assert_eq!(schema.slot("alpha").unwrap().order(), vec!["one", "two"]);
        let program = decompose(source).unwrap();
        assert_eq!(required_variables(&program), vec!["zeta", "alpha.one", "alpha.two", "beta"]);
    }

    #[test]
    fn loop_bodies_describe_elements() {
        let schema = schema_of("${for:items}${this.name} ${this.price:money} ${i}${end}");
        let Some(Schema::Sequence(element)) = schema.slot("items") else {
            panic!("items should be a sequence: {:?}", schema);
        };
        assert_eq!(element.order(), vec!["name", "price"]);
        assert_eq!(
            schema.slot("items.price"),
            Some(&Schema::Scalar {
                attributes: Some(vec!["money".to_string()])
            })
        );
        // `i` is the loop index, not data.
        assert_eq!(schema.order(), vec!["items"]);
    }

    #[test]
    fn nested_loops_and_with_blocks() {
        let schema = schema_of(
            "${for:groups}${for:this.members}${this.email}${end}${with:this.owner}${name}${end}${end}${title}",
        );
        assert_eq!(schema.order(), vec!["groups", "title"]);
        assert!(matches!(schema.slot("groups.members"), Some(Schema::Sequence(_))));
        assert!(schema.slot("groups.members.email").is_some());
        assert!(matches!(schema.slot("groups.owner"), Some(Schema::Mapping(_))));
        assert!(schema.slot("groups.owner.name").is_some());
        assert!(schema.slot("name").is_none());
    }

    #[test]
    fn containers_win_over_scalars() {
        let schema = schema_of("${items}${for:items}${this.a}${end}${items}");
        assert!(matches!(schema.slot("items"), Some(Schema::Sequence(_))));
        assert!(schema.slot("items.a").is_some());
    }

    #[test]
    fn translations_contribute_no_slot() {
        let program = decompose("${T:en=Hi,fr=Salut}${name}${T:en=Bye}").unwrap();
        assert_eq!(infer(&program).order(), vec!["name"]);
        let maps = translations(&program);
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[0].get("fr").map(String::as_str), Some("Salut"));
    }

    #[test]
    fn export_shape() {
        let schema = schema_of("${title:required}${for:items}${this.name}${end}${for:tags}${end}");
        assert_eq!(
            schema.export(),
            json!({
                "order": ["title", "items", "tags"],
                "values": {
                    "title": {"value": "Any", "attributes": ["required"]},
                    "items": [{"order": ["name"], "values": {"name": "Any"}}],
                    "tags": ["Any"]
                }
            })
        );
    }
}
