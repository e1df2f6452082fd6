use crate::value::Value;
use indexmap::IndexMap;
use std::num::NonZeroUsize;

/// Locale code (lower-cased) to literal text, in declaration order.
pub type Translations = IndexMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Eq, // ==
    Ne, // !=
    Gt, // >
    Lt, // <
    Ge, // >=
    Le, // <=
}

#[derive(Debug, Clone, PartialEq)]
pub enum Test {
    /// `${if:name}`
    Truthy,
    /// `${if:name?}`: at least one truthy element.
    Populated,
    /// `${if:name OP literal}`
    Compare(Comparison, Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub path: String,
    pub test: Test,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolve {
    pub path: String,
    /// Free-form tags after `:`, carried into the schema; never evaluated.
    pub attributes: Option<Vec<String>>,
    /// Formatter names after `|`, applied left to right.
    pub formatters: Vec<String>,
    /// Line break and indentation preceding the directive when it sits on
    /// its own line, empty otherwise. Not written to the output; formatters
    /// can read it.
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Literal(String),
    Resolve(Resolve),
    Translate(Translations),
    If(Condition),
    Else,
    For {
        path: String,
        /// `None` iterates the whole collection.
        limit: Option<NonZeroUsize>,
    },
    With {
        path: String,
    },
    End,
}

pub type Program = Vec<Operation>;

/// If `path` addresses the current scope value, returns the remainder after
/// `this` (empty for a bare `this`).
pub(crate) fn strip_this(path: &str) -> Option<&str> {
    match path.strip_prefix("this")? {
        "" => Some(""),
        rest => rest.strip_prefix('.'),
    }
}

pub(crate) fn join_path(prefix: &str, rest: &str) -> String {
    match (prefix.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{prefix}.{rest}"),
    }
}

/// Rewrite a template path to its absolute dot-path.
///
/// `this` paths hang off `scope` (the path bound by the innermost `for` or
/// `with`); other paths are relative to `context` (the path bound by the
/// innermost `with`).
pub(crate) fn absolute_path(path: &str, scope: &str, context: &str) -> String {
    match strip_this(path) {
        Some(rest) => join_path(scope, rest),
        None => join_path(context, path),
    }
}
