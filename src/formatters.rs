//! Named value formatters applied by `${name|fmt1+fmt2}`.
//!
//! The builtins form a closed set; a [`FormatterRegistry`] maps names to
//! builtins or caller-supplied functions and is built once, then consulted
//! per resolve. Looking up a name that is not registered is a fatal render
//! error, never a parse error.

use crate::ast::Resolve;
use crate::error::{Result, TemplateError};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// `(value, locale, directive) -> text`
pub type FormatterFn = dyn Fn(&Value, &str, &Resolve) -> Result<String> + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Json,
    EscapeHtml,
    Repr,
}

impl Builtin {
    pub const ALL: [Builtin; 3] = [Builtin::Json, Builtin::EscapeHtml, Builtin::Repr];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Json => "json",
            Builtin::EscapeHtml => "escapeHTML",
            Builtin::Repr => "repr",
        }
    }

    pub fn apply(self, value: &Value, resolve: &Resolve) -> Result<String> {
        match self {
            Builtin::Json => Ok(to_json(value)),
            Builtin::EscapeHtml => match value {
                Value::String(s) => Ok(escape_html(s)),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(TemplateError::InvalidOutputType {
                    path: resolve.path.clone(),
                    found: other.kind(),
                }),
            },
            Builtin::Repr => Ok(match value {
                Value::String(s) => format!("{s:?}"),
                other => to_json(other),
            }),
        }
    }
}

fn to_json(value: &Value) -> String {
    serde_json::Value::from(value.clone()).to_string()
}

/// Escape `&`, `<` and `>`. Quotes are left alone.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Clone)]
pub enum Formatter {
    Builtin(Builtin),
    Custom(Arc<FormatterFn>),
}

impl Formatter {
    pub fn apply(&self, value: &Value, locale: &str, resolve: &Resolve) -> Result<String> {
        match self {
            Formatter::Builtin(builtin) => builtin.apply(value, resolve),
            Formatter::Custom(f) => f(value, locale, resolve),
        }
    }
}

impl fmt::Debug for Formatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formatter::Builtin(builtin) => write!(f, "Builtin({})", builtin.name()),
            Formatter::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FormatterRegistry {
    table: HashMap<String, Formatter>,
}

impl Default for FormatterRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FormatterRegistry {
    /// Registry holding `json`, `escapeHTML` and `repr`.
    pub fn builtin() -> Self {
        let table = Builtin::ALL
            .into_iter()
            .map(|b| (b.name().to_string(), Formatter::Builtin(b)))
            .collect();
        Self { table }
    }

    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Register (or replace) a named formatter.
    pub fn register<F>(&mut self, name: impl Into<String>, formatter: F) -> &mut Self
    where
        F: Fn(&Value, &str, &Resolve) -> Result<String> + Send + Sync + 'static,
    {
        self.table
            .insert(name.into(), Formatter::Custom(Arc::new(formatter)));
        self
    }

    pub fn get(&self, name: &str) -> Result<&Formatter> {
        self.table
            .get(name)
            .ok_or_else(|| TemplateError::UnknownFormatter {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.table.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn directive(path: &str) -> Resolve {
        Resolve {
            path: path.to_string(),
            attributes: None,
            formatters: Vec::new(),
            prefix: String::new(),
        }
    }

    #[test]
    fn builtin_names() {
        let registry = FormatterRegistry::builtin();
        assert_eq!(registry.names(), vec!["escapeHTML", "json", "repr"]);
    }

    #[test]
    fn json_encodes_any_value() {
        let value = Value::from(json!({"a": [1, "two", null]}));
        let out = Builtin::Json.apply(&value, &directive("a")).unwrap();
        assert_eq!(out, r#"{"a":[1,"two",null]}"#);
        let out = Builtin::Json.apply(&Value::from("say \"hi\""), &directive("a")).unwrap();
        assert_eq!(out, r#""say \"hi\"""#);
    }

    #[test]
    fn escape_html_handles_markup() {
        let out = Builtin::EscapeHtml
            .apply(&Value::from("<a href=\"x\">Tom & Jerry's</a>"), &directive("a"))
            .unwrap();
        assert_eq!(out, "&lt;a href=\"x\"&gt;Tom &amp; Jerry's&lt;/a&gt;");

        let err = Builtin::EscapeHtml
            .apply(&Value::Null, &directive("missing"))
            .unwrap_err();
        assert_eq!(
            err,
            TemplateError::InvalidOutputType {
                path: "missing".to_string(),
                found: "null"
            }
        );
    }

    #[test]
    fn repr_quotes_strings() {
        assert_eq!(Builtin::Repr.apply(&Value::from("a\nb"), &directive("a")).unwrap(), "\"a\\nb\"");
        assert_eq!(Builtin::Repr.apply(&Value::from(3_i64), &directive("a")).unwrap(), "3");
    }

    #[test]
    fn custom_formatters_and_unknown_names() {
        let mut registry = FormatterRegistry::empty();
        registry.register("upper", |value: &Value, _: &str, _: &Resolve| match value {
            Value::String(s) => Ok(s.to_uppercase()),
            other => Ok(format!("{other:?}")),
        });
        let formatter = registry.get("upper").unwrap();
        assert_eq!(formatter.apply(&Value::from("ann"), "en", &directive("a")).unwrap(), "ANN");

        assert_eq!(
            registry.get("json").unwrap_err(),
            TemplateError::UnknownFormatter {
                name: "json".to_string()
            }
        );
    }
}
