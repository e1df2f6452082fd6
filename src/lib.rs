//! shimmyplate: small directive-based text templating engine.
//!
//! A template is plain text with `${...}` directives. It is compiled once
//! into a flat operation sequence and can then be applied to any number of
//! data contexts, or inspected without data to learn which variables and
//! translations it needs.
//!
//! Supported directives:
//! - `${name}` / `${resolve:name:attr,attr|fmt+fmt}`: write a value.
//! - `${T:en='Hello',fr='Bonjour'}`: inline translation.
//! - `${if:path}`, `${if:path?}`, `${if:path == 'x'}` ... `${else}` ... `${end}`.
//! - `${for:items}` / `${for:items|3}` ... `${empty}` ... `${end}`, with
//!   `${this}` and `${i}` bound inside the loop.
//! - `${with:path}` ... `${end}`: rebind the context.
//!
//! Missing data never panics. In the default mode a missing variable or
//! translation becomes an inline `[[ERROR: ...]]` marker; in strict mode it
//! aborts the render. Values that cannot be written (mappings, booleans,
//! sequences) and unknown formatters always abort.
//!
//! ```
//! use serde_json::json;
//! use shimmyplate::{Template, Value};
//!
//! let template = Template::new("${for:items}${this.name},${end}").unwrap();
//! let data = Value::from(json!({"items": [{"name": "a"}, {"name": "b"}]}));
//! assert_eq!(template.render(&data).unwrap(), "a,b,");
//! assert_eq!(template.list_variables(), vec!["this.name"]);
//! ```

pub mod ast;
pub mod error;
pub mod eval;
pub mod formatters;
pub mod lexer;
pub mod parser;
pub mod schema;
pub mod value;

pub use ast::{Operation, Program, Translations};
pub use error::{Result, TemplateError};
pub use formatters::{Builtin, Formatter, FormatterRegistry};
pub use schema::Schema;
pub use value::Value;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Locale used when a template or render does not pick one.
pub const DEFAULT_LOCALE: &str = "en";

/// Runs over the rendered text, in registration order.
pub type PostProcessor = dyn Fn(String, &Template) -> String + Send + Sync;

/// A compiled template plus its render configuration.
#[derive(Clone)]
pub struct Template {
    program: Program,
    default_locale: String,
    formatters: FormatterRegistry,
    post_processors: Vec<Arc<PostProcessor>>,
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("program", &self.program)
            .field("default_locale", &self.default_locale)
            .field("formatters", &self.formatters.names())
            .field("post_processors", &self.post_processors.len())
            .finish()
    }
}

/// Per-render options.
#[derive(Debug, Clone)]
pub struct RenderOptions<'r> {
    pub locale: String,
    pub strict: bool,
    /// Replaces the template's registry for this render only.
    pub formatters: Option<&'r FormatterRegistry>,
}

impl Default for RenderOptions<'_> {
    fn default() -> Self {
        Self {
            locale: DEFAULT_LOCALE.to_string(),
            strict: false,
            formatters: None,
        }
    }
}

impl<'r> RenderOptions<'r> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn formatters(mut self, formatters: &'r FormatterRegistry) -> Self {
        self.formatters = Some(formatters);
        self
    }
}

impl Template {
    /// Compile `source`. Malformed directives fail with
    /// [`TemplateError::Syntax`].
    pub fn new(source: &str) -> Result<Self> {
        Ok(Self {
            program: compile(source)?,
            default_locale: DEFAULT_LOCALE.to_string(),
            formatters: FormatterRegistry::builtin(),
            post_processors: Vec::new(),
        })
    }

    /// Recompile in place. On error the template is left unchanged.
    pub fn set_source(&mut self, source: &str) -> Result<()> {
        self.program = compile(source)?;
        Ok(())
    }

    pub fn operations(&self) -> &[Operation] {
        &self.program
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    pub fn set_default_locale(&mut self, locale: impl Into<String>) {
        self.default_locale = locale.into();
    }

    pub fn formatters(&self) -> &FormatterRegistry {
        &self.formatters
    }

    pub fn set_formatters(&mut self, formatters: FormatterRegistry) {
        self.formatters = formatters;
    }

    pub fn add_post_processor<F>(&mut self, post_processor: F) -> &mut Self
    where
        F: Fn(String, &Template) -> String + Send + Sync + 'static,
    {
        self.post_processors.push(Arc::new(post_processor));
        self
    }

    /// Render with the default locale, non-strict, builtin formatters.
    pub fn render(&self, context: &Value) -> Result<String> {
        self.apply(context, &RenderOptions::default())
    }

    pub fn apply(&self, context: &Value, options: &RenderOptions<'_>) -> Result<String> {
        let settings = eval::Settings {
            locale: &options.locale,
            default_locale: &self.default_locale,
            strict: options.strict,
            formatters: options.formatters.unwrap_or(&self.formatters),
        };
        let rendered = eval::apply(&self.program, context, &settings)?;
        Ok(self
            .post_processors
            .iter()
            .fold(rendered, |text, post_processor| post_processor(text, self)))
    }

    /// Every resolved path as written, first occurrence first.
    pub fn list_variables(&self) -> Vec<&str> {
        schema::required_variables(&self.program)
    }

    pub fn list_translations(&self) -> Vec<&Translations> {
        schema::translations(&self.program)
    }

    /// The inferred shape of the data this template reads.
    pub fn schema(&self) -> Schema {
        schema::infer(&self.program)
    }
}

impl FromStr for Template {
    type Err = TemplateError;

    fn from_str(source: &str) -> Result<Self> {
        Template::new(source)
    }
}

fn compile(source: &str) -> Result<Program> {
    let program = parser::decompose(source)?;
    debug!(operations = program.len(), bytes = source.len(), "compiled template");
    Ok(program)
}

/// Compile and render `source` in one step with default options.
pub fn render(source: &str, context: &Value) -> Result<String> {
    Template::new(source)?.render(context)
}
