//! Stack interpreter for compiled operation sequences.
//!
//! Blocks are not nested in the program; `if`, `for` and `with` push a
//! [`Frame`] and the matching `end` pops it. Output suppression for false
//! branches and empty loops is a single mute flag: muted operations still do
//! their structural bookkeeping, they just emit nothing. A `for` frame
//! re-executes its body by moving the instruction pointer back to the first
//! body operation.
//!
//! `this` and `i` are never written into the caller's data. They are read off
//! the frame stack: `this` is the value bound by the innermost `for` or
//! `with`, `i` the index of the innermost `for`.

use crate::ast::*;
use crate::error::{Result, TemplateError};
use crate::formatters::FormatterRegistry;
use crate::value::Value;
use indexmap::IndexMap;
use std::borrow::Cow;
use std::cmp::Ordering;
use tracing::{debug, trace, warn};

static NULL: Value = Value::Null;

/// Per-render settings, resolved by the caller.
#[derive(Debug, Clone, Copy)]
pub struct Settings<'r> {
    pub locale: &'r str,
    pub default_locale: &'r str,
    pub strict: bool,
    pub formatters: &'r FormatterRegistry,
}

/// State in effect before a block opened, restored when it closes.
#[derive(Debug)]
struct Saved<'a> {
    context: Option<&'a Value>,
    context_path: String,
    scope_path: String,
    mute: bool,
}

#[derive(Debug)]
enum Frame<'a> {
    If {
        saved: Saved<'a>,
    },
    For {
        saved: Saved<'a>,
        body_start: usize,
        index: usize,
        limit: usize,
        items: Vec<&'a Value>,
    },
    With {
        saved: Saved<'a>,
        value: Option<&'a Value>,
    },
}

impl<'a> Frame<'a> {
    fn saved(&self) -> &Saved<'a> {
        match self {
            Frame::If { saved } | Frame::For { saved, .. } | Frame::With { saved, .. } => saved,
        }
    }

    fn into_saved(self) -> Saved<'a> {
        match self {
            Frame::If { saved } | Frame::For { saved, .. } | Frame::With { saved, .. } => saved,
        }
    }
}

/// Execute `program` against `context`.
pub fn apply(program: &[Operation], context: &Value, settings: &Settings<'_>) -> Result<String> {
    Evaluator::new(program, context, *settings).run()
}

pub struct Evaluator<'p, 'a> {
    program: &'p [Operation],
    settings: Settings<'p>,
    /// Render locale, lower-cased once for every lookup.
    locale: String,
    stack: Vec<Frame<'a>>,
    context: Option<&'a Value>,
    /// Absolute path of `context`, set by `with`.
    context_path: String,
    /// Absolute path `this` stands for, set by `for` and `with`.
    scope_path: String,
    mute: bool,
    output: Vec<Cow<'p, str>>,
}

impl<'p, 'a> Evaluator<'p, 'a> {
    pub fn new(program: &'p [Operation], context: &'a Value, settings: Settings<'p>) -> Self {
        Self {
            program,
            settings,
            locale: settings.locale.to_lowercase(),
            stack: Vec::new(),
            context: Some(context),
            context_path: String::new(),
            scope_path: String::new(),
            mute: false,
            output: Vec::new(),
        }
    }

    pub fn run(mut self) -> Result<String> {
        let program = self.program;
        let mut pc = 0;
        while let Some(operation) = program.get(pc) {
            pc += 1;
            match operation {
                Operation::Literal(text) => self.emit_literal(text),
                Operation::Resolve(resolve) => {
                    if !self.mute {
                        self.resolve(resolve)?;
                    }
                }
                Operation::Translate(translations) => {
                    if !self.mute {
                        self.translate(translations)?;
                    }
                }
                Operation::If(condition) => {
                    let saved = self.save();
                    let holds = self.evaluate(condition);
                    self.stack.push(Frame::If { saved });
                    self.mute = self.mute || !holds;
                }
                Operation::Else => {
                    let Some(frame) = self.stack.last() else {
                        return Err(TemplateError::InternalConsistency(format!(
                            "else outside of a block at operation {}",
                            pc - 1
                        )));
                    };
                    // A muted enclosing block stays muted.
                    self.mute = frame.saved().mute || !self.mute;
                }
                Operation::For { path, limit } => {
                    let saved = self.save();
                    let items = match self.lookup(path) {
                        Some(Cow::Borrowed(collection)) => collection.items().unwrap_or_default(),
                        _ => Vec::new(),
                    };
                    let limit = limit.map_or(items.len(), |l| l.get().min(items.len()));
                    trace!(path = %path, len = items.len(), limit, "entering loop");
                    if items.is_empty() {
                        self.mute = true;
                    }
                    self.scope_path = absolute_path(path, &self.scope_path, &self.context_path);
                    self.stack.push(Frame::For {
                        saved,
                        body_start: pc,
                        index: 0,
                        limit,
                        items,
                    });
                }
                Operation::With { path } => {
                    let saved = self.save();
                    let value = match self.lookup(path) {
                        Some(Cow::Borrowed(value)) => Some(value),
                        _ => None,
                    };
                    let absolute = absolute_path(path, &self.scope_path, &self.context_path);
                    self.stack.push(Frame::With { saved, value });
                    self.context = value;
                    self.scope_path = absolute.clone();
                    self.context_path = absolute;
                }
                Operation::End => {
                    let Some(frame) = self.stack.last_mut() else {
                        return Err(TemplateError::InternalConsistency(format!(
                            "end without an open block at operation {}",
                            pc - 1
                        )));
                    };
                    if let Frame::For {
                        saved,
                        body_start,
                        index,
                        limit,
                        ..
                    } = frame
                    {
                        *index += 1;
                        if *index < *limit {
                            trace!(index = *index, "next iteration");
                            self.mute = saved.mute;
                            pc = *body_start;
                            continue;
                        }
                    }
                    if let Some(frame) = self.stack.pop() {
                        self.restore(frame.into_saved());
                    }
                }
            }
        }

        if !self.stack.is_empty() {
            return Err(TemplateError::InternalConsistency(format!(
                "{} block(s) left open at end of template",
                self.stack.len()
            )));
        }
        debug!(fragments = self.output.len(), "render finished");
        Ok(self.output.concat())
    }

    fn save(&self) -> Saved<'a> {
        Saved {
            context: self.context,
            context_path: self.context_path.clone(),
            scope_path: self.scope_path.clone(),
            mute: self.mute,
        }
    }

    fn restore(&mut self, saved: Saved<'a>) {
        self.context = saved.context;
        self.context_path = saved.context_path;
        self.scope_path = saved.scope_path;
        self.mute = saved.mute;
    }

    fn emit_literal(&mut self, text: &'p str) {
        if self.mute {
            return;
        }
        // Lets a template open with a block directive on its own line
        // without starting the output with a blank line.
        let text = match text.strip_prefix('\n') {
            Some(rest) if self.output.is_empty() && !self.stack.is_empty() => rest,
            _ => text,
        };
        if !text.is_empty() {
            self.output.push(Cow::Borrowed(text));
        }
    }

    /// Value bound to `this`: `Some(None)` inside an empty loop, `None` at
    /// top level.
    fn scope_value(&self) -> Option<Option<&'a Value>> {
        self.stack.iter().rev().find_map(|frame| match frame {
            Frame::For { items, index, .. } => Some(items.get(*index).copied()),
            Frame::With { value, .. } => Some(*value),
            Frame::If { .. } => None,
        })
    }

    fn loop_index(&self) -> Option<i64> {
        self.stack.iter().rev().find_map(|frame| match frame {
            Frame::For { items, .. } if items.is_empty() => Some(-1),
            Frame::For { index, .. } => i64::try_from(*index).ok(),
            _ => None,
        })
    }

    fn lookup(&self, path: &str) -> Option<Cow<'a, Value>> {
        if let Some(rest) = strip_this(path) {
            let value = self.scope_value().flatten()?;
            return value.lookup(rest).map(Cow::Borrowed);
        }
        if path == "i" {
            if let Some(index) = self.loop_index() {
                return Some(Cow::Owned(Value::from(index)));
            }
        }
        self.context?.lookup(path).map(Cow::Borrowed)
    }

    fn select_locale<'m>(&self, map: &'m IndexMap<String, Value>) -> Option<&'m Value> {
        let find = |locale: &str| {
            map.iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(locale))
                .map(|(_, value)| value)
        };
        find(&self.locale).or_else(|| find(self.settings.default_locale))
    }

    fn evaluate(&self, condition: &Condition) -> bool {
        let value = self.lookup(&condition.path);
        match &condition.test {
            Test::Truthy => value.is_some_and(|v| v.is_truthy()),
            Test::Populated => value.is_some_and(|v| v.is_populated()),
            Test::Compare(comparison, literal) => {
                let lhs = value.as_deref().unwrap_or(&NULL);
                let ordering = lhs.scalar_cmp(literal);
                match comparison {
                    Comparison::Eq => lhs.loose_eq(literal),
                    Comparison::Ne => !lhs.loose_eq(literal),
                    Comparison::Gt => ordering == Some(Ordering::Greater),
                    Comparison::Lt => ordering == Some(Ordering::Less),
                    Comparison::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
                    Comparison::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                }
            }
        }
    }

    fn resolve(&mut self, resolve: &'p Resolve) -> Result<()> {
        let mut value = match self.lookup(&resolve.path) {
            Some(Cow::Borrowed(Value::LocaleMap(map))) => self.select_locale(map).map(Cow::Borrowed),
            Some(Cow::Owned(Value::LocaleMap(map))) => self.select_locale(&map).cloned().map(Cow::Owned),
            other => other,
        };

        for name in &resolve.formatters {
            let formatter = self.settings.formatters.get(name)?;
            let input = value.as_deref().unwrap_or(&NULL);
            let text = formatter.apply(input, &self.locale, resolve)?;
            value = Some(Cow::Owned(Value::String(text)));
        }

        match value.as_deref() {
            None | Some(Value::Null) => self.missing_variable(resolve),
            Some(Value::String(s)) => {
                self.output.push(Cow::Owned(s.clone()));
                Ok(())
            }
            Some(Value::Number(n)) => {
                self.output.push(Cow::Owned(n.to_string()));
                Ok(())
            }
            Some(other) => Err(TemplateError::InvalidOutputType {
                path: resolve.path.clone(),
                found: other.kind(),
            }),
        }
    }

    fn missing_variable(&mut self, resolve: &Resolve) -> Result<()> {
        let absolute = absolute_path(&resolve.path, &self.scope_path, &self.context_path);
        warn!(path = %resolve.path, absolute = %absolute, "missing variable");
        if self.settings.strict {
            return Err(TemplateError::MissingVariable {
                path: resolve.path.clone(),
            });
        }
        self.output
            .push(Cow::Owned(format!("[[ERROR: Missing variable {}]]", resolve.path)));
        Ok(())
    }

    fn translate(&mut self, translations: &'p Translations) -> Result<()> {
        if let Some(text) = translations.get(&self.locale) {
            self.output.push(Cow::Borrowed(text.as_str()));
            return Ok(());
        }
        warn!(locale = %self.locale, "missing translation");
        if self.settings.strict {
            return Err(TemplateError::MissingTranslation {
                locale: self.locale.clone(),
            });
        }
        let known = serde_json::to_string(translations).unwrap_or_default();
        self.output.push(Cow::Owned(format!(
            "[[ERROR: Missing translation for locale {} in {}]]",
            self.locale, known
        )));
        Ok(())
    }
}
