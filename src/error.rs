//! Error types for template compilation and rendering.

use thiserror::Error;

/// Everything that can go wrong while compiling or applying a template.
///
/// `Syntax` is only produced at construction time. The render-time variants
/// abort the render in progress; `MissingVariable` and `MissingTranslation`
/// are only raised in strict mode, otherwise they become inline markers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    /// A directive could not be classified or is malformed.
    #[error("syntax error at offset {offset}: {message} in '${{{content}}}'")]
    Syntax {
        message: String,
        content: String,
        offset: usize,
    },

    /// A path resolved to no value (strict mode only).
    #[error("missing variable {path}")]
    MissingVariable { path: String },

    /// The render locale is absent from a translation (strict mode only).
    #[error("missing translation for locale {locale}")]
    MissingTranslation { locale: String },

    /// A resolved value cannot be written to the output.
    #[error("expanded variable '{path}' must be a string or a number, got {found}")]
    InvalidOutputType { path: String, found: &'static str },

    /// A formatter name is not present in the registry.
    #[error("unknown formatter '{name}'")]
    UnknownFormatter { name: String },

    /// The operation sequence is unbalanced. Never produced for templates
    /// compiled by this crate.
    #[error("internal consistency failure: {0}")]
    InternalConsistency(String),
}

impl TemplateError {
    pub(crate) fn syntax(message: impl Into<String>, content: &str, offset: usize) -> Self {
        TemplateError::Syntax {
            message: message.into(),
            content: content.to_string(),
            offset,
        }
    }
}

/// Result type alias for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_names_the_directive() {
        let err = TemplateError::syntax("unrecognized directive", "a b", 4);
        assert_eq!(
            err.to_string(),
            "syntax error at offset 4: unrecognized directive in '${a b}'"
        );
    }

    #[test]
    fn render_errors_are_descriptive() {
        let err = TemplateError::InvalidOutputType {
            path: "user".to_string(),
            found: "mapping",
        };
        assert_eq!(
            err.to_string(),
            "expanded variable 'user' must be a string or a number, got mapping"
        );

        let err = TemplateError::UnknownFormatter {
            name: "upper".to_string(),
        };
        assert_eq!(err.to_string(), "unknown formatter 'upper'");
    }
}
