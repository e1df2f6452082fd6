use crate::ast::*;
use crate::error::{Result, TemplateError};
use crate::lexer::{Token, Tokenizer};
use crate::value::Value;
use std::num::NonZeroUsize;

const RESOLVE_KEYWORD: &str = "resolve:";
const TRANSLATION_KEYWORD: &str = "T:";

/// A block directive still waiting for its `${end}`.
struct OpenBlock<'a> {
    content: &'a str,
    offset: usize,
}

pub struct Parser<'a> {
    lexer: Tokenizer<'a>,
    open: Vec<OpenBlock<'a>>,
}

/// Compile template source into its operation sequence.
pub fn decompose(source: &str) -> Result<Program> {
    Parser::new(source).parse()
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            lexer: Tokenizer::new(input),
            open: Vec::new(),
        }
    }

    pub fn parse(&mut self) -> Result<Program> {
        let mut program = Vec::new();
        while let Some(token) = self.lexer.next_token() {
            match token {
                Token::Text(text) => program.push(Operation::Literal(text.to_string())),
                Token::Directive {
                    content,
                    prefix,
                    offset,
                } => {
                    let operation = classify(content, prefix, offset)?;
                    self.track_block(&operation, content, offset)?;
                    // Only a translation writes its line break back out. A
                    // resolve keeps it on the operation for formatters.
                    if !prefix.is_empty() && matches!(operation, Operation::Translate(_)) {
                        program.push(Operation::Literal(prefix.to_string()));
                    }
                    program.push(operation);
                }
            }
        }

        if let Some(block) = self.open.last() {
            return Err(TemplateError::syntax(
                "block is never closed with ${end}",
                block.content,
                block.offset,
            ));
        }
        Ok(program)
    }

    fn track_block(&mut self, operation: &Operation, content: &'a str, offset: usize) -> Result<()> {
        match operation {
            Operation::If(_) | Operation::For { .. } | Operation::With { .. } => {
                self.open.push(OpenBlock { content, offset });
            }
            Operation::Else if self.open.is_empty() => {
                return Err(TemplateError::syntax(
                    "else outside of an if, for or with block",
                    content,
                    offset,
                ));
            }
            Operation::End => {
                if self.open.pop().is_none() {
                    return Err(TemplateError::syntax("end without an open block", content, offset));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Classify directive content: translation, then control, then resolve.
fn classify(content: &str, prefix: &str, offset: usize) -> Result<Operation> {
    if let Some(translations) = parse_translation(content) {
        return Ok(Operation::Translate(translations));
    }
    if let Some(operation) = parse_control(content, offset)? {
        return Ok(operation);
    }
    if let Some(resolve) = parse_resolve(content, prefix) {
        return Ok(Operation::Resolve(resolve));
    }
    Err(TemplateError::syntax("unrecognized directive", content, offset))
}

/// `T:en='Hello',fr="Bonjour",de=Hallo`
fn parse_translation(content: &str) -> Option<Translations> {
    let mut rest = content.strip_prefix(TRANSLATION_KEYWORD)?;
    let mut translations = Translations::new();
    loop {
        let key_len = rest
            .find(|c: char| !is_word_char(c))
            .unwrap_or(rest.len());
        if key_len == 0 {
            return None;
        }
        let key = &rest[..key_len];
        rest = rest[key_len..].strip_prefix('=')?;

        let (text, after) = match rest.chars().next() {
            Some(quote @ ('\'' | '"')) => {
                let close = rest[1..].find(quote)?;
                (&rest[1..1 + close], &rest[close + 2..])
            }
            _ => {
                let end = rest.find(',').unwrap_or(rest.len());
                if end == 0 {
                    return None;
                }
                rest.split_at(end)
            }
        };
        translations.insert(key.to_lowercase(), text.to_string());

        if after.is_empty() {
            return Some(translations);
        }
        rest = after.strip_prefix(',')?;
    }
}

/// `if|else|empty|for|with|end`, optionally followed by `:` and an operand.
fn parse_control(content: &str, offset: usize) -> Result<Option<Operation>> {
    let (keyword, operand) = match content.split_once(':') {
        Some((keyword, operand)) => (keyword, Some(operand)),
        None => (content, None),
    };

    let operation = match keyword {
        "if" => {
            let operand = required_operand(keyword, operand, content, offset)?;
            Operation::If(parse_condition(operand, content, offset)?)
        }
        // Operands on else/end are labels only.
        "else" | "empty" => Operation::Else,
        "end" => Operation::End,
        "for" => {
            let operand = required_operand(keyword, operand, content, offset)?;
            let (path, limit) = match operand.split_once('|') {
                Some((path, limit)) => {
                    let limit = limit
                        .trim()
                        .parse::<NonZeroUsize>()
                        .map_err(|_| TemplateError::syntax("invalid loop limit", content, offset))?;
                    (path.trim(), Some(limit))
                }
                None => (operand, None),
            };
            Operation::For {
                path: checked_path(path, content, offset)?,
                limit,
            }
        }
        "with" => {
            let operand = required_operand(keyword, operand, content, offset)?;
            Operation::With {
                path: checked_path(operand, content, offset)?,
            }
        }
        "elif" => {
            return Err(TemplateError::syntax(
                "multi-branch conditionals are not supported",
                content,
                offset,
            ))
        }
        _ => return Ok(None),
    };
    Ok(Some(operation))
}

fn required_operand<'c>(
    keyword: &str,
    operand: Option<&'c str>,
    content: &str,
    offset: usize,
) -> Result<&'c str> {
    operand
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .ok_or_else(|| TemplateError::syntax(format!("{keyword} requires an operand"), content, offset))
}

/// `path`, `path?` or `path OP literal`.
fn parse_condition(operand: &str, content: &str, offset: usize) -> Result<Condition> {
    let Some(idx) = operand.find(['=', '!', '<', '>']) else {
        let (path, test) = match operand.strip_suffix('?') {
            Some(path) => (path.trim_end(), Test::Populated),
            None => (operand, Test::Truthy),
        };
        return Ok(Condition {
            path: checked_path(path, content, offset)?,
            test,
        });
    };

    let path = checked_path(operand[..idx].trim(), content, offset)?;
    let rest = &operand[idx..];
    let (comparison, len) = if rest.starts_with("==") {
        (Comparison::Eq, 2)
    } else if rest.starts_with("!=") {
        (Comparison::Ne, 2)
    } else if rest.starts_with(">=") {
        (Comparison::Ge, 2)
    } else if rest.starts_with("<=") {
        (Comparison::Le, 2)
    } else if rest.starts_with('>') {
        (Comparison::Gt, 1)
    } else if rest.starts_with('<') {
        (Comparison::Lt, 1)
    } else {
        return Err(TemplateError::syntax("invalid comparison operator", content, offset));
    };

    let literal = parse_literal(rest[len..].trim())
        .ok_or_else(|| TemplateError::syntax("invalid comparison value", content, offset))?;
    Ok(Condition {
        path,
        test: Test::Compare(comparison, literal),
    })
}

/// A JSON scalar, or a single-quoted string.
fn parse_literal(text: &str) -> Option<Value> {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) if !value.is_array() && !value.is_object() => Some(Value::from(value)),
        Ok(_) => None,
        Err(_) => text
            .strip_prefix('\'')
            .and_then(|t| t.strip_suffix('\''))
            .map(Value::from),
    }
}

/// `[resolve:]path[:attr,attr][|fmt+fmt]`
fn parse_resolve(content: &str, prefix: &str) -> Option<Resolve> {
    let body = content.strip_prefix(RESOLVE_KEYWORD).unwrap_or(content);
    let (head, formatters) = match body.split_once('|') {
        Some((head, formatters)) => (head, Some(formatters)),
        None => (body, None),
    };
    let (path, attributes) = match head.split_once(':') {
        Some((path, attributes)) => (path, Some(attributes)),
        None => (head, None),
    };
    if !is_path(path) {
        return None;
    }

    let attributes = match attributes {
        Some(list) => {
            if list.is_empty()
                || !list
                    .chars()
                    .all(|c| is_word_char(c) || c.is_whitespace() || c == ',')
            {
                return None;
            }
            Some(
                list.split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string)
                    .collect(),
            )
        }
        None => None,
    };

    let formatters = match formatters {
        Some(list) => {
            let names: Vec<&str> = list.split('+').collect();
            if names.iter().any(|n| n.is_empty() || !n.chars().all(is_word_char)) {
                return None;
            }
            names.into_iter().map(str::to_string).collect()
        }
        None => Vec::new(),
    };

    Some(Resolve {
        path: path.to_string(),
        attributes,
        formatters,
        prefix: prefix.to_string(),
    })
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_path(path: &str) -> bool {
    !path.is_empty()
        && path
            .split('.')
            .all(|segment| !segment.is_empty() && segment.chars().all(is_word_char))
}

fn checked_path(path: &str, content: &str, offset: usize) -> Result<String> {
    if is_path(path) {
        Ok(path.to_string())
    } else {
        Err(TemplateError::syntax(
            format!("invalid variable path '{path}'"),
            content,
            offset,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(path: &str) -> Operation {
        Operation::Resolve(Resolve {
            path: path.to_string(),
            attributes: None,
            formatters: Vec::new(),
            prefix: String::new(),
        })
    }

    fn syntax_message(source: &str) -> String {
        match decompose(source) {
            Err(TemplateError::Syntax { message, .. }) => message,
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn shorthand_and_keyword_resolve_are_equivalent() {
        assert_eq!(decompose("${name}").unwrap(), decompose("${resolve:name}").unwrap());
        assert_eq!(decompose("${user.name}").unwrap(), vec![resolve("user.name")]);
    }

    #[test]
    fn resolve_with_attributes_and_formatters() {
        let program = decompose("${resolve:title:required, short|escapeHTML+json}").unwrap();
        assert_eq!(
            program,
            vec![Operation::Resolve(Resolve {
                path: "title".to_string(),
                attributes: Some(vec!["required".to_string(), "short".to_string()]),
                formatters: vec!["escapeHTML".to_string(), "json".to_string()],
                prefix: String::new(),
            })]
        );
    }

    #[test]
    fn translation_values_quoted_and_bare() {
        let program = decompose(r#"${T:en='Hello, you',FR="Bonjour",de=Hallo,en=Hi}"#).unwrap();
        let Operation::Translate(map) = &program[0] else {
            panic!("expected translation, got {:?}", program);
        };
        // Duplicate keys overwrite, keys are lower-cased.
        assert_eq!(map.get("en").map(String::as_str), Some("Hi"));
        assert_eq!(map.get("fr").map(String::as_str), Some("Bonjour"));
        assert_eq!(map.get("de").map(String::as_str), Some("Hallo"));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["en", "fr", "de"]);
    }

    #[test]
    fn control_keywords() {
        let program = decompose("${if:flag}a${else}b${end}").unwrap();
        assert_eq!(
            program,
            vec![
                Operation::If(Condition {
                    path: "flag".to_string(),
                    test: Test::Truthy
                }),
                Operation::Literal("a".to_string()),
                Operation::Else,
                Operation::Literal("b".to_string()),
                Operation::End,
            ]
        );
    }

    #[test]
    fn keyword_must_be_whole_word() {
        assert_eq!(decompose("${ending}").unwrap(), vec![resolve("ending")]);
        assert_eq!(decompose("${format}").unwrap(), vec![resolve("format")]);
    }

    #[test]
    fn for_limits() {
        let program = decompose("${for:items|2}${end}").unwrap();
        assert_eq!(
            program[0],
            Operation::For {
                path: "items".to_string(),
                limit: NonZeroUsize::new(2)
            }
        );
        let program = decompose("${for:items}${empty}none${end}").unwrap();
        assert_eq!(
            program[0],
            Operation::For {
                path: "items".to_string(),
                limit: None
            }
        );
        assert_eq!(program[1], Operation::Else);
        assert_eq!(syntax_message("${for:items|0}${end}"), "invalid loop limit");
        assert_eq!(syntax_message("${for:items|x}${end}"), "invalid loop limit");
    }

    #[test]
    fn conditions() {
        let cases = [
            ("count == 3", Comparison::Eq, Value::from(3_i64)),
            ("name!='bob'", Comparison::Ne, Value::from("bob")),
            ("score >= 1.5", Comparison::Ge, Value::from(1.5_f64)),
            ("score<=2", Comparison::Le, Value::from(2_i64)),
            ("label > \"m\"", Comparison::Gt, Value::from("m")),
            ("flag < true", Comparison::Lt, Value::from(true)),
        ];
        for (text, comparison, literal) in cases {
            let condition = parse_condition(text, text, 0).unwrap();
            assert_eq!(condition.test, Test::Compare(comparison, literal), "{text}");
        }

        let condition = parse_condition("items?", "", 0).unwrap();
        assert_eq!(condition.path, "items");
        assert_eq!(condition.test, Test::Populated);
    }

    #[test]
    fn invalid_conditions() {
        assert_eq!(syntax_message("${if:a == nope}${end}"), "invalid comparison value");
        assert_eq!(syntax_message("${if:a == [1]}${end}"), "invalid comparison value");
        assert_eq!(syntax_message("${if:a =! 1}${end}"), "invalid comparison operator");
        assert_eq!(syntax_message("${if}${end}"), "if requires an operand");
    }

    #[test]
    fn own_line_prefixes() {
        let program = decompose("a\n${if:x}\nb\n  ${name}\n  ${T:en=hi}\n${end}").unwrap();
        assert_eq!(
            program,
            vec![
                Operation::Literal("a".to_string()),
                Operation::If(Condition {
                    path: "x".to_string(),
                    test: Test::Truthy
                }),
                Operation::Literal("\nb".to_string()),
                Operation::Resolve(Resolve {
                    path: "name".to_string(),
                    attributes: None,
                    formatters: Vec::new(),
                    prefix: "\n  ".to_string(),
                }),
                Operation::Literal("\n  ".to_string()),
                Operation::Translate(Translations::from([("en".to_string(), "hi".to_string())])),
                Operation::End,
            ]
        );
    }

    #[test]
    fn unbalanced_blocks_are_rejected() {
        assert_eq!(syntax_message("${end}"), "end without an open block");
        assert_eq!(syntax_message("a${else}b"), "else outside of an if, for or with block");
        assert_eq!(syntax_message("${for:items}x"), "block is never closed with ${end}");
    }

    #[test]
    fn unrecognized_directives() {
        assert_eq!(syntax_message("${a b}"), "unrecognized directive");
        assert_eq!(syntax_message("${name|}"), "unrecognized directive");
        assert_eq!(syntax_message("${T:en='open}"), "unrecognized directive");
        assert_eq!(
            syntax_message("${if:a}${elif:b}${end}"),
            "multi-branch conditionals are not supported"
        );

        match decompose("ok ${a b}") {
            Err(TemplateError::Syntax {
                content, offset, ..
            }) => {
                assert_eq!(content, "a b");
                assert_eq!(offset, 3);
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }
}
