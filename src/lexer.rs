//! One-pass scanner splitting template source into text runs and `${...}`
//! directives.
//!
//! A directive is `${`, at least one character other than `}`, then `}`.
//! `${}` and an unclosed `${` are ordinary text. When a directive sits on its
//! own line, the line break and indentation in front of it are split off the
//! text run and handed to the directive as its `prefix`.

#[derive(Debug, Clone, PartialEq)]
pub enum Token<'a> {
    Text(&'a str),
    Directive {
        /// Everything between `${` and `}`.
        content: &'a str,
        /// Leading line break and whitespace, or empty.
        prefix: &'a str,
        /// Byte offset of `$` in the source.
        offset: usize,
    },
}

#[derive(Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    cursor: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, cursor: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn advance(&mut self, n: usize) {
        self.cursor += n;
    }

    pub fn next_token(&mut self) -> Option<Token<'a>> {
        let rest = self.remaining();
        if rest.is_empty() {
            return None;
        }

        let Some((start, len)) = find_directive(rest) else {
            self.advance(rest.len());
            return Some(Token::Text(rest));
        };

        let (text, prefix) = split_prefix(&rest[..start]);
        if !text.is_empty() {
            // The prefix stays in the input and is picked up with the
            // directive on the next call.
            self.advance(text.len());
            return Some(Token::Text(text));
        }

        let offset = self.cursor + start;
        let content = &rest[start + 2..start + len - 1];
        self.advance(start + len);
        Some(Token::Directive {
            content,
            prefix,
            offset,
        })
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

/// Position and total length of the next well-formed directive in `text`.
fn find_directive(text: &str) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(idx) = text[from..].find("${") {
        let start = from + idx;
        let body = &text[start + 2..];
        match body.find('}') {
            // `${}` is not a directive, keep scanning after it.
            Some(0) => from = start + 2,
            Some(end) => return Some((start, end + 3)),
            // No closing brace anywhere after this point.
            None => return None,
        }
    }
    None
}

/// Split the trailing whitespace run of `text` at its first line break.
fn split_prefix(text: &str) -> (&str, &str) {
    let body_len = text.trim_end().len();
    match text[body_len..].find('\n') {
        Some(idx) => text.split_at(body_len + idx),
        None => (text, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token<'_>> {
        Tokenizer::new(input).collect()
    }

    #[test]
    fn plain_text_is_one_token() {
        assert_eq!(tokens("Hello, world!"), vec![Token::Text("Hello, world!")]);
        assert!(tokens("").is_empty());
    }

    #[test]
    fn splits_text_and_directives() {
        assert_eq!(
            tokens("Hi ${name}!"),
            vec![
                Token::Text("Hi "),
                Token::Directive {
                    content: "name",
                    prefix: "",
                    offset: 3
                },
                Token::Text("!"),
            ]
        );
    }

    #[test]
    fn empty_and_unclosed_markers_are_text() {
        assert_eq!(tokens("a ${} b"), vec![Token::Text("a ${} b")]);
        assert_eq!(tokens("a ${name"), vec![Token::Text("a ${name")]);
        assert_eq!(
            tokens("${}${x}"),
            vec![
                Token::Text("${}"),
                Token::Directive {
                    content: "x",
                    prefix: "",
                    offset: 3
                },
            ]
        );
    }

    #[test]
    fn directive_on_its_own_line_takes_a_prefix() {
        assert_eq!(
            tokens("<ul>\n  ${for:items}"),
            vec![
                Token::Text("<ul>"),
                Token::Directive {
                    content: "for:items",
                    prefix: "\n  ",
                    offset: 7
                },
            ]
        );
    }

    #[test]
    fn prefix_starts_at_first_line_break_of_trailing_whitespace() {
        assert_eq!(split_prefix("a \n \n  "), ("a ", "\n \n  "));
        assert_eq!(split_prefix("a  "), ("a  ", ""));
        assert_eq!(split_prefix("\n"), ("", "\n"));
        assert_eq!(split_prefix("a\nb "), ("a\nb ", ""));
    }

    #[test]
    fn content_may_contain_dollar_and_open_brace() {
        assert_eq!(
            tokens("${a${b}"),
            vec![Token::Directive {
                content: "a${b",
                prefix: "",
                offset: 0
            }]
        );
    }
}
