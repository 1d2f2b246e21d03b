//! Tokenizer for the manifest format.

use crate::error::{Error, Result};

/// Token kinds produced by [`tokenize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare word: keywords, names, unquoted values.
    Ident(String),
    /// Double-quoted string with escapes resolved.
    Str(String),
    LBrace,
    RBrace,
    Equals,
    /// `;` or a line break; both end a statement.
    Terminator,
    Eof,
}

/// A token with the 1-based line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '+' | ':' | '@')
}

/// Split manifest text into tokens. `//` comments run to end of line.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    let mut line = 1;

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                chars.next();
                tokens.push(Token {
                    kind: TokenKind::Terminator,
                    line,
                });
                line += 1;
            }
            ';' => {
                chars.next();
                tokens.push(Token {
                    kind: TokenKind::Terminator,
                    line,
                });
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '{' => {
                chars.next();
                tokens.push(Token {
                    kind: TokenKind::LBrace,
                    line,
                });
            }
            '}' => {
                chars.next();
                tokens.push(Token {
                    kind: TokenKind::RBrace,
                    line,
                });
            }
            '=' => {
                chars.next();
                tokens.push(Token {
                    kind: TokenKind::Equals,
                    line,
                });
            }
            '/' if {
                let mut ahead = chars.clone();
                ahead.next();
                ahead.peek() == Some(&'/')
            } =>
            {
                while let Some(&c) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '"' => {
                let start = line;
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => value.push('\n'),
                            Some('t') => value.push('\t'),
                            Some('"') => value.push('"'),
                            Some('\\') => value.push('\\'),
                            Some(other) => {
                                return Err(Error::manifest_parse(
                                    line,
                                    format!("unknown escape \\{}", other),
                                ));
                            }
                            None => {
                                return Err(Error::manifest_parse(start, "unterminated string"));
                            }
                        },
                        Some('\n') => {
                            line += 1;
                            value.push('\n');
                        }
                        Some(other) => value.push(other),
                        None => return Err(Error::manifest_parse(start, "unterminated string")),
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Str(value),
                    line: start,
                });
            }
            c if is_ident_char(c) => {
                let mut value = String::new();
                while let Some(&c) = chars.peek() {
                    if !is_ident_char(c) {
                        break;
                    }
                    // A `//` inside a bare word still starts a comment
                    if c == '/' {
                        let mut ahead = chars.clone();
                        ahead.next();
                        if ahead.peek() == Some(&'/') {
                            break;
                        }
                    }
                    value.push(c);
                    chars.next();
                }
                tokens.push(Token {
                    kind: TokenKind::Ident(value),
                    line,
                });
            }
            other => {
                return Err(Error::manifest_parse(
                    line,
                    format!("unexpected character {:?}", other),
                ));
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        line,
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    fn ident(s: &str) -> TokenKind {
        TokenKind::Ident(s.to_string())
    }

    #[test]
    fn test_scalar() {
        assert_eq!(
            kinds(r#"name "app""#),
            vec![ident("name"), TokenKind::Str("app".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_block_and_props() {
        assert_eq!(
            kinds("dependency x { capability fs path=\"./d\"; }"),
            vec![
                ident("dependency"),
                ident("x"),
                TokenKind::LBrace,
                ident("capability"),
                ident("fs"),
                ident("path"),
                TokenKind::Equals,
                TokenKind::Str("./d".into()),
                TokenKind::Terminator,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            kinds("// header\nname app // trailing\n"),
            vec![
                TokenKind::Terminator,
                ident("name"),
                ident("app"),
                TokenKind::Terminator,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\"b\\c""#),
            vec![TokenKind::Str("a\"b\\c".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_line_numbers() {
        let tokens = tokenize("a\r\n\nb").unwrap();
        let b = tokens.iter().find(|t| t.kind == ident("b")).unwrap();
        assert_eq!(b.line, 3);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            tokenize("name \"open"),
            Err(Error::ManifestParse { line: 1, .. })
        ));
        assert!(tokenize("name #").is_err());
        assert!(tokenize(r#""\q""#).is_err());
    }
}
