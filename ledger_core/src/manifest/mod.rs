//! Author-facing manifest (`ledger.kdl`).
//!
//! ```text
//! name "my-app"
//! version "1.0.0"
//!
//! // production dependencies
//! dependency crypto {
//!     git "https://github.com/acme/crypto.git" tag="v2.1.0"
//!     capability fs path="./data"
//! }
//! dependency utils { path "./vendor/utils"; }
//! dependency blob { tar "https://example.com/blob-1.0.tar.gz" checksum="..." }
//!
//! dev-dependency fixtures { path "./fixtures" }
//! ```
//!
//! Missing `name` or `version` parse as empty strings.

pub mod lexer;

use crate::capability::Capability;
use crate::error::{Error, Result};
use crate::package::{GitRef, PackageRef, Source};
use lexer::{Token, TokenKind, tokenize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

/// Default manifest file name.
pub const MANIFEST_FILE: &str = "ledger.kdl";

/// A parsed manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub dependencies: Vec<PackageRef>,
    pub dev_dependencies: Vec<PackageRef>,
}

impl Manifest {
    /// Read and parse a manifest file. Fails `ManifestNotFound` if absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::manifest_not_found(path));
        }
        Self::parse(&fs::read_to_string(path)?)
    }

    /// Parse manifest text.
    pub fn parse(input: &str) -> Result<Self> {
        Parser::new(tokenize(input)?).parse_document()
    }

    /// Production then dev dependencies, in declaration order.
    pub fn all_dependencies(&self) -> impl Iterator<Item = &PackageRef> {
        self.dependencies.iter().chain(self.dev_dependencies.iter())
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        // tokenize always ends with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error<T>(&self, reason: impl Into<String>) -> Result<T> {
        Err(Error::manifest_parse(self.peek().line, reason))
    }

    fn skip_terminators(&mut self) {
        while self.peek().kind == TokenKind::Terminator {
            self.advance();
        }
    }

    /// A string or bare word.
    fn expect_value(&mut self, what: &str) -> Result<String> {
        match self.peek().kind.clone() {
            TokenKind::Str(s) | TokenKind::Ident(s) => {
                self.advance();
                Ok(s)
            }
            other => self.error(format!("expected {}, found {:?}", what, other)),
        }
    }

    fn expect_end_of_statement(&mut self) -> Result<()> {
        match self.peek().kind.clone() {
            TokenKind::Terminator => {
                self.advance();
                Ok(())
            }
            TokenKind::RBrace | TokenKind::Eof => Ok(()),
            other => self.error(format!("expected end of statement, found {:?}", other)),
        }
    }

    /// `key=value` pairs up to the end of the statement.
    fn parse_props(&mut self) -> Result<BTreeMap<String, String>> {
        let mut props = BTreeMap::new();
        while let TokenKind::Ident(key) = self.peek().kind.clone() {
            self.advance();
            if self.peek().kind != TokenKind::Equals {
                return self.error(format!("expected '=' after {}", key));
            }
            self.advance();
            let value = self.expect_value("property value")?;
            if props.insert(key.clone(), value).is_some() {
                return self.error(format!("duplicate property {}", key));
            }
        }
        self.expect_end_of_statement()?;
        Ok(props)
    }

    fn parse_document(&mut self) -> Result<Manifest> {
        let mut manifest = Manifest::default();
        let mut seen = HashSet::new();

        loop {
            self.skip_terminators();
            let token = self.advance();
            match token.kind {
                TokenKind::Eof => break,
                TokenKind::Ident(keyword) => match keyword.as_str() {
                    "name" => {
                        manifest.name = self.expect_value("package name")?;
                        self.expect_end_of_statement()?;
                    }
                    "version" => {
                        manifest.version = self.expect_value("version")?;
                        self.expect_end_of_statement()?;
                    }
                    "dependency" | "dev-dependency" => {
                        let package = self.parse_dependency_block()?;
                        if !seen.insert(package.name.clone()) {
                            return Err(Error::manifest_parse(
                                token.line,
                                format!("dependency {} declared twice", package.name),
                            ));
                        }
                        if keyword == "dependency" {
                            manifest.dependencies.push(package);
                        } else {
                            manifest.dev_dependencies.push(package);
                        }
                    }
                    other => {
                        return Err(Error::manifest_parse(
                            token.line,
                            format!("unknown directive {}", other),
                        ));
                    }
                },
                other => {
                    return Err(Error::manifest_parse(
                        token.line,
                        format!("unexpected {:?}", other),
                    ));
                }
            }
        }

        Ok(manifest)
    }

    fn parse_dependency_block(&mut self) -> Result<PackageRef> {
        let name = self.expect_value("dependency name")?;
        let open_line = self.peek().line;
        if self.peek().kind != TokenKind::LBrace {
            return self.error(format!("expected '{{' after dependency {}", name));
        }
        self.advance();

        let mut source = None;
        let mut capabilities = Vec::new();

        loop {
            self.skip_terminators();
            let token = self.advance();
            let directive = match token.kind {
                TokenKind::RBrace => break,
                TokenKind::Eof => {
                    return Err(Error::manifest_parse(
                        open_line,
                        format!("unclosed block for dependency {}", name),
                    ));
                }
                TokenKind::Ident(directive) => directive,
                other => {
                    return Err(Error::manifest_parse(
                        token.line,
                        format!("unexpected {:?} in dependency {}", other, name),
                    ));
                }
            };

            match directive.as_str() {
                "git" | "path" | "tar" => {
                    let parsed = self.parse_source(&directive, token.line)?;
                    if source.replace(parsed).is_some() {
                        return Err(Error::manifest_parse(
                            token.line,
                            format!("dependency {} has more than one source", name),
                        ));
                    }
                }
                "capability" => {
                    let cap_name = self.expect_value("capability name")?;
                    let params = self.parse_props()?;
                    capabilities.push(Capability {
                        name: cap_name,
                        params,
                    });
                }
                other => {
                    return Err(Error::manifest_parse(
                        token.line,
                        format!("unknown directive {} in dependency {}", other, name),
                    ));
                }
            }
        }

        let source = source.ok_or_else(|| {
            Error::manifest_parse(open_line, format!("dependency {} has no source", name))
        })?;

        Ok(PackageRef {
            name,
            source,
            capabilities,
        })
    }

    fn parse_source(&mut self, kind: &str, line: usize) -> Result<Source> {
        let location = self.expect_value("source location")?;
        let mut props = self.parse_props()?;

        let source = match kind {
            "git" => {
                let mut refs: Vec<(String, String)> = ["tag", "branch", "commit"]
                    .iter()
                    .filter_map(|k| props.remove(*k).map(|v| (k.to_string(), v)))
                    .collect();
                let (url, fragment) = match location.split_once('#') {
                    Some((url, fragment)) => (url.to_string(), Some(fragment)),
                    None => (location.clone(), None),
                };
                let reference = match (fragment, refs.len()) {
                    (None, 0) => GitRef::default(),
                    (Some(fragment), 0) => fragment
                        .parse::<GitRef>()
                        .map_err(|e| Error::manifest_parse(line, e.to_string()))?,
                    (None, 1) => {
                        let (k, v) = refs.remove(0);
                        GitRef::from_parts(&k, &v)
                            .map_err(|e| Error::manifest_parse(line, e.to_string()))?
                    }
                    (Some(_), _) => {
                        return Err(Error::manifest_parse(
                            line,
                            "git ref given both in the URL fragment and as a property",
                        ));
                    }
                    _ => {
                        return Err(Error::manifest_parse(
                            line,
                            "only one of tag=, branch=, commit= may be given",
                        ));
                    }
                };
                Source::Git { url, reference }
            }
            "path" => Source::Path { path: location },
            _ => Source::Tar {
                url: location,
                checksum: props.remove("checksum"),
            },
        };

        if let Some(key) = props.keys().next() {
            return Err(Error::manifest_parse(
                line,
                format!("unknown {} property {}", kind, key),
            ));
        }

        Ok(source)
    }
}
