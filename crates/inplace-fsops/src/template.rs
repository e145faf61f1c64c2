//! Command templates with `%0`, `%1`, `%2` and `%%` placeholders.
//!
//! # Design
//! - A template is tokenized once; rendering walks the fixed token sequence.
//! - Placeholder expansions are shell-quoted, literal template text is not.
//! - Arity 0 templates are rewritten into the redirect form `(<t>) < %1 > %2`.

use std::ffi::{OsStr, OsString};
use std::mem;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::Path;

use crate::error::TemplateError;

const INPUT_BIT: u8 = 0x1;
const OUTPUT_BIT: u8 = 0x2;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Original,
    Input,
    Output,
}

/// A compiled command template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formatter {
    template: String,
    tokens: Vec<Token>,
    arity: u8,
}

impl Formatter {
    /// Compile `template`, determining its arity.
    ///
    /// # Errors
    ///
    /// Returns an error if the template is empty, contains an unknown
    /// placeholder, or uses `%2` without `%1`.
    pub fn new(template: &str) -> Result<Self, TemplateError> {
        if template.is_empty() {
            return Err(TemplateError::EmptyTemplate);
        }

        let (tokens, arity) = tokenize(template)?;
        if arity > 0 {
            return Ok(Self {
                template: template.to_string(),
                tokens,
                arity,
            });
        }

        let wrapped = format!("({template}) < %1 > %2");
        let (tokens, arity) = tokenize(&wrapped)?;
        Ok(Self {
            template: wrapped,
            tokens,
            arity,
        })
    }

    /// Number of file placeholders the template consumes: 1 when the input is
    /// edited destructively, 2 when input and output are separate.
    #[must_use]
    pub const fn arity(&self) -> u8 {
        self.arity
    }

    /// Whether the command edits `%1` in place.
    #[must_use]
    pub const fn is_destructive(&self) -> bool {
        self.arity == 1
    }

    /// Effective template text, after any redirect rewrite.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Render the command line for the given paths.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::MissingOutput`] when the template references
    /// `%2` and no output path is supplied.
    pub fn format(
        &self,
        original: &Path,
        input: &Path,
        output: Option<&Path>,
    ) -> Result<OsString, TemplateError> {
        let mut rendered = Vec::with_capacity(self.template.len() + 64);
        for token in &self.tokens {
            match token {
                Token::Literal(text) => rendered.extend_from_slice(text.as_bytes()),
                Token::Original => push_quoted(&mut rendered, original.as_os_str()),
                Token::Input => push_quoted(&mut rendered, input.as_os_str()),
                Token::Output => {
                    let output = output.ok_or_else(|| TemplateError::MissingOutput {
                        template: self.template.clone(),
                    })?;
                    push_quoted(&mut rendered, output.as_os_str());
                }
            }
        }
        Ok(OsString::from_vec(rendered))
    }
}

fn tokenize(template: &str) -> Result<(Vec<Token>, u8), TemplateError> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut bits = 0_u8;
    let mut chars = template.chars();

    while let Some(ch) = chars.next() {
        if ch != '%' {
            literal.push(ch);
            continue;
        }
        let placeholder = match chars.next() {
            Some('%') => {
                literal.push('%');
                continue;
            }
            Some('0') => Token::Original,
            Some('1') => {
                bits |= INPUT_BIT;
                Token::Input
            }
            Some('2') => {
                bits |= OUTPUT_BIT;
                Token::Output
            }
            other => {
                return Err(TemplateError::InvalidPlaceholder {
                    placeholder: other.map(String::from).unwrap_or_default(),
                    template: template.to_string(),
                });
            }
        };
        if !literal.is_empty() {
            tokens.push(Token::Literal(mem::take(&mut literal)));
        }
        tokens.push(placeholder);
    }
    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }

    let arity = match bits {
        0 => 0,
        INPUT_BIT => 1,
        OUTPUT_BIT => {
            return Err(TemplateError::InconsistentPlaceholders {
                template: template.to_string(),
            });
        }
        _ => 2,
    };
    Ok((tokens, arity))
}

const fn is_shell_safe(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(byte, b'_' | b'-' | b'.' | b',' | b':' | b'+' | b'/' | b'@')
}

fn push_escaped(out: &mut Vec<u8>, word: &[u8]) {
    for &byte in word {
        match byte {
            b'\n' => out.extend_from_slice(b"'\n'"),
            _ if is_shell_safe(byte) => out.push(byte),
            _ => {
                out.push(b'\\');
                out.push(byte);
            }
        }
    }
}

fn push_quoted(out: &mut Vec<u8>, word: &OsStr) {
    let bytes = word.as_bytes();
    if bytes.is_empty() {
        out.extend_from_slice(b"''");
    } else {
        push_escaped(out, bytes);
    }
}

/// Quote `word` so `sh` reads it back as a single literal word.
#[must_use]
pub fn shell_quote(word: &OsStr) -> OsString {
    let mut out = Vec::with_capacity(word.len() * 2);
    push_quoted(&mut out, word);
    OsString::from_vec(out)
}

/// Join an argument list into a template.
///
/// Words containing `%` keep their placeholders and have every other special
/// character escaped; the remaining words are quoted whole.
#[must_use]
pub fn template_from_args<S: AsRef<str>>(words: &[S]) -> String {
    let mut joined = String::new();
    for (index, word) in words.iter().enumerate() {
        if index > 0 {
            joined.push(' ');
        }
        let word = word.as_ref();
        if word.is_empty() {
            joined.push_str("''");
            continue;
        }
        let keep_percent = word.contains('%');
        for ch in word.chars() {
            match ch {
                '\n' => joined.push_str("'\n'"),
                '%' if keep_percent => joined.push(ch),
                _ if ch.is_ascii() && is_shell_safe(ch as u8) => joined.push(ch),
                _ => {
                    joined.push('\\');
                    joined.push(ch);
                }
            }
        }
    }
    joined
}
