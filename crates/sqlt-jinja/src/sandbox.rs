//! Sandbox policy for template source.
//!
//! minijinja already refuses to reach host internals: values only expose
//! what their `Object` impl returns, and there is no import machinery. What
//! it does allow is building callables (`{% macro %}`), pulling in other
//! templates, and calling methods that mutate shared containers. Those
//! constructs are rejected here, lexically, before the template is compiled,
//! so a rejected template never produces output.
//!
//! The scanner walks `{{ ... }}` and `{% ... %}` blocks, skips comments and
//! `{% raw %}` sections, and tokenizes just enough (identifiers, string
//! literals, punctuation) to recognise the forbidden shapes.

use crate::error::{SandboxViolation, ViolationCategory};
use regex::Regex;
use std::sync::OnceLock;

/// Globals minijinja provides without a namespace entry
pub(crate) const BUILTIN_GLOBALS: &[&str] = &["range", "dict", "namespace", "loop"];

const MUTATING_METHODS: &[&str] = &[
    "append",
    "extend",
    "insert",
    "pop",
    "popitem",
    "remove",
    "clear",
    "update",
    "setdefault",
    "add",
    "discard",
    "reverse",
    "sort",
];

const OPERATOR_KEYWORDS: &[&str] = &["in", "and", "or", "not", "is", "if", "else", "set"];

const INTROSPECTION_CALLS: &[&str] = &[
    "debug", "eval", "exec", "compile", "open", "getattr", "globals", "locals", "vars", "dir",
];

static ENDRAW_RE: OnceLock<Regex> = OnceLock::new();

fn endraw_re() -> &'static Regex {
    ENDRAW_RE.get_or_init(|| Regex::new(r"\{%[-+]?\s*endraw\s*[-+]?%\}").expect("valid regex"))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number,
    Punct(char),
}

#[derive(Debug)]
struct Spanned {
    token: Token,
    line: usize,
}

/// Check `source` against the sandbox policy.
///
/// Returns the first violation found, in source order.
pub fn check_template(source: &str) -> Result<(), SandboxViolation> {
    let mut rest = source;
    let mut line = 1;

    while let Some(start) = find_block_start(rest) {
        line += newlines(&rest[..start]);
        let opener = &rest[start..start + 2];
        let body = &rest[start + 2..];

        if opener == "{#" {
            let Some(end) = body.find("#}") else {
                return Ok(());
            };
            line += newlines(&body[..end]);
            rest = &body[end + 2..];
            continue;
        }

        let is_statement = opener == "{%";
        let closer = if is_statement { '%' } else { '}' };
        let (tokens, consumed) = tokenize(body, closer, line);
        check_block(is_statement, &tokens)?;
        line += newlines(&body[..consumed]);
        rest = &body[consumed..];

        if is_statement && is_raw(&tokens) {
            let Some(m) = endraw_re().find(rest) else {
                return Ok(());
            };
            line += newlines(&rest[..m.end()]);
            rest = &rest[m.end()..];
        }
    }
    Ok(())
}

fn find_block_start(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut from = 0;
    while let Some(offset) = s[from..].find('{') {
        let idx = from + offset;
        match bytes.get(idx + 1) {
            Some(b'{') | Some(b'%') | Some(b'#') => return Some(idx),
            _ => from = idx + 1,
        }
    }
    None
}

fn newlines(s: &str) -> usize {
    s.bytes().filter(|b| *b == b'\n').count()
}

/// Tokenize a block body up to its closing delimiter.
///
/// Returns the tokens and the number of bytes consumed, closer included.
/// An unclosed block consumes the rest of the input.
fn tokenize(body: &str, closer: char, mut line: usize) -> (Vec<Spanned>, usize) {
    let mut tokens = Vec::new();
    let mut chars = body.char_indices().peekable();
    let mut depth = 0usize;

    while let Some((i, c)) = chars.next() {
        match c {
            '\n' => line += 1,
            c if c.is_whitespace() => {}
            c if c == closer && depth == 0 && body[i + c.len_utf8()..].starts_with('}') => {
                return (tokens, i + c.len_utf8() + 1);
            }
            '\'' | '"' => {
                let mut value = String::new();
                let start_line = line;
                while let Some((_, ch)) = chars.next() {
                    match ch {
                        '\\' => {
                            if let Some((_, escaped)) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        ch if ch == c => break,
                        '\n' => {
                            line += 1;
                            value.push(ch);
                        }
                        ch => value.push(ch),
                    }
                }
                tokens.push(Spanned {
                    token: Token::Str(value),
                    line: start_line,
                });
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::from(c);
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_alphanumeric() || next == '_' {
                        ident.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Spanned {
                    token: Token::Ident(ident),
                    line,
                });
            }
            c if c.is_ascii_digit() => {
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_alphanumeric() || next == '_' || next == '.' {
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Spanned {
                    token: Token::Number,
                    line,
                });
            }
            c => {
                match c {
                    '{' | '[' | '(' => depth += 1,
                    '}' | ']' | ')' => depth = depth.saturating_sub(1),
                    _ => {}
                }
                tokens.push(Spanned {
                    token: Token::Punct(c),
                    line,
                });
            }
        }
    }
    (tokens, body.len())
}

fn is_raw(tokens: &[Spanned]) -> bool {
    let mut idents = tokens.iter().filter(|t| !matches!(t.token, Token::Punct('-' | '+')));
    matches!(idents.next(), Some(Spanned { token: Token::Ident(name), .. }) if name == "raw")
        && idents.next().is_none()
}

fn check_block(is_statement: bool, tokens: &[Spanned]) -> Result<(), SandboxViolation> {
    let token_at = |i: usize| tokens.get(i).map(|t| &t.token);
    let violation = |category, i: usize| Err(SandboxViolation::at_line(category, tokens[i].line));

    if is_statement {
        let keyword = tokens
            .iter()
            .position(|t| !matches!(t.token, Token::Punct('-' | '+')));
        if let Some(k) = keyword {
            if let Token::Ident(name) = &tokens[k].token {
                match name.as_str() {
                    "macro" | "call" => return violation(ViolationCategory::CallableConstruction, k),
                    "import" | "from" | "include" | "extends" => {
                        return violation(ViolationCategory::ModuleImport, k)
                    }
                    _ => {}
                }
            }
        }
    }

    for (i, spanned) in tokens.iter().enumerate() {
        let prev = i.checked_sub(1).and_then(token_at);
        let next = token_at(i + 1);
        let next2 = token_at(i + 2);

        match &spanned.token {
            Token::Ident(name) if prev == Some(&Token::Punct('.')) => {
                if name.starts_with('_') {
                    return violation(ViolationCategory::PrivateAttribute, i);
                }
                if MUTATING_METHODS.contains(&name.as_str()) && next == Some(&Token::Punct('(')) {
                    return violation(ViolationCategory::MutatingCall, i);
                }
            }
            Token::Ident(name) => {
                let calls = next == Some(&Token::Punct('('));
                match name.as_str() {
                    "lambda" | "def" => return violation(ViolationCategory::CallableConstruction, i),
                    "__import__" | "importlib" => {
                        return violation(ViolationCategory::ModuleImport, i)
                    }
                    n if n.starts_with("__") => return violation(ViolationCategory::PrivateName, i),
                    n if calls && INTROSPECTION_CALLS.contains(&n) => {
                        return violation(ViolationCategory::Introspection, i)
                    }
                    "attr" if calls && is_private_str(next2) => {
                        return violation(ViolationCategory::PrivateAttribute, i)
                    }
                    "attribute" if next == Some(&Token::Punct('=')) && is_private_str(next2) => {
                        return violation(ViolationCategory::PrivateAttribute, i)
                    }
                    _ => {}
                }
            }
            Token::Punct('[') if is_private_str(next) && is_subscript_target(prev) => {
                return violation(ViolationCategory::PrivateAttribute, i);
            }
            _ => {}
        }
    }
    Ok(())
}

fn is_private_str(token: Option<&Token>) -> bool {
    matches!(token, Some(Token::Str(s)) if s.starts_with('_'))
}

/// A `[` directly after a value subscripts it; anywhere else it opens a
/// list literal.
fn is_subscript_target(prev: Option<&Token>) -> bool {
    match prev {
        Some(Token::Ident(name)) => !OPERATOR_KEYWORDS.contains(&name.as_str()),
        Some(Token::Str(_)) | Some(Token::Punct(')')) | Some(Token::Punct(']')) => true,
        _ => false,
    }
}

#[cfg(test)]
#[path = "sandbox_test.rs"]
mod tests;
