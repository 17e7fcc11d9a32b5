//! `?` / `:name` to `$n` placeholder rewriting.
//!
//! The scanner skips string literals (including `E'...'` escape strings),
//! quoted identifiers, line and nested block comments, dollar-quoted bodies
//! and `::` casts. `??` is an escaped literal `?`.

use crate::connection::ParamKey;
use crate::error::{OrmError, OrmResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Normal,
    /// `escapes` is set for `E'...'` strings, where `\` escapes the next byte.
    SingleQuoted { escapes: bool },
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Positional,
    Named,
}

/// Rewritten SQL plus the key bound to each `$n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Translated {
    pub sql: String,
    /// `slots[i]` is the parameter key for `$i+1`. Empty when the text has
    /// no `?` or `:name` placeholders.
    pub slots: Vec<ParamKey>,
}

pub(crate) fn translate(sql: &str) -> OrmResult<Translated> {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut slots: Vec<ParamKey> = Vec::new();
    let mut style: Option<Style> = None;
    let mut state = State::Normal;
    // Start of the pending, not yet copied, slice of `sql`.
    let mut copied = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => {
                    state = State::SingleQuoted {
                        escapes: is_escape_string_prefix(bytes, idx),
                    };
                }
                b'"' => state = State::DoubleQuoted,
                b'-' if bytes.get(idx + 1) == Some(&b'-') => {
                    state = State::LineComment;
                    idx += 1;
                }
                b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'$' => {
                    if let Some((tag, end)) = try_start_dollar_quote(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = end;
                    }
                }
                b':' if bytes.get(idx + 1) == Some(&b':') => idx += 1,
                b':' if bytes.get(idx + 1).is_some_and(|c| is_ident_start(*c)) => {
                    check_style(&mut style, Style::Named, sql)?;
                    let end = scan_ident(bytes, idx + 1);
                    let name = &sql[idx + 1..end];
                    let existing = slots
                        .iter()
                        .position(|k| matches!(k, ParamKey::Name(n) if n == name));
                    let position = match existing {
                        Some(slot) => slot + 1,
                        None => {
                            slots.push(ParamKey::Name(name.to_string()));
                            slots.len()
                        }
                    };
                    out.push_str(&sql[copied..idx]);
                    out.push('$');
                    out.push_str(&position.to_string());
                    copied = end;
                    idx = end;
                    continue;
                }
                b'?' if bytes.get(idx + 1) == Some(&b'?') => {
                    out.push_str(&sql[copied..idx]);
                    out.push('?');
                    copied = idx + 2;
                    idx += 2;
                    continue;
                }
                b'?' => {
                    check_style(&mut style, Style::Positional, sql)?;
                    slots.push(ParamKey::Position(slots.len() + 1));
                    out.push_str(&sql[copied..idx]);
                    out.push('$');
                    out.push_str(&slots.len().to_string());
                    copied = idx + 1;
                }
                _ => {}
            },
            State::SingleQuoted { escapes } => match b {
                b'\\' if escapes => idx += 1,
                b'\'' if bytes.get(idx + 1) == Some(&b'\'') => idx += 1,
                b'\'' => state = State::Normal,
                _ => {}
            },
            State::DoubleQuoted => match b {
                b'"' if bytes.get(idx + 1) == Some(&b'"') => idx += 1,
                b'"' => state = State::Normal,
                _ => {}
            },
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if b == b'/' && bytes.get(idx + 1) == Some(&b'*') {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && closes_dollar_quote(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
            }
        }
        idx += 1;
    }

    if style.is_none() && copied == 0 {
        return Ok(Translated {
            sql: sql.to_string(),
            slots,
        });
    }
    out.push_str(&sql[copied.min(sql.len())..]);
    Ok(Translated { sql: out, slots })
}

fn check_style(current: &mut Option<Style>, found: Style, sql: &str) -> OrmResult<()> {
    match current {
        None => {
            *current = Some(found);
            Ok(())
        }
        Some(style) if *style == found => Ok(()),
        Some(_) => Err(OrmError::invalid_argument(format!(
            "mixed positional and named placeholders in: {sql}"
        ))),
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn scan_ident(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && is_ident_byte(bytes[end]) {
        end += 1;
    }
    end
}

/// `E'` or `e'` not preceded by an identifier byte.
fn is_escape_string_prefix(bytes: &[u8], quote: usize) -> bool {
    quote >= 1
        && matches!(bytes[quote - 1], b'E' | b'e')
        && (quote < 2 || !is_ident_byte(bytes[quote - 2]))
}

/// `$tag$` opening at `start`; returns the tag and the index of its closing `$`.
fn try_start_dollar_quote(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    if start > 0 && is_ident_byte(bytes[start - 1]) {
        return None;
    }
    let mut idx = start + 1;
    while idx < bytes.len() && bytes[idx] != b'$' {
        if !is_ident_byte(bytes[idx]) {
            return None;
        }
        idx += 1;
    }
    if idx >= bytes.len() {
        return None;
    }
    let tag = &bytes[start + 1..idx];
    if tag.first().is_some_and(u8::is_ascii_digit) {
        return None;
    }
    let tag = String::from_utf8(tag.to_vec()).ok()?;
    Some((tag, idx))
}

fn closes_dollar_quote(bytes: &[u8], idx: usize, tag: &str) -> bool {
    let end = idx + 1 + tag.len();
    end < bytes.len() && &bytes[idx + 1..end] == tag.as_bytes() && bytes[end] == b'$'
}
