//! SQL identifier quoting.
//!
//! Names matching `[A-Za-z][A-Za-z0-9_]*` are emitted as-is. Anything else is
//! split once on the first `.` (so `schema.table` keeps working) and each
//! segment is wrapped in double quotes with embedded `"` doubled.
//!
//! # Example
//! ```ignore
//! use pgfluent::quote_identifier;
//!
//! assert_eq!(quote_identifier("users"), "users");
//! assert_eq!(quote_identifier("public.Users"), r#""public"."Users""#);
//! ```

/// Returns `true` if `name` can be emitted without quoting.
pub fn is_bare_identifier(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            bytes.all(|b| b == b'_' || b.is_ascii_alphanumeric())
        }
        _ => false,
    }
}

/// Quote a table or column name for inclusion in SQL text.
pub fn quote_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    write_identifier(&mut out, name);
    out
}

pub(crate) fn write_identifier(out: &mut String, name: &str) {
    if is_bare_identifier(name) {
        out.push_str(name);
        return;
    }
    match name.split_once('.') {
        Some((schema, rest)) => {
            write_quoted(out, schema);
            out.push('.');
            write_quoted(out, rest);
        }
        None => write_quoted(out, name),
    }
}

fn write_quoted(out: &mut String, segment: &str) {
    out.push('"');
    for ch in segment.chars() {
        if ch == '"' {
            out.push('"');
            out.push('"');
        } else {
            out.push(ch);
        }
    }
    out.push('"');
}

/// Inverse of [`quote_identifier`].
///
/// Bare names come back unchanged; quoted segments lose their surrounding
/// quotes and have `""` collapsed to `"`.
pub fn unquote_identifier(quoted: &str) -> String {
    if !quoted.starts_with('"') {
        return quoted.to_string();
    }

    let mut out = String::with_capacity(quoted.len());
    let mut chars = quoted.chars().peekable();
    let mut in_quotes = false;

    while let Some(ch) = chars.next() {
        match (ch, in_quotes) {
            ('"', false) => in_quotes = true,
            ('"', true) => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    out.push('"');
                } else {
                    in_quotes = false;
                }
            }
            (c, _) => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ident_simple() {
        assert_eq!(quote_identifier("users"), "users");
        assert_eq!(quote_identifier("order_items2"), "order_items2");
    }

    #[test]
    fn ident_dotted_is_quoted_per_segment() {
        assert_eq!(quote_identifier("public.users"), r#""public"."users""#);
    }

    #[test]
    fn ident_splits_only_once() {
        assert_eq!(quote_identifier("a.b.c"), r#""a"."b.c""#);
    }

    #[test]
    fn ident_quoted_with_escape() {
        assert_eq!(quote_identifier(r#"has"quote"#), r#""has""quote""#);
    }

    #[test]
    fn ident_needs_quotes() {
        assert_eq!(quote_identifier("my table"), r#""my table""#);
        assert_eq!(quote_identifier("1table"), r#""1table""#);
        assert_eq!(quote_identifier("_hidden"), r#""_hidden""#);
        assert_eq!(quote_identifier(""), r#""""#);
    }

    #[test]
    fn ident_bare_is_idempotent() {
        for name in ["users", "A1", "camelCase", "x_y_z"] {
            let once = quote_identifier(name);
            assert_eq!(quote_identifier(&once), once);
        }
    }

    #[test]
    fn unquote_inverts_quote() {
        for name in [
            "users",
            "public.users",
            "a.b.c",
            r#"has"quote"#,
            r#"sch"ema.ta"ble"#,
            "my table",
            "",
            ".leading",
            "trailing.",
        ] {
            assert_eq!(unquote_identifier(&quote_identifier(name)), name, "{name}");
        }
    }
}
