//! Tokenizer stage of directive parsing: finds `setter('<path>', ...)`
//! calls in free text and splits their argument lists without
//! interpreting the values.

use crate::core::literal::unescape;

/// One setter call as it appeared in the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCall<'a> {
    /// Byte offset of the setter name in the scanned text.
    pub offset: usize,
    /// The unquoted first argument.
    pub path: String,
    /// Remaining top-level arguments, untrimmed.
    pub args: Vec<&'a str>,
}

impl<'a> RawCall<'a> {
    /// The value literal: the last argument after the path, so both
    /// `set(path, value)` and `set(path, old, new)` resolve to the new value.
    pub fn value_literal(&self) -> Option<&'a str> {
        self.args.last().copied()
    }
}

/// Scan `text` for calls to `setter`. `base` is added to every reported
/// offset so calls found in a slice keep their position in the full text.
pub fn scan_calls<'a>(text: &'a str, setter: &str, base: usize) -> Vec<RawCall<'a>> {
    let mut calls = Vec::new();
    if setter.is_empty() {
        return calls;
    }

    let mut search_from = 0;
    while let Some(found) = text[search_from..].find(setter) {
        let start = search_from + found;
        let after_name = start + setter.len();
        search_from = after_name;

        if !starts_identifier(text, start) {
            continue;
        }
        if let Some((call, end)) = read_call(text, after_name, start + base) {
            calls.push(call);
            search_from = end;
        }
    }
    calls
}

/// The setter must not be the tail of a longer identifier (`my_.set`).
fn starts_identifier(text: &str, start: usize) -> bool {
    match text[..start].chars().next_back() {
        Some(prev) => !(prev.is_alphanumeric() || prev == '_' || prev == '.' || prev == '$'),
        None => true,
    }
}

/// Parse `(` quoted-path `,` args `)` starting right after the setter name.
/// Returns the call and the byte index just past the closing parenthesis.
fn read_call(text: &str, from: usize, offset: usize) -> Option<(RawCall<'_>, usize)> {
    let mut pos = skip_whitespace(text, from);
    if !text[pos..].starts_with('(') {
        return None;
    }
    pos = skip_whitespace(text, pos + 1);

    let quote = text[pos..].chars().next()?;
    if !matches!(quote, '\'' | '"' | '`') {
        return None;
    }
    let path_start = pos + quote.len_utf8();
    let path_end = find_closing_quote(text, path_start, quote)?;
    let path = unescape(&text[path_start..path_end], quote)?;
    pos = skip_whitespace(text, path_end + quote.len_utf8());

    let mut args = Vec::new();
    if text[pos..].starts_with(')') {
        return Some((RawCall { offset, path, args }, pos + 1));
    }
    if !text[pos..].starts_with(',') {
        return None;
    }
    pos += 1;

    let (arg_slices, end) = split_arguments(text, pos)?;
    args.extend(arg_slices);
    Some((RawCall { offset, path, args }, end))
}

fn skip_whitespace(text: &str, from: usize) -> usize {
    text[from..]
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| from + i)
        .unwrap_or(text.len())
}

fn find_closing_quote(text: &str, from: usize, quote: char) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in text[from..].char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some(from + i);
        } else if c == '\n' && quote != '`' {
            return None;
        }
    }
    None
}

/// Split comma-separated arguments up to the `)` that closes the call,
/// respecting nested brackets and quoted strings.
fn split_arguments(text: &str, from: usize) -> Option<(Vec<&str>, usize)> {
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut in_quote: Option<char> = None;
    let mut escaped = false;
    let mut arg_start = from;

    for (i, c) in text[from..].char_indices() {
        let at = from + i;
        if let Some(q) = in_quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                in_quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => in_quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ']' | '}' => depth = depth.saturating_sub(1),
            ')' if depth == 0 => {
                args.push(&text[arg_start..at]);
                return Some((args, at + 1));
            }
            ')' => depth -= 1,
            ',' if depth == 0 => {
                args.push(&text[arg_start..at]);
                arg_start = at + 1;
            }
            _ => {}
        }
    }
    None
}
