//! Value grammar for directive arguments.
//!
//! Rules are tried in order: number, quoted string, boolean, null,
//! bracketed JSON. Anything else is kept as the trimmed raw text, so a
//! malformed literal degrades to an opaque string instead of failing.

use serde_json::{Number, Value};

/// Parse one argument literal. Returns `None` only for an empty literal.
pub fn parse_literal(raw: &str) -> Option<Value> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(number) = parse_number(text) {
        return Some(number);
    }
    if let Some(string) = parse_quoted(text) {
        return Some(Value::String(string));
    }
    match text {
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        "null" | "undefined" => return Some(Value::Null),
        _ => {}
    }
    if let Some(json) = parse_json(text) {
        return Some(json);
    }

    Some(Value::String(text.to_string()))
}

fn parse_number(text: &str) -> Option<Value> {
    let body = text.strip_prefix(['+', '-']).unwrap_or(text);
    let mut digits = 0;
    let mut dots = 0;
    for c in body.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => dots += 1,
            _ => return None,
        }
    }
    if digits == 0 || dots > 1 {
        return None;
    }

    let normalized = text.strip_prefix('+').unwrap_or(text);
    if dots == 0 {
        if let Ok(int) = normalized.parse::<i64>() {
            return Some(Value::Number(int.into()));
        }
    }
    let float = normalized.parse::<f64>().ok()?;
    Number::from_f64(float).map(Value::Number)
}

fn parse_quoted(text: &str) -> Option<String> {
    let mut chars = text.chars();
    let quote = chars.next()?;
    if !matches!(quote, '\'' | '"' | '`') || text.len() < 2 || !text.ends_with(quote) {
        return None;
    }
    let inner = &text[quote.len_utf8()..text.len() - quote.len_utf8()];
    unescape(inner, quote)
}

/// Resolve backslash escapes. Returns `None` when an unescaped closing
/// quote appears inside, meaning the literal was not one string.
pub fn unescape(inner: &str, quote: char) -> Option<String> {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == quote {
            return None;
        }
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    Some(out)
}

fn parse_json(text: &str) -> Option<Value> {
    let bracketed = (text.starts_with('[') && text.ends_with(']'))
        || (text.starts_with('{') && text.ends_with('}'));
    if !bracketed {
        return None;
    }
    serde_json::from_str(text).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers() {
        assert_eq!(parse_literal("12"), Some(json!(12)));
        assert_eq!(parse_literal(" -3 "), Some(json!(-3)));
        assert_eq!(parse_literal("+4"), Some(json!(4)));
        assert_eq!(parse_literal("1.50"), Some(json!(1.5)));
        assert_eq!(parse_literal(".5"), Some(json!(0.5)));
        assert_eq!(parse_literal("99999999999999999999"), Some(json!(1e20)));
    }

    #[test]
    fn not_numbers() {
        assert_eq!(parse_literal("1.2.3"), Some(json!("1.2.3")));
        assert_eq!(parse_literal("NaN"), Some(json!("NaN")));
        assert_eq!(parse_literal("inf"), Some(json!("inf")));
        assert_eq!(parse_literal("-"), Some(json!("-")));
        assert_eq!(parse_literal("12cm"), Some(json!("12cm")));
    }

    #[test]
    fn strings() {
        assert_eq!(parse_literal("'city'"), Some(json!("city")));
        assert_eq!(parse_literal("\"two words\""), Some(json!("two words")));
        assert_eq!(parse_literal(r"'it\'s'"), Some(json!("it's")));
        assert_eq!(parse_literal("''"), Some(json!("")));
        assert_eq!(parse_literal("`tick`"), Some(json!("tick")));
    }

    #[test]
    fn mismatched_quotes_fall_back_to_raw() {
        assert_eq!(parse_literal("'a' + 'b'"), Some(json!("'a' + 'b'")));
        assert_eq!(parse_literal("'open"), Some(json!("'open")));
    }

    #[test]
    fn keywords() {
        assert_eq!(parse_literal("true"), Some(json!(true)));
        assert_eq!(parse_literal("false"), Some(json!(false)));
        assert_eq!(parse_literal("null"), Some(Value::Null));
        assert_eq!(parse_literal("undefined"), Some(Value::Null));
        assert_eq!(parse_literal("True"), Some(json!("True")));
    }

    #[test]
    fn json_values() {
        assert_eq!(parse_literal("[1, 2]"), Some(json!([1, 2])));
        assert_eq!(
            parse_literal(r#"{"heightCm": 170, "tags": ["a"]}"#),
            Some(json!({ "heightCm": 170, "tags": ["a"] }))
        );
        assert_eq!(parse_literal("{bad json}"), Some(json!("{bad json}")));
    }

    #[test]
    fn empty_literal() {
        assert_eq!(parse_literal(""), None);
        assert_eq!(parse_literal("   "), None);
    }

    #[test]
    fn bare_words_are_raw_strings() {
        assert_eq!(parse_literal("giant"), Some(json!("giant")));
    }
}
