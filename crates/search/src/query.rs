//! Query normalization and literal-safe pattern escaping.

/// Characters with special meaning in the partition pattern language.
const META: &[char] = &['.', '*', '+', '?', '^', '$', '{', '}', '(', ')', '|', '[', ']', '\\'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Token(String),
    /// Below the minimum length; answered with an empty success.
    TooShort,
}

/// Trim and length-check raw input. Length counts chars, not bytes.
/// Tokens longer than `max_len` chars are cut to their first `max_len`
/// chars so the compiled matchers stay bounded.
pub fn normalize(raw: Option<&str>, min_len: usize, max_len: usize) -> Normalized {
    let t = raw.unwrap_or("").trim();
    let t = match t.char_indices().nth(max_len.max(min_len).max(1)) {
        Some((cut, _)) => t[..cut].trim_end(),
        None => t,
    };
    if t.chars().count() < min_len.max(1) {
        return Normalized::TooShort;
    }
    Normalized::Token(t.to_string())
}

/// Backslash-escape every metacharacter so the pattern matches `token` as
/// literal text.
pub fn escape_pattern(token: &str) -> String {
    let mut out = String::with_capacity(token.len() + 4);
    for ch in token.chars() {
        if META.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
