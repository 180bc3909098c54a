//! Text repair passes. Each pass is a pure `&str -> String` transform that
//! leaves JSON string literals untouched.

use std::sync::LazyLock;

use regex::Regex;

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").expect("Invalid regex pattern")
});

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[\]}])").expect("Invalid regex pattern"));

static ELISION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\.{2,}|…)(?:\s*(?:and\s+)?\d+\s+more(?:\s+[a-z]+)*)?|\band\s+\d+\s+more(?:\s+[a-z]+)*")
        .expect("Invalid regex pattern")
});

static REPEATED_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(?:\s*,)+").expect("Invalid regex pattern"));

static LEADING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\[{])\s*,").expect("Invalid regex pattern"));

/// Upper bound on candidates considered by [`balanced_candidates`].
const MAX_CANDIDATES: usize = 16;

/// Trim whitespace and unwrap the first Markdown code fence, if any.
pub fn strip_fences(text: &str) -> String {
    let trimmed = text.trim();
    match CODE_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim().to_string(),
        None => trimmed.to_string(),
    }
}

/// Remove `//`, `#` and `/* */` comments outside string literals, then
/// drop trailing commas before closing brackets.
pub fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => skip_line(&mut chars, &mut out),
            '#' => skip_line(&mut chars, &mut out),
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    map_code(&out, |code| TRAILING_COMMA.replace_all(code, "$1").into_owned())
}

/// Remove elision markers (`...`, `…`, "and 3 more days") that stand in for
/// real items, then tidy the commas they leave behind.
pub fn collapse_elisions(text: &str) -> String {
    map_code(text, |code| {
        let code = ELISION.replace_all(code, "");
        let code = REPEATED_COMMA.replace_all(&code, ",");
        let code = LEADING_COMMA.replace_all(&code, "$1");
        TRAILING_COMMA.replace_all(&code, "$1").into_owned()
    })
}

/// Bracket-balanced `{...}` / `[...]` substrings, largest first.
///
/// Scanning is string-aware from each opening bracket, so braces inside
/// quoted values do not unbalance a candidate. Nested candidates are not
/// reported separately.
pub fn balanced_candidates(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut candidates = Vec::new();
    let mut start = 0;

    while start < bytes.len() && candidates.len() < MAX_CANDIDATES {
        if !matches!(bytes[start], b'{' | b'[') {
            start += 1;
            continue;
        }
        match balanced_end(bytes, start) {
            Some(end) => {
                candidates.push(&text[start..=end]);
                start = end + 1;
            }
            None => start += 1,
        }
    }

    candidates.sort_by_key(|c| std::cmp::Reverse(c.len()));
    candidates
}

fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(b) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn skip_line(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, out: &mut String) {
    for next in chars.by_ref() {
        if next == '\n' {
            out.push('\n');
            break;
        }
    }
}

/// Apply `f` to every stretch of text outside JSON string literals.
fn map_code(text: &str, f: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut code_start = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                out.push_str(&text[code_start..=i]);
                code_start = i + 1;
            }
        } else if c == '"' {
            out.push_str(&f(&text[code_start..i]));
            code_start = i;
            in_string = true;
        }
    }

    if in_string {
        out.push_str(&text[code_start..]);
    } else {
        out.push_str(&f(&text[code_start..]));
    }
    out
}
