//! Canonical form for scripture references, used as the cache key.

use std::sync::LazyLock;

use regex::Regex;

use crate::prompt::pacing;

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<book>(?:[1-3]|i{1,3})?\s*[A-Za-z][A-Za-z .]*?)\.?\s*(?P<locator>\d[\d\s:.,\-–—]*)?$")
        .expect("Invalid regex pattern")
});

static VERSE_DOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d)\.(\d)").expect("Invalid regex pattern"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

const LOWERCASE_WORDS: &[&str] = &["of", "the"];

/// Normalize a reference: collapse whitespace, unify dashes and separators,
/// canonicalize the book name, and drop trailing punctuation.
///
/// Returns `None` for text that does not look like a reference at all. A
/// bare name without a chapter or verse is only a reference when it names a
/// known book; with a locator, unknown book names are title-cased.
///
/// ```
/// use lectio_core::citation::normalize::normalize_reference;
///
/// assert_eq!(normalize_reference("  john 3.16 ").as_deref(), Some("John 3:16"));
/// assert_eq!(normalize_reference("Ps 23:1 – 3;").as_deref(), Some("Psalms 23:1-3"));
/// assert_eq!(normalize_reference("").as_deref(), None);
/// ```
pub fn normalize_reference(raw: &str) -> Option<String> {
    let collapsed = WHITESPACE.replace_all(raw.trim(), " ");
    let cleaned = collapsed.trim_end_matches(['.', ',', ';', ':', ' ']);
    let captures = REFERENCE.captures(cleaned)?;

    let book = spaced_book(captures.name("book")?.as_str());
    if book.is_empty() {
        return None;
    }
    let Some(locator) = captures.name("locator") else {
        return known_book(&book);
    };
    let book = known_book(&book).unwrap_or_else(|| title_case(&book));

    let locator: String = locator
        .as_str()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if matches!(c, '–' | '—') { '-' } else { c })
        .collect();
    let locator = VERSE_DOT.replace_all(&locator, "$1:$2");
    let locator = locator.trim_end_matches(['-', ',', ':', '.']);

    Some(format!("{book} {locator}"))
}

fn spaced_book(raw: &str) -> String {
    let spaced = WHITESPACE.replace_all(raw.trim().trim_end_matches('.'), " ");
    split_ordinal(&spaced)
}

/// Canonical name of a book in the book table, matched by name or alias.
fn known_book(spaced: &str) -> Option<String> {
    pacing::books()
        .iter()
        .find(|b| b.name.eq_ignore_ascii_case(spaced) || b.aliases.iter().any(|a| a.eq_ignore_ascii_case(spaced)))
        .map(|b| b.name.clone())
}

/// `1john` and `ii peter` become `1 john` and `2 peter`.
fn split_ordinal(book: &str) -> String {
    let lower = book.to_ascii_lowercase();
    for (roman, digit) in [("iii ", "3 "), ("ii ", "2 "), ("i ", "1 ")] {
        if let Some(rest) = lower.strip_prefix(roman) {
            return format!("{digit}{rest}");
        }
    }
    match book.chars().next() {
        Some(d @ '1'..='3') => {
            let rest = book[1..].trim_start();
            format!("{d} {rest}")
        }
        _ => book.to_string(),
    }
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .enumerate()
        .map(|(i, word)| {
            let lower = word.to_lowercase();
            if i > 0 && LOWERCASE_WORDS.contains(&lower.as_str()) {
                return lower;
            }
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_spacing_and_separators() {
        assert_eq!(normalize_reference("John 3:16").as_deref(), Some("John 3:16"));
        assert_eq!(normalize_reference("john   3 : 16").as_deref(), Some("John 3:16"));
        assert_eq!(normalize_reference("John 3.16-18.").as_deref(), Some("John 3:16-18"));
        assert_eq!(normalize_reference("Romans 8:28—30").as_deref(), Some("Romans 8:28-30"));
    }

    #[test]
    fn canonicalizes_book_names() {
        assert_eq!(normalize_reference("1john 1:9").as_deref(), Some("1 John 1:9"));
        assert_eq!(normalize_reference("II Corinthians 5:17").as_deref(), Some("2 Corinthians 5:17"));
        assert_eq!(normalize_reference("gen. 1:1").as_deref(), Some("Genesis 1:1"));
        assert_eq!(normalize_reference("song of songs 2").as_deref(), Some("Song of Solomon 2"));
        assert_eq!(normalize_reference("Psalm 23").as_deref(), Some("Psalms 23"));
    }

    #[test]
    fn unknown_books_are_title_cased() {
        assert_eq!(normalize_reference("tobit 4:15").as_deref(), Some("Tobit 4:15"));
    }

    #[test]
    fn whole_book_reference_has_no_locator() {
        assert_eq!(normalize_reference("Jude").as_deref(), Some("Jude"));
        assert_eq!(normalize_reference("1john").as_deref(), Some("1 John"));
    }

    #[test]
    fn prose_without_locator_is_not_a_book() {
        assert_eq!(normalize_reference("see above"), None);
        assert_eq!(normalize_reference("Tobit"), None);
        assert_eq!(normalize_reference("Introduction"), None);
    }

    #[test]
    fn non_references_are_rejected() {
        assert_eq!(normalize_reference("   "), None);
        assert_eq!(normalize_reference("3:16"), None);
        assert_eq!(normalize_reference("see the notes above!"), None);
    }
}
