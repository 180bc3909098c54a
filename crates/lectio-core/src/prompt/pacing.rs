//! Book-study pacing: fits a book's chapters to the requested duration.
//!
//! The book table is embedded from `books.toml` at compile time.

use std::sync::LazyLock;

use serde::Deserialize;

/// One canonical book.
#[derive(Debug, Clone, Deserialize)]
pub struct Book {
    pub name: String,
    pub chapters: u32,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BookTable {
    books: Vec<Book>,
}

static BOOKS_TOML: &str = include_str!("books.toml");

/// # Panics
///
/// Panics on first access if the embedded TOML is malformed. The table is
/// compiled in, so a built binary always carries a valid one.
static BOOKS: LazyLock<Vec<Book>> = LazyLock::new(|| {
    let table: BookTable = toml::from_str(BOOKS_TOML).expect("embedded books.toml is invalid");
    table.books
});

/// All books in canonical order.
pub fn books() -> &'static [Book] {
    &BOOKS
}

/// Find the book named in free text, preferring the longest matching name
/// so "1 John" wins over "John".
pub fn find_book(text: &str) -> Option<&'static Book> {
    let haystack = text.to_lowercase();
    let mut best: Option<(&'static Book, usize)> = None;
    for book in books() {
        for name in std::iter::once(&book.name).chain(book.aliases.iter()) {
            let needle = name.to_lowercase();
            if contains_word(&haystack, &needle) && best.is_none_or(|(_, len)| needle.len() > len) {
                best = Some((book, needle.len()));
            }
        }
    }
    best.map(|(book, _)| book)
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(at, _)| {
        let before = haystack[..at].chars().next_back();
        let after = haystack[at + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// What one day of a book study covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    /// Orientation to the book before the chapters begin.
    Introduction,
    /// A contiguous chapter range, inclusive.
    Chapters { first: u32, last: u32 },
    /// A single chapter studied in depth when the book cannot fit.
    DeepDive { chapter: u32 },
    /// Practical application of what has been read.
    Application,
    /// Review of the whole book.
    Review,
}

impl Coverage {
    /// Chapter span this day reads, if any.
    pub fn span(self) -> Option<(u32, u32)> {
        match self {
            Self::Chapters { first, last } => Some((first, last)),
            Self::DeepDive { chapter } => Some((chapter, chapter)),
            Self::Introduction | Self::Application | Self::Review => None,
        }
    }

    /// Canonical reference for the span, e.g. `Acts 1` or `Romans 3-4`.
    pub fn reference(self, book: &str) -> Option<String> {
        self.span().map(|(first, last)| {
            if first == last {
                format!("{book} {first}")
            } else {
                format!("{book} {first}-{last}")
            }
        })
    }

    fn describe(self, book: &str) -> String {
        match self {
            Self::Introduction => format!("introduction to {book}: author, setting, and purpose"),
            Self::Chapters { first, last } if first == last => format!("{book} chapter {first}"),
            Self::Chapters { first, last } => format!("{book} chapters {first}-{last}"),
            Self::DeepDive { chapter } => {
                format!("{book} chapter {chapter} only, as a deep exposition")
            }
            Self::Application => format!("application of the themes of {book} to daily life"),
            Self::Review => format!("review of the whole book of {book}"),
        }
    }
}

/// How the duration relates to the book's length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingMode {
    SingleChapterDeepDive,
    GroupedChapters,
    OneChapterPerDay,
    WithFillerDays,
}

/// Per-day coverage for a book study.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pacing {
    pub book: String,
    pub chapters: u32,
    pub mode: PacingMode,
    pub days: Vec<Coverage>,
}

impl Pacing {
    /// Coverage for a 1-based day number.
    pub fn day(&self, day_number: u32) -> Option<Coverage> {
        let index = usize::try_from(day_number.checked_sub(1)?).ok()?;
        self.days.get(index).copied()
    }

    /// Prompt instructions describing the whole schedule.
    pub fn instructions(&self) -> String {
        let mut out = String::with_capacity(128 + self.days.len() * 48);
        let headline = match self.mode {
            PacingMode::SingleChapterDeepDive => format!(
                "{} has {} chapters but the study lasts one day. Cover chapter 1 only, in deep exposition. Do not reference any other chapter.",
                self.book, self.chapters
            ),
            PacingMode::GroupedChapters => format!(
                "{} has {} chapters across {} days. Group consecutive chapters exactly as scheduled below.",
                self.book,
                self.chapters,
                self.days.len()
            ),
            PacingMode::OneChapterPerDay => format!(
                "{} has {} chapters. Study exactly one chapter per day, in order.",
                self.book, self.chapters
            ),
            PacingMode::WithFillerDays => format!(
                "{} has only {} chapters across {} days. Use the extra days for introduction, application, and review as scheduled below.",
                self.book,
                self.chapters,
                self.days.len()
            ),
        };
        out.push_str(&headline);
        out.push_str("\n\nSchedule:\n");
        for (i, coverage) in self.days.iter().enumerate() {
            out.push_str(&format!("- Day {}: {}\n", i + 1, coverage.describe(&self.book)));
        }
        out
    }
}

/// Compute per-day coverage of `book` over `days` days.
///
/// Grouping spreads the remainder over the earliest days, so `chapters = 5`
/// over `days = 2` yields `1-3` and `4-5`.
pub fn plan_coverage(book: &Book, days: u32) -> Pacing {
    let chapters = book.chapters.max(1);
    let days = days.max(1);

    let (mode, coverage) = if days == 1 && chapters > 1 {
        (
            PacingMode::SingleChapterDeepDive,
            vec![Coverage::DeepDive { chapter: 1 }],
        )
    } else if days < chapters {
        let base = chapters / days;
        let extra = chapters % days;
        let mut next = 1;
        let coverage = (0..days)
            .map(|i| {
                let len = base + u32::from(i < extra);
                let range = Coverage::Chapters {
                    first: next,
                    last: next + len - 1,
                };
                next += len;
                range
            })
            .collect();
        (PacingMode::GroupedChapters, coverage)
    } else if days == chapters {
        let coverage = (1..=chapters)
            .map(|c| Coverage::Chapters { first: c, last: c })
            .collect();
        (PacingMode::OneChapterPerDay, coverage)
    } else {
        let fillers = days - chapters;
        let mut coverage = Vec::with_capacity(days as usize);
        coverage.push(Coverage::Introduction);
        coverage.extend((1..=chapters).map(|c| Coverage::Chapters { first: c, last: c }));
        if fillers >= 2 {
            coverage.extend(std::iter::repeat_n(Coverage::Application, (fillers - 2) as usize));
            coverage.push(Coverage::Review);
        }
        (PacingMode::WithFillerDays, coverage)
    };

    Pacing {
        book: book.name.clone(),
        chapters,
        mode,
        days: coverage,
    }
}

/// Chapter span named by `reference` if it cites `book`, e.g.
/// `Acts 2:1-4` gives `(2, 2)` and `Acts 2-3` gives `(2, 3)`.
pub fn chapter_span(reference: &str, book: &Book) -> Option<(u32, u32)> {
    let lower = reference.trim().to_lowercase();
    let rest = std::iter::once(&book.name)
        .chain(book.aliases.iter())
        .filter_map(|name| lower.strip_prefix(&name.to_lowercase()))
        .find(|rest| rest.starts_with(|c: char| c.is_whitespace() || c == '.'))?;
    let rest = rest.trim_start_matches(['.', ' ']);

    let (start, end) = match rest.split_once(['-', '–']) {
        Some((start, end)) => (start.trim(), Some(end.trim())),
        None => (rest.trim(), None),
    };
    let first: u32 = start.split(':').next()?.trim().parse().ok()?;
    let last = match end {
        // `2:1-4` keeps chapter 2; `2:1-3:4` and `2-3` move to chapter 3.
        Some(end) if end.contains(':') || !start.contains(':') => {
            end.split(':').next()?.trim().parse().ok()?
        }
        _ => first,
    };
    (last >= first).then_some((first, last))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(name: &str) -> &'static Book {
        books().iter().find(|b| b.name == name).unwrap()
    }

    #[test]
    fn table_has_sixty_six_books() {
        assert_eq!(books().len(), 66);
        assert_eq!(book("Acts").chapters, 28);
        assert_eq!(book("Psalms").chapters, 150);
    }

    #[test]
    fn find_book_prefers_longest_match() {
        assert_eq!(find_book("Walking through 1 John").unwrap().name, "1 John");
        assert_eq!(find_book("The Gospel of John").unwrap().name, "John");
        assert_eq!(find_book("first corinthians in depth").unwrap().name, "1 Corinthians");
        assert_eq!(find_book("Song of Songs").unwrap().name, "Song of Solomon");
        assert!(find_book("Jobs and careers").is_none());
    }

    #[test]
    fn one_day_of_long_book_is_chapter_one_deep_dive() {
        let pacing = plan_coverage(book("Acts"), 1);
        assert_eq!(pacing.mode, PacingMode::SingleChapterDeepDive);
        assert_eq!(pacing.days, vec![Coverage::DeepDive { chapter: 1 }]);
        assert!(pacing.instructions().contains("chapter 1 only"));
    }

    #[test]
    fn fewer_days_than_chapters_groups_evenly() {
        let pacing = plan_coverage(book("Romans"), 5);
        assert_eq!(pacing.mode, PacingMode::GroupedChapters);
        let spans: Vec<_> = pacing.days.iter().map(|c| c.span().unwrap()).collect();
        assert_eq!(spans, vec![(1, 4), (5, 7), (8, 10), (11, 13), (14, 16)]);
    }

    #[test]
    fn equal_days_and_chapters_is_one_per_day() {
        let pacing = plan_coverage(book("Philippians"), 4);
        assert_eq!(pacing.mode, PacingMode::OneChapterPerDay);
        assert_eq!(pacing.day(4), Some(Coverage::Chapters { first: 4, last: 4 }));
        assert_eq!(pacing.day(5), None);
        assert_eq!(pacing.day(0), None);
    }

    #[test]
    fn extra_days_become_fillers() {
        let pacing = plan_coverage(book("Ruth"), 8);
        assert_eq!(pacing.mode, PacingMode::WithFillerDays);
        assert_eq!(pacing.days.len(), 8);
        assert_eq!(pacing.days[0], Coverage::Introduction);
        assert_eq!(pacing.days[5], Coverage::Application);
        assert_eq!(pacing.days[6], Coverage::Application);
        assert_eq!(pacing.days[7], Coverage::Review);

        let one_extra = plan_coverage(book("Ruth"), 5);
        assert_eq!(one_extra.days[0], Coverage::Introduction);
        assert_eq!(one_extra.days[4], Coverage::Chapters { first: 4, last: 4 });
    }

    #[test]
    fn single_chapter_book_over_one_day() {
        let pacing = plan_coverage(book("Jude"), 1);
        assert_eq!(pacing.mode, PacingMode::OneChapterPerDay);
        assert_eq!(pacing.days[0].reference("Jude").as_deref(), Some("Jude 1"));
    }

    #[test]
    fn chapter_span_parses_common_forms() {
        let acts = book("Acts");
        assert_eq!(chapter_span("Acts 2:1-4", acts), Some((2, 2)));
        assert_eq!(chapter_span("Acts 2-3", acts), Some((2, 3)));
        assert_eq!(chapter_span("acts 2:40-3:10", acts), Some((2, 3)));
        assert_eq!(chapter_span("Acts 1", acts), Some((1, 1)));
        assert_eq!(chapter_span("Romans 1:1", acts), None);
        assert_eq!(chapter_span("Actsx 1", acts), None);
    }
}
