//! Per-style prompt variants, keyed by the closed [`ContentStyle`] set.

use lectio_db::models::ContentStyle;

/// The parts of a prompt that vary with content style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleTemplate {
    /// Short human label used in the prompt header.
    pub label: &'static str,
    /// Voice and tone for all generated text.
    pub voice: &'static str,
    /// How the days should be arranged during planning.
    pub planning: &'static str,
    /// What each day's content should emphasize.
    pub daily: &'static str,
}

const DEVOTIONAL: StyleTemplate = StyleTemplate {
    label: "reflective devotional",
    voice: "warm, pastoral and contemplative; speak to the heart as well as the mind",
    planning: "Build a gentle progression from invitation to rest to renewed practice. \
               Each day should center on one short passage suited to slow, prayerful reading.",
    daily: "Open with the passage, draw out one central truth, and move the reader toward \
            personal reflection and prayer. Favor stillness over information.",
};

const TOPICAL: StyleTemplate = StyleTemplate {
    label: "thematic topical study",
    voice: "clear and teaching-focused, with an even, confident tone",
    planning: "Trace the theme across both testaments. Each day examines one facet of the \
               topic through a different passage, building toward a coherent whole.",
    daily: "Explain how the passage contributes to the theme, connect it to at least one \
            other scripture, and close with concrete application.",
};

const BOOK_STUDY: StyleTemplate = StyleTemplate {
    label: "sequential book exposition",
    voice: "careful and expository; attentive to context, structure and original setting",
    planning: "Walk through the book in canonical order. Follow the chapter schedule \
               exactly; never skip ahead or revisit earlier chapters out of order.",
    daily: "Expound the assigned chapters in order: context, structure, key verses, and \
            meaning for the original audience before application today.",
};

const RELATIONSHIP: StyleTemplate = StyleTemplate {
    label: "relationship-focused study",
    voice: "conversational and practical; suitable for couples, friends or small groups",
    planning: "Arrange days around relational practices: listening, forgiveness, service, \
               encouragement and commitment, each grounded in scripture.",
    daily: "Write discussion questions meant to be answered together, and application \
            points that two or more people can practice this week.",
};

/// Template for a style.
pub fn template_for(style: ContentStyle) -> &'static StyleTemplate {
    match style {
        ContentStyle::Devotional => &DEVOTIONAL,
        ContentStyle::Topical => &TOPICAL,
        ContentStyle::BookStudy => &BOOK_STUDY,
        ContentStyle::Relationship => &RELATIONSHIP,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn every_style_has_a_distinct_template() {
        let styles = [
            ContentStyle::Devotional,
            ContentStyle::Topical,
            ContentStyle::BookStudy,
            ContentStyle::Relationship,
        ];
        let labels: HashSet<_> = styles.iter().map(|s| template_for(*s).label).collect();
        assert_eq!(labels.len(), styles.len());
        let bodies: HashSet<_> = styles.iter().map(|s| template_for(*s).daily).collect();
        assert_eq!(bodies.len(), styles.len());
    }
}
