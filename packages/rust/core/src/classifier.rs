//! Splits a raw bookmark list into chapter, section and content candidates.
//!
//! Each collection is sorted by the document's ordering counter (stable, so
//! equal counters keep their supplied order). Chapter candidates also get
//! their 1-based rank as `new_position`.

use serde::Serialize;
use tracing::debug;

use scriptsync_shared::{BookmarkRecord, OutlineConfig};

/// A chapter bookmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterCandidate {
    pub label: String,
    pub description: String,
    pub counter: i64,
    /// The chapter's own number, referenced by its sections and content.
    pub chapter: i64,
    pub destination: String,
    pub page: Option<i64>,
    /// Rank among all chapter candidates, starting at 1.
    pub new_position: i64,
}

/// A section bookmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionCandidate {
    pub label: String,
    pub description: String,
    pub counter: i64,
    /// Number of the containing chapter.
    pub chapter: Option<i64>,
    /// The section's own number, referenced by its content.
    pub section: i64,
    pub destination: String,
    pub page: Option<i64>,
}

/// Any bookmark that is neither chapter nor section (definitions, theorems, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentCandidate {
    /// Outline subkind, carried over to the content marker.
    pub kind: String,
    pub label: String,
    pub description: String,
    pub counter: i64,
    pub chapter: Option<i64>,
    pub section: Option<i64>,
    pub destination: String,
    pub page: Option<i64>,
}

/// The three candidate collections of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Candidates {
    pub chapters: Vec<ChapterCandidate>,
    pub sections: Vec<SectionCandidate>,
    pub content: Vec<ContentCandidate>,
}

/// Classify bookmarks by sort, using the configured chapter and section sorts.
pub fn classify(bookmarks: &[BookmarkRecord], outline: &OutlineConfig) -> Candidates {
    let mut candidates = Candidates::default();

    for b in bookmarks {
        if outline.is_chapter(&b.sort) {
            candidates.chapters.push(ChapterCandidate {
                label: b.label.clone(),
                description: b.description.clone(),
                counter: b.counter,
                chapter: b.chapter.unwrap_or(b.counter),
                destination: b.destination.clone(),
                page: b.page,
                new_position: 0,
            });
        } else if outline.is_section(&b.sort) {
            candidates.sections.push(SectionCandidate {
                label: b.label.clone(),
                description: b.description.clone(),
                counter: b.counter,
                chapter: b.chapter,
                section: b.section.unwrap_or(b.counter),
                destination: b.destination.clone(),
                page: b.page,
            });
        } else {
            candidates.content.push(ContentCandidate {
                kind: b.sort.clone(),
                label: b.label.clone(),
                description: b.description.clone(),
                counter: b.counter,
                chapter: b.chapter,
                section: b.section,
                destination: b.destination.clone(),
                page: b.page,
            });
        }
    }

    candidates.chapters.sort_by_key(|c| c.counter);
    candidates.sections.sort_by_key(|s| s.counter);
    candidates.content.sort_by_key(|c| c.counter);

    for (i, chapter) in candidates.chapters.iter_mut().enumerate() {
        chapter.new_position = i as i64 + 1;
    }

    debug!(
        chapters = candidates.chapters.len(),
        sections = candidates.sections.len(),
        content = candidates.content.len(),
        "bookmarks classified"
    );

    candidates
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn bookmark(
        sort: &str,
        label: &str,
        description: &str,
        counter: i64,
        chapter: Option<i64>,
        section: Option<i64>,
        destination: &str,
    ) -> BookmarkRecord {
        BookmarkRecord {
            sort: sort.into(),
            label: label.into(),
            description: description.into(),
            counter,
            chapter,
            section,
            destination: destination.into(),
            page: Some(counter),
        }
    }

    #[test]
    fn empty_input_yields_empty_collections() {
        let candidates = classify(&[], &OutlineConfig::default());
        assert_eq!(candidates, Candidates::default());
    }

    #[test]
    fn chapters_are_ranked_by_counter() {
        let bookmarks = vec![
            bookmark("Kapitel", "3", "Three", 30, Some(3), None, "c3"),
            bookmark("Kapitel", "1", "One", 10, Some(1), None, "c1"),
            bookmark("Kapitel", "2", "Two", 20, Some(2), None, "c2"),
        ];
        let candidates = classify(&bookmarks, &OutlineConfig::default());

        let counters: Vec<_> = candidates.chapters.iter().map(|c| c.counter).collect();
        assert_eq!(counters, vec![10, 20, 30]);
        let positions: Vec<_> = candidates.chapters.iter().map(|c| c.new_position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[test]
    fn equal_counters_keep_input_order() {
        let bookmarks = vec![
            bookmark("Definition", "1.1.1", "first", 5, Some(1), Some(1), "a"),
            bookmark("Satz", "1.1.2", "second", 5, Some(1), Some(1), "b"),
            bookmark("Lemma", "1.1.0", "earlier", 4, Some(1), Some(1), "c"),
        ];
        let candidates = classify(&bookmarks, &OutlineConfig::default());
        let destinations: Vec<_> = candidates
            .content
            .iter()
            .map(|c| c.destination.as_str())
            .collect();
        assert_eq!(destinations, vec!["c", "a", "b"]);
    }

    #[test]
    fn sorts_are_split_by_configuration() {
        let bookmarks = vec![
            bookmark("chapter", "1", "Intro", 1, Some(1), None, "c1"),
            bookmark("Abschnitt", "1.1", "Basics", 2, Some(1), Some(1), "s1"),
            bookmark("Bemerkung", "1.1.1", "Note", 3, Some(1), Some(1), "n1"),
        ];
        let candidates = classify(&bookmarks, &OutlineConfig::default());
        assert_eq!(candidates.chapters.len(), 1);
        assert_eq!(candidates.sections.len(), 1);
        assert_eq!(candidates.content.len(), 1);
        assert_eq!(candidates.content[0].kind, "Bemerkung");

        let strict = OutlineConfig {
            chapter_sorts: vec!["Kapitel".into()],
            ..OutlineConfig::default()
        };
        let candidates = classify(&bookmarks, &strict);
        assert!(candidates.chapters.is_empty());
        assert_eq!(candidates.content.len(), 2);
    }

    #[test]
    fn own_numbers_default_to_counter() {
        let bookmarks = vec![
            bookmark("Kapitel", "c1", "Intro", 1, None, None, "c1"),
            bookmark("Abschnitt", "s1", "Basics", 1, Some(1), None, "s1"),
        ];
        let candidates = classify(&bookmarks, &OutlineConfig::default());
        assert_eq!(candidates.chapters[0].chapter, 1);
        assert_eq!(candidates.sections[0].section, 1);
    }
}
