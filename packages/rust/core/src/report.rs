//! The readiness gate: every inconsistency that blocks an import.

use std::collections::HashMap;

use serde::Serialize;

use scriptsync_shared::BookmarkRecord;

use crate::matcher::{MatchedChapter, MatchedContent, MatchedSection, Matching};

/// All contradictions of one document against its lecture.
///
/// An import is permitted iff [`ContradictionReport::total_count`] is zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContradictionReport {
    pub chapters: Vec<MatchedChapter>,
    pub sections: Vec<MatchedSection>,
    pub content: Vec<MatchedContent>,
    /// Destinations declared by more than one bookmark.
    pub duplicate_destinations: Vec<String>,
}

impl ContradictionReport {
    /// Collect contradictions from a finished matching and the raw bookmarks.
    pub fn collect(matching: &Matching, bookmarks: &[BookmarkRecord]) -> Self {
        Self {
            chapters: matching
                .chapters
                .iter()
                .filter(|c| c.contradiction.is_some())
                .cloned()
                .collect(),
            sections: matching
                .sections
                .iter()
                .filter(|s| s.contradiction.is_some())
                .cloned()
                .collect(),
            content: matching
                .content
                .iter()
                .filter(|c| c.contradiction.is_some())
                .cloned()
                .collect(),
            duplicate_destinations: duplicate_destinations(bookmarks),
        }
    }

    pub fn total_count(&self) -> usize {
        self.chapters.len()
            + self.sections.len()
            + self.content.len()
            + self.duplicate_destinations.len()
    }

    pub fn is_clear(&self) -> bool {
        self.total_count() == 0
    }
}

/// Destinations occurring more than once, in order of first occurrence.
pub fn duplicate_destinations(bookmarks: &[BookmarkRecord]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for b in bookmarks {
        *counts.entry(b.destination.as_str()).or_default() += 1;
    }

    let mut duplicates: Vec<String> = Vec::new();
    for b in bookmarks {
        if counts[b.destination.as_str()] > 1 && !duplicates.contains(&b.destination) {
            duplicates.push(b.destination.clone());
        }
    }
    duplicates
}
