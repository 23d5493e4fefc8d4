//! Matches classified candidates against a lecture's persisted hierarchy.
//!
//! Matching is two-phase: a candidate first has to hang off a candidate of
//! the same document, and only then is it compared by reference and title.
//! Persisted chapters and sections are only read here.

use std::collections::HashSet;

use serde::Serialize;

use scriptsync_shared::{Chapter, Section};

use crate::classifier::{Candidates, ChapterCandidate, ContentCandidate, SectionCandidate};

/// Why a candidate is inconsistent with the outline or the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Contradiction {
    /// A persisted entity with the same reference has a different title.
    TitleMismatch,
    /// The parent chapter number matches no chapter bookmark.
    MissingParentChapter,
    /// The parent section number matches no section bookmark.
    MissingParentSection,
}

impl std::fmt::Display for Contradiction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::TitleMismatch => "title differs from the lecture",
            Self::MissingParentChapter => "chapter has no bookmark",
            Self::MissingParentSection => "section has no bookmark",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedChapter {
    pub candidate: ChapterCandidate,
    pub persisted: Option<Chapter>,
    pub contradiction: Option<Contradiction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedSection {
    pub candidate: SectionCandidate,
    pub persisted: Option<Section>,
    pub contradiction: Option<Contradiction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedContent {
    pub candidate: ContentCandidate,
    pub contradiction: Option<Contradiction>,
}

/// A chapter an import would create: rank, title and document counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewChapter {
    pub position: i64,
    pub title: String,
    pub counter: i64,
}

/// Candidates enriched with their persisted counterparts and contradictions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Matching {
    pub chapters: Vec<MatchedChapter>,
    pub sections: Vec<MatchedSection>,
    pub content: Vec<MatchedContent>,
}

/// Match candidates against the lecture's chapters and sections.
pub fn match_candidates(
    candidates: Candidates,
    chapters: &[Chapter],
    sections: &[Section],
) -> Matching {
    let matched_chapters: Vec<MatchedChapter> = candidates
        .chapters
        .into_iter()
        .map(|candidate| {
            let persisted = chapters
                .iter()
                .find(|c| c.reference == candidate.label)
                .cloned();
            let contradiction = title_contradiction(
                persisted.as_ref().map(|c| c.title.as_str()),
                &candidate.description,
            );
            MatchedChapter {
                candidate,
                persisted,
                contradiction,
            }
        })
        .collect();

    let chapter_numbers: HashSet<i64> = matched_chapters
        .iter()
        .map(|c| c.candidate.chapter)
        .collect();

    let matched_sections: Vec<MatchedSection> = candidates
        .sections
        .into_iter()
        .map(|candidate| {
            let parent = candidate.chapter.and_then(|number| {
                matched_chapters
                    .iter()
                    .find(|c| c.candidate.chapter == number)
            });
            let Some(parent) = parent else {
                return MatchedSection {
                    candidate,
                    persisted: None,
                    contradiction: Some(Contradiction::MissingParentChapter),
                };
            };
            let persisted = parent.persisted.as_ref().and_then(|chapter| {
                sections
                    .iter()
                    .find(|s| s.chapter_id == chapter.id && s.reference == candidate.label)
                    .cloned()
            });
            let contradiction = title_contradiction(
                persisted.as_ref().map(|s| s.title.as_str()),
                &candidate.description,
            );
            MatchedSection {
                candidate,
                persisted,
                contradiction,
            }
        })
        .collect();

    let section_keys: HashSet<(Option<i64>, i64)> = matched_sections
        .iter()
        .map(|s| (s.candidate.chapter, s.candidate.section))
        .collect();

    let matched_content = candidates
        .content
        .into_iter()
        .map(|candidate| {
            let contradiction = if !candidate
                .chapter
                .is_some_and(|n| chapter_numbers.contains(&n))
            {
                Some(Contradiction::MissingParentChapter)
            } else if !candidate
                .section
                .is_some_and(|n| section_keys.contains(&(candidate.chapter, n)))
            {
                Some(Contradiction::MissingParentSection)
            } else {
                None
            };
            MatchedContent {
                candidate,
                contradiction,
            }
        })
        .collect();

    Matching {
        chapters: matched_chapters,
        sections: matched_sections,
        content: matched_content,
    }
}

fn title_contradiction(persisted_title: Option<&str>, description: &str) -> Option<Contradiction> {
    match persisted_title {
        Some(title) if title != description => Some(Contradiction::TitleMismatch),
        _ => None,
    }
}

impl Matching {
    /// Section candidates of a chapter, in document order.
    pub fn sections_in_chapter(&self, chapter: &ChapterCandidate) -> Vec<&MatchedSection> {
        self.sections
            .iter()
            .filter(|s| s.candidate.chapter == Some(chapter.chapter))
            .collect()
    }

    /// Content candidates of a section, in document order. Section numbers
    /// may restart per chapter, so both parent numbers must agree.
    pub fn content_in_section(&self, section: &SectionCandidate) -> Vec<&MatchedContent> {
        self.content
            .iter()
            .filter(|c| c.candidate.chapter == section.chapter)
            .filter(|c| c.candidate.section == Some(section.section))
            .collect()
    }

    /// Sections whose chapter has no bookmark in this document.
    pub fn sections_in_unbookmarked_chapters(&self) -> Vec<&MatchedSection> {
        self.sections
            .iter()
            .filter(|s| s.contradiction == Some(Contradiction::MissingParentChapter))
            .collect()
    }

    /// Content whose chapter or section has no bookmark in this document.
    pub fn content_in_unbookmarked_locations(&self) -> Vec<&MatchedContent> {
        self.content
            .iter()
            .filter(|c| c.contradiction.is_some())
            .collect()
    }

    /// Chapters without a persisted counterpart, i.e. what an import creates.
    pub fn new_chapters(&self) -> Vec<NewChapter> {
        self.chapters
            .iter()
            .filter(|c| c.persisted.is_none())
            .map(|c| NewChapter {
                position: c.candidate.new_position,
                title: c.candidate.description.clone(),
                counter: c.candidate.counter,
            })
            .collect()
    }

    /// Persisted chapters no candidate matched.
    pub fn unmatched_chapters<'a>(&self, chapters: &'a [Chapter]) -> Vec<&'a Chapter> {
        let matched: HashSet<&str> = self
            .chapters
            .iter()
            .filter_map(|c| c.persisted.as_ref().map(|p| p.id.as_str()))
            .collect();
        chapters
            .iter()
            .filter(|c| !matched.contains(c.id.as_str()))
            .collect()
    }

    /// Persisted sections no candidate matched.
    pub fn unmatched_sections<'a>(&self, sections: &'a [Section]) -> Vec<&'a Section> {
        let matched: HashSet<&str> = self
            .sections
            .iter()
            .filter_map(|s| s.persisted.as_ref().map(|p| p.id.as_str()))
            .collect();
        sections
            .iter()
            .filter(|s| !matched.contains(s.id.as_str()))
            .collect()
    }
}
