//! Core domain types for scriptsync: outline input, curriculum entities, anchors.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ScriptSyncError};

/// Generate a new time-sortable entity identifier (UUID v7).
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

// ---------------------------------------------------------------------------
// Outline input
// ---------------------------------------------------------------------------

/// One bookmark of a document outline, as produced by the outline extractor.
///
/// Chapter and section bookmarks carry their own number in `chapter` /
/// `section`; content bookmarks use the same fields to point at their parents.
/// These are document-local counters, never database ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkRecord {
    /// Kind of bookmark (chapter sort, section sort, or a content subkind).
    pub sort: String,
    /// Stable cross-document reference, e.g. `"2.3"`.
    #[serde(default)]
    pub label: String,
    /// Display title.
    #[serde(default)]
    pub description: String,
    /// Document order within the bookmark's kind.
    #[serde(alias = "orderingCounter")]
    pub counter: i64,
    /// Chapter number (own number for chapters, parent for everything else).
    #[serde(default, alias = "parentChapterCounter")]
    pub chapter: Option<i64>,
    /// Section number (own number for sections, parent for content).
    #[serde(default, alias = "parentSectionCounter")]
    pub section: Option<i64>,
    /// Anchor key, unique within the document.
    #[serde(alias = "anchorDestination")]
    pub destination: String,
    /// Page the bookmark points to.
    #[serde(default)]
    pub page: Option<i64>,
}

/// Accepted shapes of a bookmark file: a bare array, or the extractor's
/// metadata object with a `bookmarks` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Outline {
    Bookmarks(Vec<BookmarkRecord>),
    Metadata {
        #[serde(default)]
        bookmarks: Vec<BookmarkRecord>,
    },
}

impl Outline {
    /// Decode an outline from JSON and return its bookmarks in supplied order.
    pub fn from_json(json: &str) -> Result<Vec<BookmarkRecord>> {
        let outline: Outline = serde_json::from_str(json)
            .map_err(|e| ScriptSyncError::parse(format!("invalid bookmark outline: {e}")))?;
        Ok(outline.into_bookmarks())
    }

    pub fn into_bookmarks(self) -> Vec<BookmarkRecord> {
        match self {
            Self::Bookmarks(bookmarks) | Self::Metadata { bookmarks } => bookmarks,
        }
    }
}

// ---------------------------------------------------------------------------
// Curriculum entities
// ---------------------------------------------------------------------------

/// A lecture owning an ordered list of chapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lecture {
    pub id: String,
    pub title: String,
}

/// A persisted chapter, ranked among its lecture's chapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub lecture_id: String,
    pub title: String,
    /// Stable reference matched against bookmark labels.
    pub reference: String,
    /// 1-based rank among the lecture's chapters.
    pub position: i64,
}

/// A persisted section, ranked among its chapter's sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub chapter_id: String,
    pub title: String,
    pub reference: String,
    /// 1-based rank among the chapter's sections.
    pub position: i64,
}

/// A medium (document) whose anchors are reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medium {
    pub id: String,
    /// Owning lecture; media attached elsewhere have none.
    pub lecture_id: Option<String>,
    /// Medium sort, e.g. `"Script"`.
    pub sort: String,
    pub description: String,
}

// ---------------------------------------------------------------------------
// Navigation anchors
// ---------------------------------------------------------------------------

/// What a navigation anchor marks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorKind {
    Chapter,
    Section,
    /// Content leaf, carrying its outline subkind (e.g. `"Definition"`).
    Content(String),
    /// The anchor every medium has for itself.
    #[serde(rename = "self")]
    SelfAnchor,
    /// Bare named destination in the document.
    Destination,
}

impl AnchorKind {
    /// Value stored in the `sort` column.
    pub fn sort(&self) -> &'static str {
        match self {
            Self::Chapter => "chapter",
            Self::Section => "section",
            Self::Content(_) => "content",
            Self::SelfAnchor => "self",
            Self::Destination => "destination",
        }
    }

    /// Content subkind, stored alongside the sort.
    pub fn content_kind(&self) -> Option<&str> {
        match self {
            Self::Content(kind) => Some(kind),
            _ => None,
        }
    }

    /// Rebuild a kind from its stored columns.
    pub fn from_columns(sort: &str, content_kind: Option<String>) -> Result<Self> {
        match sort {
            "chapter" => Ok(Self::Chapter),
            "section" => Ok(Self::Section),
            "content" => Ok(Self::Content(content_kind.unwrap_or_default())),
            "self" => Ok(Self::SelfAnchor),
            "destination" => Ok(Self::Destination),
            other => Err(ScriptSyncError::Storage(format!("unknown anchor sort: {other}"))),
        }
    }

    /// Chapter, section and content markers are derived from outline bookmarks.
    pub fn is_marker(&self) -> bool {
        matches!(self, Self::Chapter | Self::Section | Self::Content(_))
    }
}

/// A persisted pointer into a medium.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationAnchor {
    pub id: String,
    pub medium_id: String,
    pub kind: AnchorKind,
    pub destination: Option<String>,
    pub section_id: Option<String>,
    pub page: Option<i64>,
    pub description: Option<String>,
    pub reference: Option<String>,
    /// Order of a content marker within its section.
    pub position: Option<i64>,
}

/// Fields for a new anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAnchor {
    pub medium_id: String,
    pub kind: AnchorKind,
    pub destination: Option<String>,
    pub section_id: Option<String>,
    pub page: Option<i64>,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub position: Option<i64>,
}

/// Mutable fields of a marker anchor. Identity, medium and destination stay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorUpdate {
    pub kind: AnchorKind,
    pub section_id: Option<String>,
    pub page: Option<i64>,
    pub description: String,
    pub reference: String,
    pub position: Option<i64>,
}

/// A cross-document reference from a medium to an anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Referral {
    pub id: String,
    /// The referring medium.
    pub medium_id: String,
    /// The referenced anchor (usually in another medium).
    pub anchor_id: String,
}
