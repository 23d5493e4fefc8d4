//! Contracts of the stores the reconciliation engine reads and writes.
//!
//! The libSQL storage crate implements all three; the engine is generic over
//! them so a run only needs the capabilities it actually uses.

#![allow(async_fn_in_trait)]

use std::collections::HashSet;

use crate::error::Result;
use crate::types::{
    AnchorUpdate, Chapter, Lecture, Medium, NavigationAnchor, NewAnchor, Section,
};

/// Read access to a lecture's chapters and sections, plus insert-at-rank.
pub trait CurriculumStore {
    async fn get_lecture(&self, lecture_id: &str) -> Result<Option<Lecture>>;

    /// Chapters of a lecture, ordered by position.
    async fn list_chapters(&self, lecture_id: &str) -> Result<Vec<Chapter>>;

    /// Sections of all chapters of a lecture, ordered by chapter then position.
    async fn list_sections(&self, lecture_id: &str) -> Result<Vec<Section>>;

    /// Insert a chapter at a 1-based rank; siblings at or after it shift down.
    async fn insert_chapter_at(
        &self,
        lecture_id: &str,
        title: &str,
        reference: &str,
        position: i64,
    ) -> Result<Chapter>;

    /// Insert a section at a 1-based rank; siblings at or after it shift down.
    async fn insert_section_at(
        &self,
        chapter_id: &str,
        title: &str,
        reference: &str,
        position: i64,
    ) -> Result<Section>;
}

/// Anchor records scoped to one medium, keyed by destination.
pub trait AnchorStore {
    async fn get_medium(&self, medium_id: &str) -> Result<Option<Medium>>;

    async fn list_anchors(&self, medium_id: &str) -> Result<Vec<NavigationAnchor>>;

    /// The anchor of a medium that carries this destination, whatever its
    /// kind. Self anchors never carry one.
    async fn find_anchor(
        &self,
        medium_id: &str,
        destination: &str,
    ) -> Result<Option<NavigationAnchor>>;

    async fn insert_anchor(&self, anchor: &NewAnchor) -> Result<NavigationAnchor>;

    async fn update_anchor(&self, anchor_id: &str, update: &AnchorUpdate) -> Result<()>;

    async fn delete_anchor(&self, anchor_id: &str) -> Result<()>;

    /// Detach an anchor from its destination without deleting it.
    async fn clear_destination(&self, anchor_id: &str) -> Result<()>;
}

/// Cross-document references onto anchors.
pub trait ReferralStore {
    /// Ids of this medium's anchors that some referral points to.
    async fn referred_anchor_ids(&self, medium_id: &str) -> Result<HashSet<String>>;
}
