//! A medium's outline loaded against its lecture, and the three entry points
//! of the engine: [`compute_contradictions`], [`import_if_eligible`] and
//! [`reconcile_destinations`].

use serde::Serialize;
use tracing::{info, instrument, warn};

use scriptsync_shared::{
    AnchorStore, BookmarkRecord, Chapter, CurriculumStore, Lecture, Medium, OutlineConfig,
    ReferralStore, Result, ScriptSyncError, Section,
};

use crate::classifier::classify;
use crate::destinations::{self, DestinationSync};
use crate::importer::{self, ImportSummary};
use crate::matcher::{MatchedContent, MatchedSection, Matching, NewChapter, match_candidates};
use crate::report::ContradictionReport;

/// The outline of a lecture script, matched against the lecture's hierarchy.
#[derive(Debug, Clone)]
pub struct Manuscript {
    medium: Medium,
    lecture: Lecture,
    bookmarks: Vec<BookmarkRecord>,
    chapters: Vec<Chapter>,
    sections: Vec<Section>,
    matching: Matching,
}

/// Outcome of [`import_if_eligible`].
#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub imported: bool,
    pub report: ContradictionReport,
    /// Present when the import ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ImportSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destinations: Option<DestinationSync>,
}

impl Manuscript {
    /// Load a script medium, its lecture and the lecture's hierarchy, and
    /// match `bookmarks` against it.
    ///
    /// Fails when the medium is not a script of a lecture.
    pub async fn load<S>(
        store: &S,
        medium_id: &str,
        bookmarks: Vec<BookmarkRecord>,
        outline: &OutlineConfig,
    ) -> Result<Self>
    where
        S: CurriculumStore + AnchorStore,
    {
        let medium = store
            .get_medium(medium_id)
            .await?
            .ok_or_else(|| ScriptSyncError::not_found("medium", medium_id))?;
        if medium.sort != outline.script_sort {
            return Err(ScriptSyncError::validation(format!(
                "medium {} has sort {:?}, expected {:?}",
                medium.id, medium.sort, outline.script_sort
            )));
        }
        let lecture_id = medium.lecture_id.as_deref().ok_or_else(|| {
            ScriptSyncError::validation(format!("medium {} does not belong to a lecture", medium.id))
        })?;
        let lecture = store
            .get_lecture(lecture_id)
            .await?
            .ok_or_else(|| ScriptSyncError::not_found("lecture", lecture_id))?;

        let chapters = store.list_chapters(&lecture.id).await?;
        let sections = store.list_sections(&lecture.id).await?;
        let matching = match_candidates(classify(&bookmarks, outline), &chapters, &sections);

        Ok(Self {
            medium,
            lecture,
            bookmarks,
            chapters,
            sections,
            matching,
        })
    }

    pub fn medium(&self) -> &Medium {
        &self.medium
    }

    pub fn lecture(&self) -> &Lecture {
        &self.lecture
    }

    pub fn bookmarks(&self) -> &[BookmarkRecord] {
        &self.bookmarks
    }

    pub fn matching(&self) -> &Matching {
        &self.matching
    }

    /// Contradictions of this outline. Recomputed on every call.
    pub fn contradictions(&self) -> ContradictionReport {
        ContradictionReport::collect(&self.matching, &self.bookmarks)
    }

    pub fn contradiction_count(&self) -> usize {
        self.contradictions().total_count()
    }

    pub fn new_chapters(&self) -> Vec<NewChapter> {
        self.matching.new_chapters()
    }

    pub fn unmatched_chapters(&self) -> Vec<&Chapter> {
        self.matching.unmatched_chapters(&self.chapters)
    }

    pub fn unmatched_sections(&self) -> Vec<&Section> {
        self.matching.unmatched_sections(&self.sections)
    }

    pub fn sections_in_unbookmarked_chapters(&self) -> Vec<&MatchedSection> {
        self.matching.sections_in_unbookmarked_chapters()
    }

    pub fn content_in_unbookmarked_locations(&self) -> Vec<&MatchedContent> {
        self.matching.content_in_unbookmarked_locations()
    }
}

/// Contradictions between `bookmarks` and the hierarchy of a lecture.
#[instrument(skip_all, fields(lecture_id = %lecture_id, bookmarks = bookmarks.len()))]
pub async fn compute_contradictions<S: CurriculumStore>(
    store: &S,
    bookmarks: &[BookmarkRecord],
    lecture_id: &str,
    outline: &OutlineConfig,
) -> Result<ContradictionReport> {
    let lecture = store
        .get_lecture(lecture_id)
        .await?
        .ok_or_else(|| ScriptSyncError::not_found("lecture", lecture_id))?;
    let chapters = store.list_chapters(&lecture.id).await?;
    let sections = store.list_sections(&lecture.id).await?;

    let matching = match_candidates(classify(bookmarks, outline), &chapters, &sections);
    let report = ContradictionReport::collect(&matching, bookmarks);
    info!(contradictions = report.total_count(), "contradictions computed");
    Ok(report)
}

/// Import the outline of a script medium into its lecture when it has no
/// contradictions. Otherwise nothing is written and `imported` is false.
///
/// Bare destinations are reconciled first, then chapters and sections are
/// created and each marker takes over the anchor carrying its destination.
#[instrument(skip_all, fields(medium_id = %medium_id, bookmarks = bookmarks.len()))]
pub async fn import_if_eligible<S>(
    store: &S,
    bookmarks: &[BookmarkRecord],
    medium_id: &str,
    outline: &OutlineConfig,
) -> Result<ImportOutcome>
where
    S: CurriculumStore + AnchorStore + ReferralStore,
{
    let manuscript = Manuscript::load(store, medium_id, bookmarks.to_vec(), outline).await?;
    let report = manuscript.contradictions();

    if !report.is_clear() {
        warn!(
            contradictions = report.total_count(),
            "outline has contradictions, not importing"
        );
        return Ok(ImportOutcome {
            imported: false,
            report,
            summary: None,
            destinations: None,
        });
    }

    let destinations =
        destinations::reconcile_destinations(store, medium_id, manuscript.bookmarks()).await?;
    let summary = importer::import(
        store,
        &manuscript.lecture().id,
        medium_id,
        manuscript.matching(),
    )
    .await?;

    Ok(ImportOutcome {
        imported: true,
        report,
        summary: Some(summary),
        destinations: Some(destinations),
    })
}

/// Bring the bare destination anchors of a medium in line with `bookmarks`.
pub async fn reconcile_destinations<S>(
    store: &S,
    bookmarks: &[BookmarkRecord],
    medium_id: &str,
) -> Result<DestinationSync>
where
    S: AnchorStore + ReferralStore,
{
    destinations::reconcile_destinations(store, medium_id, bookmarks).await
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::HashSet;

    use super::*;
    use crate::classifier::tests::bookmark;
    use crate::matcher::Contradiction;
    use crate::test_support::{script_with_lecture, small_outline, test_storage};
    use scriptsync_shared::{AnchorKind, AnchorUpdate, NavigationAnchor, NewAnchor};
    use scriptsync_storage::Storage;

    async fn markers(storage: &Storage, medium_id: &str) -> Vec<NavigationAnchor> {
        storage
            .list_anchors(medium_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|a| a.kind.is_marker())
            .collect()
    }

    #[tokio::test]
    async fn end_to_end_single_chapter_section_and_leaf() {
        let storage = test_storage().await;
        let (lecture, medium) = script_with_lecture(&storage).await;
        let outline = OutlineConfig::default();
        let bookmarks = small_outline();

        let report = compute_contradictions(&storage, &bookmarks, &lecture.id, &outline)
            .await
            .unwrap();
        assert_eq!(report.total_count(), 0);

        let outcome = import_if_eligible(&storage, &bookmarks, &medium.id, &outline)
            .await
            .unwrap();
        assert!(outcome.imported);
        assert_eq!(
            outcome.summary,
            Some(ImportSummary {
                chapters_created: 1,
                sections_created: 1,
                anchors_created: 0,
                anchors_converted: 3,
                anchors_updated: 0,
            })
        );
        assert_eq!(
            outcome.destinations,
            Some(DestinationSync {
                created: 3,
                destroyed: 0
            })
        );

        let chapters = storage.list_chapters(&lecture.id).await.unwrap();
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, "Intro");
        assert_eq!(chapters[0].reference, "c1");

        let sections = storage.list_sections(&lecture.id).await.unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, "Basics");
        assert_eq!(sections[0].chapter_id, chapters[0].id);

        let anchors = storage.list_anchors(&medium.id).await.unwrap();
        let mut kinds: Vec<_> = anchors.iter().map(|a| a.kind.sort()).collect();
        kinds.sort_unstable();
        assert_eq!(kinds, vec!["chapter", "content", "section", "self"]);
        let by_destination = |d: &str| {
            anchors
                .iter()
                .find(|a| a.destination.as_deref() == Some(d))
                .unwrap()
        };
        assert_eq!(by_destination("dest.c1").kind, AnchorKind::Chapter);
        assert_eq!(by_destination("dest.c1").section_id, None);
        assert_eq!(by_destination("dest.s1").kind, AnchorKind::Section);
        assert_eq!(
            by_destination("dest.s1").section_id.as_deref(),
            Some(sections[0].id.as_str())
        );
        let leaf = by_destination("dest.d1");
        assert_eq!(leaf.kind, AnchorKind::Content("Definition".into()));
        assert_eq!(leaf.section_id.as_deref(), Some(sections[0].id.as_str()));
        assert_eq!(leaf.position, Some(1));
    }

    #[tokio::test]
    async fn second_import_changes_nothing() {
        let storage = test_storage().await;
        let (lecture, medium) = script_with_lecture(&storage).await;
        let outline = OutlineConfig::default();
        let bookmarks = small_outline();

        import_if_eligible(&storage, &bookmarks, &medium.id, &outline)
            .await
            .unwrap();
        let chapters = storage.list_chapters(&lecture.id).await.unwrap();
        let sections = storage.list_sections(&lecture.id).await.unwrap();
        let anchors = storage.list_anchors(&medium.id).await.unwrap();

        let outcome = import_if_eligible(&storage, &bookmarks, &medium.id, &outline)
            .await
            .unwrap();
        assert!(outcome.imported);
        let summary = outcome.summary.unwrap();
        assert_eq!(summary.chapters_created, 0);
        assert_eq!(summary.sections_created, 0);
        assert_eq!(summary.anchors_created, 0);
        assert_eq!(summary.anchors_updated, 3);
        assert_eq!(outcome.destinations, Some(DestinationSync::default()));

        assert_eq!(storage.list_chapters(&lecture.id).await.unwrap(), chapters);
        assert_eq!(storage.list_sections(&lecture.id).await.unwrap(), sections);
        assert_eq!(storage.list_anchors(&medium.id).await.unwrap(), anchors);
    }

    #[tokio::test]
    async fn chapters_are_created_in_counter_order() {
        let storage = test_storage().await;
        let (lecture, medium) = script_with_lecture(&storage).await;
        let bookmarks = vec![
            bookmark("Kapitel", "3", "Third", 30, Some(3), None, "c30"),
            bookmark("Kapitel", "1", "First", 10, Some(1), None, "c10"),
            bookmark("Kapitel", "2", "Second", 20, Some(2), None, "c20"),
        ];

        let manuscript =
            Manuscript::load(&storage, &medium.id, bookmarks.clone(), &OutlineConfig::default())
                .await
                .unwrap();
        let positions: Vec<_> = manuscript
            .new_chapters()
            .iter()
            .map(|c| (c.counter, c.position))
            .collect();
        assert_eq!(positions, vec![(10, 1), (20, 2), (30, 3)]);

        import_if_eligible(&storage, &bookmarks, &medium.id, &OutlineConfig::default())
            .await
            .unwrap();
        let titles: Vec<_> = storage
            .list_chapters(&lecture.id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.title)
            .collect();
        assert_eq!(titles, vec!["First", "Second", "Third"]);
    }

    #[tokio::test]
    async fn new_chapter_is_inserted_between_existing_ones() {
        let storage = test_storage().await;
        let (lecture, medium) = script_with_lecture(&storage).await;
        storage.insert_chapter_at(&lecture.id, "First", "1", 1).await.unwrap();
        storage.insert_chapter_at(&lecture.id, "Third", "3", 2).await.unwrap();

        let bookmarks = vec![
            bookmark("Kapitel", "1", "First", 1, Some(1), None, "c1"),
            bookmark("Kapitel", "2", "Second", 2, Some(2), None, "c2"),
            bookmark("Kapitel", "3", "Third", 3, Some(3), None, "c3"),
        ];
        let outcome = import_if_eligible(&storage, &bookmarks, &medium.id, &OutlineConfig::default())
            .await
            .unwrap();
        assert_eq!(outcome.summary.unwrap().chapters_created, 1);

        let chapters = storage.list_chapters(&lecture.id).await.unwrap();
        let order: Vec<_> = chapters.iter().map(|c| (c.position, c.title.as_str())).collect();
        assert_eq!(order, vec![(1, "First"), (2, "Second"), (3, "Third")]);
    }

    #[tokio::test]
    async fn dangling_section_blocks_import_without_writes() {
        let storage = test_storage().await;
        let (lecture, medium) = script_with_lecture(&storage).await;
        let bookmarks = vec![
            bookmark("Kapitel", "1", "Intro", 1, Some(1), None, "c1"),
            bookmark("Abschnitt", "2.1", "Orphan", 2, Some(2), Some(1), "s1"),
        ];
        let anchors_before = storage.list_anchors(&medium.id).await.unwrap();

        let outcome = import_if_eligible(&storage, &bookmarks, &medium.id, &OutlineConfig::default())
            .await
            .unwrap();
        assert!(!outcome.imported);
        assert!(outcome.summary.is_none());
        assert_eq!(outcome.report.sections.len(), 1);
        assert_eq!(
            outcome.report.sections[0].contradiction,
            Some(Contradiction::MissingParentChapter)
        );

        assert!(storage.list_chapters(&lecture.id).await.unwrap().is_empty());
        assert_eq!(storage.list_anchors(&medium.id).await.unwrap(), anchors_before);
    }

    #[tokio::test]
    async fn title_mismatch_against_database_blocks_import() {
        let storage = test_storage().await;
        let (lecture, medium) = script_with_lecture(&storage).await;
        storage.insert_chapter_at(&lecture.id, "Introduction", "c1", 1).await.unwrap();

        let manuscript =
            Manuscript::load(&storage, &medium.id, small_outline(), &OutlineConfig::default())
                .await
                .unwrap();
        assert_eq!(manuscript.contradiction_count(), 1);
        assert!(manuscript.new_chapters().is_empty());
        assert!(manuscript.unmatched_chapters().is_empty());

        let outcome =
            import_if_eligible(&storage, &small_outline(), &medium.id, &OutlineConfig::default())
                .await
                .unwrap();
        assert!(!outcome.imported);
        assert_eq!(outcome.report.chapters[0].contradiction, Some(Contradiction::TitleMismatch));
    }

    #[tokio::test]
    async fn renamed_leaf_updates_its_marker_in_place() {
        let storage = test_storage().await;
        let (_lecture, medium) = script_with_lecture(&storage).await;
        let outline = OutlineConfig::default();
        import_if_eligible(&storage, &small_outline(), &medium.id, &outline)
            .await
            .unwrap();
        let before = storage.find_anchor(&medium.id, "dest.d1").await.unwrap().unwrap();

        let mut bookmarks = small_outline();
        bookmarks[2].description = "Vector spaces".into();
        bookmarks[2].sort = "Satz".into();
        bookmarks[2].page = Some(42);
        import_if_eligible(&storage, &bookmarks, &medium.id, &outline)
            .await
            .unwrap();

        let after = storage.find_anchor(&medium.id, "dest.d1").await.unwrap().unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(after.description.as_deref(), Some("Vector spaces"));
        assert_eq!(after.kind, AnchorKind::Content("Satz".into()));
        assert_eq!(after.page, Some(42));
    }

    #[tokio::test]
    async fn media_other_than_lecture_scripts_are_rejected() {
        let storage = test_storage().await;
        let lecture = storage.insert_lecture("Algebra").await.unwrap();
        let video = storage
            .insert_medium(Some(lecture.id.as_str()), "Kaviar", "Recording")
            .await
            .unwrap();
        let orphan = storage.insert_medium(None, "Script", "Loose notes").await.unwrap();
        let outline = OutlineConfig::default();

        let err = Manuscript::load(&storage, &video.id, small_outline(), &outline)
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptSyncError::Validation { .. }));

        let err = Manuscript::load(&storage, &orphan.id, small_outline(), &outline)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not belong to a lecture"));
    }

    /// Storage whose section inserts fail while `fail_sections` is set.
    struct FlakyStore {
        inner: Storage,
        fail_sections: Cell<bool>,
    }

    impl CurriculumStore for FlakyStore {
        async fn get_lecture(&self, lecture_id: &str) -> Result<Option<Lecture>> {
            self.inner.get_lecture(lecture_id).await
        }
        async fn list_chapters(&self, lecture_id: &str) -> Result<Vec<Chapter>> {
            self.inner.list_chapters(lecture_id).await
        }
        async fn list_sections(&self, lecture_id: &str) -> Result<Vec<Section>> {
            self.inner.list_sections(lecture_id).await
        }
        async fn insert_chapter_at(
            &self,
            lecture_id: &str,
            title: &str,
            reference: &str,
            position: i64,
        ) -> Result<Chapter> {
            self.inner
                .insert_chapter_at(lecture_id, title, reference, position)
                .await
        }
        async fn insert_section_at(
            &self,
            chapter_id: &str,
            title: &str,
            reference: &str,
            position: i64,
        ) -> Result<Section> {
            if self.fail_sections.get() {
                return Err(ScriptSyncError::Storage("disk full".into()));
            }
            self.inner
                .insert_section_at(chapter_id, title, reference, position)
                .await
        }
    }

    impl AnchorStore for FlakyStore {
        async fn get_medium(&self, medium_id: &str) -> Result<Option<Medium>> {
            self.inner.get_medium(medium_id).await
        }
        async fn list_anchors(&self, medium_id: &str) -> Result<Vec<NavigationAnchor>> {
            self.inner.list_anchors(medium_id).await
        }
        async fn find_anchor(
            &self,
            medium_id: &str,
            destination: &str,
        ) -> Result<Option<NavigationAnchor>> {
            self.inner.find_anchor(medium_id, destination).await
        }
        async fn insert_anchor(&self, anchor: &NewAnchor) -> Result<NavigationAnchor> {
            self.inner.insert_anchor(anchor).await
        }
        async fn update_anchor(&self, anchor_id: &str, update: &AnchorUpdate) -> Result<()> {
            self.inner.update_anchor(anchor_id, update).await
        }
        async fn delete_anchor(&self, anchor_id: &str) -> Result<()> {
            self.inner.delete_anchor(anchor_id).await
        }
        async fn clear_destination(&self, anchor_id: &str) -> Result<()> {
            self.inner.clear_destination(anchor_id).await
        }
    }

    impl ReferralStore for FlakyStore {
        async fn referred_anchor_ids(&self, medium_id: &str) -> Result<HashSet<String>> {
            self.inner.referred_anchor_ids(medium_id).await
        }
    }

    #[tokio::test]
    async fn failed_run_is_repaired_by_rerunning() {
        let storage = test_storage().await;
        let (lecture, medium) = script_with_lecture(&storage).await;
        let store = FlakyStore {
            inner: storage,
            fail_sections: Cell::new(true),
        };
        let outline = OutlineConfig::default();

        let err = import_if_eligible(&store, &small_outline(), &medium.id, &outline)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert_eq!(store.list_chapters(&lecture.id).await.unwrap().len(), 1);
        assert!(store.list_sections(&lecture.id).await.unwrap().is_empty());

        store.fail_sections.set(false);
        let outcome = import_if_eligible(&store, &small_outline(), &medium.id, &outline)
            .await
            .unwrap();
        assert!(outcome.imported);
        let summary = outcome.summary.unwrap();
        assert_eq!(summary.chapters_created, 0);
        assert_eq!(summary.sections_created, 1);

        assert_eq!(store.list_chapters(&lecture.id).await.unwrap().len(), 1);
        assert_eq!(store.list_sections(&lecture.id).await.unwrap().len(), 1);
        assert_eq!(markers(&store.inner, &medium.id).await.len(), 3);
        assert_eq!(store.list_anchors(&medium.id).await.unwrap().len(), 4);
    }
}
