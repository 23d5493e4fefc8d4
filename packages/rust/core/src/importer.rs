//! Creates missing chapters and sections in document order and upserts the
//! chapter, section and content markers of a medium.
//!
//! Every step is an insert-if-absent or an upsert keyed by destination, so
//! a run that failed half way is repaired by running it again. A marker
//! reuses whatever anchor already carries its destination, so a bare
//! destination anchor becomes the marker in place and keeps its referrals.

use serde::Serialize;
use tracing::{debug, info, instrument};

use scriptsync_shared::{
    AnchorKind, AnchorStore, AnchorUpdate, Chapter, CurriculumStore, NewAnchor, Result,
    ScriptSyncError, Section,
};

use crate::matcher::Matching;

/// Counts of what an import changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub chapters_created: usize,
    pub sections_created: usize,
    pub anchors_created: usize,
    /// Bare destination anchors turned into markers.
    pub anchors_converted: usize,
    pub anchors_updated: usize,
}

enum Upserted {
    Created,
    Converted,
    Updated,
}

/// Write a contradiction-free matching into the lecture and the medium.
///
/// The caller is responsible for checking the contradiction gate.
#[instrument(skip_all, fields(lecture_id = %lecture_id, medium_id = %medium_id))]
pub(crate) async fn import<S>(
    store: &S,
    lecture_id: &str,
    medium_id: &str,
    matching: &Matching,
) -> Result<ImportSummary>
where
    S: CurriculumStore + AnchorStore,
{
    let mut summary = ImportSummary::default();

    // 1. Chapters, inserted at their rank among the chapter bookmarks.
    let mut chapters: Vec<Option<Chapter>> =
        matching.chapters.iter().map(|c| c.persisted.clone()).collect();
    for (slot, matched) in chapters.iter_mut().zip(&matching.chapters) {
        if slot.is_none() {
            let c = &matched.candidate;
            let created = store
                .insert_chapter_at(lecture_id, &c.description, &c.label, c.new_position)
                .await?;
            debug!(chapter = %c.label, position = c.new_position, "created chapter");
            *slot = Some(created);
            summary.chapters_created += 1;
        }
    }

    // 2. Sections, inserted at their rank within their chapter.
    let mut sections: Vec<Option<Section>> =
        matching.sections.iter().map(|s| s.persisted.clone()).collect();
    for (matched, chapter) in matching.chapters.iter().zip(&chapters) {
        let Some(chapter) = chapter else { continue };
        let number = matched.candidate.chapter;
        let children = matching
            .sections
            .iter()
            .enumerate()
            .filter(|(_, s)| s.candidate.chapter == Some(number));
        for (rank, (index, section)) in children.enumerate() {
            if sections[index].is_some() {
                continue;
            }
            let s = &section.candidate;
            let created = store
                .insert_section_at(&chapter.id, &s.description, &s.label, rank as i64 + 1)
                .await?;
            debug!(section = %s.label, position = rank + 1, "created section");
            sections[index] = Some(created);
            summary.sections_created += 1;
        }
    }

    // 3. Chapter markers.
    for matched in &matching.chapters {
        let c = &matched.candidate;
        let update = AnchorUpdate {
            kind: AnchorKind::Chapter,
            section_id: None,
            page: c.page,
            description: c.description.clone(),
            reference: c.label.clone(),
            position: None,
        };
        tally(&mut summary, upsert_marker(store, medium_id, &c.destination, update).await?);
    }

    // 4. Section markers, bound to their persisted section.
    for (matched, section) in matching.sections.iter().zip(&sections) {
        let s = &matched.candidate;
        let section = section.as_ref().ok_or_else(|| unresolved_section(&s.label))?;
        let update = AnchorUpdate {
            kind: AnchorKind::Section,
            section_id: Some(section.id.clone()),
            page: s.page,
            description: s.description.clone(),
            reference: s.label.clone(),
            position: None,
        };
        tally(&mut summary, upsert_marker(store, medium_id, &s.destination, update).await?);
    }

    // 5. Content markers of every section that has content.
    for (matched, section) in matching.sections.iter().zip(&sections) {
        let content = matching.content_in_section(&matched.candidate);
        if content.is_empty() {
            continue;
        }
        let section = section
            .as_ref()
            .ok_or_else(|| unresolved_section(&matched.candidate.label))?;
        for leaf in content {
            let c = &leaf.candidate;
            let update = AnchorUpdate {
                kind: AnchorKind::Content(c.kind.clone()),
                section_id: Some(section.id.clone()),
                page: c.page,
                description: c.description.clone(),
                reference: c.label.clone(),
                position: Some(c.counter),
            };
            tally(&mut summary, upsert_marker(store, medium_id, &c.destination, update).await?);
        }
    }

    info!(
        chapters_created = summary.chapters_created,
        sections_created = summary.sections_created,
        anchors_created = summary.anchors_created,
        anchors_converted = summary.anchors_converted,
        anchors_updated = summary.anchors_updated,
        "import complete"
    );
    Ok(summary)
}

/// Rewrite the anchor carrying this destination into the given marker, or
/// create the marker when no anchor carries it.
async fn upsert_marker<S: AnchorStore>(
    store: &S,
    medium_id: &str,
    destination: &str,
    update: AnchorUpdate,
) -> Result<Upserted> {
    if let Some(existing) = store.find_anchor(medium_id, destination).await? {
        store.update_anchor(&existing.id, &update).await?;
        return Ok(if existing.kind == AnchorKind::Destination {
            Upserted::Converted
        } else {
            Upserted::Updated
        });
    }

    store
        .insert_anchor(&NewAnchor {
            medium_id: medium_id.to_string(),
            kind: update.kind,
            destination: Some(destination.to_string()),
            section_id: update.section_id,
            page: update.page,
            description: Some(update.description),
            reference: Some(update.reference),
            position: update.position,
        })
        .await?;
    Ok(Upserted::Created)
}

fn tally(summary: &mut ImportSummary, upserted: Upserted) {
    match upserted {
        Upserted::Created => summary.anchors_created += 1,
        Upserted::Converted => summary.anchors_converted += 1,
        Upserted::Updated => summary.anchors_updated += 1,
    }
}

fn unresolved_section(label: &str) -> ScriptSyncError {
    ScriptSyncError::validation(format!("section {label} has no persisted counterpart"))
}
