//! Keeps a medium's destination anchors in sync with its outline.
//!
//! Every outline destination is carried by exactly one anchor of the medium.
//! A new destination first gets a bare destination anchor; importing the
//! outline later turns that anchor into a chapter, section or content marker
//! in place. A bare anchor survives even when its destination left the
//! outline if it is protected: some referral targets it, or a marker of the
//! same medium still carries its destination.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use tracing::{debug, info, instrument};

use scriptsync_shared::{
    AnchorKind, AnchorStore, BookmarkRecord, NavigationAnchor, NewAnchor, ReferralStore, Result,
};

/// Counts of bare destination anchors created and destroyed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DestinationSync {
    pub created: usize,
    pub destroyed: usize,
}

/// Destinations declared by the current outline.
pub fn current_destinations(bookmarks: &[BookmarkRecord]) -> BTreeSet<&str> {
    bookmarks.iter().map(|b| b.destination.as_str()).collect()
}

/// Ids of bare destination anchors that must not be destroyed.
pub fn protected_anchor_ids(
    anchors: &[NavigationAnchor],
    referred: &HashSet<String>,
) -> HashSet<String> {
    let carried = carried_destinations(anchors);

    anchors
        .iter()
        .filter(|a| a.kind == AnchorKind::Destination)
        .filter(|a| {
            referred.contains(&a.id)
                || a.destination.as_deref().is_some_and(|d| carried.contains(d))
        })
        .map(|a| a.id.clone())
        .collect()
}

/// Destinations carried by chapter, section or content markers.
fn carried_destinations(anchors: &[NavigationAnchor]) -> HashSet<&str> {
    anchors
        .iter()
        .filter(|a| a.kind.is_marker())
        .filter_map(|a| a.destination.as_deref())
        .collect()
}

fn bare_destination(medium_id: &str, destination: &str) -> NewAnchor {
    NewAnchor {
        medium_id: medium_id.to_string(),
        kind: AnchorKind::Destination,
        destination: Some(destination.to_string()),
        section_id: None,
        page: None,
        description: Some(destination.to_string()),
        reference: None,
        position: None,
    }
}

/// Create a bare anchor for every destination no anchor carries yet and
/// destroy the bare anchors the outline no longer implies, unless they are
/// protected.
#[instrument(skip_all, fields(medium_id = %medium_id, bookmarks = bookmarks.len()))]
pub async fn reconcile_destinations<S>(
    store: &S,
    medium_id: &str,
    bookmarks: &[BookmarkRecord],
) -> Result<DestinationSync>
where
    S: AnchorStore + ReferralStore,
{
    let anchors = store.list_anchors(medium_id).await?;
    let referred = store.referred_anchor_ids(medium_id).await?;
    let protected = protected_anchor_ids(&anchors, &referred);
    let current = current_destinations(bookmarks);

    let existing: HashSet<&str> = anchors
        .iter()
        .filter_map(|a| a.destination.as_deref())
        .collect();

    let mut sync = DestinationSync::default();

    for destination in current.iter().filter(|d| !existing.contains(*d)) {
        store
            .insert_anchor(&bare_destination(medium_id, destination))
            .await?;
        sync.created += 1;
    }

    for anchor in anchors.iter().filter(|a| a.kind == AnchorKind::Destination) {
        let implied = anchor
            .destination
            .as_deref()
            .is_some_and(|d| current.contains(d));
        if implied {
            continue;
        }
        if protected.contains(&anchor.id) {
            debug!(destination = ?anchor.destination, "keeping protected destination");
            continue;
        }
        store.delete_anchor(&anchor.id).await?;
        sync.destroyed += 1;
    }

    info!(
        created = sync.created,
        destroyed = sync.destroyed,
        protected = protected.len(),
        "destinations reconciled"
    );
    Ok(sync)
}

/// Destroy the bare anchors for `destinations` and detach every other anchor
/// of the medium from them. Returns the number of anchors destroyed.
#[instrument(skip_all, fields(medium_id = %medium_id, destinations = destinations.len()))]
pub async fn destroy_destinations<S: AnchorStore>(
    store: &S,
    medium_id: &str,
    destinations: &[String],
) -> Result<usize> {
    let targets: HashSet<&str> = destinations.iter().map(String::as_str).collect();
    let mut destroyed = 0;

    for anchor in store.list_anchors(medium_id).await? {
        let Some(destination) = anchor.destination.as_deref() else {
            continue;
        };
        if !targets.contains(destination) {
            continue;
        }
        if anchor.kind == AnchorKind::Destination {
            store.delete_anchor(&anchor.id).await?;
            destroyed += 1;
        } else {
            store.clear_destination(&anchor.id).await?;
        }
    }

    info!(destroyed, "destinations destroyed");
    Ok(destroyed)
}

/// Replace all bare destination anchors by one per current destination that
/// no marker carries. Protection does not apply: referrals onto the old
/// anchors are dropped.
#[instrument(skip_all, fields(medium_id = %medium_id))]
pub async fn reset_destinations<S: AnchorStore>(
    store: &S,
    medium_id: &str,
    bookmarks: &[BookmarkRecord],
) -> Result<DestinationSync> {
    let mut sync = DestinationSync::default();
    let anchors = store.list_anchors(medium_id).await?;
    let carried = carried_destinations(&anchors);

    for anchor in anchors.iter().filter(|a| a.kind == AnchorKind::Destination) {
        store.delete_anchor(&anchor.id).await?;
        sync.destroyed += 1;
    }
    for destination in current_destinations(bookmarks)
        .into_iter()
        .filter(|d| !carried.contains(d))
    {
        store
            .insert_anchor(&bare_destination(medium_id, destination))
            .await?;
        sync.created += 1;
    }

    info!(created = sync.created, destroyed = sync.destroyed, "destinations reset");
    Ok(sync)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::tests::bookmark;
    use crate::test_support::test_storage;
    use scriptsync_storage::Storage;

    fn anchor(id: &str, kind: AnchorKind, destination: Option<&str>) -> NavigationAnchor {
        NavigationAnchor {
            id: id.into(),
            medium_id: "m".into(),
            kind,
            destination: destination.map(String::from),
            section_id: None,
            page: None,
            description: None,
            reference: None,
            position: None,
        }
    }

    fn outline(destinations: &[&str]) -> Vec<BookmarkRecord> {
        destinations
            .iter()
            .enumerate()
            .map(|(i, d)| bookmark("Satz", "", "", i as i64, None, None, d))
            .collect()
    }

    async fn bare_destinations(storage: &Storage, medium_id: &str) -> BTreeSet<String> {
        storage
            .list_anchors(medium_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|a| a.kind == AnchorKind::Destination)
            .filter_map(|a| a.destination)
            .collect()
    }

    #[test]
    fn protection_is_the_union_of_referrals_and_carried_destinations() {
        let anchors = vec![
            anchor("referred", AnchorKind::Destination, Some("r")),
            anchor("carried", AnchorKind::Destination, Some("c")),
            anchor("free", AnchorKind::Destination, Some("f")),
            anchor("marker", AnchorKind::Chapter, Some("c")),
            anchor("self", AnchorKind::SelfAnchor, None),
        ];
        let referred = HashSet::from(["referred".to_string(), "marker".to_string()]);

        let protected = protected_anchor_ids(&anchors, &referred);
        assert_eq!(
            protected,
            HashSet::from(["referred".to_string(), "carried".to_string()])
        );
    }

    #[tokio::test]
    async fn adds_new_and_removes_stale_destinations() {
        let storage = test_storage().await;
        let medium = storage.insert_medium(None, "Script", "notes").await.unwrap();

        let sync = reconcile_destinations(&storage, &medium.id, &outline(&["a", "b"]))
            .await
            .unwrap();
        assert_eq!(sync, DestinationSync { created: 2, destroyed: 0 });

        let sync = reconcile_destinations(&storage, &medium.id, &outline(&["b", "c"]))
            .await
            .unwrap();
        assert_eq!(sync, DestinationSync { created: 1, destroyed: 1 });
        assert_eq!(
            bare_destinations(&storage, &medium.id).await,
            BTreeSet::from(["b".to_string(), "c".to_string()])
        );

        let sync = reconcile_destinations(&storage, &medium.id, &outline(&["b", "c"]))
            .await
            .unwrap();
        assert_eq!(sync, DestinationSync::default());
    }

    #[tokio::test]
    async fn referred_destination_survives_removal_from_outline() {
        let storage = test_storage().await;
        let script = storage.insert_medium(None, "Script", "notes").await.unwrap();
        let video = storage.insert_medium(None, "Kaviar", "video").await.unwrap();

        reconcile_destinations(&storage, &script.id, &outline(&["thm.1", "thm.2"]))
            .await
            .unwrap();
        let target = storage
            .list_anchors(&script.id)
            .await
            .unwrap()
            .into_iter()
            .find(|a| a.destination.as_deref() == Some("thm.2"))
            .unwrap();
        storage.insert_referral(&video.id, &target.id).await.unwrap();

        let sync = reconcile_destinations(&storage, &script.id, &outline(&[]))
            .await
            .unwrap();
        assert_eq!(sync.destroyed, 1);
        assert_eq!(
            bare_destinations(&storage, &script.id).await,
            BTreeSet::from(["thm.2".to_string()])
        );
    }

    #[tokio::test]
    async fn destination_carried_by_a_marker_survives() {
        let storage = test_storage().await;
        let medium = storage.insert_medium(None, "Script", "notes").await.unwrap();
        reconcile_destinations(&storage, &medium.id, &outline(&["sec.1"]))
            .await
            .unwrap();
        storage
            .insert_anchor(&NewAnchor {
                kind: AnchorKind::Section,
                ..bare_destination(&medium.id, "sec.1")
            })
            .await
            .unwrap();

        let sync = reconcile_destinations(&storage, &medium.id, &outline(&[]))
            .await
            .unwrap();
        assert_eq!(sync.destroyed, 0);
        assert!(bare_destinations(&storage, &medium.id).await.contains("sec.1"));
    }

    #[tokio::test]
    async fn destination_carried_by_a_marker_gets_no_bare_anchor() {
        let storage = test_storage().await;
        let medium = storage.insert_medium(None, "Script", "notes").await.unwrap();
        storage
            .insert_anchor(&NewAnchor {
                kind: AnchorKind::Chapter,
                ..bare_destination(&medium.id, "c.1")
            })
            .await
            .unwrap();

        let sync = reconcile_destinations(&storage, &medium.id, &outline(&["c.1", "t.1"]))
            .await
            .unwrap();
        assert_eq!(sync, DestinationSync { created: 1, destroyed: 0 });
        assert_eq!(
            bare_destinations(&storage, &medium.id).await,
            BTreeSet::from(["t.1".to_string()])
        );

        let sync = reset_destinations(&storage, &medium.id, &outline(&["c.1", "t.1"]))
            .await
            .unwrap();
        assert_eq!(sync, DestinationSync { created: 1, destroyed: 1 });
        assert_eq!(storage.list_anchors(&medium.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn destroy_detaches_markers_and_deletes_bare_anchors() {
        let storage = test_storage().await;
        let medium = storage.insert_medium(None, "Script", "notes").await.unwrap();
        reconcile_destinations(&storage, &medium.id, &outline(&["x", "y"]))
            .await
            .unwrap();
        let marker = storage
            .insert_anchor(&NewAnchor {
                kind: AnchorKind::Chapter,
                ..bare_destination(&medium.id, "x")
            })
            .await
            .unwrap();

        let destroyed = destroy_destinations(&storage, &medium.id, &["x".to_string()])
            .await
            .unwrap();
        assert_eq!(destroyed, 1);
        assert_eq!(
            bare_destinations(&storage, &medium.id).await,
            BTreeSet::from(["y".to_string()])
        );
        let anchors = storage.list_anchors(&medium.id).await.unwrap();
        let marker = anchors.iter().find(|a| a.id == marker.id).unwrap();
        assert!(marker.destination.is_none());
    }

    #[tokio::test]
    async fn reset_ignores_protection() {
        let storage = test_storage().await;
        let script = storage.insert_medium(None, "Script", "notes").await.unwrap();
        let video = storage.insert_medium(None, "Kaviar", "video").await.unwrap();
        reconcile_destinations(&storage, &script.id, &outline(&["old"]))
            .await
            .unwrap();
        let old = storage.list_anchors(&script.id).await.unwrap();
        let old = old.iter().find(|a| a.kind == AnchorKind::Destination).unwrap();
        storage.insert_referral(&video.id, &old.id).await.unwrap();

        let sync = reset_destinations(&storage, &script.id, &outline(&["new"]))
            .await
            .unwrap();
        assert_eq!(sync, DestinationSync { created: 1, destroyed: 1 });
        assert_eq!(
            bare_destinations(&storage, &script.id).await,
            BTreeSet::from(["new".to_string()])
        );
    }
}
