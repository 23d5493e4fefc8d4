//! libSQL storage layer for lectures, their chapter/section hierarchy, media,
//! navigation anchors and referrals.
//!
//! The [`Storage`] struct implements the [`CurriculumStore`], [`AnchorStore`]
//! and [`ReferralStore`] contracts the reconciliation engine runs against.
//!
//! **Access rules:**
//! - Reconciliation runs: read-write via [`Storage::open`]
//! - Reporting only: read-only via [`Storage::open_readonly`]

mod migrations;

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use scriptsync_shared::{
    AnchorKind, AnchorStore, AnchorUpdate, Chapter, CurriculumStore, Lecture, Medium,
    NavigationAnchor, NewAnchor, Referral, ReferralStore, Result, ScriptSyncError, Section,
    new_id,
};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

fn db_err(e: libsql::Error) -> ScriptSyncError {
    ScriptSyncError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ScriptSyncError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        ScriptSyncError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(ScriptSyncError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lecture, medium and referral records
    // -----------------------------------------------------------------------

    /// Insert a new lecture.
    pub async fn insert_lecture(&self, title: &str) -> Result<Lecture> {
        self.check_writable()?;
        let lecture = Lecture {
            id: new_id(),
            title: title.to_string(),
        };
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO lectures (id, title, created_at) VALUES (?1, ?2, ?3)",
                params![lecture.id.as_str(), title, now.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(lecture)
    }

    /// Insert a new medium together with its `self` anchor.
    pub async fn insert_medium(
        &self,
        lecture_id: Option<&str>,
        sort: &str,
        description: &str,
    ) -> Result<Medium> {
        self.check_writable()?;
        let medium = Medium {
            id: new_id(),
            lecture_id: lecture_id.map(String::from),
            sort: sort.to_string(),
            description: description.to_string(),
        };
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO media (id, lecture_id, sort, description, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![medium.id.as_str(), lecture_id, sort, description, now.as_str()],
            )
            .await
            .map_err(db_err)?;

        self.insert_anchor(&NewAnchor {
            medium_id: medium.id.clone(),
            kind: AnchorKind::SelfAnchor,
            destination: None,
            section_id: None,
            page: None,
            description: None,
            reference: None,
            position: None,
        })
        .await?;

        Ok(medium)
    }

    /// Record that `medium_id` refers to the anchor `anchor_id`.
    pub async fn insert_referral(&self, medium_id: &str, anchor_id: &str) -> Result<Referral> {
        self.check_writable()?;
        let referral = Referral {
            id: new_id(),
            medium_id: medium_id.to_string(),
            anchor_id: anchor_id.to_string(),
        };
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO referrals (id, medium_id, anchor_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![referral.id.as_str(), medium_id, anchor_id, now.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(referral)
    }
}

// ---------------------------------------------------------------------------
// Curriculum store
// ---------------------------------------------------------------------------

impl CurriculumStore for Storage {
    async fn get_lecture(&self, lecture_id: &str) -> Result<Option<Lecture>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title FROM lectures WHERE id = ?1",
                params![lecture_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(Lecture {
                id: row.get::<String>(0).map_err(db_err)?,
                title: row.get::<String>(1).map_err(db_err)?,
            })),
            None => Ok(None),
        }
    }

    async fn list_chapters(&self, lecture_id: &str) -> Result<Vec<Chapter>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, lecture_id, title, reference, position
                 FROM chapters WHERE lecture_id = ?1 ORDER BY position",
                params![lecture_id],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(Chapter {
                id: row.get::<String>(0).map_err(db_err)?,
                lecture_id: row.get::<String>(1).map_err(db_err)?,
                title: row.get::<String>(2).map_err(db_err)?,
                reference: row.get::<String>(3).map_err(db_err)?,
                position: row.get::<i64>(4).map_err(db_err)?,
            });
        }
        Ok(results)
    }

    async fn list_sections(&self, lecture_id: &str) -> Result<Vec<Section>> {
        let mut rows = self
            .conn
            .query(
                "SELECT s.id, s.chapter_id, s.title, s.reference, s.position
                 FROM sections s JOIN chapters c ON c.id = s.chapter_id
                 WHERE c.lecture_id = ?1
                 ORDER BY c.position, s.position",
                params![lecture_id],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(Section {
                id: row.get::<String>(0).map_err(db_err)?,
                chapter_id: row.get::<String>(1).map_err(db_err)?,
                title: row.get::<String>(2).map_err(db_err)?,
                reference: row.get::<String>(3).map_err(db_err)?,
                position: row.get::<i64>(4).map_err(db_err)?,
            });
        }
        Ok(results)
    }

    async fn insert_chapter_at(
        &self,
        lecture_id: &str,
        title: &str,
        reference: &str,
        position: i64,
    ) -> Result<Chapter> {
        let (id, position) = self
            .insert_at_rank(Ranked::Chapters, lecture_id, title, reference, position)
            .await?;
        tracing::debug!(chapter_id = %id, position, "inserted chapter");
        Ok(Chapter {
            id,
            lecture_id: lecture_id.to_string(),
            title: title.to_string(),
            reference: reference.to_string(),
            position,
        })
    }

    async fn insert_section_at(
        &self,
        chapter_id: &str,
        title: &str,
        reference: &str,
        position: i64,
    ) -> Result<Section> {
        let (id, position) = self
            .insert_at_rank(Ranked::Sections, chapter_id, title, reference, position)
            .await?;
        tracing::debug!(section_id = %id, position, "inserted section");
        Ok(Section {
            id,
            chapter_id: chapter_id.to_string(),
            title: title.to_string(),
            reference: reference.to_string(),
            position,
        })
    }
}

/// Sibling tables ordered by an explicit position under one parent.
#[derive(Debug, Clone, Copy)]
enum Ranked {
    Chapters,
    Sections,
}

impl Ranked {
    fn table(self) -> &'static str {
        match self {
            Self::Chapters => "chapters",
            Self::Sections => "sections",
        }
    }

    fn parent_column(self) -> &'static str {
        match self {
            Self::Chapters => "lecture_id",
            Self::Sections => "chapter_id",
        }
    }
}

impl Storage {
    /// Insert a row at `position` among its siblings in one transaction, so a
    /// failed insert never leaves the siblings shifted.
    async fn insert_at_rank(
        &self,
        ranked: Ranked,
        parent_id: &str,
        title: &str,
        reference: &str,
        position: i64,
    ) -> Result<(String, i64)> {
        self.check_writable()?;
        let tx = self.conn.transaction().await.map_err(db_err)?;

        let inserted = insert_ranked(&tx, ranked, parent_id, title, reference, position).await;
        match inserted {
            Ok(inserted) => {
                tx.commit().await.map_err(db_err)?;
                Ok(inserted)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, table = ranked.table(), "rollback failed");
                }
                Err(e)
            }
        }
    }
}

/// Clamp `position` to `1..=len + 1`, shift the siblings at or after it and
/// insert the new row there. Returns the new id and the clamped position.
async fn insert_ranked(
    conn: &Connection,
    ranked: Ranked,
    parent_id: &str,
    title: &str,
    reference: &str,
    position: i64,
) -> Result<(String, i64)> {
    let (table, parent) = (ranked.table(), ranked.parent_column());

    let len = {
        let mut rows = conn
            .query(
                &format!("SELECT COUNT(*) FROM {table} WHERE {parent} = ?1"),
                params![parent_id],
            )
            .await
            .map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => row.get::<i64>(0).map_err(db_err)?,
            None => 0,
        }
    };
    let position = position.clamp(1, len + 1);

    conn.execute(
        &format!(
            "UPDATE {table} SET position = position + 1 WHERE {parent} = ?1 AND position >= ?2"
        ),
        params![parent_id, position],
    )
    .await
    .map_err(db_err)?;

    let id = new_id();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        &format!(
            "INSERT INTO {table} (id, {parent}, title, reference, position, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
        ),
        params![id.as_str(), parent_id, title, reference, position, now.as_str()],
    )
    .await
    .map_err(db_err)?;

    Ok((id, position))
}

// ---------------------------------------------------------------------------
// Anchor store
// ---------------------------------------------------------------------------

const ANCHOR_COLUMNS: &str =
    "id, medium_id, sort, content_kind, destination, section_id, page, description, reference, position";

impl AnchorStore for Storage {
    async fn get_medium(&self, medium_id: &str) -> Result<Option<Medium>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, lecture_id, sort, description FROM media WHERE id = ?1",
                params![medium_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(Medium {
                id: row.get::<String>(0).map_err(db_err)?,
                lecture_id: row.get::<String>(1).ok(),
                sort: row.get::<String>(2).map_err(db_err)?,
                description: row.get::<String>(3).map_err(db_err)?,
            })),
            None => Ok(None),
        }
    }

    async fn list_anchors(&self, medium_id: &str) -> Result<Vec<NavigationAnchor>> {
        let sql = format!(
            "SELECT {ANCHOR_COLUMNS} FROM anchors WHERE medium_id = ?1 ORDER BY sort, destination"
        );
        let mut rows = self
            .conn
            .query(&sql, params![medium_id])
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_anchor(&row)?);
        }
        Ok(results)
    }

    async fn find_anchor(
        &self,
        medium_id: &str,
        destination: &str,
    ) -> Result<Option<NavigationAnchor>> {
        let sql = format!(
            "SELECT {ANCHOR_COLUMNS} FROM anchors
             WHERE medium_id = ?1 AND destination = ?2 AND sort != 'self'
             ORDER BY sort = 'destination'
             LIMIT 1"
        );
        let mut rows = self
            .conn
            .query(&sql, params![medium_id, destination])
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_anchor(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_anchor(&self, anchor: &NewAnchor) -> Result<NavigationAnchor> {
        self.check_writable()?;
        let id = new_id();
        self.conn
            .execute(
                "INSERT INTO anchors (id, medium_id, sort, content_kind, destination, section_id,
                                      page, description, reference, position)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id.as_str(),
                    anchor.medium_id.as_str(),
                    anchor.kind.sort(),
                    anchor.kind.content_kind(),
                    anchor.destination.as_deref(),
                    anchor.section_id.as_deref(),
                    anchor.page,
                    anchor.description.as_deref(),
                    anchor.reference.as_deref(),
                    anchor.position,
                ],
            )
            .await
            .map_err(db_err)?;

        Ok(NavigationAnchor {
            id,
            medium_id: anchor.medium_id.clone(),
            kind: anchor.kind.clone(),
            destination: anchor.destination.clone(),
            section_id: anchor.section_id.clone(),
            page: anchor.page,
            description: anchor.description.clone(),
            reference: anchor.reference.clone(),
            position: anchor.position,
        })
    }

    async fn update_anchor(&self, anchor_id: &str, update: &AnchorUpdate) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "UPDATE anchors SET sort = ?1, content_kind = ?2, section_id = ?3, page = ?4,
                                    description = ?5, reference = ?6, position = ?7
                 WHERE id = ?8",
                params![
                    update.kind.sort(),
                    update.kind.content_kind(),
                    update.section_id.as_deref(),
                    update.page,
                    update.description.as_str(),
                    update.reference.as_str(),
                    update.position,
                    anchor_id,
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_anchor(&self, anchor_id: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "DELETE FROM referrals WHERE anchor_id = ?1",
                params![anchor_id],
            )
            .await
            .map_err(db_err)?;
        self.conn
            .execute("DELETE FROM anchors WHERE id = ?1", params![anchor_id])
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn clear_destination(&self, anchor_id: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "UPDATE anchors SET destination = NULL WHERE id = ?1",
                params![anchor_id],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Referral store
// ---------------------------------------------------------------------------

impl ReferralStore for Storage {
    async fn referred_anchor_ids(&self, medium_id: &str) -> Result<HashSet<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT DISTINCT r.anchor_id
                 FROM referrals r JOIN anchors a ON a.id = r.anchor_id
                 WHERE a.medium_id = ?1",
                params![medium_id],
            )
            .await
            .map_err(db_err)?;

        let mut results = HashSet::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.insert(row.get::<String>(0).map_err(db_err)?);
        }
        Ok(results)
    }
}

/// Convert a database row to a [`NavigationAnchor`].
fn row_to_anchor(row: &libsql::Row) -> Result<NavigationAnchor> {
    let sort: String = row.get(2).map_err(db_err)?;
    Ok(NavigationAnchor {
        id: row.get::<String>(0).map_err(db_err)?,
        medium_id: row.get::<String>(1).map_err(db_err)?,
        kind: AnchorKind::from_columns(&sort, row.get::<String>(3).ok())?,
        destination: row.get::<String>(4).ok(),
        section_id: row.get::<String>(5).ok(),
        page: row.get::<i64>(6).ok(),
        description: row.get::<String>(7).ok(),
        reference: row.get::<String>(8).ok(),
        position: row.get::<i64>(9).ok(),
    })
}
