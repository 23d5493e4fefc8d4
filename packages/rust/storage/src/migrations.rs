//! SQL migration definitions for the scriptsync database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: lectures, chapters, sections, media",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS lectures (
    id         TEXT PRIMARY KEY,
    title      TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Chapters are ranked by an explicit position, not by creation order
CREATE TABLE IF NOT EXISTS chapters (
    id         TEXT PRIMARY KEY,
    lecture_id TEXT NOT NULL REFERENCES lectures(id) ON DELETE CASCADE,
    title      TEXT NOT NULL,
    reference  TEXT NOT NULL,
    position   INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chapters_lecture ON chapters(lecture_id, position);

CREATE TABLE IF NOT EXISTS sections (
    id         TEXT PRIMARY KEY,
    chapter_id TEXT NOT NULL REFERENCES chapters(id) ON DELETE CASCADE,
    title      TEXT NOT NULL,
    reference  TEXT NOT NULL,
    position   INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sections_chapter ON sections(chapter_id, position);

CREATE TABLE IF NOT EXISTS media (
    id          TEXT PRIMARY KEY,
    lecture_id  TEXT REFERENCES lectures(id) ON DELETE SET NULL,
    sort        TEXT NOT NULL,
    description TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Navigation anchors and referrals",
            sql: r#"
CREATE TABLE IF NOT EXISTS anchors (
    id           TEXT PRIMARY KEY,
    medium_id    TEXT NOT NULL REFERENCES media(id) ON DELETE CASCADE,
    sort         TEXT NOT NULL,
    content_kind TEXT,
    destination  TEXT,
    section_id   TEXT REFERENCES sections(id) ON DELETE SET NULL,
    page         INTEGER,
    description  TEXT,
    reference    TEXT,
    position     INTEGER
);

CREATE INDEX IF NOT EXISTS idx_anchors_medium ON anchors(medium_id);

-- At most one chapter, section or content anchor per destination and medium
CREATE UNIQUE INDEX IF NOT EXISTS idx_anchors_marker_destination
    ON anchors(medium_id, destination)
    WHERE sort IN ('chapter', 'section', 'content') AND destination IS NOT NULL;

CREATE INDEX IF NOT EXISTS idx_anchors_destination ON anchors(medium_id, destination);

CREATE TABLE IF NOT EXISTS referrals (
    id         TEXT PRIMARY KEY,
    medium_id  TEXT NOT NULL REFERENCES media(id) ON DELETE CASCADE,
    anchor_id  TEXT NOT NULL REFERENCES anchors(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_referrals_anchor ON referrals(anchor_id);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
