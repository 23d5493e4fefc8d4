//! Shared types, error model, configuration, and store contracts for scriptsync.
//!
//! This crate is the foundation depended on by all other scriptsync crates.
//! It provides:
//! - [`ScriptSyncError`]: the unified error type
//! - Domain types ([`BookmarkRecord`], [`Chapter`], [`Section`], [`NavigationAnchor`], ...)
//! - Configuration ([`AppConfig`], [`OutlineConfig`], config loading)
//! - Store contracts ([`CurriculumStore`], [`AnchorStore`], [`ReferralStore`])

pub mod config;
pub mod error;
pub mod store;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, OutlineConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from,
};
pub use error::{Result, ScriptSyncError};
pub use store::{AnchorStore, CurriculumStore, ReferralStore};
pub use types::{
    AnchorKind, AnchorUpdate, BookmarkRecord, Chapter, Lecture, Medium, NavigationAnchor,
    NewAnchor, Outline, Referral, Section, new_id,
};
