//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use scriptsync_core::{ContradictionReport, ImportOutcome, Reconciler};
use scriptsync_shared::{
    AnchorStore, AppConfig, BookmarkRecord, CurriculumStore, Outline, init_config, load_config,
};
use scriptsync_storage::Storage;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// scriptsync: reconcile lecture script outlines with their lecture.
#[derive(Parser)]
#[command(
    name = "scriptsync",
    version,
    about = "Check lecture script outlines against their lecture and import chapters, sections and anchors.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database file (overrides `defaults.database_path`).
    #[arg(long, env = "SCRIPTSYNC_DB", global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Lecture records.
    Lecture {
        #[command(subcommand)]
        action: LectureAction,
    },

    /// Media (documents) and their anchors.
    Medium {
        #[command(subcommand)]
        action: MediumAction,
    },

    /// Cross-document references onto anchors.
    Referral {
        #[command(subcommand)]
        action: ReferralAction,
    },

    /// Show a lecture's chapters and sections.
    Outline {
        /// Lecture ID.
        #[arg(long)]
        lecture: String,
    },

    /// Report contradictions between a script's bookmarks and its lecture.
    Check {
        /// Script medium ID.
        #[arg(long)]
        medium: String,

        /// Bookmark JSON file from the outline extractor.
        #[arg(long)]
        bookmarks: PathBuf,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Import a script's outline into its lecture if it has no contradictions.
    Import {
        /// Script medium ID.
        #[arg(long)]
        medium: String,

        /// Bookmark JSON file from the outline extractor.
        #[arg(long)]
        bookmarks: PathBuf,

        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Bare destination anchors of a medium.
    Destinations {
        #[command(subcommand)]
        action: DestinationsAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum LectureAction {
    /// Create a lecture.
    Add {
        /// Lecture title.
        title: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum MediumAction {
    /// Create a medium (and its self anchor).
    Add {
        /// Owning lecture ID.
        #[arg(long)]
        lecture: Option<String>,

        /// Medium sort (defaults to the configured script sort).
        #[arg(long)]
        sort: Option<String>,

        /// Description.
        description: String,
    },
    /// List a medium's anchors.
    Anchors {
        /// Medium ID.
        #[arg(long)]
        medium: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum ReferralAction {
    /// Record that a medium refers to an anchor.
    Add {
        /// Referring medium ID.
        #[arg(long)]
        from: String,

        /// Referenced anchor ID.
        #[arg(long)]
        anchor: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum DestinationsAction {
    /// Create new and remove stale, unprotected destinations.
    Sync {
        #[arg(long)]
        medium: String,
        #[arg(long)]
        bookmarks: PathBuf,
    },
    /// Drop all destinations and recreate them from the outline.
    Reset {
        #[arg(long)]
        medium: String,
        #[arg(long)]
        bookmarks: PathBuf,
    },
    /// Remove specific destinations.
    Destroy {
        #[arg(long)]
        medium: String,

        /// Destination to remove (can be specified multiple times).
        #[arg(long = "destination", required = true)]
        destinations: Vec<String>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "scriptsync=info",
        1 => "scriptsync=debug",
        _ => "scriptsync=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = load_config()?;

    let Cli { db, command, .. } = cli;
    if let Command::Config { action } = &command {
        return cmd_config(action, &config);
    }

    let db_path = match db {
        Some(path) => path,
        None => config.database_path()?,
    };
    let storage = Storage::open(&db_path).await?;
    info!(db = %db_path.display(), "database opened");
    dispatch(command, storage, &config).await
}

async fn dispatch(command: Command, storage: Storage, config: &AppConfig) -> Result<()> {
    match command {
        Command::Lecture {
            action: LectureAction::Add { title },
        } => {
            let lecture = storage.insert_lecture(&title).await?;
            println!("{}", lecture.id);
        }
        Command::Medium { action } => match action {
            MediumAction::Add {
                lecture,
                sort,
                description,
            } => {
                let sort = sort.unwrap_or_else(|| config.outline.script_sort.clone());
                let medium = storage
                    .insert_medium(lecture.as_deref(), &sort, &description)
                    .await?;
                println!("{}", medium.id);
            }
            MediumAction::Anchors { medium } => cmd_anchors(&storage, &medium).await?,
        },
        Command::Referral {
            action: ReferralAction::Add { from, anchor },
        } => {
            let referral = storage.insert_referral(&from, &anchor).await?;
            println!("{}", referral.id);
        }
        Command::Outline { lecture } => cmd_outline(&storage, &lecture).await?,
        Command::Check {
            medium,
            bookmarks,
            json,
        } => {
            let reconciler = Reconciler::new(storage, config.outline.clone());
            cmd_check(&reconciler, &medium, &read_bookmarks(&bookmarks)?, json).await?;
        }
        Command::Import {
            medium,
            bookmarks,
            json,
        } => {
            let reconciler = Reconciler::new(storage, config.outline.clone());
            let outcome = reconciler
                .import(&medium, &read_bookmarks(&bookmarks)?)
                .await?;
            print_outcome(&outcome, json)?;
        }
        Command::Destinations { action } => {
            let reconciler = Reconciler::new(storage, config.outline.clone());
            match action {
                DestinationsAction::Sync { medium, bookmarks } => {
                    let sync = reconciler
                        .sync_destinations(&medium, &read_bookmarks(&bookmarks)?)
                        .await?;
                    println!("created: {}, destroyed: {}", sync.created, sync.destroyed);
                }
                DestinationsAction::Reset { medium, bookmarks } => {
                    let sync = reconciler
                        .reset_destinations(&medium, &read_bookmarks(&bookmarks)?)
                        .await?;
                    println!("created: {}, destroyed: {}", sync.created, sync.destroyed);
                }
                DestinationsAction::Destroy {
                    medium,
                    destinations,
                } => {
                    let destroyed = reconciler
                        .destroy_destinations(&medium, &destinations)
                        .await?;
                    println!("destroyed: {destroyed}");
                }
            }
        }
        Command::Config { action } => cmd_config(&action, config)?,
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn read_bookmarks(path: &Path) -> Result<Vec<BookmarkRecord>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre!("cannot read bookmarks {}: {e}", path.display()))?;
    Ok(Outline::from_json(&content)?)
}

async fn cmd_outline(storage: &Storage, lecture_id: &str) -> Result<()> {
    let lecture = storage
        .get_lecture(lecture_id)
        .await?
        .ok_or_else(|| eyre!("lecture not found: {lecture_id}"))?;
    let chapters = storage.list_chapters(&lecture.id).await?;
    let sections = storage.list_sections(&lecture.id).await?;

    println!("{}", lecture.title);
    for chapter in &chapters {
        println!("{:>3}. [{}] {}", chapter.position, chapter.reference, chapter.title);
        for section in sections.iter().filter(|s| s.chapter_id == chapter.id) {
            println!(
                "     {:>3}. [{}] {}",
                section.position, section.reference, section.title
            );
        }
    }
    Ok(())
}

async fn cmd_anchors(storage: &Storage, medium_id: &str) -> Result<()> {
    for anchor in storage.list_anchors(medium_id).await? {
        let kind = match anchor.kind.content_kind() {
            Some(kind) => format!("{} ({kind})", anchor.kind.sort()),
            None => anchor.kind.sort().to_string(),
        };
        println!(
            "{}  {:<22} {:<20} {}",
            anchor.id,
            kind,
            anchor.destination.as_deref().unwrap_or("-"),
            anchor.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn cmd_check(
    reconciler: &Reconciler<Storage>,
    medium_id: &str,
    bookmarks: &[BookmarkRecord],
    json: bool,
) -> Result<()> {
    let manuscript = reconciler.check(medium_id, bookmarks).await?;
    let report = manuscript.contradictions();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_report(&report);

    let matching = manuscript.matching();
    for chapter in &matching.chapters {
        println!("[{}] {}", chapter.candidate.label, chapter.candidate.description);
        for section in matching.sections_in_chapter(&chapter.candidate) {
            println!("  [{}] {}", section.candidate.label, section.candidate.description);
            for content in matching.content_in_section(&section.candidate) {
                println!(
                    "    {} [{}] {}",
                    content.candidate.kind, content.candidate.label, content.candidate.description
                );
            }
        }
    }

    for chapter in manuscript.new_chapters() {
        println!("new chapter at {}: {}", chapter.position, chapter.title);
    }
    for chapter in manuscript.unmatched_chapters() {
        println!("chapter not in outline: [{}] {}", chapter.reference, chapter.title);
    }
    for section in manuscript.unmatched_sections() {
        println!("section not in outline: [{}] {}", section.reference, section.title);
    }
    Ok(())
}

fn print_report(report: &ContradictionReport) {
    if report.is_clear() {
        println!("No contradictions.");
        return;
    }

    println!("{} contradiction(s):", report.total_count());
    for c in &report.chapters {
        if let Some(reason) = c.contradiction {
            println!("  chapter [{}] {}: {reason}", c.candidate.label, c.candidate.description);
        }
    }
    for s in &report.sections {
        if let Some(reason) = s.contradiction {
            println!("  section [{}] {}: {reason}", s.candidate.label, s.candidate.description);
        }
    }
    for c in &report.content {
        if let Some(reason) = c.contradiction {
            println!(
                "  {} [{}] {}: {reason}",
                c.candidate.kind, c.candidate.label, c.candidate.description
            );
        }
    }
    for destination in &report.duplicate_destinations {
        println!("  destination {destination} is declared more than once");
    }
}

fn print_outcome(outcome: &ImportOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    if !outcome.imported {
        print_report(&outcome.report);
        return Err(eyre!("outline not imported"));
    }
    if let Some(summary) = &outcome.summary {
        println!(
            "Imported: {} chapter(s), {} section(s) created; \
             {} anchor(s) created, {} converted, {} updated",
            summary.chapters_created,
            summary.sections_created,
            summary.anchors_created,
            summary.anchors_converted,
            summary.anchors_updated
        );
    }
    if let Some(sync) = &outcome.destinations {
        println!(
            "Destinations: {} created, {} destroyed",
            sync.created, sync.destroyed
        );
    }
    Ok(())
}

fn cmd_config(action: &ConfigAction, config: &AppConfig) -> Result<()> {
    match action {
        ConfigAction::Init => cmd_config_init(),
        ConfigAction::Show => cmd_config_show(config),
    }
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
