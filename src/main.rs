//! Binary entry point for vaultsync.
//!
//! CLI over the synchronization service: entity CRUD with git mirroring,
//! reconciliation, health, and mirror history inspection.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow unnecessary_wraps for consistent command function signatures
#![allow(clippy::unnecessary_wraps)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use vaultsync::{
    CommitAuthor, EntityKind, EntityRecord, ReviewStatus, SyncService, VaultConfig, observability,
};

/// Vaultsync - a git-backed dual-write synchronization engine.
#[derive(Parser)]
#[command(name = "vaultsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Root of the git mirror working tree (overrides config).
    #[arg(long, global = true)]
    repo: Option<PathBuf>,

    /// Path to the SQLite database (overrides config).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the mirror repository and database.
    Init,

    /// Create an entity and mirror it to git.
    Create {
        /// Entity kind: skill, customer-profile, prompt-block, prompt-modifier.
        kind: String,

        /// Entity title.
        title: String,

        /// Markdown body (reads stdin when omitted).
        #[arg(short, long)]
        body: Option<String>,

        /// Categories / tags (comma-separated).
        #[arg(short, long)]
        categories: Option<String>,

        /// Owner identifier.
        #[arg(short, long)]
        owner: Option<String>,

        /// Create as draft (review-gated kinds stay out of the mirror).
        #[arg(long)]
        draft: bool,

        /// Acting user recorded in the log and the commit.
        #[arg(long, default_value = "cli")]
        user: String,
    },

    /// Update an entity and mirror the change.
    Update {
        /// Entity id.
        id: String,

        /// New title (renames the mirror file).
        #[arg(short, long)]
        title: Option<String>,

        /// New markdown body.
        #[arg(short, long)]
        body: Option<String>,

        /// Publish a draft.
        #[arg(long)]
        publish: bool,

        /// Acting user recorded in the log and the commit.
        #[arg(long, default_value = "cli")]
        user: String,
    },

    /// Delete an entity and its mirror file.
    Delete {
        /// Entity id.
        id: String,

        /// Acting user recorded in the log and the commit.
        #[arg(long, default_value = "cli")]
        user: String,
    },

    /// List entities of a kind.
    List {
        /// Entity kind.
        kind: String,

        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show one entity with its sync state.
    Show {
        /// Entity id.
        id: String,
    },

    /// Show the sync log for an entity.
    Logs {
        /// Entity kind.
        kind: String,

        /// Entity id.
        id: String,

        /// Maximum rows.
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show the sync health report.
    Health {
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Replay out-of-sync entities into the mirror.
    Sync {
        /// Replay every entity regardless of cached status.
        #[arg(long)]
        force: bool,
    },

    /// Show the git history of an entity's mirror file.
    History {
        /// Entity id.
        id: String,

        /// Maximum commits.
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Diff an entity's mirror file between two commits.
    Diff {
        /// Entity id.
        id: String,

        /// Older commit.
        from: String,

        /// Newer commit.
        to: String,
    },

    /// Push the mirror branch to the configured remote.
    Push,
}

/// Main entry point.
fn main() -> ExitCode {
    // Load .env if present; ignore absence.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    observability::init_logging(cli.verbose);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run_command(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Resolves configuration from defaults plus CLI overrides.
fn load_config(cli: &Cli) -> Result<VaultConfig, Box<dyn std::error::Error>> {
    let mut config = VaultConfig::load_default()?;
    if let Some(repo) = &cli.repo {
        config.repo_path.clone_from(repo);
    }
    if let Some(db) = &cli.db {
        config.db_path.clone_from(db);
    }
    Ok(config)
}

/// Runs the selected command.
fn run_command(cli: Cli, config: &VaultConfig) -> Result<(), Box<dyn std::error::Error>> {
    let service = SyncService::open(config)?;

    match cli.command {
        Commands::Init => cmd_init(config),
        Commands::Create {
            kind,
            title,
            body,
            categories,
            owner,
            draft,
            user,
        } => cmd_create(&service, &kind, title, body, categories, owner, draft, &user),
        Commands::Update {
            id,
            title,
            body,
            publish,
            user,
        } => cmd_update(&service, &id, title, body, publish, &user),
        Commands::Delete { id, user } => cmd_delete(&service, &id, &user),
        Commands::List { kind, json } => cmd_list(&service, &kind, json),
        Commands::Show { id } => cmd_show(&service, &id),
        Commands::Logs { kind, id, limit } => cmd_logs(&service, &kind, &id, limit),
        Commands::Health { json } => cmd_health(&service, json),
        Commands::Sync { force } => cmd_sync(&service, force),
        Commands::History { id, limit } => cmd_history(&service, &id, limit),
        Commands::Diff { id, from, to } => cmd_diff(&service, &id, &from, &to),
        Commands::Push => cmd_push(&service),
    }
}

/// Reads the acting author identity from git-style environment variables,
/// falling back to the acting user name.
fn author_for(user: &str) -> CommitAuthor {
    let name = std::env::var("VAULTSYNC_AUTHOR_NAME").unwrap_or_else(|_| user.to_string());
    let email = std::env::var("VAULTSYNC_AUTHOR_EMAIL")
        .unwrap_or_else(|_| format!("{user}@vaultsync.local"));
    CommitAuthor::new(name, email)
}

fn read_body(body: Option<String>) -> Result<String, Box<dyn std::error::Error>> {
    match body {
        Some(body) => Ok(body),
        None => {
            use std::io::Read;
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        },
    }
}

fn cmd_init(config: &VaultConfig) -> Result<(), Box<dyn std::error::Error>> {
    // SyncService::open already initialized the repository and database;
    // pre-create the kind directories so the mirror layout is visible.
    for kind in EntityKind::all() {
        let dir = config
            .repo_path
            .join(vaultsync::sync::adapter_for(*kind).directory());
        std::fs::create_dir_all(&dir)?;
    }
    println!("Mirror repository: {}", config.repo_path.display());
    println!("Database:         {}", config.db_path.display());
    println!("Initialized.");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_create(
    service: &SyncService,
    kind: &str,
    title: String,
    body: Option<String>,
    categories: Option<String>,
    owner: Option<String>,
    draft: bool,
    user: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let kind = EntityKind::parse(kind)?;
    let body = read_body(body)?;

    let mut entity = EntityRecord::new(kind, title, body);
    if let Some(categories) = categories {
        entity = entity.with_categories(
            categories
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
        );
    }
    if let Some(owner) = owner {
        entity = entity.with_owner(owner);
    }
    if draft {
        entity = entity.with_review_status(ReviewStatus::Draft);
    }

    let stored = service.create(entity, &author_for(user), user)?;
    println!("Created {} {} ({})", stored.kind, stored.id, stored.slug);
    match &stored.git_commit_sha {
        Some(sha) => println!("Committed as {sha}"),
        None => println!("Not mirrored (draft or unchanged)"),
    }
    Ok(())
}

fn cmd_update(
    service: &SyncService,
    id: &str,
    title: Option<String>,
    body: Option<String>,
    publish: bool,
    user: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut entity = service
        .get(id)?
        .ok_or_else(|| format!("no entity with id {id}"))?;

    if let Some(title) = title {
        entity.title = title;
    }
    if let Some(body) = body {
        entity.body = body;
    }
    if publish {
        entity.review_status = ReviewStatus::Published;
    }

    let stored = service.update(entity, &author_for(user), user)?;
    println!("Updated {} ({})", stored.id, stored.slug);
    Ok(())
}

fn cmd_delete(
    service: &SyncService,
    id: &str,
    user: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    service.delete(id, &author_for(user), user)?;
    println!("Deleted {id}");
    Ok(())
}

fn cmd_list(
    service: &SyncService,
    kind: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let kind = EntityKind::parse(kind)?;
    let entities = service.list(kind)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entities)?);
        return Ok(());
    }

    if entities.is_empty() {
        println!("No {kind} entities.");
        return Ok(());
    }
    for entity in entities {
        println!(
            "{}  {:10}  {}  {}",
            entity.id, entity.sync_status, entity.slug, entity.title
        );
    }
    Ok(())
}

fn cmd_show(service: &SyncService, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let entity = service
        .get(id)?
        .ok_or_else(|| format!("no entity with id {id}"))?;
    println!("{}", serde_json::to_string_pretty(&entity)?);
    Ok(())
}

fn cmd_logs(
    service: &SyncService,
    kind: &str,
    id: &str,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let kind = EntityKind::parse(kind)?;
    let entries = service.sync_logs_for(kind, id, limit)?;

    if entries.is_empty() {
        println!("No sync log rows for {id}.");
        return Ok(());
    }
    for entry in entries {
        let sha = entry.git_commit_sha.as_deref().unwrap_or("-");
        let detail = entry.error.as_deref().unwrap_or("");
        println!(
            "{}  {:7}  {:7}  {:.12}  by {}  {}",
            entry.started_at, entry.operation, entry.status, sha, entry.synced_by, detail
        );
    }
    Ok(())
}

fn cmd_health(service: &SyncService, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let report = service.health();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Sync health");
        println!("===========");
        for kind in &report.kinds {
            let state = if kind.healthy { "ok" } else { "DEGRADED" };
            println!(
                "{:17} {:8}  total {:4}  synced {:4}  pending {:4}  failed {:4}  recent failures {:4}  stuck {:4}",
                kind.kind.to_string(),
                state,
                kind.total,
                kind.synced,
                kind.pending,
                kind.failed,
                kind.recent_failures,
                kind.stuck_pending
            );
        }
        for error in &report.errors {
            println!("error: {error}");
        }
    }

    if report.healthy {
        Ok(())
    } else {
        Err("sync health degraded".into())
    }
}

fn cmd_sync(service: &SyncService, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let report = service.trigger_sync(force);
    println!(
        "Processed {} entities: {} committed, {} unchanged, {} drafts skipped, {} failed",
        report.processed, report.committed, report.unchanged, report.skipped_draft, report.failed
    );
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    if report.is_clean() {
        Ok(())
    } else {
        Err(format!("{} entities failed to sync", report.failed).into())
    }
}

fn cmd_history(
    service: &SyncService,
    id: &str,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let commits = service.history(id, limit)?;
    if commits.is_empty() {
        println!("No history for {id}.");
        return Ok(());
    }
    for commit in commits {
        println!(
            "{:.12}  {}  {} <{}>  {}",
            commit.sha,
            commit.date.format("%Y-%m-%d %H:%M"),
            commit.author,
            commit.email,
            commit.message
        );
    }
    Ok(())
}

fn cmd_diff(
    service: &SyncService,
    id: &str,
    from: &str,
    to: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    print!("{}", service.diff(id, from, to)?);
    Ok(())
}

fn cmd_push(service: &SyncService) -> Result<(), Box<dyn std::error::Error>> {
    service.push()?;
    println!("Pushed.");
    Ok(())
}
