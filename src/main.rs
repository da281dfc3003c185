//! CLI entry point for ragvault.
//!
//! Each invocation opens one session, runs one command and exits. Output is
//! text by default or a JSON envelope with `--json`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use console::style;
use ragvault::content::{ContentKind, Extractors, MessageRole, Record};
use ragvault::io::{ExitCode, OutputFormat, OutputManager};
use ragvault::session::{self, BatchReport, DEFAULT_SESSION, ItemOutcome, SessionContext};
use ragvault::vector::FastEmbedGenerator;
use ragvault::{RagError, SearchResult, Settings};
use serde::Serialize;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Session-scoped retrieval for a local assistant
#[derive(Parser)]
#[command(
    name = "ragvault",
    version = env!("CARGO_PKG_VERSION"),
    about = "Index session files and retrieve ranked context for prompts",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Examples:\n  ragvault init\n  ragvault ingest notes.txt slides.pdf\n  ragvault search \"gradient descent\" -k 10\n  ragvault prompt \"summarize the lecture\" --upload lecture.txt\n  ragvault --session project-x stats"
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Session to operate on
    #[arg(short, long, global = true, env = "RV_SESSION", default_value = DEFAULT_SESSION)]
    session: String,

    /// Log progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a commented .ragvault/settings.toml in the current directory
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Ingest files into the partition matching their extension
    Ingest {
        files: Vec<PathBuf>,

        /// External id per file, in order; defaults to the file name
        #[arg(long = "id")]
        ids: Vec<String>,
    },

    /// Ranked search over the configured partitions
    Search {
        query: String,

        /// Number of results
        #[arg(short, default_value = "5")]
        k: usize,

        /// Source paths to rank ahead of others
        #[arg(long = "prioritize")]
        prioritized: Vec<String>,
    },

    /// Remove every record of an item
    Delete {
        id: String,

        /// Content kind, or a file extension such as pdf or wav
        #[arg(long)]
        kind: String,
    },

    /// Rebuild partitions from their metadata
    Rebuild {
        /// Only this kind; all partitions otherwise
        #[arg(long)]
        kind: Option<ContentKind>,
    },

    /// Store a chat message in the session history
    Remember {
        text: String,

        #[arg(long, default_value = "user")]
        role: MessageRole,

        #[arg(long)]
        id: Option<String>,
    },

    /// Show the most recent exchanges
    Recent {
        /// Exchanges, two messages each
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,
    },

    /// Build the chat messages for a prompt
    Prompt {
        text: String,

        /// Files uploaded with this prompt; ingested first and prioritized
        #[arg(long = "upload")]
        uploads: Vec<PathBuf>,
    },

    /// Record counts and health per partition
    Stats,

    /// Display active settings
    Config,

    /// Delete a session and all its partitions
    DropSession {
        /// Defaults to --session
        name: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path).unwrap_or_else(|e| {
            eprintln!("Configuration error loading from {}: {e}", path.display());
            std::process::exit(ExitCode::ConfigError.into());
        }),
        None => Settings::load().unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            eprintln!("Using default configuration.");
            Settings::default()
        }),
    };

    init_tracing(cli.verbose, settings.debug);

    let mut output = OutputManager::new(OutputFormat::from_json_flag(cli.json), &cli.session);
    let code = match run(&cli, settings, &mut output) {
        Ok(code) => code,
        Err(e) => match e.downcast_ref::<RagError>() {
            Some(rag) => output.error(rag).unwrap_or(ExitCode::GeneralError),
            None => {
                eprintln!("Error: {e:#}");
                ExitCode::GeneralError
            }
        },
    };
    std::process::exit(code.into());
}

fn init_tracing(verbose: bool, debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else if verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn open_session(cli: &Cli, settings: Settings) -> anyhow::Result<SessionContext> {
    let show_progress = !cli.json;
    let embedder = FastEmbedGenerator::new(
        &settings.embedding.model,
        &settings.models_dir(),
        show_progress,
    )
    .map_err(RagError::from)?;
    let session = SessionContext::open(
        settings,
        &cli.session,
        Arc::new(embedder),
        Extractors::default(),
    )?;
    Ok(session)
}

fn run(cli: &Cli, settings: Settings, output: &mut OutputManager) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Commands::Init { force } => {
            let dir = std::env::current_dir().context("cannot read current directory")?;
            let path = Settings::init_config_file(&dir, *force)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            output.progress("Edit this file to customize your settings.")?;
            Ok(output.success(&path, |path| {
                format!("Created configuration file at: {}", path.display())
            })?)
        }

        Commands::Config => {
            let rendered = toml::to_string_pretty(&settings)?;
            Ok(output.success(&settings, |_| {
                format!("Current Configuration:\n{}\n{rendered}", "=".repeat(50))
            })?)
        }

        Commands::DropSession { name } => {
            let name = name.as_deref().unwrap_or(&cli.session);
            let removed = session::remove_session(&settings, name)?;
            let summary = Removal {
                session: name.to_string(),
                removed,
            };
            Ok(output.success(&summary, |s| {
                if s.removed {
                    format!("Removed session '{}'", s.session)
                } else {
                    format!("Session '{}' does not exist", s.session)
                }
            })?)
        }

        Commands::Ingest { files, ids } => {
            if files.is_empty() {
                bail!("no files given");
            }
            if !ids.is_empty() && ids.len() != files.len() {
                bail!("{} ids given for {} files", ids.len(), files.len());
            }
            let batch: Vec<(String, PathBuf)> = files
                .iter()
                .enumerate()
                .map(|(i, path)| {
                    let id = ids.get(i).cloned().unwrap_or_else(|| default_id(path));
                    (id, path.clone())
                })
                .collect();

            let mut session = open_session(cli, settings)?;
            let report = session.process_files(&batch);
            output.success(&report, render_batch)?;
            Ok(if report.failed > 0 {
                ExitCode::GeneralError
            } else {
                ExitCode::Success
            })
        }

        Commands::Search {
            query,
            k,
            prioritized,
        } => {
            let session = open_session(cli, settings)?;
            let results = session.search(query, prioritized, *k)?;
            Ok(output.collection(&results, "results", render_result)?)
        }

        Commands::Delete { id, kind } => {
            let kind = parse_kind(kind)?;
            let session = open_session(cli, settings)?;
            let removed = session.delete_files(&[(id.clone(), kind)])?;
            let summary = Deletion {
                id: id.clone(),
                kind,
                removed,
            };
            output.success(&summary, |d| {
                format!("Removed {} {} record(s) for '{}'", d.removed, d.kind, d.id)
            })?;
            Ok(if removed == 0 {
                ExitCode::NotFound
            } else {
                ExitCode::Success
            })
        }

        Commands::Rebuild { kind } => {
            let session = open_session(cli, settings)?;
            let kinds = match kind {
                Some(kind) => vec![*kind],
                None => ContentKind::ALL.to_vec(),
            };
            let mut rebuilt = Vec::new();
            for kind in kinds {
                output.progress(&format!("Rebuilding {kind} partition..."))?;
                let records = session.rebuild(kind)?;
                rebuilt.push(Rebuilt { kind, records });
            }
            Ok(output.collection(&rebuilt, "partitions", |_, r| {
                format!("  {:<10} {} records", r.kind, r.records)
            })?)
        }

        Commands::Remember { text, role, id } => {
            let session = open_session(cli, settings)?;
            let outcome = session.record_message(id.as_deref(), *role, text)?;
            let id = outcome.id().map(|id| id.get());
            Ok(output.success(&id, |id| match id {
                Some(id) => format!("Stored message as vector {id}"),
                None => "Message already stored".to_string(),
            })?)
        }

        Commands::Recent { count } => {
            let session = open_session(cli, settings)?;
            let messages = session.recent_messages(*count);
            Ok(output.collection(&messages, "messages", |_, m| {
                format!("{} {}: {}", style(format!("[{:.0}]", m.timestamp)).dim(), m.role, m.text)
            })?)
        }

        Commands::Prompt { text, uploads } => {
            let mut session = open_session(cli, settings)?;
            if !uploads.is_empty() {
                let queued = uploads
                    .iter()
                    .map(|path| (default_id(path), path.clone()))
                    .collect();
                session.queue_files(queued);
            }
            let messages = session.prepare_prompt(text)?;
            Ok(output.success(&messages, |messages| {
                messages
                    .iter()
                    .map(|m| format!("{}\n{}", style(format!("--- {} ---", m.role)).cyan().bold(), m.content))
                    .collect::<Vec<_>>()
                    .join("\n\n")
            })?)
        }

        Commands::Stats => {
            let session = open_session(cli, settings)?;
            let stats = session.stats();
            Ok(output.success(&stats, |stats| {
                let mut lines = vec![format!(
                    "Session '{}' at {}",
                    session.session_id(),
                    session.dir().display()
                )];
                for s in stats {
                    let health = match &s.stale {
                        Some(reason) => style(format!("stale: {reason}")).yellow().to_string(),
                        None => style("ok").green().to_string(),
                    };
                    lines.push(format!(
                        "  {:<10} {:>6} records {:>4} sources  {health}",
                        s.kind.as_str(),
                        s.records,
                        s.sources
                    ));
                }
                lines.join("\n")
            })?)
        }
    }
}

#[derive(Serialize)]
struct Removal {
    session: String,
    removed: bool,
}

#[derive(Serialize)]
struct Deletion {
    id: String,
    kind: ContentKind,
    removed: usize,
}

#[derive(Serialize)]
struct Rebuilt {
    kind: ContentKind,
    records: usize,
}

fn default_id(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Accepts a kind name or a file extension.
fn parse_kind(value: &str) -> anyhow::Result<ContentKind> {
    if let Ok(kind) = value.parse::<ContentKind>() {
        return Ok(kind);
    }
    ContentKind::from_extension(value.trim_start_matches('.'))
        .with_context(|| format!("'{value}' is neither a content kind nor a known extension"))
}

fn render_batch(report: &BatchReport) -> String {
    let mut lines = Vec::new();
    for item in &report.items {
        let kind = item.kind.map(|k| k.as_str()).unwrap_or("-");
        let line = match &item.outcome {
            ItemOutcome::Ingested { added, duplicates } => format!(
                "{} {} [{kind}] {} chunks added, {} duplicates",
                style("✓").green(),
                item.path.display(),
                added,
                duplicates
            ),
            ItemOutcome::Skipped { reason } => format!(
                "{} {} skipped: {reason}",
                style("-").yellow(),
                item.path.display()
            ),
            ItemOutcome::Failed { code, message } => format!(
                "{} {} {}: {message}",
                style("✗").red(),
                item.path.display(),
                style(code).red().bold()
            ),
        };
        lines.push(line);
    }
    lines.push(format!(
        "{} ingested, {} skipped, {} failed ({} chunks added, {} duplicates)",
        report.ingested(),
        report.skipped,
        report.failed,
        report.added,
        report.duplicates
    ));
    lines.join("\n")
}

fn render_result(position: usize, result: &SearchResult) -> String {
    let source = result
        .record
        .path()
        .unwrap_or_else(|| result.record.external_id());
    let preview: String = result.record.embedding_text().chars().take(160).collect();
    let extra = match &result.record {
        Record::Image(image) if !image.objects.is_empty() => {
            let objects: Vec<&str> = image.objects.iter().map(String::as_str).collect();
            format!("\n   objects: {}", objects.join(", "))
        }
        Record::Audio(audio) => format!("\n   language: {}", audio.language),
        _ => String::new(),
    };
    format!(
        "{}. {} {} (distance {:.4}, relevancy {:.4})\n   {}{extra}",
        position + 1,
        style(format!("[{}]", result.kind())).cyan(),
        style(source).bold(),
        result.distance,
        result.relevancy,
        preview.replace('\n', " ")
    )
}
