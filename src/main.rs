//! # TalentGate CLI (`tg`)
//!
//! The `tg` binary is the primary interface for TalentGate. It provides
//! commands for configuration scaffolding, resume ingestion, question
//! answering, semantic search, schema inspection, and starting the HTTP
//! server.
//!
//! ## Usage
//!
//! ```bash
//! tg --config ./talentgate.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tg init` | Write a starter configuration file |
//! | `tg ingest` | Pull documents from the configured source into the index |
//! | `tg ask "<question>"` | Classify a question and answer it |
//! | `tg search "<query>"` | Semantic resume search |
//! | `tg schema [object]` | List catalog objects or show one object's schema |
//! | `tg health` | Probe the completion service and the business store |
//! | `tg serve` | Start the JSON HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Write a starter config
//! tg init --config ./talentgate.toml
//!
//! # Ingest resumes from the configured source
//! tg ingest
//!
//! # Ask as a recruiter
//! tg ask "Show me the top 5 candidates by score" --role Recruiter
//!
//! # Search resumes
//! tg search "senior rust engineer" --role Recruiter --limit 3
//!
//! # Start the HTTP server
//! tg serve
//! ```

use anyhow::bail;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use talentgate::catalog;
use talentgate::config;
use talentgate::engine::{Engine, DEFAULT_SEARCH_LIMIT};
use talentgate::models::{QueryAnswer, Role};
use talentgate::server;
use talentgate::source;

/// TalentGate CLI — role-gated question answering and resume search over
/// recruitment data.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file; `TALENTGATE_CONFIG` is honored when the flag is absent.
#[derive(Parser)]
#[command(
    name = "tg",
    about = "TalentGate — role-gated question answering and resume search over recruitment data",
    version,
    long_about = "TalentGate classifies natural-language questions, translates structured ones \
    into read-only SQL against a platform-owned SQLite store, and answers resume questions from \
    a locally built semantic index. Role membership gates every path."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Falls back to the `TALENTGATE_CONFIG` environment variable, then to
    /// `./talentgate.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration file.
    ///
    /// Writes a commented TOML template to the config path. Refuses to
    /// overwrite an existing file unless `--force` is given. The business
    /// store is platform-owned and never created by this tool; the index
    /// database is created on first use.
    Init {
        /// Overwrite an existing configuration file.
        #[arg(long)]
        force: bool,
    },

    /// Ingest documents from the configured source.
    ///
    /// Lists the source folder, downloads new or changed PDF and DOCX files,
    /// mirrors them locally, and indexes their extracted text. Unchanged
    /// files are skipped via the stored metadata stamps.
    Ingest,

    /// Classify a question and answer it.
    ///
    /// Dispatches to the conversational, structured-query, or resume-search
    /// path depending on the classified intent.
    Ask {
        /// The question to answer.
        question: String,

        /// Role name attached to the request (repeatable).
        #[arg(long = "role")]
        roles: Vec<String>,

        /// Return raw rows instead of a natural-language summary for
        /// structured answers.
        #[arg(long)]
        table: bool,
    },

    /// Semantic resume search.
    ///
    /// Bypasses classification and queries the document index directly.
    /// Requires a role listed in `[access].document_roles`.
    Search {
        /// The search query string.
        query: String,

        /// Role name attached to the request (repeatable).
        #[arg(long = "role")]
        roles: Vec<String>,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List catalog objects, or show one object's schema.
    Schema {
        /// Table or view name. Omit to list all catalog objects.
        object: Option<String>,
    },

    /// Probe the completion service and the business store.
    Health,

    /// Start the JSON HTTP server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// TalentGate API endpoints.
    Serve,
}

/// Starter configuration written by `tg init`. Defaults shown commented out
/// match the built-in defaults.
const CONFIG_TEMPLATE: &str = r#"# TalentGate configuration.
#
# The business store must already exist; it belongs to the platform, not to
# this engine. The index database is created on first use.

[store]
path = "talentgate.db"

[index]
# path = ".talentgate/index.db"
# max_document_tokens = 8192
# chars_per_token = 4
# snippet_chars = 500

[completion]
provider = "openai"                  # "openai" or "disabled"
model = "gpt-4o-mini"
# base_url = "https://api.openai.com/v1"
# api_key_env = "OPENAI_API_KEY"
# max_retries = 3
# timeout_secs = 30

[embedding]
provider = "openai"
model = "text-embedding-3-small"
# base_url = "https://api.openai.com/v1"
# api_key_env = "OPENAI_API_KEY"
# max_retries = 5
# timeout_secs = 30

[source]
kind = "filesystem"                  # "filesystem" or "http"
root = "./resumes"
# For an HTTP drive (Microsoft Graph style listing):
# kind = "http"
# base_url = "https://graph.microsoft.com/v1.0/drives/<drive-id>"
# folder = "Resumes"
# token_env = "TALENTGATE_SOURCE_TOKEN"

[ingest]
# document_dir = ".talentgate/documents"
# metadata_path = ".talentgate/metadata.json"

[server]
bind = "127.0.0.1:8085"

[access]
# admin_role = "Admin"
# document_roles = ["Recruiter", "Admin"]
"#;

fn resolve_config_path(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| std::env::var_os("TALENTGATE_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("./talentgate.toml"))
}

fn init_config(path: &PathBuf, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!(
            "Configuration file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, CONFIG_TEMPLATE)?;
    println!("Wrote configuration template to {}", path.display());
    println!("Edit [store].path to point at the platform database, then run `tg ingest`.");
    Ok(())
}

/// Map `--role` flags to role records. CLI callers carry names only; ids are
/// positional.
fn to_roles(names: Vec<String>) -> Vec<Role> {
    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| Role {
            id: (i + 1) as i64,
            name,
        })
        .collect()
}

fn print_answer(answer: &QueryAnswer) -> anyhow::Result<()> {
    if let Some(message) = &answer.message {
        println!("{}", message);
    }
    if !answer.rows.is_empty() {
        println!("{}", serde_json::to_string_pretty(&answer.rows)?);
    }
    if !answer.results.is_empty() {
        println!();
        for (i, result) in answer.results.iter().enumerate() {
            let name = result
                .metadata
                .get("candidate_name")
                .and_then(|v| v.as_str())
                .unwrap_or(&result.document_id);
            println!("{}. [{:.2}] {}", i + 1, result.similarity_score, name);
            println!(
                "    excerpt: \"{}\"",
                result.snippet.replace('\n', " ").trim()
            );
            println!("    id: {}", result.document_id);
            println!();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config);

    // Init runs before config loading; it writes the file the other
    // commands read.
    if let Commands::Init { force } = &cli.command {
        return init_config(&config_path, *force);
    }

    let config = config::load_config(&config_path)?;

    match cli.command {
        Commands::Init { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
        Commands::Ingest => {
            let engine = Engine::initialize(config).await;
            let source = source::from_config(&engine.config().source)?;
            let report = engine.ingest_documents(source.as_ref()).await?;
            println!(
                "Ingest complete: {} listed, {} filtered, {} unchanged, {} updated, {} failed",
                report.listed, report.filtered, report.unchanged, report.updated, report.failed
            );
        }
        Commands::Ask {
            question,
            roles,
            table,
        } => {
            let engine = Engine::initialize(config).await;
            let answer = engine.answer(&question, &to_roles(roles), table).await?;
            print_answer(&answer)?;
        }
        Commands::Search {
            query,
            roles,
            limit,
        } => {
            let engine = Engine::initialize(config).await;
            let answer = engine
                .search_documents(
                    &query,
                    &to_roles(roles),
                    limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
                )
                .await?;
            print_answer(&answer)?;
        }
        Commands::Schema { object } => {
            let engine = Engine::initialize(config).await;
            match object {
                Some(name) => {
                    let descriptor = engine.get_object_schema(&name).await?;
                    println!("{}", catalog::render(&descriptor));
                }
                None => {
                    for name in engine.list_catalog().await? {
                        println!("{}", name);
                    }
                }
            }
        }
        Commands::Health => {
            let engine = Engine::initialize(config).await;
            let report = engine.health_check().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Serve => {
            let engine = Engine::initialize(config).await;
            server::run_server(engine).await?;
        }
    }

    Ok(())
}
