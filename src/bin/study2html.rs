//! CLI binary for studyhtml.
//!
//! A thin shim over the library crates: maps flags onto `StudyConfig` and
//! `CacheConfig`, runs one command, prints the result.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use offline_cache::{CacheConfig, HttpFetcher, OfflineCache};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use studyhtml::{convert_file, discover_topics, Converter, StudyConfig, StudyHtmlError};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # List topics under ./uploads/topics
  study2html topics

  # Render a topic (converts and persists the .html on first run)
  study2html render pathology/renal-tumours -o renal.html

  # One-off conversion, nothing persisted
  study2html convert notes.docx > notes.html

  # Offline audio
  study2html cache save pathology/renal-tumours https://cdn.example.com/renal.mp3
  study2html cache list --json
  study2html cache size

ENVIRONMENT VARIABLES:
  STUDY_TOPICS_ROOT    Topics root directory (default: uploads/topics)
  STUDY_NO_PERSIST     Do not write converted HTML next to its source
  STUDY_CACHE_DIR      Offline cache directory (default: .cache)
  STUDY_CACHE_STORE    Store namespace inside the cache directory
  STUDY_FETCH_TIMEOUT  Audio download timeout in seconds
  RUST_LOG             Overrides --verbose / --quiet log filtering
"#;

/// Normalise study documents to HTML and manage the offline audio cache.
#[derive(Parser, Debug)]
#[command(
    name = "study2html",
    version,
    about = "Normalise study documents to HTML and manage offline audio",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Root of the <category>/<topic>/ tree.
    #[arg(long, global = true, env = "STUDY_TOPICS_ROOT", default_value = "uploads/topics")]
    topics_root: PathBuf,

    /// Do not persist converted HTML next to the source.
    #[arg(long, global = true, env = "STUDY_NO_PERSIST")]
    no_persist: bool,

    /// Offline cache directory.
    #[arg(long, global = true, env = "STUDY_CACHE_DIR", default_value = ".cache")]
    cache_dir: PathBuf,

    /// Store namespace inside the cache directory.
    #[arg(long, global = true, env = "STUDY_CACHE_STORE", default_value = offline_cache::DEFAULT_STORE_ID)]
    store_id: String,

    /// Audio download timeout in seconds.
    #[arg(long, global = true, env = "STUDY_FETCH_TIMEOUT", default_value_t = 120)]
    fetch_timeout: u64,

    /// Emit JSON instead of human-readable text.
    #[arg(long, global = true, env = "STUDY_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "STUDY_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "STUDY_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every topic with its available content.
    Topics,

    /// Print (or write) the HTML for one topic, converting if needed.
    Render {
        /// Topic id, `category/slug`.
        topic_id: String,
        /// Write HTML to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert a single .docx/.pdf/.txt file without persisting.
    Convert {
        file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Offline audio cache operations.
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Download audio for a topic and store it.
    Save { topic_id: String, url: String },
    /// Report whether a topic's audio is cached.
    Status { topic_id: String },
    /// Copy a cached blob out to a file.
    Get {
        topic_id: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Remove a topic's cached audio.
    Remove { topic_id: String },
    /// Remove every cached entry.
    Clear,
    /// Total bytes of cached audio.
    Size,
    /// List every cached entry.
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Topics => cmd_topics(&cli).await,
        Command::Render { topic_id, output } => cmd_render(&cli, topic_id, output.as_deref()).await,
        Command::Convert { file, output } => cmd_convert(&cli, file, output.as_deref()).await,
        Command::Cache(cmd) => cmd_cache(&cli, cmd).await,
    }
}

fn study_config(cli: &Cli) -> Result<StudyConfig> {
    StudyConfig::builder()
        .topics_root(&cli.topics_root)
        .persist_converted(!cli.no_persist)
        .build()
        .context("Invalid configuration")
}

async fn cmd_topics(cli: &Cli) -> Result<()> {
    let topics = discover_topics(&cli.topics_root)
        .await
        .with_context(|| format!("Failed to scan {}", cli.topics_root.display()))?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&topics).context("Failed to serialise topics")?
        );
        return Ok(());
    }

    let mut category = None;
    for topic in &topics {
        if category != Some(&topic.category) {
            println!("{}", bold(&topic.category));
            category = Some(&topic.category);
        }
        let mut kinds = Vec::new();
        for (present, kind) in [
            (topic.has_docx, "docx"),
            (topic.has_pdf, "pdf"),
            (topic.has_html, "html"),
            (topic.has_audio, "audio"),
            (topic.has_image, "image"),
        ] {
            if present {
                kinds.push(kind);
            }
        }
        println!("  {:<40} {}", topic.id, dim(&kinds.join(" ")));
    }
    if !cli.quiet {
        eprintln!("{} topics", topics.len());
    }
    Ok(())
}

async fn cmd_render(cli: &Cli, topic_id: &str, output: Option<&Path>) -> Result<()> {
    let converter = Converter::new(study_config(cli)?);
    let rendered = match converter.render_id(topic_id).await {
        Ok(r) => r,
        Err(e @ StudyHtmlError::ContentAbsent { .. }) => {
            bail!("{e} (no .html, .docx, .pdf or .txt in the topic folder)")
        }
        Err(e) => return Err(e).context("Render failed"),
    };

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&rendered).context("Failed to serialise output")?
        );
    } else {
        write_output(&rendered.html, output).await?;
    }

    if !cli.quiet {
        let how = if rendered.was_converted() {
            "converted"
        } else {
            "existing"
        };
        eprintln!(
            "{}  {}  {}  {}ms",
            green("✔"),
            topic_id,
            how,
            rendered.duration_ms
        );
    }
    Ok(())
}

async fn cmd_convert(cli: &Cli, file: &Path, output: Option<&Path>) -> Result<()> {
    let html = convert_file(file, &study_config(cli)?)
        .await
        .with_context(|| format!("Failed to convert {}", file.display()))?;
    write_output(&html, output).await
}

async fn write_output(html: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => tokio::fs::write(path, html)
            .await
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(html.as_bytes())
                .context("Failed to write to stdout")?;
            if !html.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
            Ok(())
        }
    }
}

async fn cmd_cache(cli: &Cli, cmd: &CacheCommand) -> Result<()> {
    let config = CacheConfig::builder()
        .root(&cli.cache_dir)
        .store_id(cli.store_id.clone())
        .fetch_timeout_secs(cli.fetch_timeout)
        .build()
        .context("Invalid cache configuration")?;
    let fetcher = HttpFetcher::new(config.fetch_timeout_secs).context("Failed to build HTTP client")?;
    let cache = OfflineCache::new(config, Arc::new(fetcher));

    match cmd {
        CacheCommand::Save { topic_id, url } => {
            let entry = cache
                .save(topic_id, url)
                .await
                .with_context(|| format!("Failed to cache audio for {topic_id}"))?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            } else if !cli.quiet {
                eprintln!("{}  {}  {} bytes", green("✔"), topic_id, entry.size);
            }
        }
        CacheCommand::Status { topic_id } => {
            let cached = cache.is_cached(topic_id).await;
            if cli.json {
                println!("{}", serde_json::json!({ "topicId": topic_id, "cached": cached }));
            } else {
                println!("{topic_id}: {}", if cached { "cached" } else { "not cached" });
            }
        }
        CacheCommand::Get { topic_id, output } => {
            let Some(audio) = cache
                .get_cached_audio(topic_id)
                .await
                .context("Failed to read cache")?
            else {
                bail!("{topic_id} is not cached");
            };
            tokio::fs::write(output, &*audio.bytes)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            if !cli.quiet {
                eprintln!(
                    "{}  {} bytes ({})  →  {}",
                    green("✔"),
                    audio.len(),
                    audio.mime_type,
                    bold(&output.display().to_string())
                );
            }
        }
        CacheCommand::Remove { topic_id } => {
            cache
                .remove(topic_id)
                .await
                .with_context(|| format!("Failed to remove {topic_id}"))?;
        }
        CacheCommand::Clear => {
            cache.clear_all().await.context("Failed to clear cache")?;
        }
        CacheCommand::Size => {
            let bytes = cache.total_size().await.context("Failed to size cache")?;
            if cli.json {
                println!("{}", serde_json::json!({ "totalBytes": bytes }));
            } else {
                println!("{}", human_bytes(bytes));
            }
        }
        CacheCommand::List => {
            let entries = cache.list_entries().await.context("Failed to list cache")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for e in &entries {
                    println!("{:<40} {:>10}  {}", e.topic_id, human_bytes(e.size), dim(&e.source_url));
                }
            }
        }
    }
    Ok(())
}

fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
