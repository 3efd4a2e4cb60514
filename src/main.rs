//! CLI entry point for `tagview`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use tagview::config::{self, Config};
use tagview::index::mbox::{builder, header, MboxIndex};
use tagview::model::{MessageSummary, MessageView, MimePart, TagDelta, TagRequest, TagTarget};
use tagview::render::{body_html, body_text};
use tagview::{MessageAssembler, TagMutator};

#[derive(Parser)]
#[command(name = "tagview", version, about = "Browse, read and tag mail in an mbox")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Mbox file to open (defaults to `index.mbox` from the config file)
    #[arg(short, long, global = true, env = "TAGVIEW_MBOX", value_name = "FILE")]
    mbox: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (or refresh) the header index and print statistics
    Index {
        /// Rebuild even if a valid index exists
        #[arg(short, long)]
        force: bool,
    },
    /// List messages carrying a tag
    List {
        /// Tag to list (defaults to `index.default_tag`)
        tag: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List messages matching a query
    Search {
        query: String,
        #[arg(long)]
        json: bool,
    },
    /// Count messages matching a query
    Count {
        #[arg(default_value = "*")]
        query: String,
    },
    /// Show one message
    Show {
        id: String,
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Show a thread, newest message first
    Thread {
        thread_id: String,
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// List the MIME parts of a message
    Parts { id: String },
    /// Write one MIME part to stdout or a file
    Part {
        id: String,
        ordinal: usize,
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Add (+tag) or remove (-tag) tags on a message or a whole thread
    Tag {
        /// Message id, or thread id with --thread
        target: String,
        /// Changes such as `+done -unread`
        #[arg(allow_hyphen_values = true)]
        changes: Vec<String>,
        /// Treat the target as a thread id
        #[arg(long)]
        thread: bool,
        /// Changes as JSON: {"tags": {"add": [...], "remove": [...]}}
        #[arg(long, conflicts_with = "changes")]
        json: Option<String>,
    },
    /// List every tag in use
    Tags,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Html,
    Json,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Completions { shell } => return cmd_completions(shell),
        Commands::Manpage => return cmd_manpage(),
        Commands::Index { force } => {
            let path = mbox_path(cli.mbox.as_deref(), &config)?;
            return cmd_index(&path, &config, force);
        }
        _ => {}
    }

    let path = mbox_path(cli.mbox.as_deref(), &config)?;
    let index = open_index(&path, &config, false)?;
    let assembler = MessageAssembler::new(&index);

    match cli.command {
        Commands::List { tag, json } => {
            let tag = tag.unwrap_or_else(|| config.index.default_tag.clone());
            print_summaries(&assembler.list_tag(&tag)?, json, &config)
        }
        Commands::Search { query, json } => {
            print_summaries(&assembler.search(&query)?, json, &config)
        }
        Commands::Count { query } => {
            println!("{}", assembler.count(&query)?);
            Ok(())
        }
        Commands::Show { id, format } => {
            let view = assembler.message(&id)?;
            match format {
                Format::Json => print_json(&view),
                Format::Html => {
                    println!("{}", body_html(&view, &config.display));
                    Ok(())
                }
                Format::Text => {
                    print_message_text(&view, &config);
                    Ok(())
                }
            }
        }
        Commands::Thread { thread_id, format } => {
            let thread = assembler.thread(&thread_id)?;
            match format {
                Format::Json => print_json(&thread),
                Format::Html => {
                    for view in &thread.messages {
                        println!("<article>\n{}\n</article>", body_html(view, &config.display));
                    }
                    Ok(())
                }
                Format::Text => {
                    println!();
                    println!(
                        "  Thread {}: {}",
                        thread.thread_id,
                        thread.subject.as_deref().unwrap_or("(no subject)")
                    );
                    for view in &thread.messages {
                        print_message_text(view, &config);
                    }
                    Ok(())
                }
            }
        }
        Commands::Parts { id } => {
            let view = assembler.message(&id)?;
            print_parts_table(&view);
            Ok(())
        }
        Commands::Part {
            id,
            ordinal,
            output,
        } => cmd_part(&assembler, &id, ordinal, output.as_deref()),
        Commands::Tag {
            target,
            changes,
            thread,
            json,
        } => cmd_tag(&index, target, &changes, thread, json.as_deref()),
        Commands::Tags => {
            for tag in assembler.all_tags()? {
                println!("{tag}");
            }
            Ok(())
        }
        Commands::Index { .. } | Commands::Completions { .. } | Commands::Manpage => Ok(()),
    }
}

/// Set up tracing with stderr output and file logging into the cache dir.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "tagview.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn mbox_path(cli_path: Option<&Path>, config: &Config) -> anyhow::Result<PathBuf> {
    let path = cli_path
        .map(Path::to_path_buf)
        .or_else(|| config.index.mbox.clone())
        .context("no mbox given: pass --mbox, set TAGVIEW_MBOX or index.mbox in the config")?;
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    Ok(path)
}

/// Open the mbox index, showing a progress bar while a build is running.
fn open_index(path: &Path, config: &Config, force: bool) -> anyhow::Result<MboxIndex> {
    let pb = ProgressBar::new(std::fs::metadata(path)?.len());
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} Indexing [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )?
            .progress_chars("#>-"),
    );
    let index = MboxIndex::open_with(
        path,
        &config.mbox_options(force),
        Some(&|current, total| {
            pb.set_length(total);
            pb.set_position(current);
        }),
    )?;
    pb.finish_and_clear();
    Ok(index)
}

fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "tagview", &mut std::io::stdout());
    Ok(())
}

fn cmd_manpage() -> anyhow::Result<()> {
    let man = clap_mangen::Man::new(Cli::command());
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::stdout().write_all(&buf)?;
    Ok(())
}

/// Index an mbox and print statistics.
fn cmd_index(path: &Path, config: &Config, force: bool) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};
    use tagview::index::{MailIndex, MessageHandle, ReadSession};

    let start = Instant::now();
    let index = open_index(path, config, force)?;
    let elapsed = start.elapsed();

    let session = index.open_read()?;
    let all = session.query("*")?;
    let threads: std::collections::BTreeSet<&str> = all.iter().map(|h| h.thread_id()).collect();
    let idx_size = std::fs::metadata(builder::index_path_for(path))
        .or_else(|_| {
            std::fs::metadata(builder::cache_index_path_for(
                path,
                Some(config::cache_dir(config).as_path()),
            ))
        })
        .map(|m| m.len())
        .unwrap_or(0);

    println!();
    println!("  {:<16} {}", "File", path.display());
    println!(
        "  {:<16} {}",
        "File size",
        format_size(std::fs::metadata(path)?.len(), BINARY)
    );
    println!("  {:<16} {}", "Messages", index.len());
    println!("  {:<16} {}", "Threads", threads.len());
    println!("  {:<16} {}", "Tags", session.all_tags()?.len());
    if idx_size > 0 {
        println!("  {:<16} {}", "Index size", format_size(idx_size, BINARY));
    }
    println!("  {:<16} {:.2?}", "Time", elapsed);
    println!();
    Ok(())
}

fn cmd_part(
    assembler: &MessageAssembler<'_, MboxIndex>,
    id: &str,
    ordinal: usize,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let part = assembler.part(id, ordinal)?;
    match output {
        Some(path) => {
            std::fs::write(path, &part.raw)
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!(
                "Wrote {} ({}) to {}",
                humansize::format_size(part.size(), humansize::BINARY),
                part.content_type,
                path.display()
            );
        }
        None => {
            tracing::info!(
                content_type = %part.content_type,
                disposition = part.content_disposition().as_deref().unwrap_or("-"),
                "Writing part to stdout"
            );
            std::io::stdout().write_all(&part.raw)?;
        }
    }
    Ok(())
}

fn cmd_tag(
    index: &MboxIndex,
    target: String,
    changes: &[String],
    thread: bool,
    json: Option<&str>,
) -> anyhow::Result<()> {
    let delta = match json {
        Some(body) => {
            serde_json::from_str::<TagRequest>(body)
                .context("invalid tag request JSON")?
                .tags
        }
        None => TagDelta::from_args(changes)
            .map_err(|arg| anyhow::anyhow!("expected +tag or -tag, got '{arg}'"))?,
    };
    if delta.is_empty() {
        anyhow::bail!("no tag changes given");
    }

    let target = if thread {
        TagTarget::Thread(target)
    } else {
        TagTarget::Message(target)
    };
    let touched = TagMutator::new(index).apply(&target, &delta)?;
    println!("Updated {touched} message(s)");
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_date(raw: Option<&str>, config: &Config) -> String {
    raw.map(|raw| match header::parse_date(raw) {
        Some(date) => date.format(&config.general.date_format).to_string(),
        None => raw.to_string(),
    })
    .unwrap_or_default()
}

fn print_summaries(
    summaries: &[MessageSummary],
    json: bool,
    config: &Config,
) -> anyhow::Result<()> {
    if json {
        let output = serde_json::json!({
            "result_count": summaries.len(),
            "results": summaries,
        });
        return print_json(&output);
    }

    println!();
    println!("  {} message(s)", summaries.len());
    println!();
    if summaries.is_empty() {
        return Ok(());
    }

    println!(
        "  {:<16} {:<17} {:<25} {:<40} {}",
        "Thread", "Date", "From", "Subject", "Tags"
    );
    println!("  {}", "-".repeat(110));
    for s in summaries {
        let tags: Vec<&str> = s.tags.iter().map(String::as_str).collect();
        println!(
            "  {:<16} {:<17} {} {} {}",
            s.thread_id,
            truncate_str(&format_date(s.headers.date.as_deref(), config), 17),
            pad(&truncate_str(s.headers.from.as_deref().unwrap_or(""), 25), 25),
            pad(&truncate_str(s.headers.subject.as_deref().unwrap_or(""), 40), 40),
            tags.join(",")
        );
    }
    println!();
    Ok(())
}

fn print_message_text(view: &MessageView, config: &Config) {
    println!();
    println!("  {:<9} {}", "Id", view.id);
    for (name, value) in [
        ("Date", &view.headers.date),
        ("From", &view.headers.from),
        ("To", &view.headers.to),
        ("Cc", &view.headers.cc),
        ("Subject", &view.headers.subject),
    ] {
        if let Some(value) = value {
            println!("  {name:<9} {value}");
        }
    }
    let tags: Vec<&str> = view.tags.iter().map(String::as_str).collect();
    println!("  {:<9} {}", "Tags", tags.join(", "));
    println!();

    match body_text(view, &config.display) {
        Some(text) => println!("{text}"),
        None if view.html.is_some() => println!("  (HTML only, use --format html)"),
        None => println!("  (no body)"),
    }

    let attachments = view.parts.iter().filter(|p| p.filename.is_some()).count();
    if attachments > 0 {
        println!();
        println!("  {attachments} attachment(s), see `tagview parts {}`", view.id);
    }
}

fn print_parts_table(view: &MessageView) {
    use humansize::{format_size, BINARY};

    println!();
    println!(
        "  {:<4} {:<30} {:<12} {:>10}  {}",
        "#", "Content-Type", "Charset", "Size", "Filename / Content-ID"
    );
    println!("  {}", "-".repeat(80));
    for part in &view.parts {
        println!(
            "  {:<4} {:<30} {:<12} {:>10}  {}",
            part.ordinal,
            truncate_str(&part.content_type, 30),
            part.charset.as_deref().unwrap_or("-"),
            format_size(part.size(), BINARY),
            part_label(part)
        );
    }
    println!();
}

/// Filename, else `cid:<id>` for inline parts referenced from HTML.
fn part_label(part: &MimePart) -> String {
    match (&part.filename, &part.content_id) {
        (Some(name), _) => name.clone(),
        (None, Some(cid)) => format!("cid:{cid}"),
        (None, None) => String::new(),
    }
}

/// Truncate to a display width, ending with "..." when cut.
fn truncate_str(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    if max_width <= 3 {
        return s.chars().take(max_width).collect();
    }
    let mut result = String::new();
    let mut width = 0;
    for ch in s.chars() {
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + ch_width + 3 > max_width {
            break;
        }
        result.push(ch);
        width += ch_width;
    }
    result.push_str("...");
    result
}

/// Pad to a display width; `format!` padding counts chars, not columns.
fn pad(s: &str, width: usize) -> String {
    let used = UnicodeWidthStr::width(s);
    format!("{s}{}", " ".repeat(width.saturating_sub(used)))
}
