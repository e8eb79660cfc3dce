//! CLI entry point for `mailbounce`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailbounce::analyzer::verp;
use mailbounce::config::Config;
use mailbounce::deliverer::{DelivererConfig, DirectoryFetcher, Fetcher};
use mailbounce::mime::{self, MessageHeaders, MimeEntity};
use mailbounce::result::{BounceAnalyzerResult, DefaultAnalyzerResult, ProcessorResult};
use mailbounce::services::{
    JsonLinesEventSink, MemorySendStateStore, OutboxMailSender, SendStateStore, Services,
};
use mailbounce::MessageProcessor;

#[derive(Parser)]
#[command(
    name = "mailbounce",
    version,
    about = "Process incoming mail and classify bounces"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run messages through the analyzers and handlers
    Process {
        /// .eml files, or directories containing them
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
        /// Deliverer id attached to the messages
        #[arg(short, long)]
        deliverer: Option<String>,
        /// Append processing events as JSON lines to this file
        #[arg(long, value_name = "FILE")]
        events: Option<PathBuf>,
        /// Write outgoing mail (forwards) as .eml files into this directory
        #[arg(long, value_name = "DIR")]
        outbox: Option<PathBuf>,
        /// Address whose send state is tracked (repeatable)
        #[arg(long = "known", value_name = "ADDRESS")]
        known: Vec<String>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the MIME structure of a message
    Parse {
        file: PathBuf,
        /// Print the parsed entity as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the VERP return path for a recipient
    ReturnPath {
        recipient: String,
        /// Base return path; defaults to the configured site return path
        #[arg(long, value_name = "ADDRESS")]
        base: Option<String>,
        /// The message also has Cc or Bcc recipients
        #[arg(long)]
        cc: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = mailbounce::config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Process {
            paths,
            deliverer,
            events,
            outbox,
            known,
            json,
        } => {
            let options = ProcessOptions {
                deliverer: deliverer.unwrap_or_else(|| config.general.deliverer.clone()),
                events,
                outbox,
                known,
                json,
            };
            cmd_process(&config, &paths, &options)
        }
        Commands::Parse { file, json } => cmd_parse(&file, json),
        Commands::ReturnPath { recipient, base, cc } => {
            let base = base.unwrap_or_else(|| config.site.return_path.clone());
            cmd_return_path(&base, &recipient, cc)
        }
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Try to set up file logging
    let log_dir = mailbounce::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailbounce.log");
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

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailbounce", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

struct ProcessOptions {
    deliverer: String,
    events: Option<PathBuf>,
    outbox: Option<PathBuf>,
    known: Vec<String>,
    json: bool,
}

/// Where messages to process come from.
enum Source {
    File(PathBuf),
    Directory(DirectoryFetcher),
}

/// Process files and directories of messages and print the outcome.
fn cmd_process(config: &Config, paths: &[PathBuf], options: &ProcessOptions) -> anyhow::Result<()> {
    let deliverer = DelivererConfig::new(&options.deliverer);

    let states = Arc::new(MemorySendStateStore::new());
    for address in &options.known {
        states.register(address);
    }
    let mut services = Services::new(config.site.clone()).with_send_states(states.clone());
    if let Some(ref dir) = options.outbox {
        services = services.with_mail_sender(Arc::new(OutboxMailSender::new(dir)?));
    }
    if let Some(ref path) = options.events {
        services = services.with_events(Arc::new(JsonLinesEventSink::open(path)?));
    }
    let processor = MessageProcessor::new(config, services)?;

    let mut sources = Vec::new();
    let mut total = 0u64;
    for path in paths {
        if path.is_dir() {
            let mut fetcher = DirectoryFetcher::new(deliverer.clone(), path);
            fetcher.update()?;
            total += fetcher.count().unwrap_or(0) as u64;
            sources.push(Source::Directory(fetcher));
        } else if path.exists() {
            total += 1;
            sources.push(Source::File(path.clone()));
        } else {
            anyhow::bail!("File not found: {}", path.display());
        }
    }

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Processing [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let mut outcomes: Vec<(String, Option<ProcessorResult>)> = Vec::new();
    for source in &mut sources {
        match source {
            Source::File(path) => {
                let raw = std::fs::read(&*path)?;
                outcomes.push((path.display().to_string(), processor.process(&raw, &deliverer)));
                pb.inc(1);
            }
            Source::Directory(fetcher) => {
                let dir = fetcher.dir().display().to_string();
                let mut index = 0;
                loop {
                    let batch = fetcher.fetch()?;
                    if batch.is_empty() {
                        break;
                    }
                    for raw in batch {
                        index += 1;
                        let outcome = processor.process(&raw, &deliverer);
                        outcomes.push((format!("{dir}#{index}"), outcome));
                        pb.inc(1);
                    }
                }
            }
        }
    }
    pb.finish_and_clear();
    let elapsed = start.elapsed();

    if options.json {
        print_results_json(&outcomes, &options.known, &*states)?;
    } else {
        print_results_table(&outcomes, &options.known, &*states, elapsed);
    }
    Ok(())
}

/// Print one line per message, then the tracked send states.
fn print_results_table(
    outcomes: &[(String, Option<ProcessorResult>)],
    known: &[String],
    states: &dyn SendStateStore,
    elapsed: std::time::Duration,
) {
    println!();
    println!("  {:<40} {:<8} {:<30} {}", "Message", "Bounce", "Recipient", "Status");
    println!("  {}", "-".repeat(90));
    for (label, outcome) in outcomes {
        let Some(result) = outcome else {
            println!("  {:<40} {}", truncate(label, 40), "(unparseable)");
            continue;
        };
        let bounce = result.typed_result::<BounceAnalyzerResult>(BounceAnalyzerResult::TOPIC);
        let recipient = bounce.and_then(|b| b.recipient()).unwrap_or("-");
        let status = bounce
            .and_then(|b| b.status_code())
            .map(|code| match code.label() {
                Some(label) => format!("{code} {label}"),
                None => code.to_string(),
            })
            .or_else(|| {
                result
                    .typed_result::<DefaultAnalyzerResult>(DefaultAnalyzerResult::TOPIC)
                    .and_then(DefaultAnalyzerResult::sender)
                    .map(|sender| format!("from {sender}"))
            })
            .unwrap_or_else(|| "-".to_string());
        let is_bounce = bounce.is_some_and(BounceAnalyzerResult::is_bounce);
        println!(
            "  {:<40} {:<8} {:<30} {}",
            truncate(label, 40),
            if is_bounce { "yes" } else { "no" },
            truncate(recipient, 30),
            status
        );
        for (source, lines) in result.rendered_log() {
            for line in lines {
                println!("  {:<40} [{source}] {line}", "");
            }
        }
    }

    if !known.is_empty() {
        println!();
        println!("  Send states:");
        for address in known {
            let state = states
                .state(address)
                .ok()
                .flatten()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("    {address:<40} {state}");
        }
    }

    let failed = outcomes.iter().filter(|(_, o)| o.is_none()).count();
    println!();
    println!(
        "  {} message(s), {} unparseable, in {:.2?}",
        outcomes.len(),
        failed,
        elapsed
    );
    println!();
}

/// Print results as JSON.
fn print_results_json(
    outcomes: &[(String, Option<ProcessorResult>)],
    known: &[String],
    states: &dyn SendStateStore,
) -> anyhow::Result<()> {
    let messages: Vec<serde_json::Value> = outcomes
        .iter()
        .map(|(label, outcome)| match outcome {
            Some(result) => serde_json::json!({
                "message": label,
                "parsed": true,
                "bounce": result
                    .typed_result::<BounceAnalyzerResult>(BounceAnalyzerResult::TOPIC)
                    .is_some_and(BounceAnalyzerResult::is_bounce),
                "results": result.summaries(),
                "log": result.rendered_log(),
            }),
            None => serde_json::json!({
                "message": label,
                "parsed": false,
            }),
        })
        .collect();

    let mut send_states = serde_json::Map::new();
    for address in known {
        let state = states.state(address)?;
        send_states.insert(address.clone(), serde_json::to_value(state)?);
    }

    let output = serde_json::json!({
        "messages": messages,
        "send_states": send_states,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Show the MIME structure of a single message.
fn cmd_parse(path: &Path, json: bool) -> anyhow::Result<()> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    let message = mime::Parser::new().parse_file(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&message)?);
        return Ok(());
    }

    println!();
    println!("  {:<14} {}", "File:", path.display());
    println!("  {:<14} {}", "Message-Id:", message.message_id().unwrap_or("-"));
    println!("  {:<14} {}", "From:", message.from_field().unwrap_or("-"));
    println!("  {:<14} {}", "To:", message.to().unwrap_or("-"));
    println!("  {:<14} {}", "Subject:", message.subject().unwrap_or("-"));
    if let Some(date) = message.received_date() {
        println!("  {:<14} {}", "Received:", date.to_rfc2822());
    }
    println!();
    print_structure(&message, 1);

    if let Some(dsn) = message.as_dsn() {
        println!();
        println!("  Delivery status:");
        for (i, fields) in dsn.recipient_fields().enumerate() {
            println!(
                "    #{:<3} {:<40} {}",
                i + 1,
                fields.field_body("Final-Recipient").unwrap_or("-"),
                fields.field_body("Status").unwrap_or("-")
            );
        }
    }
    println!();
    Ok(())
}

fn print_structure(entity: &MimeEntity, depth: usize) {
    let indent = "  ".repeat(depth);
    println!(
        "{indent}{} {} ({} bytes)",
        entity.kind(),
        entity.content_type().mime_type(),
        entity.body().len()
    );
    if let Some(multipart) = entity.as_multipart() {
        for part in multipart.parts() {
            print_structure(part, depth + 1);
        }
    }
}

/// Print the VERP return path for mail to `recipient`.
fn cmd_return_path(base: &str, recipient: &str, cc: bool) -> anyhow::Result<()> {
    if base.is_empty() {
        anyhow::bail!("No return path configured; set [site] return_path or pass --base");
    }
    println!("{}", verp::return_path_for(base, recipient, cc)?);
    Ok(())
}

/// Shorten `s` to at most `max` characters.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}
