//! Research CLI - Run a deep-research prompt from the terminal
//!
//! Usage:
//!   research <PROMPT> [--url <url>] [--pdf <file>] [--verbose]
//!
//! Example:
//!   research "impact of tariffs on semiconductor supply chains"
//!   research "state of solid-state batteries" --pdf batteries.pdf

use anyhow::{Context, Result};
use colored::Colorize;
use deep_research::client::{ClientConfig, ResearchBackend, ResearchClient};
use deep_research::export::Exporter;
use deep_research::markdown::Renderer;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const DEFAULT_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

fn print_usage() {
    eprintln!(
        r#"
{} - Run a deep-research prompt from the terminal

{}
    research <PROMPT> [OPTIONS]

{}
    <PROMPT>    Research topic, free text

{}
    -u, --url <URL>        Research service base URL
                           (default: CORE_API_URL env var, else {})
    -t, --timeout <SECS>   Request timeout in seconds (default: {})
    --pdf <FILE>           Also export the result as a PDF file
    -v, --verbose          Show request logging
    -h, --help             Print this help message

{}
    research "impact of tariffs on semiconductor supply chains"
    research "current state of solid-state batteries" --pdf batteries.pdf
"#,
        "Research CLI".bold(),
        "USAGE:".bold(),
        "ARGS:".bold(),
        "OPTIONS:".bold(),
        DEFAULT_URL,
        DEFAULT_TIMEOUT_SECS,
        "EXAMPLES:".bold(),
    );
}

struct CliArgs {
    prompt: String,
    url: String,
    timeout_secs: u64,
    pdf: Option<PathBuf>,
    verbose: bool,
}

fn parse_args() -> Result<CliArgs> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        std::process::exit(if args.iter().any(|a| a == "--help" || a == "-h") {
            0
        } else {
            1
        });
    }

    let prompt = args[1].clone();
    let mut url = std::env::var("CORE_API_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let mut timeout_secs = DEFAULT_TIMEOUT_SECS;
    let mut pdf = None;
    let mut verbose = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "-u" | "--url" => {
                i += 1;
                url = args
                    .get(i)
                    .context("--url requires a value")?
                    .clone();
            }
            "-t" | "--timeout" => {
                i += 1;
                timeout_secs = args
                    .get(i)
                    .context("--timeout requires a value")?
                    .parse()
                    .context("--timeout must be a number of seconds")?;
            }
            "--pdf" => {
                i += 1;
                pdf = Some(PathBuf::from(
                    args.get(i).context("--pdf requires a file path")?,
                ));
            }
            "-v" | "--verbose" => verbose = true,
            other => anyhow::bail!("Unknown option: {}", other),
        }
        i += 1;
    }

    Ok(CliArgs {
        prompt,
        url,
        timeout_secs,
        pdf,
        verbose,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose {
            Level::DEBUG
        } else {
            Level::WARN
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.prompt.trim().is_empty() {
        anyhow::bail!("Prompt must not be empty");
    }

    let client = ResearchClient::new(
        ClientConfig::new(args.url.as_str())
            .with_timeout(Duration::from_secs(args.timeout_secs)),
    );

    eprintln!("{}", "Generating...".dimmed());
    let result = client
        .fetch_research(&args.prompt)
        .await
        .context("Research request failed")?;

    println!("{}", "Research Summary".bold());
    println!("{}\n", result.summary);

    println!("{}", "Detailed Report".bold());
    println!("{}\n", result.report);

    if !result.follow_up_questions.is_empty() {
        println!("{}", "Follow-up Questions".bold());
        for (i, question) in result.follow_up_questions.iter().enumerate() {
            println!("{}. {}", i + 1, question);
        }
        println!();
    }

    let trace_line = format!("Trace ID: {}", result.trace_id);
    println!("{}", trace_line.as_str().dimmed());

    if let Some(path) = args.pdf {
        let renderer = Renderer::default();
        let exporter = Exporter::new(Duration::from_secs(30));
        let bytes = exporter
            .export(&result, &renderer)
            .await
            .context("PDF export failed")?;
        std::fs::write(&path, &bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        let saved = format!("Saved PDF to {}", path.display());
        println!("{}", saved.as_str().green());
    }

    Ok(())
}
