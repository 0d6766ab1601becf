//! AgentDNS - natural-language task router for MCP tool services.
//!
//! Reads requests line by line, routes each through AgentDNS to the matching
//! tool services and streams the explained results.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use crossterm::style::Stylize;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use agentdns::core::{BANNER, CONFIG_ENV};
use agentdns::{
    Config, ConsoleSink, HttpConnector, I18n, OpenAICompatibleGateway, Orchestrator, OutputSink,
};

/// Route natural-language requests to MCP tool services via AgentDNS
#[derive(Parser)]
#[command(name = "agentdns")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(short, long, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Do not print the startup banner
    #[arg(long)]
    no_banner: bool,
}

/// Inputs that end the session, compared case-insensitively.
const EXIT_WORDS: [&str; 3] = ["exit", "quit", "q"];

fn is_exit(input: &str) -> bool {
    EXIT_WORDS.iter().any(|word| input.eq_ignore_ascii_case(word))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Logs go to stderr; stdout is the conversation
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = Config::load(cli.config.as_deref())?;

    let i18n = I18n::new(config.locale());
    if !cli.no_banner {
        print_banner(&i18n);
    }

    let client = reqwest::Client::new();
    let gateway =
        Arc::new(OpenAICompatibleGateway::new(&config.completion).with_client(client.clone()));
    let connector = Arc::new(HttpConnector::with_client(client));
    let orchestrator = Orchestrator::from_config(&config, connector, gateway);

    run_repl(&orchestrator).await
}

fn print_banner(i18n: &I18n) {
    println!("{}", BANNER.cyan());
    println!("{}", i18n.t("banner.subtitle").dim());
    println!();
}

/// One line read from stdin, without its line ending.
type InputLine = Result<String, std::string::FromUtf8Error>;

/// Read stdin on a plain thread so a pending read never holds up shutdown.
fn spawn_line_reader() -> mpsc::UnboundedReceiver<InputLine> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let mut stdin = std::io::stdin().lock();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match stdin.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Reading stdin failed");
                    break;
                }
            }
            if tx.send(String::from_utf8(trim_line_ending(&buf).to_vec())).is_err() {
                break;
            }
        }
    });
    rx
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

async fn run_repl(orchestrator: &Orchestrator) -> Result<()> {
    let i18n = orchestrator.i18n();
    let mut sink = ConsoleSink::new();
    let mut lines = spawn_line_reader();

    loop {
        print!("{}", i18n.t("main.input_prompt"));
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.recv() => line,
            _ = tokio::signal::ctrl_c() => {
                println!();
                None
            }
        };

        let line = match line {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                tracing::debug!(error = %e, "Ignoring undecodable input line");
                sink.diagnostic(&i18n.t("diag.invalid_input"));
                continue;
            }
            // EOF or interrupt
            None => break,
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if is_exit(input) {
            break;
        }

        tokio::select! {
            result = orchestrator.handle_turn(input, &mut sink) => {
                if let Err(e) = result {
                    tracing::debug!(error = ?e, "Turn aborted");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    println!("{}", i18n.t("main.goodbye"));
    Ok(())
}
