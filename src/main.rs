//! Metrisk: metabolic risk assessment
//!
//! Main entry point for the command line application.

use anyhow::Result;
use std::io::{IsTerminal, Write};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use metrisk::adapters::sanitize::SanitizingMakeWriter;
use metrisk::application::AppContext;
use metrisk::cli::{self, Command};
use metrisk::config::AppConfig;

fn main() -> Result<()> {
    // Initialize logging.
    //
    // Command output goes to stdout. Default behavior:
    // - interactive TTY: log to a file
    // - non-interactive: log to stderr
    let log_mode = std::env::var("METRISK_LOG_MODE").unwrap_or_else(|_| "auto".to_string());

    let interactive = std::io::stdout().is_terminal();
    let mode = match log_mode.as_str() {
        "file" | "stdout" | "stderr" => log_mode.as_str(),
        // auto
        _ if interactive => "file",
        _ => "stderr",
    };

    let (writer, _guard) = match mode {
        "file" => {
            let log_file =
                std::env::var("METRISK_LOG_FILE").unwrap_or_else(|_| "metrisk.log".to_string());

            if let Some(parent) = std::path::Path::new(&log_file).parent() {
                // Best-effort: don't fail startup just because the directory is missing.
                let _ = std::fs::create_dir_all(parent);
            }

            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)?;
            tracing_appender::non_blocking(file)
        }
        "stdout" => tracing_appender::non_blocking(std::io::stdout()),
        _ => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(SanitizingMakeWriter::new(writer)))
        .init();

    let command = match cli::parse_args(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("error: {e}\n\n{}", cli::USAGE);
            std::process::exit(2);
        }
    };

    let mut stdout = std::io::stdout().lock();
    if command == Command::Help {
        writeln!(stdout, "{}", cli::USAGE)?;
        return Ok(());
    }

    tracing::info!("Starting Metrisk...");
    let config = AppConfig::from_env()?;
    let context = AppContext::build(config)?;

    let result = cli::run(&context, command, &mut stdout);
    if let Err(e) = context.shutdown() {
        tracing::error!("Failed to flush local store: {}", e);
    }

    tracing::info!("Metrisk shutdown complete.");
    result
}
