//! Command line front end for the `metrisk` binary.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;

use crate::application::{export, AppContext, Listing, RecommendationSource, Submission};
use crate::domain::advice::plain_text;
use crate::domain::gauge::{GaugeScale, BMI_GAUGE, TG_HDL_GAUGE, TYG_GAUGE};
use crate::domain::{PatientInput, PatientRecord};

pub const USAGE: &str = "\
Usage: metrisk <command> [options]

Commands:
  assess   Assess a patient and print metrics, risk and recommendations
           --name <text> --age <years> --gender <text> --weight <kg>
           --height <m> --glucose <mg/dL> --triglycerides <mg/dL>
           --hdl <mg/dL> --hba1c <%> --diabetes <status> [--save]
  list     List saved records, newest first [--search <text>]
  export   Write saved records as CSV --out <file> [--search <text>]
  sync     Push locally held records to the configured backend [--sequential]
  ping     Check that the spreadsheet endpoint answers
  help     Show this message

Configuration is read from METRISK_* environment variables.";

/// Argument errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CliError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("{flag} must be a number, got {value:?}")]
    InvalidNumber { flag: String, value: String },

    #[error("{0} is required")]
    MissingFlag(&'static str),
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Assess { input: PatientInput, save: bool },
    List { search: Option<String> },
    Export { out: PathBuf, search: Option<String> },
    Sync { sequential: bool },
    Ping,
    Help,
}

fn value<I: Iterator<Item = String>>(args: &mut I, flag: &str) -> Result<String, CliError> {
    args.next().ok_or_else(|| CliError::MissingValue(flag.to_string()))
}

fn number<T: std::str::FromStr>(flag: &str, raw: &str) -> Result<T, CliError> {
    raw.trim().parse::<T>().map_err(|_| CliError::InvalidNumber {
        flag: flag.to_string(),
        value: raw.to_string(),
    })
}

fn parse_assess<I: Iterator<Item = String>>(mut args: I) -> Result<Command, CliError> {
    let mut input = PatientInput {
        full_name: String::new(),
        age: 0,
        gender: String::new(),
        weight: f64::NAN,
        height: f64::NAN,
        glucose: f64::NAN,
        triglycerides: f64::NAN,
        hdl: f64::NAN,
        hba1c: f64::NAN,
        diabetes_status: String::new(),
    };
    let mut age = None;
    let mut hba1c = None;
    let mut save = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--name" => input.full_name = value(&mut args, &arg)?,
            "--age" => age = Some(number(&arg, &value(&mut args, &arg)?)?),
            "--gender" => input.gender = value(&mut args, &arg)?,
            "--weight" => input.weight = number(&arg, &value(&mut args, &arg)?)?,
            "--height" => input.height = number(&arg, &value(&mut args, &arg)?)?,
            "--glucose" => input.glucose = number(&arg, &value(&mut args, &arg)?)?,
            "--triglycerides" => input.triglycerides = number(&arg, &value(&mut args, &arg)?)?,
            "--hdl" => input.hdl = number(&arg, &value(&mut args, &arg)?)?,
            "--hba1c" => hba1c = Some(number(&arg, &value(&mut args, &arg)?)?),
            "--diabetes" => input.diabetes_status = value(&mut args, &arg)?,
            "--save" => save = true,
            _ => return Err(CliError::UnexpectedArgument(arg)),
        }
    }

    input.age = age.ok_or(CliError::MissingFlag("--age"))?;
    input.hba1c = hba1c.ok_or(CliError::MissingFlag("--hba1c"))?;
    Ok(Command::Assess { input, save })
}

/// Parse arguments (without the program name).
///
/// # Errors
/// Returns `CliError` for unknown commands, unknown flags or bad values.
pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Command, CliError> {
    let mut args = args.into_iter();
    let Some(command) = args.next() else {
        return Ok(Command::Help);
    };

    match command.as_str() {
        "assess" => parse_assess(args),
        "list" | "export" => {
            let mut search = None;
            let mut out = None;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--search" => search = Some(value(&mut args, &arg)?),
                    "--out" if command == "export" => out = Some(PathBuf::from(value(&mut args, &arg)?)),
                    _ => return Err(CliError::UnexpectedArgument(arg)),
                }
            }
            if command == "list" {
                Ok(Command::List { search })
            } else {
                let out = out.ok_or(CliError::MissingFlag("--out"))?;
                Ok(Command::Export { out, search })
            }
        }
        "sync" => {
            let mut sequential = false;
            for arg in args {
                match arg.as_str() {
                    "--sequential" => sequential = true,
                    _ => return Err(CliError::UnexpectedArgument(arg)),
                }
            }
            Ok(Command::Sync { sequential })
        }
        "ping" => match args.next() {
            Some(arg) => Err(CliError::UnexpectedArgument(arg)),
            None => Ok(Command::Ping),
        },
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => Err(CliError::UnknownCommand(other.to_string())),
    }
}

fn gauge_line(scale: &GaugeScale, value: f64) -> String {
    const WIDTH: usize = 30;
    let reading = scale.read(value);
    let needle = ((reading.fraction * WIDTH as f64).round() as usize).min(WIDTH);
    let bar: String = (0..=WIDTH).map(|i| if i == needle { '|' } else { '-' }).collect();
    format!("{:<13} {:>6} [{}] {}", scale.name, value, bar, reading.band.label)
}

fn print_submission(out: &mut dyn Write, submission: &Submission) -> anyhow::Result<()> {
    let Submission {
        assessment,
        recommendation,
        record,
        saved,
    } = submission;

    writeln!(out, "Patient: {} ({}, {})", record.full_name, assessment.input.age, record.gender)?;
    writeln!(out, "{}", gauge_line(&BMI_GAUGE, assessment.metrics.bmi))?;
    writeln!(out, "{}", gauge_line(&TYG_GAUGE, assessment.metrics.tyg_index))?;
    writeln!(out, "{}", gauge_line(&TG_HDL_GAUGE, assessment.metrics.tg_hdl_ratio))?;
    writeln!(out, "Risk: {} - {}", assessment.risk.label(), assessment.risk.description())?;
    writeln!(out)?;

    let source = match &recommendation.source {
        RecommendationSource::Advisor(name) => name.as_str(),
        RecommendationSource::RuleBased => "rule-based",
        RecommendationSource::Placeholder => "unavailable",
    };
    writeln!(out, "Recommendations ({source}):")?;
    writeln!(out, "{}", plain_text(&recommendation.html))?;
    if let Some(error) = &recommendation.error {
        writeln!(out, "warning: {error}")?;
    }

    if let Some(outcome) = saved {
        writeln!(out)?;
        writeln!(out, "Saved record {} to {}", outcome.receipt.id, outcome.receipt.backend)?;
        for warning in &outcome.warnings {
            writeln!(out, "warning: {warning}")?;
        }
    }
    Ok(())
}

fn print_listing(out: &mut dyn Write, listing: &Listing) -> anyhow::Result<()> {
    for warning in &listing.warnings {
        writeln!(out, "warning: {warning}")?;
    }
    if listing.records.is_empty() {
        writeln!(out, "No records found in {}", listing.source)?;
        return Ok(());
    }

    let show = |n: Option<f64>| n.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());
    writeln!(
        out,
        "{:<14} {:<24} {:>4} {:>6} {:>6} {:>7} {:<14} {}",
        "ID", "Name", "Age", "BMI", "TyG", "TG/HDL", "Risk", "Created"
    )?;
    for r in &listing.records {
        writeln!(
            out,
            "{:<14} {:<24} {:>4} {:>6} {:>6} {:>7} {:<14} {}",
            r.id,
            r.full_name,
            r.age.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string()),
            show(r.bmi),
            show(r.tyg_index),
            show(r.tg_hdl_ratio),
            r.risk_level,
            r.created_at.format("%Y-%m-%d %H:%M")
        )?;
    }
    writeln!(out, "{} record(s) from {}", listing.records.len(), listing.source)?;
    Ok(())
}

fn listing(ctx: &AppContext, search: Option<&str>) -> anyhow::Result<Listing> {
    let listing = match search {
        Some(query) => ctx.records().search(query)?,
        None => ctx.records().list()?,
    };
    Ok(listing)
}

/// Execute a command, writing user-facing output to `out`.
///
/// # Errors
/// Returns an error when the command cannot complete.
pub fn run(ctx: &AppContext, command: Command, out: &mut dyn Write) -> anyhow::Result<()> {
    match command {
        Command::Assess { input, save } => {
            let submission = if save {
                ctx.submit(input)?
            } else {
                ctx.evaluate(input)?
            };
            print_submission(out, &submission)?;
        }
        Command::List { search } => {
            print_listing(out, &listing(ctx, search.as_deref())?)?;
        }
        Command::Export { out: path, search } => {
            let listing = listing(ctx, search.as_deref())?;
            let records: &[PatientRecord] = &listing.records;
            export::write_csv(&path, records)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            for warning in &listing.warnings {
                writeln!(out, "warning: {warning}")?;
            }
            writeln!(out, "Exported {} record(s) to {}", records.len(), path.display())?;
        }
        Command::Sync { sequential } => match ctx.sync(sequential)? {
            None => writeln!(out, "Nothing to sync: the local store is the primary backend")?,
            Some(report) => {
                writeln!(
                    out,
                    "Synced {} record(s) from {} to {} ({} already present{})",
                    report.report.saved,
                    report.source,
                    report.target,
                    report.skipped,
                    if report.sequential { ", one at a time" } else { "" }
                )?;
                for failure in &report.report.failures {
                    writeln!(out, "failed: {} - {}", failure.id, failure.message)?;
                }
            }
        },
        Command::Ping => {
            let sheet = ctx
                .spreadsheet()
                .context("No spreadsheet endpoint configured (set METRISK_SHEETS_URL)")?;
            let reply = sheet.ping()?;
            writeln!(out, "{}: {}", sheet.url(), reply.trim())?;
        }
        Command::Help => writeln!(out, "{USAGE}")?,
    }
    Ok(())
}
