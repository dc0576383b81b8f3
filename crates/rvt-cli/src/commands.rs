use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use serde::Serialize;
use tracing::debug;

use rvt_core::{
    Change, ChangeKind, DiffView, DocId, EngineConfig, Interval, LineMatch, Match, Workspace,
};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Diff(args) => cmd_diff(&args, format),
        Command::History(args) => cmd_history(&args, format),
        Command::Config(args) => cmd_config(&args, format),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::load(path)?),
        None => Ok(EngineConfig::default()),
    }
}

fn read_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---- diff ----

#[derive(Debug, Serialize)]
struct DiffReport {
    old_len: usize,
    new_len: usize,
    degenerate: bool,
    matches: Vec<Match>,
    #[serde(skip_serializing_if = "Option::is_none")]
    changes: Option<Vec<Change>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lines: Option<Vec<LineMatch>>,
}

fn diff_files(args: &DiffArgs) -> anyhow::Result<DiffReport> {
    let ws = Workspace::new(load_config(args.config.as_deref())?);
    let old = read_file(&args.old)?;
    let new = read_file(&args.new)?;
    let left = ws.create_document("rvt", &args.old.display().to_string(), &old)?;
    let right = ws.create_document("rvt", &args.new.display().to_string(), &new)?;

    let mut view = DiffView::open(&ws, left, right)?;
    let changes = args.changes.then(|| view.changes().to_vec());
    let lines = if args.lines {
        Some(view.line_matches(&ws)?.to_vec())
    } else {
        None
    };
    Ok(DiffReport {
        old_len: old.len(),
        new_len: new.len(),
        degenerate: view.is_degenerate(),
        matches: view.matches().iter().copied().collect(),
        changes,
        lines,
    })
}

fn cmd_diff(args: &DiffArgs, format: OutputFormat) -> anyhow::Result<()> {
    let report = diff_files(args)?;
    if format == OutputFormat::Json {
        return print_json(&report);
    }

    let shared: usize = report.matches.iter().map(|m| m.len).sum();
    println!(
        "{} ({} bytes) -> {} ({} bytes): {} matches, {} bytes shared",
        args.old.display().to_string().bold(),
        report.old_len,
        args.new.display().to_string().bold(),
        report.new_len,
        report.matches.len(),
        shared
    );
    if report.degenerate {
        println!("{} inputs too large to compare; showing a full replace", "!".yellow().bold());
    }

    if let Some(changes) = &report.changes {
        for c in changes {
            match c.kind {
                ChangeKind::Deletion => println!(
                    "{} {}..{} (at {} in new)",
                    "-".red().bold(), c.start, c.end, c.rev_pos
                ),
                _ => println!(
                    "{} {}..{} (at {} in old)",
                    "+".green().bold(), c.start, c.end, c.rev_pos
                ),
            }
        }
    } else if let Some(lines) = &report.lines {
        for l in lines {
            println!(
                "{} {}",
                format!(
                    "@@ -{},{} +{},{} @@",
                    l.left_start + 1,
                    l.left_end - l.left_start,
                    l.right_start + 1,
                    l.right_end - l.right_start
                )
                .cyan(),
                format!("{} / {}", l.left_kind, l.right_kind).dimmed()
            );
        }
    } else {
        for m in &report.matches {
            println!("  {m}");
        }
    }
    Ok(())
}

// ---- history ----

#[derive(Debug, Serialize)]
struct HistoryEntry {
    version: DocId,
    parent: Option<usize>,
    range: Interval,
    text: String,
}

fn trace_history(args: &HistoryArgs) -> anyhow::Result<Vec<HistoryEntry>> {
    let ws = Workspace::new(load_config(args.config.as_deref())?);
    let (first, rest) = args.files.split_first().context("no files given")?;
    let draft = ws.create_draft("rvt", &read_file(first)?)?;
    for path in rest {
        ws.new_version(draft.document)?;
        let id = ws.apply_text(draft.document, &read_file(path)?)?;
        debug!(revision = %id, path = %path.display(), "loaded version");
    }

    let head = ws.draft_head(draft.document)?;
    let entries = ws.partial_diff(head, args.range)?;
    entries
        .into_iter()
        .map(|e| {
            let text = ws.text_part(e.version, e.range.start, e.range.end)?;
            Ok(HistoryEntry {
                version: e.version,
                parent: e.parent,
                range: e.range,
                text: String::from_utf8_lossy(&text).into_owned(),
            })
        })
        .collect()
}

fn cmd_history(args: &HistoryArgs, format: OutputFormat) -> anyhow::Result<()> {
    let entries = trace_history(args)?;
    if format == OutputFormat::Json {
        return print_json(&entries);
    }

    for (i, entry) in entries.iter().enumerate() {
        let file = args
            .files
            .get(entry.version.version as usize)
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        println!(
            "{} {} {}  {}",
            format!("#{i}").dimmed(),
            entry.version.to_string().yellow(),
            entry.range.to_string().bold(),
            file.dimmed()
        );
        if entry.range.is_empty() {
            println!("    {}", "(not present)".dimmed());
        } else {
            println!("    {:?}", entry.text);
        }
    }
    Ok(())
}

// ---- config ----

fn cmd_config(args: &ConfigArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(args.file.as_deref())?;
    match format {
        OutputFormat::Json => print_json(&config),
        OutputFormat::Text => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
