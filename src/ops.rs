use anyhow::{Result, anyhow};
use colored::*;
use comfy_table::{Attribute, Cell, ContentArrangement, Table, presets::UTF8_FULL};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use datafresh::config::{self, DataFreshConfig, StorageKind};
use datafresh::{DataFresh, PreparedState, RefreshSummary, TransferReport};

pub fn do_init(
    target: String,
    storage: StorageKind,
    snapshot_root: Option<PathBuf>,
    workers: Option<usize>,
    batch_size: Option<usize>,
) -> Result<()> {
    let mut cfg = DataFreshConfig::new(target);
    cfg.storage = storage;
    cfg.snapshot_root = snapshot_root;
    cfg.workers = workers;
    if let Some(n) = batch_size {
        cfg.batch_size = n;
    }
    cfg.validate()?;

    let path = config::init_at(&std::env::current_dir()?, &cfg)?;
    println!(
        "{} {}",
        "✔".green().bold(),
        format!("Initialized {}", path.display()).green()
    );
    Ok(())
}

pub fn do_prepare(config_path: &Option<PathBuf>, verbose: bool, create_snapshot: bool) -> Result<()> {
    let fresh = open(config_path, verbose)?;
    let bar = create_progress_bar("Preparing database", verbose);

    fresh.prepare(create_snapshot)?;

    bar.finish_and_clear();
    let tables = fresh.catalog().list_all_base_tables()?;
    println!(
        "{} {}",
        "✔".green().bold(),
        format!(
            "Tracking {} table(s) in {} database '{}'",
            tables.len(),
            fresh.engine().name(),
            fresh.engine().database()
        )
        .green()
    );
    if create_snapshot {
        println!("{} {}", "✔".green().bold(), "Baseline captured".green());
    }
    Ok(())
}

pub fn do_snapshot(config_path: &Option<PathBuf>, verbose: bool) -> Result<()> {
    let fresh = open(config_path, verbose)?;
    let bar = create_progress_bar("Capturing baseline", verbose);

    let report = fresh.create_snapshot();
    bar.finish_and_clear();

    let report = report?;
    println!(
        "{} {}",
        "✔".green().bold(),
        format!("Baseline captured: {} table(s), {} row(s)", report.attempted(), report.total_rows()).green()
    );
    Ok(())
}

pub fn do_refresh(config_path: &Option<PathBuf>, verbose: bool, entire: bool) -> Result<()> {
    let fresh = open(config_path, verbose)?;
    let bar = create_progress_bar("Refreshing database", verbose);

    let summary = if entire { fresh.refresh_entire() } else { fresh.refresh() };
    bar.finish_and_clear();

    match summary {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(datafresh::Error::Transfer { failed, attempted, direction }) => {
            for (table, message) in &failed {
                eprintln!("{} {}: {}", "!".yellow().bold(), table.to_string().yellow(), message);
            }
            Err(anyhow!("{} incomplete: {} of {} table(s) failed", direction, failed.len(), attempted))
        }
        Err(err) => Err(err.into()),
    }
}

pub fn do_status(config_path: &Option<PathBuf>, verbose: bool) -> Result<()> {
    let fresh = open(config_path, verbose)?;

    if fresh.state()? == PreparedState::Unprepared {
        println!(
            "{} {}",
            "i".yellow().bold(),
            format!("'{}' is not prepared", fresh.engine().database()).yellow()
        );
        return Ok(());
    }

    if !fresh.has_database_been_modified()? {
        println!("{} {}", "✔".green().bold(), "Database matches baseline".green());
        return Ok(());
    }

    let changed = fresh.catalog().list_changed_tables()?;
    let bracket = fresh.catalog().list_changed_and_referenced_tables()?;
    println!("{} {}", "!".yellow().bold(), "Database modified".yellow());

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Table").add_attribute(Attribute::Bold),
            Cell::new("Action").add_attribute(Attribute::Bold),
        ]);
    for t in &bracket {
        let action = if changed.contains(t) { "reload" } else { "constraints only" };
        table.add_row(vec![Cell::new(t.to_string()), Cell::new(action)]);
    }
    println!("{}", table);
    Ok(())
}

pub fn do_tables(config_path: &Option<PathBuf>, verbose: bool) -> Result<()> {
    let fresh = open(config_path, verbose)?;
    let tables = fresh.catalog().list_all_base_tables()?;

    if tables.is_empty() {
        println!("{} {}", "i".yellow().bold(), "No base tables found".yellow());
        return Ok(());
    }

    let prepared = fresh.state()? == PreparedState::Prepared;
    let changed = if prepared { fresh.catalog().list_changed_tables()? } else { Vec::new() };

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Table").add_attribute(Attribute::Bold),
            Cell::new("Tracked").add_attribute(Attribute::Bold),
            Cell::new("Baseline").add_attribute(Attribute::Bold),
            Cell::new("Changed").add_attribute(Attribute::Bold),
        ]);

    for t in &tables {
        let tracked = fresh.tracking().hook_installed(t)?;
        let baseline = if fresh.store().entry_exists(t)? { fresh.store().location(t) } else { "-".into() };
        table.add_row(vec![
            Cell::new(t.to_string()),
            Cell::new(if tracked { "yes" } else { "no" }),
            Cell::new(baseline),
            Cell::new(if changed.contains(t) { "yes" } else { "no" }),
        ]);
    }

    println!("{}", table);
    Ok(())
}

pub fn do_teardown(config_path: &Option<PathBuf>, verbose: bool, yes: bool) -> Result<()> {
    let fresh = open(config_path, verbose)?;
    let db = fresh.engine().database();

    if !yes && !prompt_confirm(&format!("Remove tracking and baselines from '{}'? [y/N] ", db))? {
        println!("Aborted.");
        return Ok(());
    }

    let bar = create_progress_bar("Tearing down", verbose);
    fresh.teardown()?;
    bar.finish_and_clear();

    println!(
        "{} {}",
        "✔".green().bold(),
        format!("Removed datafresh objects from '{}'", db).green()
    );
    Ok(())
}

pub fn do_version() {
    println!("{} {}", "datafresh".bold(), env!("CARGO_PKG_VERSION").cyan());
}

fn open(config_path: &Option<PathBuf>, verbose: bool) -> Result<DataFresh> {
    let path = match config_path {
        Some(p) => p.clone(),
        None => config::find_config(&std::env::current_dir()?)?,
    };
    let mut cfg = config::load_config(&path)?;
    cfg.verbose |= verbose;
    Ok(DataFresh::open(cfg)?)
}

fn print_summary(summary: &RefreshSummary) {
    let report: &TransferReport = &summary.reloaded;
    if report.attempted() == 0 {
        println!("{} {}", "✔".green().bold(), "Nothing to refresh".green());
        return;
    }
    for outcome in &report.outcomes {
        if let Ok(rows) = &outcome.result {
            println!("  {} {} ({} rows)", "↺".cyan(), outcome.table, rows);
        }
    }
    println!(
        "{} {}",
        "✔".green().bold(),
        format!(
            "Refreshed {} table(s), {} with constraints suspended, in {:.2?}",
            report.attempted(),
            summary.bracketed.len(),
            summary.elapsed
        )
        .green()
    );
}

fn create_progress_bar(prefix: &str, verbose: bool) -> ProgressBar {
    // Verbose runs draw their own transfer bar and log lines.
    if verbose {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "),
    );
    bar.set_message(prefix.to_string());
    bar.enable_steady_tick(std::time::Duration::from_millis(80));
    bar
}

fn prompt_confirm(message: &str) -> Result<bool> {
    use std::io::{self, Write};
    print!("{} {}", "?".cyan().bold(), message.cyan());
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let ans = input.trim().to_lowercase();
    Ok(ans == "y" || ans == "yes")
}
