use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};

use crate::config;
use crate::model::fetch_params::FetchParams;
use crate::providers;
use crate::services::openai;
use crate::store::DataStore;
use crate::summarize::Summarizer;
use crate::sync;
use crate::util;

/// Guided setup for data sources and service integrations.
///
/// With provider names as arguments (`connect jira linear`), sets up exactly
/// those; without arguments, offers every registered provider in turn.
pub async fn handle_connect(args: &[String]) -> Result<()> {
    let mut config = config::load_config()?;

    if !args.is_empty() {
        for name in args {
            let mut provider = providers::get_provider(name, &config)?;
            println!("Setting up {}...", provider.name());
            provider.setup(&mut config).await?;
        }
        config::save_config(&config)?;
        println!("\nSetup complete!");
        return Ok(());
    }

    println!("Setting up data sources...");
    for mut provider in providers::all_providers(&config) {
        if util::confirm(&format!("Connect {}?", provider.name()), false)? {
            provider.setup(&mut config).await?;
        }
    }

    println!("\nSetting up service integrations...");
    if util::confirm("Configure OpenAI (used for report generation)?", false)? {
        openai::setup(&mut config).await?;
    }

    config::save_config(&config)?;
    println!("\nSetup complete!");
    Ok(())
}

/// `sync [--start-date Y-M-D] [--end-date Y-M-D] [--user EMAIL]`
pub async fn handle_sync(args: &[String]) -> Result<()> {
    let (start_date, end_date, user) = parse_sync_args(args)?;

    let today = Local::now().date_naive();
    let start_date = start_date.unwrap_or_else(|| today - chrono::Duration::days(365));
    let end_date = end_date.unwrap_or(today);
    let params = FetchParams::new(start_date, end_date, user)?;

    let config = config::load_config()?;
    let candidates = providers::all_providers(&config);
    let authenticated = sync::authenticated_providers(candidates).await;
    if authenticated.is_empty() {
        eprintln!("No authenticated integrations found. Please run 'connect' first.");
        return Ok(());
    }

    let names: Vec<_> = authenticated.iter().map(|p| p.name()).collect();
    let user_msg = match &params.user_filter {
        Some(user) => format!(" for user: {user}"),
        None => " (authenticated user)".to_string(),
    };
    println!(
        "Starting synchronization for data sources: {}{user_msg}",
        names.join(", ")
    );

    let store = DataStore::new();
    let outcomes = sync::sync_all(&authenticated, &params, &store).await;
    for outcome in &outcomes {
        if outcome.success {
            println!(
                "Data sync from {} complete! Saved {} work items.",
                outcome.provider_name, outcome.count
            );
        } else {
            eprintln!(
                "Error syncing data from {}: {}",
                outcome.provider_name,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
            if outcome.count > 0 {
                eprintln!(
                    "  {} work item(s) were saved before the failure.",
                    outcome.count
                );
            }
        }
    }
    println!("All data sources have been synchronized.");
    Ok(())
}

fn parse_sync_args(
    args: &[String],
) -> Result<(Option<NaiveDate>, Option<NaiveDate>, Option<String>)> {
    let mut start_date = None;
    let mut end_date = None;
    let mut user = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--start-date" => start_date = Some(parse_date(&mut iter, "--start-date")?),
            "--end-date" => end_date = Some(parse_date(&mut iter, "--end-date")?),
            "--user" => {
                user = Some(
                    iter.next()
                        .context("--user requires an email/identifier")?
                        .clone(),
                )
            }
            other => bail!("Unknown sync option: {other}"),
        }
    }
    Ok((start_date, end_date, user))
}

fn parse_date<'a>(
    iter: &mut impl Iterator<Item = &'a String>,
    flag: &str,
) -> Result<NaiveDate> {
    let value = iter.next().with_context(|| format!("{flag} requires a date"))?;
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("{flag}: expected YYYY-MM-DD, got '{value}'"))
}

/// Generate the markdown activity report from previously synced data.
pub async fn handle_report() -> Result<()> {
    let config = config::load_config()?;
    let Some(openai_config) = config.openai.filter(|c| !c.api_key.is_empty()) else {
        eprintln!("OpenAI is not configured. Please run 'connect' first.");
        return Ok(());
    };

    let store = DataStore::new();
    let by_provider = store.get_all_data()?;
    if by_provider.is_empty() {
        eprintln!("No work items found. Please run 'sync' first.");
        return Ok(());
    }

    let all_items: Vec<_> = by_provider.values().flatten().cloned().collect();
    println!(
        "Found {} work items across {} provider(s).",
        all_items.len(),
        by_provider.len()
    );

    let summarizer = Summarizer::new(&openai_config);
    let summaries = summarizer.summarize_work_items(&all_items).await?;

    println!("Generating overall summary...");
    summarizer.generate_overall_summary(&summaries).await?;
    println!(
        "Report generation complete. Summary saved to {}",
        summarizer.markdown_path().display()
    );
    Ok(())
}

/// Print the config file with credential values redacted.
pub fn handle_config() -> Result<()> {
    let path = config::config_path();
    if !path.exists() {
        eprintln!("No configuration file found. Please run 'connect' first.");
        return Ok(());
    }
    println!("Configuration file: {}\n", path.display());
    let contents = std::fs::read_to_string(&path)?;
    for line in contents.lines() {
        println!("{}", redact_config_line(line));
    }
    Ok(())
}

const SENSITIVE_KEYS: [&str; 3] = ["key", "token", "password"];

fn redact_value(value: &str) -> String {
    // Counted in characters, not bytes: credentials pasted from password
    // managers are occasionally non-ASCII.
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}

fn redact_config_line(line: &str) -> String {
    let Some((key, value)) = line.split_once('=') else {
        return line.to_string();
    };
    let key_name = key.trim().to_ascii_lowercase();
    if !SENSITIVE_KEYS.iter().any(|s| key_name.contains(s)) {
        return line.to_string();
    }
    let raw = value.trim().trim_matches('"');
    if raw.is_empty() {
        return line.to_string();
    }
    format!("{key}= \"{}\"", redact_value(raw))
}

/// Delete synced data, summaries, and the generated report.
pub fn handle_clean(args: &[String]) -> Result<()> {
    let skip_confirm = args.iter().any(|a| a == "--confirm");

    let dir = config::data_dir();
    let candidates = [
        dir.join("whatdidido.json"),
        dir.join("whatdidido.json.lock"),
        dir.join("whatdidido-summary.json"),
        dir.join("whatdidido.md"),
    ];
    let existing: Vec<_> = candidates.iter().filter(|p| p.exists()).collect();
    if existing.is_empty() {
        println!("No whatdidido data files found to clean up.");
        return Ok(());
    }

    println!("The following files will be deleted:");
    for path in &existing {
        println!("  - {}", path.display());
    }
    if !skip_confirm && !util::confirm("Are you sure you want to delete these files?", false)? {
        println!("Cleanup cancelled.");
        return Ok(());
    }

    for path in existing {
        match std::fs::remove_file(path) {
            Ok(()) => println!("Deleted: {}", path.display()),
            Err(e) => eprintln!("Error deleting {}: {e}", path.display()),
        }
    }
    println!("Cleanup complete!");
    Ok(())
}

/// Remove stored credentials for data sources and services.
pub fn handle_disconnect(args: &[String]) -> Result<()> {
    let skip_confirm = args.iter().any(|a| a == "--confirm");

    let mut config = config::load_config()?;
    let configured: Vec<String> = providers::all_providers(&config)
        .iter()
        .filter(|p| p.is_configured())
        .map(|p| p.name().to_string())
        .collect();
    let openai_configured = openai::is_configured(&config);

    if configured.is_empty() && !openai_configured {
        println!("No configured integrations found to disconnect.");
        return Ok(());
    }

    println!("The following integrations will be disconnected:");
    for name in &configured {
        println!("  - {name} data source");
    }
    if openai_configured {
        println!("  - OpenAI service");
    }
    if !skip_confirm
        && !util::confirm(
            "Disconnect these integrations? This removes all stored credentials.",
            false,
        )?
    {
        println!("Disconnect cancelled.");
        return Ok(());
    }

    let mut count = 0;
    for provider in providers::all_providers(&config) {
        if provider.is_configured() {
            provider.disconnect(&mut config)?;
            println!("Disconnected: {}", provider.name());
            count += 1;
        }
    }
    if openai_configured {
        openai::disconnect(&mut config);
        println!("Disconnected: OpenAI");
        count += 1;
    }
    config::save_config(&config)?;

    println!("Disconnect complete! Removed {count} integration(s).");
    println!("Run 'connect' to reconnect any integrations.");
    Ok(())
}

pub fn print_usage() {
    println!("whatdidido - track your work across Jira and Linear");
    println!();
    println!("Usage: whatdidido <command> [options]");
    println!();
    println!("Commands:");
    println!("  connect [PROVIDER...] Set up data source and service integrations");
    println!("  sync                  Sync work items from configured sources");
    println!("      --start-date Y-M-D    Start of the sync window (default: 1 year ago)");
    println!("      --end-date Y-M-D      End of the sync window (default: today)");
    println!("      --user EMAIL          Sync for this user (default: authenticated user)");
    println!("  report                Generate an AI summary of synced work items");
    println!("  config                Show current configuration (credentials redacted)");
    println!("  clean [--confirm]     Delete synced data and generated reports");
    println!("  disconnect [--confirm]  Remove stored credentials");
}
