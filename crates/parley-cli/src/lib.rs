//! Command-line surface over the Parley domain registry.

pub mod cli_args;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use cli_args::{AddArgs, Cli, Command, ImportArgs, RefreshArgs, RemoveArgs};
use parley_core::{
    DomainRegistry, LoggingDestination, TrustPrompt, import_preset_organizations, init_logging,
};

/// Dispatch a parsed invocation.
pub async fn run(cli: Cli) -> Result<(), String> {
    let data_dir = resolve_data_dir(cli.data_dir);
    if let Err(err) = init_logging(&data_dir, LoggingDestination::FileOnly) {
        eprintln!("Warning: logging unavailable: {err}");
    }

    let registry = DomainRegistry::new(&data_dir).map_err(|err| err.to_string())?;
    for warning in registry.startup().map_err(|err| err.to_string())? {
        eprintln!("Warning: {warning}");
    }

    match cli.command {
        Command::List => handle_list(&registry),
        Command::Add(args) => handle_add(&registry, args).await,
        Command::Remove(args) => handle_remove(&registry, args),
        Command::Refresh(args) => handle_refresh(&registry, args).await,
        Command::Import(args) => handle_import(&registry, args).await,
        Command::Path => {
            println!("{}", registry.store_path().display());
            Ok(())
        }
    }
}

fn resolve_data_dir(overridden: Option<String>) -> PathBuf {
    overridden.map(PathBuf::from).unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("parley")
    })
}

fn handle_list(registry: &DomainRegistry) -> Result<(), String> {
    let domains = registry.list().map_err(|err| err.to_string())?;
    if domains.is_empty() {
        println!("No organizations connected.");
        return Ok(());
    }

    for (index, record) in domains.iter().enumerate() {
        let session = if record.logged_in {
            "signed in"
        } else {
            "signed out"
        };
        println!(
            "{index:>3}  {alias}  {url}  [{session}]",
            alias = record.alias,
            url = record.url
        );
    }
    Ok(())
}

async fn handle_add(registry: &DomainRegistry, args: AddArgs) -> Result<(), String> {
    if args.url.trim().is_empty() {
        return Err("A server URL is required.".to_string());
    }

    let record = if args.insecure {
        registry.check_domain(&args.url, true, false).await
    } else {
        registry
            .check_domain_interactive(&args.url, &StdinTrustPrompt)
            .await
    }
    .map_err(|err| err.to_string())?;

    let alias = record.alias.clone();
    let url = record.url.clone();
    registry.add(record).await.map_err(|err| err.to_string())?;
    println!("Connected to {alias} ({url})");
    Ok(())
}

fn handle_remove(registry: &DomainRegistry, args: RemoveArgs) -> Result<(), String> {
    let removed = registry.remove(args.index).map_err(|err| err.to_string())?;
    // Positions shift after a removal; any remembered tab index is stale.
    registry
        .set_last_active_tab(0)
        .map_err(|err| err.to_string())?;
    println!("Disconnected {} ({})", removed.alias, removed.url);
    Ok(())
}

async fn handle_refresh(registry: &DomainRegistry, args: RefreshArgs) -> Result<(), String> {
    let record = registry.get(args.index).map_err(|err| err.to_string())?;
    registry.refresh(&record.url, args.index).await;
    println!("Refreshed {} (best effort)", record.url);
    Ok(())
}

async fn handle_import(registry: &DomainRegistry, args: ImportArgs) -> Result<(), String> {
    let report = import_preset_organizations(registry, &args.urls)
        .await
        .map_err(|err| err.to_string())?;

    for url in &report.added {
        println!("Added {url}");
    }
    for url in &report.skipped {
        println!("Skipped {url} (already registered)");
    }

    match report.failure_summary() {
        Some(summary) => Err(summary),
        None => Ok(()),
    }
}

struct StdinTrustPrompt;

impl TrustPrompt for StdinTrustPrompt {
    fn confirm(&self, message: &str, detail: &str) -> bool {
        eprintln!("{message}");
        eprintln!("{detail}");
        eprint!("Connect anyway? [y/N] ");
        let _ = io::stderr().flush();

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim(), "y" | "Y" | "yes" | "Yes")
    }
}
