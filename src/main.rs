use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::collections::BTreeSet;
use tracing_subscriber::EnvFilter;

mod auth;
mod catalog;
mod cli;
mod codec;
mod config;
mod error;
mod http;
mod report;
mod scenarios;
mod session;
#[cfg(test)]
mod testing;
mod todo;
mod util;

use cli::{CatalogArgs, Command, InitArgs, ProgressArgs, RootArgs, RunArgs};
use config::ConfigOverrides;
use http::UreqTransport;
use report::EXIT_HARNESS;
use scenarios::RunOptions;
use session::{ProgressSnapshot, ProgressSource, Session, SessionClient};

fn main() {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    let code = match dispatch(args.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            EXIT_HARNESS
        }
    };
    std::process::exit(code);
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn dispatch(command: Command) -> Result<i32> {
    match command {
        Command::Run(args) => cmd_run(args),
        Command::Catalog(args) => cmd_catalog(args),
        Command::Progress(args) => cmd_progress(args),
        Command::Init(args) => cmd_init(args),
    }
}

fn cmd_run(args: RunArgs) -> Result<i32> {
    let overrides = ConfigOverrides {
        base_url: args.base_url,
        timeout_seconds: args.timeout_seconds,
        skip_reconcile: args.skip_reconcile,
    };
    let config = config::resolve_config(args.config.as_deref(), &overrides)?;
    let base_url = config.base_url()?;
    let transport = UreqTransport::new(base_url.clone(), config.timeout());

    let only = (!args.only.is_empty()).then(|| args.only.iter().copied().collect::<BTreeSet<u8>>());
    let options = RunOptions {
        only,
        credentials: config.credentials(),
        reconcile: config.reconcile,
        expected_challenges: config.expected_challenges,
        base_url: base_url.to_string(),
    };
    let report = scenarios::run_scenarios(&transport, &options)?;

    if let Some(out) = &args.out {
        report::write_report(out, &report)?;
    }
    if args.json {
        let text = serde_json::to_string_pretty(&report).context("serialize run report")?;
        println!("{text}");
    } else {
        print!("{}", report.render_text());
    }
    Ok(report.exit_code())
}

fn cmd_catalog(args: CatalogArgs) -> Result<i32> {
    if args.json {
        let text = serde_json::to_string_pretty(catalog::CHALLENGES.as_slice())
            .context("serialize catalog")?;
        println!("{text}");
        return Ok(0);
    }
    let mut section = None;
    for challenge in &catalog::CHALLENGES {
        if section != Some(challenge.section) {
            section = Some(challenge.section);
            println!("{}", challenge.section.title());
        }
        println!("  {:>2} {}", challenge.id, challenge.name);
    }
    Ok(0)
}

fn cmd_progress(args: ProgressArgs) -> Result<i32> {
    let overrides = ConfigOverrides {
        base_url: args.base_url,
        ..Default::default()
    };
    let config = config::resolve_config(args.config.as_deref(), &overrides)?;
    let transport = UreqTransport::new(config.base_url()?, config.timeout());
    let client = SessionClient::new(&transport, Session::existing(args.session.trim()));

    if args.database {
        let (response, document) = client.fetch_stored()?;
        let document = document.ok_or_else(|| {
            anyhow!("stored progress unavailable (status {})", response.status)
        })?;
        if args.json {
            let text = serde_json::to_string_pretty(&document).context("serialize document")?;
            println!("{text}");
        } else {
            let todos = todo::todos_from_document(&document).context("parse stored todos")?;
            println!("session {}: {} stored todos", args.session, todos.len());
            for todo in todos {
                let done = if todo.done_status { "x" } else { " " };
                println!("  [{done}] {:>4} {}", todo.id, todo.title);
            }
        }
        return Ok(0);
    }

    let (response, snapshot) = client.fetch_progress(ProgressSource::Live)?;
    let snapshot = snapshot
        .ok_or_else(|| anyhow!("progress unavailable (status {})", response.status))?;
    if args.json {
        let text = serde_json::to_string_pretty(&snapshot.to_value()?)
            .context("serialize progress snapshot")?;
        println!("{text}");
    } else {
        print_progress(&args.session, &snapshot);
    }
    Ok(0)
}

fn print_progress(session: &str, snapshot: &ProgressSnapshot) {
    println!(
        "session {session}: {}/{} challenges completed",
        snapshot.completed(),
        snapshot.entries()
    );
    for challenge in &catalog::CHALLENGES {
        let done = if snapshot.is_completed(challenge.key) { "x" } else { " " };
        println!("  [{done}] {:>2} {}", challenge.id, challenge.name);
    }
    for (key, done) in &snapshot.challenge_status {
        if catalog::by_key(key).is_none() {
            let done = if *done { "x" } else { " " };
            println!("  [{done}] ?? {key} (not in the declared catalog)");
        }
    }
}

fn cmd_init(args: InitArgs) -> Result<i32> {
    config::write_config_stub(&args.config, args.force)?;
    let cwd = std::env::current_dir().ok();
    println!(
        "wrote {}",
        util::display_path(&args.config, cwd.as_deref())
    );
    Ok(0)
}
