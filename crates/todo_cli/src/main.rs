//! CLI entry point over `todo_core`.
//!
//! # Responsibility
//! - Provide a `ping` probe to verify `todo_core` linkage.
//! - Run list/add/complete-all against the store named by `TODO_STORE_*`.
//! - Enable file logging when `TODO_LOG_DIR` is set.

use std::error::Error;
use std::process::ExitCode;
use todo_core::{default_log_level, init_logging, Item, StoreConfig, TodoService};

const USAGE: &str = "usage: todo_cli <ping|list|add <name> [description]|complete-all>";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<(), Box<dyn Error>> {
    let command = args.first().map(String::as_str).unwrap_or("ping");
    if command == "ping" {
        println!("todo_core ping={}", todo_core::ping());
        println!("todo_core version={}", todo_core::core_version());
        return Ok(());
    }

    if let Ok(log_dir) = std::env::var("TODO_LOG_DIR") {
        init_logging(default_log_level(), &log_dir)?;
    }
    let config = StoreConfig::from_env()?;
    let service = TodoService::connect(&config)?;

    match command {
        "list" => {
            for item in service.list_incomplete()? {
                println!("{}\t{}", item.id, item.name);
            }
        }
        "add" => {
            let name = args.get(1).ok_or(USAGE)?;
            let mut item = Item::new(name.as_str());
            item.description = args.get(2).cloned();
            service.create_item(&item)?;
            println!("{}", item.id);
        }
        "complete-all" => {
            let report = service.mark_all_complete()?;
            println!(
                "completed={} candidates={} invocations={}",
                report.completed, report.candidates, report.invocations
            );
        }
        _ => return Err(USAGE.into()),
    }
    Ok(())
}
