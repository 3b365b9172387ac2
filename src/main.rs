use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_coord::coord::heartbeat;
use agent_coord::health;
use agent_coord::report;
use agent_coord::store::{rotation, snapshot, Workspace};
use agent_coord::types::{AgentId, CoordConfig, SessionId};

const USAGE: &str = "\
usage: agent-coord <command> [options] [project-root]

commands:
  status  [--json]      show agents, locks, and files from the snapshot
  health  [--fix]       run workspace checks; --fix applies repairs
  stale   [--cleanup]   list stale agents; --cleanup releases their locks
  rotate  [--force]     rotate the log if due; --force rotates regardless

project-root defaults to the current directory.";

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent_coord=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    };

    let flags: Vec<&str> = args[1..]
        .iter()
        .filter(|a| a.starts_with("--"))
        .map(String::as_str)
        .collect();
    let root = args[1..]
        .iter()
        .find(|a| !a.starts_with("--"))
        .cloned()
        .unwrap_or_else(|| ".".into());

    let ws = Workspace::new(&root);
    let config = CoordConfig::default();

    let result = match command.as_str() {
        "status" => cmd_status(&ws, flags.contains(&"--json")),
        "health" => return cmd_health(&ws, &config, flags.contains(&"--fix")),
        "stale" => cmd_stale(&ws, &config, flags.contains(&"--cleanup")),
        "rotate" => cmd_rotate(&ws, &config, flags.contains(&"--force")),
        other => {
            eprintln!("unknown command: {}\n\n{}", other, USAGE);
            return ExitCode::from(2);
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_status(ws: &Workspace, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = snapshot::rebuild(ws, false)?;
    if json {
        println!("{}", report::render_json(&snapshot)?);
    } else {
        print!("{}", report::render_human(&snapshot));
    }
    Ok(())
}

fn cmd_health(ws: &Workspace, config: &CoordConfig, fix: bool) -> ExitCode {
    match health::run(ws, config, fix) {
        Ok(report) => {
            for check in &report.checks {
                println!("{:<12} {:?}: {}", check.name, check.status, check.detail);
            }
            for action in &report.fixed {
                println!("fixed: {}", action);
            }
            println!("overall: {:?}", report.overall);
            ExitCode::from(report.exit_code() as u8)
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(2)
        }
    }
}

fn cmd_stale(
    ws: &Workspace,
    config: &CoordConfig,
    cleanup: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let agent = AgentId::new("cli");
    let session = SessionId::new("cli");
    let report = heartbeat::check_stale(ws, &agent, &session, config.stale_threshold_sec, cleanup)?;

    if report.is_clean() {
        println!("no stale agents");
        return Ok(());
    }

    for agent in &report.stale_agents {
        println!("stale: {}", agent);
    }
    for lock in &report.stale_locks {
        println!("  holds {} on {}", lock.lock_id, lock.file_path);
    }
    for lock_id in &report.released_locks {
        println!("released: {}", lock_id);
    }
    Ok(())
}

fn cmd_rotate(
    ws: &Workspace,
    config: &CoordConfig,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = rotation::check_and_rotate(ws, config.max_events, config.keep_rotated, force)?;
    match outcome {
        rotation::RotationOutcome::Skipped { event_count } => {
            println!(
                "not due: {} of {} events",
                event_count, config.max_events
            );
        }
        rotation::RotationOutcome::Rotated {
            events_archived,
            generations_pruned,
        } => {
            println!(
                "rotated: {} events archived, {} old generation(s) pruned",
                events_archived, generations_pruned
            );
        }
    }
    Ok(())
}
