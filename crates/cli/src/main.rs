//! `adminctl` – command-line front end and daemon for the administration
//! engine.
//!
//! Runs the same command surface the desktop UI invokes, against the real
//! host or (`--simulate`) the in-memory backend.

mod logging;
mod serve;

use clap::{Parser, Subcommand};
use engine::config::EngineConfig;
use engine::model::parse_drive_letter;
use engine::platform::simulated::SimulatedPlatform;
use engine::types::*;
use engine::{AppContext, CommandRegistry, CommandResult};
use serde_json::Value;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ===========================================================================
// CLI definition
// ===========================================================================

#[derive(Parser)]
#[command(
    name = "adminctl",
    version,
    about = "Manage devices, disks, processes and local accounts from the command line"
)]
struct Cli {
    /// Configuration file (defaults to adminctl.yaml / config/adminctl.yaml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the in-memory simulated machine instead of the real host.
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect environment facts: OS, elevation, PowerShell.
    Doctor {
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
        /// Write result JSON to this path.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Invoke a backend command by name with JSON args.
    Call {
        /// Command name (e.g. "list_devices", "format_disk").
        cmd: String,
        /// JSON args to pass to the command.
        #[arg(long, default_value = "{}")]
        args: String,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// After a mutation, run the list command it invalidates.
        #[arg(long)]
        refresh: bool,
        /// Skip the interactive confirmation of destructive commands.
        #[arg(long)]
        yes: bool,
        /// Directory for artifacts output.
        #[arg(long)]
        artifacts: Option<PathBuf>,
    },

    /// List available command names.
    List,

    /// Read-only check of one area: devices, storage, processes, accounts or recycle_bin.
    Probe {
        /// Probe target.
        target: String,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Directory for artifacts output.
        #[arg(long)]
        artifacts: Option<PathBuf>,
    },

    /// Run a scripted scenario from a YAML file.
    RunScenario {
        /// Path to the scenario YAML file.
        file: PathBuf,
        /// Directory for artifacts output.
        #[arg(long)]
        artifacts: Option<PathBuf>,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start daemon mode.
    Serve {
        /// Path for the Unix domain socket.
        #[cfg(unix)]
        #[arg(long, conflicts_with = "listen")]
        socket: Option<PathBuf>,
        /// TCP address to listen on, e.g. 127.0.0.1:7420.
        #[arg(long)]
        listen: Option<String>,
    },
}

// ===========================================================================
// Main
// ===========================================================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref());
    logging::init_logging(&config.logging);

    let ctx = if cli.simulate {
        tracing::info!("using simulated backend");
        AppContext::simulated(config, Arc::new(SimulatedPlatform::seeded()))
    } else {
        AppContext::default_platform(config)
    };
    let registry = CommandRegistry::new();

    match cli.command {
        Commands::Doctor { json, out } => cmd_doctor(json, out, &ctx),
        Commands::Call {
            cmd,
            args,
            json,
            refresh,
            yes,
            artifacts,
        } => {
            let opts = CallOptions {
                json,
                refresh,
                yes,
                artifacts,
            };
            cmd_call(&cmd, &args, opts, &ctx, &registry).await
        }
        Commands::List => {
            for name in registry.list() {
                println!("{}", name);
            }
        }
        Commands::Probe {
            target,
            json,
            artifacts,
        } => cmd_probe(&target, json, artifacts, &ctx).await,
        Commands::RunScenario {
            file,
            artifacts,
            json,
        } => cmd_run_scenario(&file, json, artifacts, &ctx, &registry).await,
        #[cfg(unix)]
        Commands::Serve { socket, listen } => {
            let endpoint = match (socket, listen) {
                (Some(path), _) => serve::Endpoint::Socket(path),
                (None, Some(addr)) => serve::Endpoint::Tcp(addr),
                (None, None) => {
                    eprintln!("error: serve needs --socket <path> or --listen <addr>");
                    std::process::exit(2);
                }
            };
            serve::run_daemon(endpoint, ctx, registry).await
        }
        #[cfg(not(unix))]
        Commands::Serve { listen } => {
            let Some(addr) = listen else {
                eprintln!("error: serve needs --listen <addr>");
                std::process::exit(2);
            };
            serve::run_daemon(serve::Endpoint::Tcp(addr), ctx, registry).await
        }
    }
}

fn load_config(path: Option<&Path>) -> EngineConfig {
    let loaded = match path {
        Some(p) => engine::config::load_config_from(p),
        None => engine::config::load_config(),
    };
    match loaded {
        Ok(c) => c,
        Err(e) => {
            // Logging is not up yet.
            eprintln!("warning: ignoring configuration ({}), using defaults", e);
            EngineConfig::default()
        }
    }
}

// ===========================================================================
// Subcommand implementations
// ===========================================================================

fn cmd_doctor(json: bool, out: Option<PathBuf>, ctx: &AppContext) {
    let result = engine::doctor::run_doctor(&ctx.config);
    if let Some(ref path) = out {
        write_result_file(path, &result);
    }
    output_result(&result, json);
}

struct CallOptions {
    json: bool,
    refresh: bool,
    yes: bool,
    artifacts: Option<PathBuf>,
}

async fn cmd_call(
    cmd: &str,
    args_str: &str,
    opts: CallOptions,
    ctx: &AppContext,
    registry: &CommandRegistry,
) {
    let mut args: Value = match serde_json::from_str(args_str) {
        Ok(v) => v,
        Err(e) => {
            let r = result_err(
                "call",
                cmd,
                &new_run_id(),
                0,
                ErrorCode::InvalidInput,
                format!("invalid JSON args: {}", e),
            );
            output_result(&r, opts.json);
            return;
        }
    };

    if cmd == "format_disk" && ctx.config.safety.require_format_confirmation {
        if let Err(reason) = confirm_format(&mut args, opts.yes) {
            let r = result_err("call", cmd, &new_run_id(), 0, ErrorCode::InvalidInput, reason);
            output_result(&r, opts.json);
            return;
        }
    }

    let result = registry.execute(cmd, args, ctx).await;
    if let Some(ref dir) = opts.artifacts {
        write_artifacts(dir, &result);
    }
    print_result(&result, opts.json);

    if opts.refresh {
        if let Some(list) = result.refresh.as_deref() {
            let refreshed = registry.execute(list, Value::Null, ctx).await;
            print_result(&refreshed, opts.json);
        }
    }
    exit_for(result.status);
}

/// Ask for the typed phrase `FORMAT <letter>` before a format, unless the
/// args already carry `confirm: true` or `--yes` was given.
fn confirm_format(args: &mut Value, yes: bool) -> Result<(), String> {
    let Some(obj) = args.as_object_mut() else {
        // Let the engine report the malformed args.
        return Ok(());
    };
    if obj.get("confirm").and_then(Value::as_bool) == Some(true) {
        return Ok(());
    }
    if yes {
        obj.insert("confirm".into(), Value::Bool(true));
        return Ok(());
    }
    if !std::io::stdin().is_terminal() {
        return Ok(());
    }

    let raw = obj
        .get("driveLetter")
        .or_else(|| obj.get("drive_letter"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let Ok(letter) = parse_drive_letter(raw) else {
        return Ok(());
    };

    let phrase = format!("FORMAT {}", letter);
    let typed: String = dialoguer::Input::new()
        .with_prompt(format!(
            "All data on {}: will be erased. Type '{}' to continue",
            letter, phrase
        ))
        .allow_empty(true)
        .interact_text()
        .map_err(|e| format!("confirmation prompt failed: {}", e))?;

    if typed.trim() != phrase {
        return Err(format!("format of {}: cancelled at the confirmation prompt", letter));
    }
    obj.insert("confirm".into(), Value::Bool(true));
    Ok(())
}

async fn cmd_probe(target: &str, json: bool, artifacts: Option<PathBuf>, ctx: &AppContext) {
    let result = engine::probes::run_probe(target, ctx).await;
    if let Some(ref dir) = artifacts {
        write_artifacts(dir, &result);
    }
    output_result(&result, json);
}

fn read_scenario(file: &Path) -> Result<Scenario, (ErrorCode, String)> {
    let yaml = std::fs::read_to_string(file)
        .map_err(|e| (ErrorCode::IoError, format!("cannot read scenario file: {}", e)))?;
    engine::scenario::load_scenario(&yaml).map_err(|e| (ErrorCode::InvalidInput, e))
}

async fn cmd_run_scenario(
    file: &Path,
    json: bool,
    artifacts: Option<PathBuf>,
    ctx: &AppContext,
    registry: &CommandRegistry,
) {
    let scenario = match read_scenario(file) {
        Ok(s) => s,
        Err((code, message)) => {
            let target = file.display().to_string();
            let r = result_err("run-scenario", &target, &new_run_id(), 0, code, message);
            output_result(&r, json);
            return;
        }
    };

    let outcome = engine::scenario::run_scenario(&scenario, ctx, registry).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome).unwrap_or_default());
    } else {
        println!("Scenario: {}", outcome.name.as_deref().unwrap_or("<unnamed>"));
        println!("Overall: {}", outcome.overall_status.as_str());
        for (i, step) in outcome.step_results.iter().enumerate() {
            let code = step.error.as_ref().map(|e| e.code.as_str()).unwrap_or("");
            println!(
                "  {:>2}. {:<22} {:<5} {:>6}ms {}",
                i + 1,
                step.target,
                step.status.as_str(),
                step.timing_ms.total,
                code
            );
        }
    }

    if let Some(ref dir) = artifacts {
        write_run_dir(dir, &new_run_id(), &outcome, &outcome.step_results);
    }

    exit_for(outcome.overall_status);
}

// ===========================================================================
// Output helpers
// ===========================================================================

fn output_result(result: &CommandResult, json: bool) {
    print_result(result, json);
    exit_for(result.status);
}

fn print_result(result: &CommandResult, json: bool) {
    if json {
        let j = serde_json::to_string_pretty(result).unwrap_or_default();
        println!("{}", j);
    } else {
        print_human(result);
    }
}

/// Exit with non-zero status on error/fail.
fn exit_for(status: Status) {
    match status {
        Status::Pass | Status::Skip => {}
        Status::Fail => std::process::exit(1),
        Status::Error => std::process::exit(2),
    }
}

fn print_human(r: &CommandResult) {
    println!(
        "[{}] {} {}",
        r.status.as_str().to_ascii_uppercase(),
        r.command,
        r.target
    );
    println!("  run_id: {}", r.run_id);
    println!("  timing: {}ms", r.timing_ms.total);

    for (step, ms) in &r.timing_ms.steps {
        println!("    {}: {}ms", step, ms);
    }

    if let Some(ref err) = r.error {
        println!("  error:  {} – {}", err.code, err.message);
    }

    if let Some(ref data) = r.data {
        if let Ok(s) = serde_json::to_string_pretty(data) {
            for line in s.lines() {
                println!("  {}", line);
            }
        }
    }

    if let Some(ref list) = r.refresh {
        println!("  refresh: {}", list);
    }

    println!("  env: os={} arch={}", r.env_summary.os, r.env_summary.arch);
}

// ===========================================================================
// Artifact helpers
// ===========================================================================

fn write_result_file(path: &Path, result: &CommandResult) {
    let j = serde_json::to_string_pretty(result).unwrap_or_default();
    if let Err(e) = std::fs::write(path, &j) {
        eprintln!(
            "warning: failed to write result to {}: {}",
            path.display(),
            e
        );
    }
}

fn write_artifacts(dir: &Path, result: &CommandResult) {
    write_run_dir(dir, &result.run_id, result, std::slice::from_ref(result));
}

/// `<dir>/<run_id>/result.json` plus one `events.jsonl` line per result.
fn write_run_dir<T: serde::Serialize>(dir: &Path, run_id: &str, summary: &T, events: &[CommandResult]) {
    let run_dir = dir.join(run_id);
    if let Err(e) = std::fs::create_dir_all(&run_dir) {
        eprintln!(
            "warning: failed to create artifacts dir {}: {}",
            run_dir.display(),
            e
        );
        return;
    }

    let summary = serde_json::to_string_pretty(summary).unwrap_or_default();
    let events: String = events
        .iter()
        .filter_map(|r| serde_json::to_string(r).ok())
        .map(|line| line + "\n")
        .collect();
    for (name, body) in [("result.json", summary), ("events.jsonl", events)] {
        if let Err(e) = std::fs::write(run_dir.join(name), body) {
            eprintln!("warning: failed to write {}: {}", name, e);
        }
    }
}
