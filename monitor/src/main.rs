mod bencode;
mod config;
mod debug_tap;
mod dispatch;
mod event;
mod paths;
mod protocol;
mod receiver;
mod sampler;
mod status;
mod target;
mod telemetry;
mod trace;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::interval;

use crate::dispatch::ChannelDispatcher;
use crate::event::MonitorEvent;
use crate::protocol::ResourceEvent;
use crate::sampler::PerfSampler;
use crate::target::TargetProcess;

const USAGE: &str = "\
Usage: lstg-monitor [OPTIONS] <target-exe>

Launches <target-exe> with a /debugger:<port> flag and monitors its
telemetry, debug output and OS performance counters until it exits.

Options:
  --port <port>      Telemetry UDP port (default 3459, or config.toml)
  --workdir <dir>    Working directory for the target (default: its own dir)";

struct Args {
    target: Option<PathBuf>,
    workdir: Option<PathBuf>,
    port: Option<u16>,
}

fn parse_args(mut argv: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut args = Args { target: None, workdir: None, port: None };
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--port" => {
                let value = argv.next().ok_or("--port requires a value")?;
                args.port =
                    Some(value.parse().map_err(|_| format!("invalid port: {value}"))?);
            }
            "--workdir" => {
                let value = argv.next().ok_or("--workdir requires a value")?;
                args.workdir = Some(PathBuf::from(value));
            }
            other if other.starts_with("--") => {
                return Err(format!("unknown option: {other}"));
            }
            other => {
                if args.target.is_some() {
                    return Err("more than one target executable given".to_string());
                }
                args.target = Some(PathBuf::from(other));
            }
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() {
    // ── Command line ──────────────────────────────────────────────────────────
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {e}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = paths::config_file_path();
    let config = config::load_or_default(&config_path).unwrap_or_else(|e| {
        eprintln!("[config] Error (using defaults): {e}");
        config::Config::default()
    });
    let target_path = match args.target.or_else(|| config.monitor.target.clone().map(PathBuf::from)) {
        Some(path) => path,
        None => {
            eprintln!("Error: no target executable given\n\n{USAGE}");
            std::process::exit(2);
        }
    };
    let workdir = args
        .workdir
        .or_else(|| config.monitor.working_dir.clone().map(PathBuf::from));
    let port = args.port.unwrap_or(config.monitor.port);

    // ── Initial status ────────────────────────────────────────────────────────
    let status_path = paths::status_file_path();
    let mut current_status = status::MonitorStatus::new();
    status::write_status(&status_path, &current_status);

    // ── Controller ────────────────────────────────────────────────────────────
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<MonitorEvent>();
    let tap = debug_tap::system_tap();
    let target = match TargetProcess::new(port, tap, Arc::new(ChannelDispatcher::new(event_tx))).await
    {
        Ok(target) => target,
        Err(e) => {
            eprintln!("Failed to set up telemetry receiver: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = target.start(&target_path, workdir.as_deref()) {
        eprintln!("Failed to launch target: {e}");
        std::process::exit(1);
    }
    println!(
        "lstg-monitor v{}: monitoring {} on port {}",
        env!("CARGO_PKG_VERSION"),
        target_path.display(),
        target.port()
    );
    current_status.state = target.state_label().to_string();
    current_status.target = Some(target_path.display().to_string());
    current_status.pid = target.pid();
    status::write_status(&status_path, &current_status);

    // ── Event loop ────────────────────────────────────────────────────────────
    let mut sampler = PerfSampler::new();
    let mut ticker = interval(Duration::from_secs(config.monitor.sample_interval_secs.max(1)));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("[monitor] Interrupted; killing target");
                target.kill();
                // Keep looping: the exit event still arrives through the OS path.
            }

            _ = ticker.tick() => {
                let counters = if target.is_running() {
                    target.pid().and_then(|pid| sampler.sample(pid))
                } else {
                    None
                };
                let snapshot = target.snapshot();
                current_status.state = target.state_label().to_string();
                current_status.pid = target.pid();
                current_status.lifetime_secs = target.lifetime().as_secs();
                current_status.fps = snapshot.fps;
                current_status.objects = snapshot.objects;
                current_status.frame_time = snapshot.frame_time;
                current_status.render_time = snapshot.render_time;
                current_status.working_set = counters.map(|c| c.working_set);
                current_status.cpu_percent = counters.map(|c| c.cpu_percent);
                status::write_status(&status_path, &current_status);
            }

            Some(event) = event_rx.recv() => match event {
                MonitorEvent::Trace(record) => {
                    println!(
                        "{} [{}] {}",
                        record.time.format("%H:%M:%S%.3f"),
                        record.severity.label(),
                        record.text
                    );
                }

                MonitorEvent::Resource(resource) => print_resource(&resource),

                MonitorEvent::ProcessExited(code) => {
                    println!(
                        "Target exited with code {code} after {}s",
                        target.lifetime().as_secs()
                    );
                    current_status.state = "exited".to_string();
                    current_status.pid = None;
                    current_status.working_set = None;
                    current_status.cpu_percent = None;
                    current_status.exit_code = target.exit_code();
                    current_status.lifetime_secs = target.lifetime().as_secs();
                    status::write_status(&status_path, &current_status);
                    break;
                }
            }
        }
    }

    target.shutdown().await;
}

fn print_resource(event: &ResourceEvent) {
    match event {
        ResourceEvent::Loaded { kind, pool, name, path, load_time } => {
            println!(
                "[resource] Loaded {} '{name}' ({path}) into {} pool in {load_time:.3}s",
                kind.label(),
                pool.label()
            );
        }
        ResourceEvent::Removed { kind, pool, name } => {
            println!(
                "[resource] Removed {} '{name}' from {} pool",
                kind.label(),
                pool.label()
            );
        }
        ResourceEvent::Cleared { pool } => {
            println!("[resource] Cleared {} pool", pool.label());
        }
    }
}
