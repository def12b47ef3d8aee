// Trace replay command
//
// Reads a JSONL trace of platform commands and feeds it through a real
// SessionDriver backed by the on-disk snapshot. Running a second trace
// against the same state dir exercises restart reconciliation: the trace's
// first location fix is what the device reports at launch.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chargeside_session::collaborators::{
    InMemoryGeofenceManager, StaticLocationService, StaticTokenProvider,
};
use chargeside_session::emitter::EventTransport;
use chargeside_session::geo::LocationFix;
use chargeside_session::machine::SessionDeps;
use chargeside_session::{
    EmitterConfig, FileSnapshotStore, HttpEventTransport, ScriptedTransport, SessionCommand,
    SessionConfig, SessionDriver, SessionStateMachine, SystemClock,
};
use tracing::info;

use crate::notifier::StdoutNotifier;
use crate::output::{print_field, print_snapshot, OutputFormat};

pub struct ReplayOptions {
    pub trace: PathBuf,
    pub state_dir: PathBuf,
    pub api_url: Option<String>,
    pub token: Option<String>,
    pub dry_run: bool,
}

pub async fn run(options: ReplayOptions, output: OutputFormat, quiet: bool) -> Result<()> {
    let contents = tokio::fs::read_to_string(&options.trace)
        .await
        .with_context(|| format!("Failed to read trace {}", options.trace.display()))?;
    let commands = parse_trace(&contents)?;

    let mut emitter_config = EmitterConfig::from_env();
    if let Some(api_url) = &options.api_url {
        emitter_config = emitter_config.with_base_url(api_url.as_str());
    }

    let transport: Arc<dyn EventTransport> = if options.dry_run {
        Arc::new(ScriptedTransport::new())
    } else {
        Arc::new(HttpEventTransport::new(
            &emitter_config.base_url,
            Arc::new(StaticTokenProvider::new(options.token.clone())),
        ))
    };

    let location = Arc::new(StaticLocationService::new());
    if let Some(fix) = launch_fix(&commands) {
        location.set_fix(fix);
    }
    let deps = SessionDeps {
        store: Arc::new(FileSnapshotStore::new(&options.state_dir)),
        transport,
        location: location.clone(),
        geofences: Arc::new(InMemoryGeofenceManager::new()),
        ui: Arc::new(StdoutNotifier::new(quiet || !output.is_text())),
        clock: Arc::new(SystemClock),
    };

    info!(
        trace = %options.trace.display(),
        commands = commands.len(),
        dry_run = options.dry_run,
        "replaying trace"
    );

    let (machine, internal) = SessionStateMachine::new(SessionConfig::from_env(), emitter_config, deps);
    let handle = SessionDriver::spawn(machine, internal);

    for command in commands {
        // The platform location service sees every fix the machine does
        if let SessionCommand::LocationUpdate { fix } = &command {
            location.set_fix(*fix);
        }
        handle
            .send(command)
            .context("Session driver stopped before the trace finished")?;
    }

    let snapshot = handle.shutdown().await.context("Session driver failed")?;

    if output.is_text() && !quiet {
        println!();
        print_field("Trace", &options.trace.display().to_string());
    }
    print_snapshot(output, &snapshot)
}

/// The location known before the first command runs
fn launch_fix(commands: &[SessionCommand]) -> Option<LocationFix> {
    commands.iter().find_map(|command| match command {
        SessionCommand::LocationUpdate { fix } => Some(*fix),
        _ => None,
    })
}

/// Parse a JSONL trace. Blank lines and lines starting with `#` are skipped.
pub fn parse_trace(contents: &str) -> Result<Vec<SessionCommand>> {
    let mut commands = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let command: SessionCommand = serde_json::from_str(line)
            .with_context(|| format!("Invalid command on line {}", index + 1))?;
        commands.push(command);
    }

    if commands.is_empty() {
        bail!("Trace contains no commands");
    }
    Ok(commands)
}
