//! Plexfarm Worker - Main Entry Point
//!
//! Connects to the orchestrator, runs transcodes on request and reports back.

mod config;
mod shutdown;
mod telemetry;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{error, info};

// Import workspace crates
use plexfarm_channel::ChannelClient;
use plexfarm_core::application::{shutdown_channel, CapabilitySampler, ShutdownReason, Supervisor};
use plexfarm_core::domain::{worker_event_channel, WorkerIdentity};
use plexfarm_core::port::id_provider::UuidProvider;
use plexfarm_core::port::time_provider::SystemTimeProvider;
use plexfarm_infra_system::{SysinfoCpuProbe, TranscoderLauncher};

use crate::config::WorkerConfig;
use crate::shutdown::SignalListener;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit code for faults (panics, dead loops)
const FAULT_EXIT_CODE: i32 = 1;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration and logging
    let config = WorkerConfig::parse();
    telemetry::init(config.log_format)?;
    shutdown::install_panic_hook();
    let mut signals = SignalListener::install()?;

    // 2. Identity
    let identity = WorkerIdentity::generate(&UuidProvider, config.host_label());

    let mut launcher = TranscoderLauncher::new(&config.transcoder_path, &config.transcoder_name);
    if let Some(allowlist) = config.env_allowlist() {
        launcher = launcher.with_env_allowlist(allowlist);
    }

    info!(
        version = VERSION,
        worker_id = %identity.worker_id,
        host = %identity.host,
        orchestrator_url = %config.orchestrator_url,
        transcoder = %launcher.binary().display(),
        "Plexfarm worker starting"
    );

    // 3. Wiring: every event funnels into the supervisor loop
    let (events_tx, events_rx) = worker_event_channel();
    let (shutdown_tx, shutdown_token) = shutdown_channel();

    let (client, channel) =
        ChannelClient::new(config.channel_config(), identity, events_tx.clone());
    let supervisor = Supervisor::new(
        Arc::new(launcher),
        Arc::new(channel),
        Arc::new(SystemTimeProvider),
        events_tx.clone(),
    );
    let sampler = CapabilitySampler::new(Arc::new(SysinfoCpuProbe::new()), config.cpu_interval());

    // 4. Start loops
    let mut supervisor_task = tokio::spawn(supervisor.run(events_rx, shutdown_token.clone()));
    let mut channel_task = tokio::spawn(client.run(shutdown_token.clone()));
    tokio::spawn(sampler.run(events_tx, shutdown_token));

    // 5. Whatever comes first ends the process. In-flight transcodes are left running.
    let (reason, code) = tokio::select! {
        signal = signals.recv() => {
            info!(
                signal = signal.name,
                code = signal.number,
                "Received termination signal, exiting"
            );
            (ShutdownReason::Signal(signal.number), signal.number)
        }
        result = &mut supervisor_task => {
            report_fatal("Task supervisor", result.map(|r| r.map_err(anyhow::Error::from)));
            (ShutdownReason::Fault, FAULT_EXIT_CODE)
        }
        result = &mut channel_task => {
            report_fatal("Control channel", result.map(|r| r.map_err(anyhow::Error::from)));
            (ShutdownReason::Fault, FAULT_EXIT_CODE)
        }
    };

    shutdown_tx.shutdown(reason);
    telemetry::flush();
    std::process::exit(code)
}

/// A long-running loop ended on its own; that is always fatal
fn report_fatal(component: &str, result: std::result::Result<Result<()>, JoinError>) {
    match result {
        Ok(Ok(())) => error!(component, "Stopped unexpectedly, worker exiting"),
        Ok(Err(e)) => error!(component, error = %e, "Failed, worker exiting"),
        Err(e) => error!(component, error = %e, "Crashed, worker exiting"),
    }
}
