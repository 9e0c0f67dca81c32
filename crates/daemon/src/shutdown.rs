//! Process-wide exit paths: termination signals and panics

use tracing::error;

/// A termination signal that ended the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationSignal {
    pub name: &'static str,
    /// Also the process exit code
    pub number: i32,
}

#[cfg(unix)]
mod platform {
    use super::TerminationSignal;
    use nix::sys::signal::Signal;
    use tokio::signal::unix::{signal, SignalKind};

    /// Handlers for SIGINT, SIGTERM, SIGHUP and SIGQUIT
    pub struct SignalListener {
        interrupt: tokio::signal::unix::Signal,
        terminate: tokio::signal::unix::Signal,
        hangup: tokio::signal::unix::Signal,
        quit: tokio::signal::unix::Signal,
    }

    impl SignalListener {
        /// Replace the default handlers. Must run inside the runtime.
        pub fn install() -> std::io::Result<Self> {
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
                hangup: signal(SignalKind::hangup())?,
                quit: signal(SignalKind::quit())?,
            })
        }

        pub async fn recv(&mut self) -> TerminationSignal {
            let sig = tokio::select! {
                _ = self.interrupt.recv() => Signal::SIGINT,
                _ = self.terminate.recv() => Signal::SIGTERM,
                _ = self.hangup.recv() => Signal::SIGHUP,
                _ = self.quit.recv() => Signal::SIGQUIT,
            };
            TerminationSignal {
                name: sig.as_str(),
                number: sig as i32,
            }
        }
    }
}

#[cfg(not(unix))]
mod platform {
    use super::TerminationSignal;

    /// Ctrl+C only
    pub struct SignalListener;

    impl SignalListener {
        pub fn install() -> std::io::Result<Self> {
            Ok(Self)
        }

        pub async fn recv(&mut self) -> TerminationSignal {
            let _ = tokio::signal::ctrl_c().await;
            TerminationSignal {
                name: "SIGINT",
                number: 2,
            }
        }
    }
}

pub use platform::SignalListener;

/// Log unhandled panics and exit with code 1
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        error!(fault = %info, "Unhandled fault, worker exiting");
        crate::telemetry::flush();
        std::process::exit(1);
    }));
}
