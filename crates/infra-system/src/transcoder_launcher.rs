// Transcoder launcher
// reason: tokio for async process management, nix for POSIX signals
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use plexfarm_core::domain::TaskPayload;
use plexfarm_core::port::{LaunchError, ProcessEvents, ProcessHandle, ProcessLauncher};

/// Spawns the transcoder binary for each task
///
/// Arguments, working directory and environment come from the orchestrator
/// unchanged; an optional allowlist restricts which environment keys pass.
pub struct TranscoderLauncher {
    binary: PathBuf,
    env_allowlist: Option<Vec<String>>,
}

impl TranscoderLauncher {
    /// Create a launcher for `<directory>/<name>`
    ///
    /// # Example
    /// ```ignore
    /// let launcher = TranscoderLauncher::new("/usr/lib/plexmediaserver/", "Plex Transcoder");
    /// ```
    pub fn new(directory: impl AsRef<Path>, name: impl AsRef<Path>) -> Self {
        Self {
            binary: directory.as_ref().join(name),
            env_allowlist: None,
        }
    }

    /// Only pass these environment keys to the transcoder
    pub fn with_env_allowlist(mut self, allowlist: Vec<String>) -> Self {
        self.env_allowlist = Some(allowlist);
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn filter_env(&self, env: &HashMap<String, String>) -> HashMap<String, String> {
        match &self.env_allowlist {
            Some(allowlist) => env
                .iter()
                .filter(|(k, _)| allowlist.contains(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            None => env.clone(),
        }
    }

    fn command(&self, payload: &TaskPayload) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .args(&payload.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(cwd) = &payload.cwd {
            command.current_dir(cwd);
        }
        // A supplied env map replaces the worker environment
        if let Some(env) = &payload.env {
            command.env_clear().envs(self.filter_env(env));
        }
        command
    }
}

impl ProcessLauncher for TranscoderLauncher {
    fn launch(
        &self,
        payload: &TaskPayload,
        events: ProcessEvents,
    ) -> Result<ProcessHandle, LaunchError> {
        let child = self
            .command(payload)
            .spawn()
            .map_err(|e| LaunchError::SpawnFailed(e.to_string()))?;

        let pid = child.id();
        info!(
            task_id = %events.task_id(),
            binary = %self.binary.display(),
            pid = ?pid,
            "Transcoder started"
        );

        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(supervise(child, kill_rx, events));
        Ok(ProcessHandle::new(pid, kill_tx))
    }
}

/// Relay output, wait for the process and report exit then close
async fn supervise(mut child: Child, mut kill_rx: oneshot::Receiver<()>, events: ProcessEvents) {
    let stdout = child
        .stdout
        .take()
        .map(|out| tokio::spawn(relay(out, tokio::io::stdout())));
    let stderr = child
        .stderr
        .take()
        .map(|err| tokio::spawn(relay(err, tokio::io::stderr())));

    let waited = tokio::select! {
        status = child.wait() => status,
        Ok(()) = &mut kill_rx => {
            terminate(&mut child);
            child.wait().await
        }
    };

    match waited {
        Ok(status) => {
            let code = status.code();
            log_exit(events.task_id(), &status);
            events.exit(code);

            // close: every stdio stream has drained
            for stream in [stdout, stderr].into_iter().flatten() {
                let _ = stream.await;
            }
            events.close(code);
        }
        Err(e) => {
            warn!(task_id = %events.task_id(), error = %e, "Waiting on transcoder failed");
            events.error(e.to_string());
        }
    }
}

async fn relay<R, W>(mut from: R, mut to: W)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Err(e) = tokio::io::copy(&mut from, &mut to).await {
        debug!(error = %e, "Output relay stopped");
    }
}

/// Send the platform's default termination signal
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            info!(pid = %pid, "Sending SIGTERM to transcoder");
            match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) => return,
                Err(e) => warn!(pid = %pid, error = %e, "SIGTERM failed, forcing kill"),
            }
        }
    }

    if let Err(e) = child.start_kill() {
        debug!(error = %e, "Transcoder already exited");
    }
}

fn log_exit(task_id: &str, status: &ExitStatus) {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            info!(task_id = %task_id, signal, "Transcoder terminated by signal");
            return;
        }
    }
    debug!(task_id = %task_id, exit_code = ?status.code(), "Transcoder exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexfarm_core::domain::{
        worker_event_channel, ProcessEvent, WorkerEvent, WorkerEventReceiver,
    };
    use std::time::Duration;

    fn sh() -> TranscoderLauncher {
        TranscoderLauncher::new("/bin", "sh")
    }

    fn script(body: &str) -> TaskPayload {
        TaskPayload {
            args: vec!["-c".to_string(), body.to_string()],
            cwd: None,
            env: None,
        }
    }

    async fn next_event(rx: &mut WorkerEventReceiver) -> ProcessEvent {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("process event timed out")
            .expect("event channel closed");
        match event {
            WorkerEvent::Process(signal) => signal.event,
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_binary_path_joins_directory_and_name() {
        let with_slash = TranscoderLauncher::new("/usr/lib/plexmediaserver/", "Plex Transcoder");
        let without = TranscoderLauncher::new("/usr/lib/plexmediaserver", "Plex Transcoder");
        assert_eq!(with_slash.binary(), without.binary());
        assert_eq!(
            with_slash.binary(),
            Path::new("/usr/lib/plexmediaserver/Plex Transcoder")
        );
    }

    #[test]
    fn test_env_filtering() {
        let launcher = sh().with_env_allowlist(vec!["ALLOWED_VAR".to_string()]);

        let mut env = HashMap::new();
        env.insert("ALLOWED_VAR".to_string(), "value1".to_string());
        env.insert("BLOCKED_VAR".to_string(), "value2".to_string());

        let filtered = launcher.filter_env(&env);
        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key("ALLOWED_VAR"));

        assert_eq!(sh().filter_env(&env).len(), 2);
    }

    #[tokio::test]
    async fn test_exit_then_close() {
        let (tx, mut rx) = worker_event_channel();
        let launcher = sh();

        let handle = launcher
            .launch(&script("exit 3"), ProcessEvents::new("t1", 1, tx))
            .unwrap();
        assert!(handle.pid().is_some());

        assert_eq!(next_event(&mut rx).await, ProcessEvent::Exit { code: Some(3) });
        assert_eq!(next_event(&mut rx).await, ProcessEvent::Close { code: Some(3) });
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported_synchronously() {
        let (tx, _rx) = worker_event_channel();
        let launcher = TranscoderLauncher::new("/nonexistent/dir", "transcoder");

        let err = launcher
            .launch(&script("true"), ProcessEvents::new("t1", 1, tx))
            .unwrap_err();
        assert!(matches!(err, LaunchError::SpawnFailed(_)));
    }

    #[tokio::test]
    async fn test_kill_terminates_with_sigterm() {
        let (tx, mut rx) = worker_event_channel();
        let launcher = sh();

        let mut handle = launcher
            .launch(&script("exec sleep 30"), ProcessEvents::new("t1", 1, tx))
            .unwrap();
        assert!(handle.kill());

        // Killed by signal: no exit code
        assert_eq!(next_event(&mut rx).await, ProcessEvent::Exit { code: None });
        assert_eq!(next_event(&mut rx).await, ProcessEvent::Close { code: None });
    }

    #[tokio::test]
    async fn test_supplied_env_replaces_worker_env() {
        let (tx, mut rx) = worker_event_channel();
        let launcher = sh();

        let mut env = HashMap::new();
        env.insert("PLEXFARM_MARKER".to_string(), "on".to_string());
        let payload = TaskPayload {
            env: Some(env),
            ..script(r#"[ "$PLEXFARM_MARKER" = on ] && [ -z "$HOME" ]"#)
        };

        launcher
            .launch(&payload, ProcessEvents::new("t1", 1, tx))
            .unwrap();
        assert_eq!(next_event(&mut rx).await, ProcessEvent::Exit { code: Some(0) });
    }

    #[tokio::test]
    async fn test_working_directory_is_applied() {
        let (tx, mut rx) = worker_event_channel();
        let payload = TaskPayload {
            cwd: Some("/".to_string()),
            ..script(r#"[ "$(pwd)" = / ]"#)
        };

        sh().launch(&payload, ProcessEvents::new("t1", 1, tx)).unwrap();
        assert_eq!(next_event(&mut rx).await, ProcessEvent::Exit { code: Some(0) });
    }
}
