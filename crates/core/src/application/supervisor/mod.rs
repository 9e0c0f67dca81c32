// Task Supervisor - the worker's event loop
//
// Every inbound message, process signal and CPU sample is handled here, one at
// a time, so the registry and the CPU reading have a single writer.


use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::application::registry::{TaskRecord, TaskRegistry};
use crate::application::shutdown::ShutdownToken;
use crate::domain::{
    CpuReading, DomainError, InboundMessage, KillRequest, ProcessEvent, ProcessSignal, RunId,
    TaskRequest, TaskUpdate, WorkerEvent, WorkerEventReceiver, WorkerEventSender, WorkerStats,
};
use crate::error::Result;
use crate::port::{ControlChannel, ProcessEvents, ProcessHandle, ProcessLauncher, TimeProvider};

/// Owns the task registry and drives every task's life cycle
pub struct Supervisor {
    registry: TaskRegistry,
    cpu: CpuReading,
    launcher: Arc<dyn ProcessLauncher>,
    channel: Arc<dyn ControlChannel>,
    time_provider: Arc<dyn TimeProvider>,
    events_tx: WorkerEventSender,
    last_run_id: RunId,
}

impl Supervisor {
    /// Create a supervisor.
    ///
    /// `events_tx` must feed the receiver later passed to [`Supervisor::run`];
    /// launched processes report through it.
    pub fn new(
        launcher: Arc<dyn ProcessLauncher>,
        channel: Arc<dyn ControlChannel>,
        time_provider: Arc<dyn TimeProvider>,
        events_tx: WorkerEventSender,
    ) -> Self {
        Self {
            registry: TaskRegistry::new(),
            cpu: CpuReading::unmeasured(),
            launcher,
            channel,
            time_provider,
            events_tx,
            last_run_id: 0,
        }
    }

    /// Process events until shutdown
    pub async fn run(
        mut self,
        mut events: WorkerEventReceiver,
        mut shutdown: ShutdownToken,
    ) -> Result<()> {
        info!("Task supervisor started");
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
                reason = shutdown.wait() => {
                    info!(?reason, in_flight = self.registry.len(), "Task supervisor stopping");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Handle one event. Failures are logged; they never stop the loop.
    pub fn handle(&mut self, event: WorkerEvent) {
        let result = match event {
            WorkerEvent::Inbound(InboundMessage::Stats(reply)) => {
                let stats = self.stats();
                info!(cpu = stats.cpu, tasks = stats.tasks, "Answering with stats to orchestrator");
                if reply.send(stats).is_err() {
                    debug!("Stats requester went away before the answer");
                }
                Ok(())
            }
            WorkerEvent::Inbound(InboundMessage::TaskRequest(request)) => {
                self.on_task_request(request)
            }
            WorkerEvent::Inbound(InboundMessage::TaskKill(request)) => self.on_task_kill(request),
            WorkerEvent::Process(signal) => self.on_process_signal(signal),
            WorkerEvent::CpuSample(percent) => {
                self.cpu = CpuReading::measured(percent);
                debug!(cpu = self.cpu.percent(), "CPU reading updated");
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!(error = %e, "Event rejected");
        }
    }

    /// Current load: CPU reading and number of in-flight tasks
    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            cpu: self.cpu.percent(),
            tasks: self.registry.len(),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    fn on_task_request(&mut self, request: TaskRequest) -> Result<()> {
        request.validate()?;
        if self.registry.contains(&request.task_id) {
            return Err(DomainError::DuplicateTask(request.task_id).into());
        }

        let task_id = request.task_id;
        info!(task_id = %task_id, args = ?request.payload.args, "Received task request");
        self.channel.emit_update(TaskUpdate::received(&task_id));

        self.last_run_id += 1;
        let run_id = self.last_run_id;
        let events = ProcessEvents::new(task_id.clone(), run_id, self.events_tx.clone());

        let launched = self.launcher.launch(&request.payload, events.clone());
        let (process, launch_failure) = match launched {
            Ok(handle) => (handle, None),
            Err(e) => (ProcessHandle::detached(), Some(e)),
        };

        let mut record = TaskRecord::new(
            task_id.clone(),
            run_id,
            process,
            self.time_provider.now_millis(),
        );
        record.start()?;
        debug!(task_id = %task_id, run_id, pid = ?record.pid(), "Task registered");
        self.registry.insert(record)?;

        self.channel.emit_update(TaskUpdate::in_progress(&task_id));

        // Spawn failures surface like any other process error: after inprogress.
        if let Some(e) = launch_failure {
            events.error(e.to_string());
        }
        Ok(())
    }

    fn on_task_kill(&mut self, request: KillRequest) -> Result<()> {
        let Some(mut record) = self.registry.remove(&request.task_id) else {
            debug!(task_id = %request.task_id, "Kill for unknown task ignored");
            return Ok(());
        };

        info!(task_id = %request.task_id, pid = ?record.pid(), "Killing child process for task");
        if !record.kill()? {
            debug!(task_id = %request.task_id, "Process already gone");
        }
        info!(task_id = %request.task_id, "Removed task from registry");
        Ok(())
    }

    fn on_process_signal(&mut self, signal: ProcessSignal) -> Result<()> {
        let ProcessSignal {
            task_id,
            run_id,
            event,
        } = signal;

        let Some(record) = self.registry.get(&task_id) else {
            debug!(task_id = %task_id, ?event, "Event for retired task ignored");
            return Ok(());
        };
        if record.run_id() != run_id {
            debug!(
                task_id = %task_id,
                run_id,
                live_run_id = record.run_id(),
                "Event from stale run ignored"
            );
            return Ok(());
        }
        if !record.notification().try_claim() {
            debug!(task_id = %task_id, ?event, "Completion already reported");
            return Ok(());
        }

        let duration_ms = record.elapsed_ms(self.time_provider.now_millis());
        let (update, success) = match event {
            ProcessEvent::Exit { code } | ProcessEvent::Close { code } => {
                info!(task_id = %task_id, exit_code = ?code, duration_ms, "Completed transcode");
                (TaskUpdate::completed(&task_id, code), code == Some(0))
            }
            ProcessEvent::Error { message } => {
                error!(task_id = %task_id, error = %message, duration_ms, "Transcoding failed");
                (TaskUpdate::failed(&task_id, message), false)
            }
        };

        self.channel.emit_update(update);
        if let Some(mut record) = self.registry.remove(&task_id) {
            record.finish(success)?;
            info!(task_id = %task_id, state = %record.state(), "Removed task from registry");
        }
        Ok(())
    }
}
