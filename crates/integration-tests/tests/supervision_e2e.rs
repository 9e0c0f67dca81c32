//! Task supervision with real processes
//!
//! `/bin/sh` plays the transcoder; updates are captured by a recording channel.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use common::{script, shell_launcher, WAIT};
use plexfarm_core::application::{shutdown_channel, ShutdownReason, ShutdownSender, Supervisor};
use plexfarm_core::domain::{
    worker_event_channel, InboundMessage, KillRequest, TaskPayload, TaskRequest, TaskStatus,
    TaskUpdate, WorkerEvent, WorkerEventSender, WorkerStats,
};
use plexfarm_core::port::control_channel::mocks::RecordingChannel;
use plexfarm_core::port::time_provider::SystemTimeProvider;
use plexfarm_core::port::ProcessLauncher;
use plexfarm_infra_system::TranscoderLauncher;

struct Worker {
    events: WorkerEventSender,
    channel: RecordingChannel,
    _shutdown: ShutdownSender,
}

impl Worker {
    fn start(launcher: impl ProcessLauncher + 'static) -> Self {
        let (events, events_rx) = worker_event_channel();
        let (shutdown, token) = shutdown_channel();
        let channel = RecordingChannel::new();
        let supervisor = Supervisor::new(
            Arc::new(launcher),
            Arc::new(channel.clone()),
            Arc::new(SystemTimeProvider),
            events.clone(),
        );
        tokio::spawn(supervisor.run(events_rx, token));
        Self {
            events,
            channel,
            _shutdown: shutdown,
        }
    }

    fn request(&self, task_id: &str, payload: TaskPayload) {
        self.events
            .send(WorkerEvent::Inbound(InboundMessage::TaskRequest(
                TaskRequest::new(task_id, payload),
            )))
            .unwrap();
    }

    fn kill(&self, task_id: &str) {
        self.events
            .send(WorkerEvent::Inbound(InboundMessage::TaskKill(KillRequest {
                task_id: task_id.to_string(),
            })))
            .unwrap();
    }

    async fn stats(&self) -> WorkerStats {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(WorkerEvent::Inbound(InboundMessage::Stats(tx)))
            .unwrap();
        rx.await.unwrap()
    }

    /// Wait for the terminal update of `task_id`
    async fn done(&self, task_id: &str) -> TaskUpdate {
        tokio::time::timeout(WAIT, async {
            loop {
                if let Some(done) = self
                    .channel
                    .updates_for(task_id)
                    .into_iter()
                    .find(TaskUpdate::is_terminal)
                {
                    return done;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("task never completed")
    }

    fn statuses(&self, task_id: &str) -> Vec<TaskStatus> {
        self.channel
            .updates_for(task_id)
            .into_iter()
            .map(|u| u.status)
            .collect()
    }
}

#[tokio::test]
async fn test_successful_transcode() {
    let worker = Worker::start(shell_launcher());
    worker.request("t1", script("echo transcoding; exit 0"));

    let done = worker.done("t1").await;
    assert_eq!(done, TaskUpdate::completed("t1", Some(0)));
    assert_eq!(
        worker.statuses("t1"),
        vec![TaskStatus::Received, TaskStatus::InProgress, TaskStatus::Done]
    );

    // Close follows exit; it must not produce a second done
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(worker.statuses("t1").len(), 3);
    assert_eq!(worker.stats().await.tasks, 0);
}

#[tokio::test]
async fn test_failed_transcode_carries_exit_code() {
    let worker = Worker::start(shell_launcher());
    worker.request("t1", script("exit 187"));

    let done = worker.done("t1").await;
    assert_eq!(done.result, Some(false));
    assert_eq!(done.exit_code, Some(187));
    assert_eq!(done.error, None);
}

#[tokio::test]
async fn test_signal_death_has_no_exit_code() {
    let worker = Worker::start(shell_launcher());
    worker.request("t1", script("kill -TERM $$"));

    let done = worker.done("t1").await;
    assert_eq!(done.result, Some(false));
    assert_eq!(done.exit_code, None);
}

#[tokio::test]
async fn test_missing_transcoder_reports_error() {
    let worker = Worker::start(TranscoderLauncher::new("/nonexistent/plex", "Plex Transcoder"));
    worker.request("t1", script("true"));

    let done = worker.done("t1").await;
    assert_eq!(done.result, Some(false));
    assert!(done.error.unwrap().contains("No such file or directory"));
    assert_eq!(
        worker.statuses("t1"),
        vec![TaskStatus::Received, TaskStatus::InProgress, TaskStatus::Done]
    );
    assert_eq!(worker.stats().await.tasks, 0);
}

#[tokio::test]
async fn test_kill_leaves_no_completion() {
    let worker = Worker::start(shell_launcher());
    worker.request("t2", script("exec sleep 30"));
    assert_eq!(worker.stats().await.tasks, 1);

    worker.kill("t2");
    assert_eq!(worker.stats().await.tasks, 0);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(
        worker.statuses("t2"),
        vec![TaskStatus::Received, TaskStatus::InProgress]
    );
}

#[tokio::test]
async fn test_redispatch_after_kill_completes_once() {
    let worker = Worker::start(shell_launcher());
    worker.request("t1", script("exec sleep 30"));
    worker.kill("t1");
    worker.request("t1", script("exit 0"));

    let done = worker.done("t1").await;
    assert_eq!(done.exit_code, Some(0));

    tokio::time::sleep(Duration::from_millis(300)).await;
    let terminal = worker
        .channel
        .updates_for("t1")
        .into_iter()
        .filter(TaskUpdate::is_terminal)
        .count();
    assert_eq!(terminal, 1);
}

#[tokio::test]
async fn test_concurrent_tasks_complete_independently() {
    let worker = Worker::start(shell_launcher());
    for (i, id) in ["a", "b", "c"].iter().enumerate() {
        worker.request(id, script(&format!("sleep 0.{}; exit {}", i + 1, i)));
    }
    assert_eq!(worker.stats().await.tasks, 3);

    for (i, id) in ["a", "b", "c"].iter().enumerate() {
        assert_eq!(worker.done(id).await.exit_code, Some(i as i32));
    }
    assert_eq!(worker.stats().await.tasks, 0);
}

#[tokio::test]
async fn test_env_and_cwd_reach_the_process() {
    let worker = Worker::start(shell_launcher());
    let mut env = HashMap::new();
    env.insert("PLEX_MEDIA_SERVER_INFO_DEVICE".to_string(), "worker".to_string());
    let payload = TaskPayload {
        cwd: Some("/".to_string()),
        env: Some(env),
        ..script(r#"[ "$(pwd)" = / ] && [ "$PLEX_MEDIA_SERVER_INFO_DEVICE" = worker ]"#)
    };
    worker.request("t1", payload);

    assert_eq!(worker.done("t1").await.exit_code, Some(0));
}

#[tokio::test]
async fn test_shutdown_stops_the_loop() {
    let (events, events_rx) = worker_event_channel();
    let (shutdown, token) = shutdown_channel();
    let supervisor = Supervisor::new(
        Arc::new(shell_launcher()),
        Arc::new(RecordingChannel::new()),
        Arc::new(SystemTimeProvider),
        events,
    );
    let handle = tokio::spawn(supervisor.run(events_rx, token));

    shutdown.shutdown(ShutdownReason::Signal(15));
    let result = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    tokio_test::assert_ok!(result);
}
