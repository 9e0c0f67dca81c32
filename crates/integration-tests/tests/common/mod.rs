//! Shared harness: an in-process orchestrator and a fully wired worker

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use plexfarm_channel::packet::{EnginePacket, SocketPacket};
use plexfarm_channel::{BackoffConfig, ChannelClient, ChannelConfig, ChannelError, ChannelHandle};
use plexfarm_core::application::{shutdown_channel, ShutdownReason, ShutdownSender, Supervisor};
use plexfarm_core::domain::{worker_event_channel, TaskPayload, WorkerIdentity};
use plexfarm_core::port::time_provider::SystemTimeProvider;
use plexfarm_core::port::ProcessLauncher;
use plexfarm_infra_system::TranscoderLauncher;

pub const WAIT: Duration = Duration::from_secs(5);
pub const WORKER_ID: &str = "worker-it";
pub const WORKER_HOST: &str = "it-host";

/// `/bin/sh` standing in for the transcoder
pub fn shell_launcher() -> TranscoderLauncher {
    TranscoderLauncher::new("/bin", "sh")
}

pub fn script(body: &str) -> TaskPayload {
    TaskPayload {
        args: vec!["-c".to_string(), body.to_string()],
        cwd: None,
        env: None,
    }
}

/// Fake orchestrator speaking Engine.IO v4 / Socket.IO v5 over WebSocket
pub struct FakeOrchestrator {
    listener: TcpListener,
}

impl FakeOrchestrator {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self { listener }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.listener.local_addr().unwrap())
    }

    /// Accept the next worker connection and send the Engine.IO open packet
    pub async fn accept(&self) -> OrchestratorSession {
        self.accept_with_heartbeat(25_000, 20_000).await
    }

    /// Like `accept`, advertising the given ping interval and timeout (ms)
    pub async fn accept_with_heartbeat(
        &self,
        ping_interval: u64,
        ping_timeout: u64,
    ) -> OrchestratorSession {
        let (stream, _) = tokio::time::timeout(WAIT, self.listener.accept())
            .await
            .expect("worker did not connect")
            .unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut session = OrchestratorSession { ws };
        let open = json!({
            "sid": "it-sid",
            "upgrades": [],
            "pingInterval": ping_interval,
            "pingTimeout": ping_timeout,
            "maxPayload": 1000000,
        });
        session.send(&format!("0{}", open)).await;
        session
    }

    /// Accept, complete the namespace connect and consume the announce
    pub async fn accept_connected(&self) -> (OrchestratorSession, Value) {
        let session = self.accept().await;
        session.connect_namespace().await
    }

    pub async fn accept_connected_with_heartbeat(
        &self,
        ping_interval: u64,
        ping_timeout: u64,
    ) -> (OrchestratorSession, Value) {
        let session = self.accept_with_heartbeat(ping_interval, ping_timeout).await;
        session.connect_namespace().await
    }
}

pub struct OrchestratorSession {
    ws: WebSocketStream<TcpStream>,
}

impl OrchestratorSession {
    async fn connect_namespace(mut self) -> (Self, Value) {
        assert_eq!(self.recv_frame().await, "40");
        self.send(r#"40{"sid":"it-socket"}"#).await;
        let announce = self.expect_event("worker.announce").await;
        (self, announce)
    }

    pub async fn send(&mut self, frame: &str) {
        self.ws.send(Message::Text(frame.to_string().into())).await.unwrap();
    }

    pub async fn emit(&mut self, event: &str, payload: Value) {
        let frame = SocketPacket::event(event, vec![payload]).into_frame();
        self.send(&frame).await;
    }

    /// Next text frame from the worker
    pub async fn recv_frame(&mut self) -> String {
        tokio::time::timeout(WAIT, self.next_text())
            .await
            .expect("no frame from worker")
            .expect("worker closed the socket")
    }

    /// Next frame, or `None` if nothing arrives within `window`
    pub async fn try_recv_frame(&mut self, window: Duration) -> Option<String> {
        tokio::time::timeout(window, self.next_text())
            .await
            .ok()
            .flatten()
    }

    async fn next_text(&mut self) -> Option<String> {
        while let Some(message) = self.ws.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(text.as_str().to_string()),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
        None
    }

    /// Next Socket.IO packet carried in a message frame
    pub async fn recv_packet(&mut self) -> SocketPacket {
        loop {
            let frame = self.recv_frame().await;
            if let EnginePacket::Message(body) = EnginePacket::decode(&frame).unwrap() {
                return SocketPacket::decode(&body).unwrap();
            }
        }
    }

    /// First argument of the next event, which must be `name`
    pub async fn expect_event(&mut self, name: &str) -> Value {
        match self.recv_packet().await {
            SocketPacket::Event {
                name: received,
                mut args,
                ..
            } => {
                assert_eq!(received, name);
                args.remove(0)
            }
            other => panic!("expected {} event, got {:?}", name, other),
        }
    }

    /// Ask for stats with ack id `id` and return the acknowledged payload
    pub async fn query_stats(&mut self, id: u64) -> Value {
        self.send(&format!(r#"42{}["worker.stats"]"#, id)).await;
        loop {
            match self.recv_packet().await {
                SocketPacket::Ack { id: acked, mut args } if acked == id => return args.remove(0),
                SocketPacket::Ack { .. } => continue,
                other => panic!("expected stats ack, got {:?}", other),
            }
        }
    }

    /// Collect task updates until one with status `done` arrives
    pub async fn updates_until_done(&mut self) -> Vec<Value> {
        let mut updates = Vec::new();
        loop {
            let update = self.expect_event("worker.task.update").await;
            let done = update["status"] == json!("done");
            updates.push(update);
            if done {
                return updates;
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }

    /// True once the worker has dropped this connection
    pub async fn closed_by_worker(&mut self) -> bool {
        tokio::time::timeout(WAIT, self.next_text())
            .await
            .map(|frame| frame.is_none())
            .unwrap_or(false)
    }
}

/// Supervisor plus control channel, as the daemon wires them
pub struct WorkerUnderTest {
    pub handle: ChannelHandle,
    shutdown: ShutdownSender,
    channel_task: JoinHandle<Result<(), ChannelError>>,
}

impl WorkerUnderTest {
    pub fn start(url: &str, launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self::start_with_attempts(url, launcher, None)
    }

    /// Worker that gives up after `max_attempts` failed reconnects
    pub fn start_with_attempts(
        url: &str,
        launcher: Arc<dyn ProcessLauncher>,
        max_attempts: Option<u32>,
    ) -> Self {
        let (events_tx, events_rx) = worker_event_channel();
        let (shutdown, token) = shutdown_channel();

        let config = ChannelConfig {
            url: url.to_string(),
            backoff: BackoffConfig {
                base: Duration::from_millis(20),
                max: Duration::from_millis(100),
                randomization: 0.0,
                max_attempts,
            },
            update_buffer: 16,
        };
        let identity = WorkerIdentity {
            worker_id: WORKER_ID.to_string(),
            host: WORKER_HOST.to_string(),
        };
        let (client, handle) = ChannelClient::new(config, identity, events_tx.clone());
        let supervisor = Supervisor::new(
            launcher,
            Arc::new(handle.clone()),
            Arc::new(SystemTimeProvider),
            events_tx,
        );

        tokio::spawn(supervisor.run(events_rx, token.clone()));
        let channel_task = tokio::spawn(client.run(token));
        Self {
            handle,
            shutdown,
            channel_task,
        }
    }

    /// Wait for the channel loop to end on its own
    pub async fn finished(self) -> Result<(), ChannelError> {
        let WorkerUnderTest {
            channel_task,
            shutdown: _shutdown,
            ..
        } = self;
        tokio::time::timeout(WAIT, channel_task)
            .await
            .expect("channel kept running")
            .unwrap()
    }

    pub async fn stop(self) {
        self.shutdown.shutdown(ShutdownReason::Requested);
        let result = tokio::time::timeout(WAIT, self.channel_task)
            .await
            .expect("channel did not stop")
            .unwrap();
        tokio_test::assert_ok!(result);
    }
}
