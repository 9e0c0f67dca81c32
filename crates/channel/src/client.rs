//! Control channel client
//!
//! One task owns the WebSocket. It (re)connects with backoff, announces the
//! worker on every connection, forwards orchestrator events to the supervisor
//! and writes task updates and stats acks back.
//!
//! The Engine.IO/Socket.IO client is implemented here rather than taken from a
//! crate: no maintained async Socket.IO client handled server-initiated acks on
//! tokio, and the reconnect policy needs to own the outbox between sessions.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};
use url::Url;

use plexfarm_core::application::ShutdownToken;
use plexfarm_core::domain::{
    InboundMessage, TaskUpdate, WorkerEvent, WorkerEventSender, WorkerIdentity, WorkerStats,
};
use plexfarm_core::port::ControlChannel;

use crate::backoff::{Backoff, BackoffConfig};
use crate::error::ChannelError;
use crate::handler::{decode_event, InboundEvent};
use crate::outbox::Outbox;
use crate::packet::{EnginePacket, Handshake, SocketPacket};
use crate::types::{EVENT_ANNOUNCE, EVENT_TASK_UPDATE};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Upper bound for the Engine.IO open + Socket.IO connect exchange
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

/// Deadline used when a heartbeat window overflows `Instant` (about 30 years)
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Orchestrator base URL (`http`, `https`, `ws` or `wss`)
    pub url: String,
    pub backoff: BackoffConfig,
    /// Updates held while disconnected (0 drops them)
    pub update_buffer: usize,
}

/// Messages written by the socket task
#[derive(Debug)]
enum Outbound {
    Update(TaskUpdate),
    /// Stats answer; only valid on the session that asked
    Ack {
        session: u64,
        id: u64,
        stats: WorkerStats,
    },
}

/// Cloneable sender side handed to the supervisor
#[derive(Clone)]
pub struct ChannelHandle {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ControlChannel for ChannelHandle {
    fn emit_update(&self, update: TaskUpdate) {
        if self.tx.send(Outbound::Update(update)).is_err() {
            debug!("Control channel stopped, task update discarded");
        }
    }
}

/// Socket.IO client bound to one orchestrator
pub struct ChannelClient {
    config: ChannelConfig,
    identity: WorkerIdentity,
    inbound: WorkerEventSender,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    outbox: Outbox,
    backoff: Backoff,
    session: u64,
}

impl ChannelClient {
    /// Create a client delivering orchestrator messages to `inbound`
    pub fn new(
        config: ChannelConfig,
        identity: WorkerIdentity,
        inbound: WorkerEventSender,
    ) -> (Self, ChannelHandle) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let handle = ChannelHandle {
            tx: outbound_tx.clone(),
        };
        let client = Self {
            outbox: Outbox::new(config.update_buffer),
            backoff: Backoff::new(config.backoff.clone()),
            config,
            identity,
            inbound,
            outbound_tx,
            outbound_rx,
            session: 0,
        };
        (client, handle)
    }

    /// WebSocket endpoint for an orchestrator base URL
    ///
    /// # Example
    /// ```ignore
    /// let url = ChannelClient::socket_url("http://localhost:3500")?;
    /// assert_eq!(url.as_str(), "ws://localhost:3500/socket.io/?EIO=4&transport=websocket");
    /// ```
    pub fn socket_url(base: &str) -> Result<Url, ChannelError> {
        let mut url =
            Url::parse(base).map_err(|e| ChannelError::InvalidUrl(format!("{}: {}", base, e)))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(ChannelError::InvalidUrl(format!(
                    "unsupported scheme '{}' in {}",
                    other, base
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ChannelError::InvalidUrl(base.to_string()))?;
        url.set_path("/socket.io/");
        url.set_query(Some("EIO=4&transport=websocket"));
        Ok(url)
    }

    /// Stay connected until shutdown.
    ///
    /// Returns an error only when reconnect attempts are exhausted or the
    /// supervisor loop is gone.
    pub async fn run(mut self, mut shutdown: ShutdownToken) -> Result<(), ChannelError> {
        let url = Self::socket_url(&self.config.url)?;
        info!(url = %url, "Control channel starting");

        loop {
            let outcome = tokio::select! {
                _ = shutdown.wait() => break,
                outcome = self.session(&url) => outcome,
            };

            match outcome {
                Err(ChannelError::SupervisorGone) => return Err(ChannelError::SupervisorGone),
                Err(e) => warn!(
                    error = %e,
                    attempt = self.backoff.attempts() + 1,
                    "Control channel unavailable"
                ),
                Ok(()) => {}
            }

            let Some(delay) = self.backoff.next_delay() else {
                return Err(ChannelError::ReconnectExhausted(self.backoff.attempts()));
            };
            debug!(delay_ms = delay.as_millis() as u64, "Reconnecting to orchestrator");

            tokio::select! {
                _ = shutdown.wait() => break,
                _ = self.idle(delay) => {}
            }
        }

        info!("Control channel stopped");
        Ok(())
    }

    /// Wait out a backoff delay while holding updates for the next session
    async fn idle(&mut self, delay: Duration) {
        let deadline = sleep_until(Instant::now() + delay);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => return,
                Some(message) = self.outbound_rx.recv() => self.hold(message),
            }
        }
    }

    fn hold(&mut self, message: Outbound) {
        match message {
            Outbound::Update(update) => self.outbox.push(update),
            Outbound::Ack { session, id, .. } => {
                debug!(session, ack_id = id, "Stats answer for a closed session dropped")
            }
        }
    }

    /// One connection, from handshake to disconnect
    async fn session(&mut self, url: &Url) -> Result<(), ChannelError> {
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (mut sink, mut source) = ws.split();

        let handshake = tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(&mut sink, &mut source))
            .await
            .map_err(|_| ChannelError::Handshake("timed out".to_string()))??;

        self.session += 1;
        self.backoff.reset();
        info!(sid = %handshake.sid, session = self.session, "Worker connected on socket");

        let result = self.serve(&mut sink, &mut source, &handshake).await;
        match &result {
            Ok(()) => info!(session = self.session, "Worker disconnected"),
            Err(e) => info!(session = self.session, reason = %e, "Worker disconnected"),
        }
        let _ = sink.close().await;
        result
    }

    async fn serve(
        &mut self,
        sink: &mut WsSink,
        source: &mut WsSource,
        handshake: &Handshake,
    ) -> Result<(), ChannelError> {
        let identity = serde_json::to_value(&self.identity)?;
        let announce = SocketPacket::event(EVENT_ANNOUNCE, vec![identity]);
        send(sink, announce.into_frame()).await?;
        debug!(worker_id = %self.identity.worker_id, "Announced worker");

        self.flush_outbox(sink).await?;

        let heartbeat = heartbeat_window(handshake);
        let mut last_inbound = Instant::now();

        loop {
            tokio::select! {
                frame = source.next() => {
                    last_inbound = Instant::now();
                    match frame {
                        Some(Ok(Message::Text(text))) => self.on_frame(sink, text.as_str()).await?,
                        Some(Ok(Message::Close(_))) | None => return Err(ChannelError::Closed),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                }
                Some(message) = self.outbound_rx.recv() => self.deliver(sink, message).await?,
                _ = sleep_until(heartbeat_deadline(last_inbound, heartbeat)) => {
                    return Err(ChannelError::HeartbeatTimeout(heartbeat.as_millis() as u64));
                }
            }
        }
    }

    async fn flush_outbox(&mut self, sink: &mut WsSink) -> Result<(), ChannelError> {
        if !self.outbox.is_empty() {
            info!(pending = self.outbox.len(), "Replaying task updates held while disconnected");
        }
        while let Some(update) = self.outbox.pop() {
            if let Err(e) = send_update(sink, &update).await {
                self.outbox.requeue(update);
                return Err(e);
            }
        }
        Ok(())
    }

    async fn deliver(&mut self, sink: &mut WsSink, message: Outbound) -> Result<(), ChannelError> {
        match message {
            Outbound::Update(update) => {
                if let Err(e) = send_update(sink, &update).await {
                    self.outbox.push(update);
                    return Err(e);
                }
                Ok(())
            }
            Outbound::Ack { session, id, stats } if session == self.session => {
                let ack = SocketPacket::Ack {
                    id,
                    args: vec![serde_json::to_value(stats)?],
                };
                send(sink, ack.into_frame()).await
            }
            stale => {
                self.hold(stale);
                Ok(())
            }
        }
    }

    async fn on_frame(&mut self, sink: &mut WsSink, frame: &str) -> Result<(), ChannelError> {
        trace!(frame, "Socket recv");
        let packet = match EnginePacket::decode(frame) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "Dropping unreadable frame");
                return Ok(());
            }
        };

        match packet {
            EnginePacket::Ping => send(sink, EnginePacket::Pong.encode()).await,
            EnginePacket::Close => Err(ChannelError::Closed),
            EnginePacket::Message(body) => self.on_packet(&body),
            _ => Ok(()),
        }
    }

    fn on_packet(&mut self, body: &str) -> Result<(), ChannelError> {
        let packet = match SocketPacket::decode(body) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "Dropping unreadable packet");
                return Ok(());
            }
        };

        match packet {
            SocketPacket::Event { id, name, args } => self.on_event(id, &name, &args),
            SocketPacket::Disconnect => Err(ChannelError::Closed),
            other => {
                debug!(packet = ?other, "Ignoring packet");
                Ok(())
            }
        }
    }

    fn on_event(
        &mut self,
        ack_id: Option<u64>,
        name: &str,
        args: &[Value],
    ) -> Result<(), ChannelError> {
        let event = match decode_event(name, args) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(event = name, "Ignoring unknown event");
                return Ok(());
            }
            Err(e) => {
                warn!(error = %e, "Rejected orchestrator message");
                return Ok(());
            }
        };

        let message = match event {
            InboundEvent::TaskRequest(request) => InboundMessage::TaskRequest(request),
            InboundEvent::TaskKill(request) => InboundMessage::TaskKill(request),
            InboundEvent::Stats => {
                let Some(id) = ack_id else {
                    debug!("Stats request without ack id ignored");
                    return Ok(());
                };
                let (reply_tx, reply_rx) = oneshot::channel();
                self.answer_stats(id, reply_rx);
                InboundMessage::Stats(reply_tx)
            }
        };

        self.inbound
            .send(WorkerEvent::Inbound(message))
            .map_err(|_| ChannelError::SupervisorGone)
    }

    /// Route the supervisor's answer back as an ack on this session
    fn answer_stats(&self, id: u64, reply: oneshot::Receiver<WorkerStats>) {
        let session = self.session;
        let outbound = self.outbound_tx.clone();
        tokio::spawn(async move {
            if let Ok(stats) = reply.await {
                let _ = outbound.send(Outbound::Ack { session, id, stats });
            }
        });
    }
}

/// Silence tolerated before a session is considered lost
fn heartbeat_window(handshake: &Handshake) -> Duration {
    Duration::from_millis(handshake.ping_interval.saturating_add(handshake.ping_timeout))
}

/// Saturates at a far-future instant if the window does not fit
fn heartbeat_deadline(last_inbound: Instant, window: Duration) -> Instant {
    last_inbound
        .checked_add(window)
        .unwrap_or_else(|| last_inbound + FAR_FUTURE)
}

/// Engine.IO open, then Socket.IO connect on the default namespace
async fn handshake(sink: &mut WsSink, source: &mut WsSource) -> Result<Handshake, ChannelError> {
    let open = match next_packet(source).await? {
        EnginePacket::Open(open) => open,
        other => {
            return Err(ChannelError::Handshake(format!(
                "expected open packet, got {:?}",
                other
            )))
        }
    };
    send(sink, SocketPacket::Connect(None).into_frame()).await?;

    loop {
        match next_packet(source).await? {
            EnginePacket::Ping => send(sink, EnginePacket::Pong.encode()).await?,
            EnginePacket::Close => return Err(ChannelError::Closed),
            EnginePacket::Message(body) => match SocketPacket::decode(&body)? {
                SocketPacket::Connect(_) => return Ok(open),
                SocketPacket::ConnectError(data) => {
                    return Err(ChannelError::Handshake(format!("connection refused: {}", data)))
                }
                other => debug!(packet = ?other, "Packet before connect ignored"),
            },
            _ => {}
        }
    }
}

async fn next_packet(source: &mut WsSource) -> Result<EnginePacket, ChannelError> {
    loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => return Ok(EnginePacket::decode(text.as_str())?),
            Some(Ok(Message::Close(_))) | None => return Err(ChannelError::Closed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

async fn send_update(sink: &mut WsSink, update: &TaskUpdate) -> Result<(), ChannelError> {
    let packet = SocketPacket::event(EVENT_TASK_UPDATE, vec![serde_json::to_value(update)?]);
    send(sink, packet.into_frame()).await
}

async fn send(sink: &mut WsSink, frame: String) -> Result<(), ChannelError> {
    trace!(frame = %frame, "Socket send");
    sink.send(Message::Text(frame.into())).await?;
    Ok(())
}
