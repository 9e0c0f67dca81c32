//! Control Channel
//!
//! Socket.IO (protocol v5, Engine.IO v4) client over WebSocket that keeps the
//! worker attached to its orchestrator.

pub mod backoff;
pub mod client;
pub mod error;
pub mod handler;
pub mod outbox;
pub mod packet;
pub mod types;

pub use backoff::{Backoff, BackoffConfig};
pub use client::{ChannelClient, ChannelConfig, ChannelHandle};
pub use error::{ChannelError, PacketError};
pub use handler::{decode_event, InboundEvent};
pub use outbox::Outbox;
