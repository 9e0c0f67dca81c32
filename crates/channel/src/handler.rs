//! Inbound event decoding
//!
//! Maps orchestrator events onto supervisor messages. Unknown events are
//! ignored, malformed payloads are rejected with the event name attached.

use serde::de::DeserializeOwned;
use serde_json::Value;

use plexfarm_core::domain::{KillRequest, TaskRequest};

use crate::error::ChannelError;
use crate::types::{EVENT_STATS, EVENT_TASK_KILL, EVENT_TASK_REQUEST};

/// Orchestrator event the worker understands
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Stats query; needs the packet's ack id to be answered
    Stats,
    TaskRequest(TaskRequest),
    TaskKill(KillRequest),
}

/// Decode a named event. `Ok(None)` for events outside the worker contract.
pub fn decode_event(name: &str, args: &[Value]) -> Result<Option<InboundEvent>, ChannelError> {
    match name {
        EVENT_STATS => Ok(Some(InboundEvent::Stats)),
        EVENT_TASK_REQUEST => first_arg(name, args).map(|r| Some(InboundEvent::TaskRequest(r))),
        EVENT_TASK_KILL => first_arg(name, args).map(|r| Some(InboundEvent::TaskKill(r))),
        _ => Ok(None),
    }
}

fn first_arg<T: DeserializeOwned>(event: &str, args: &[Value]) -> Result<T, ChannelError> {
    let value = args.first().ok_or_else(|| ChannelError::InvalidPayload {
        event: event.to_string(),
        reason: "missing argument".to_string(),
    })?;
    serde_json::from_value(value.clone()).map_err(|e| ChannelError::InvalidPayload {
        event: event.to_string(),
        reason: e.to_string(),
    })
}
