use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde_json::json;
use shared::protocol::{CANCEL_ACKNOWLEDGMENT, CANCEL_FRAME, INSTRUCTION_RECEIVED};

use crate::transport::{ChannelConnector, DuplexChannel, Endpoint, Frame, TransportError};

type Responder = Box<dyn FnMut(&Frame) -> Vec<Frame> + Send>;

#[derive(Debug, Default)]
pub(crate) struct ChannelLog {
    pub sent: Vec<Frame>,
    pub closed_with: Option<String>,
}

/// In-memory channel. Inbound frames come from a preloaded queue plus whatever the
/// responder returns for each outbound frame.
pub(crate) struct ScriptedChannel {
    inbound: VecDeque<Frame>,
    responder: Responder,
    log: Arc<Mutex<ChannelLog>>,
    hang_when_drained: bool,
    fail_sends: bool,
}

impl ScriptedChannel {
    pub fn new(inbound: Vec<Frame>) -> Self {
        Self {
            inbound: inbound.into(),
            responder: Box::new(|_| Vec::new()),
            log: Arc::new(Mutex::new(ChannelLog::default())),
            hang_when_drained: false,
            fail_sends: false,
        }
    }

    pub fn responding(responder: impl FnMut(&Frame) -> Vec<Frame> + Send + 'static) -> Self {
        let mut channel = Self::new(Vec::new());
        channel.responder = Box::new(responder);
        channel
    }

    /// Keeps `recv` pending once the queue is empty instead of reporting the end of
    /// the channel.
    pub fn hanging(mut self) -> Self {
        self.hang_when_drained = true;
        self
    }

    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    pub fn log(&self) -> Arc<Mutex<ChannelLog>> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl DuplexChannel for ScriptedChannel {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if self.fail_sends {
            return Err(TransportError::Send("connection reset".into()));
        }
        let replies = (self.responder)(&frame);
        self.log.lock().expect("log lock").sent.push(frame);
        self.inbound.extend(replies);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        if self.log.lock().expect("log lock").closed_with.is_some() {
            return None;
        }
        match self.inbound.pop_front() {
            Some(frame) => Some(Ok(frame)),
            None if self.hang_when_drained => std::future::pending().await,
            None => None,
        }
    }

    async fn close(&mut self, reason: &str) -> Result<(), TransportError> {
        let mut log = self.log.lock().expect("log lock");
        if log.closed_with.is_none() {
            log.closed_with = Some(reason.to_string());
        }
        Ok(())
    }
}

pub(crate) fn text(value: serde_json::Value) -> Frame {
    Frame::Text(value.to_string())
}

pub(crate) fn init_ack(message: &str) -> Frame {
    text(json!({"init_msg": true, "message": message, "was_error": false}))
}

pub(crate) fn instruction(tag: &str) -> Frame {
    text(json!({"instruction": tag}))
}

pub(crate) fn deploy(guest: &str) -> Frame {
    text(json!({"instruction": {"Deploy": [{"Guest": {"name": guest}}]}}))
}

pub(crate) fn log_line(message: &str) -> Frame {
    text(json!({"Log": {"message": message, "level": "Info"}}))
}

pub(crate) fn generic(is_success: bool, message: &str) -> Frame {
    text(json!({"Generic": {"is_success": is_success, "message": message}}))
}

pub(crate) fn is_cancel(frame: &Frame) -> bool {
    matches!(frame, Frame::Binary(bytes) if bytes.as_slice() == CANCEL_FRAME.as_bytes())
}

/// Execution responder that answers every instruction with a log line, the receipt
/// acknowledgment and a successful result.
pub(crate) fn well_behaved_server() -> impl FnMut(&Frame) -> Vec<Frame> + Send + 'static {
    let mut count = 0;
    move |frame| {
        if is_cancel(frame) {
            return vec![Frame::Text(CANCEL_ACKNOWLEDGMENT.to_string())];
        }
        count += 1;
        vec![
            log_line(&format!("working on instruction {count}")),
            Frame::Text(INSTRUCTION_RECEIVED.to_string()),
            generic(true, &format!("instruction {count} done")),
        ]
    }
}

/// Hands out one prepared channel per endpoint.
#[derive(Default)]
pub(crate) struct FakeConnector {
    generation: Mutex<Option<ScriptedChannel>>,
    execution: Mutex<Option<ScriptedChannel>>,
    opened: Mutex<Vec<Endpoint>>,
}

impl FakeConnector {
    pub fn new(generation: ScriptedChannel, execution: Option<ScriptedChannel>) -> Self {
        Self {
            generation: Mutex::new(Some(generation)),
            execution: Mutex::new(execution),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn opened(&self) -> Vec<Endpoint> {
        self.opened.lock().expect("opened lock").clone()
    }
}

#[async_trait]
impl ChannelConnector for FakeConnector {
    async fn open(&self, endpoint: Endpoint) -> Result<Box<dyn DuplexChannel>, TransportError> {
        self.opened.lock().expect("opened lock").push(endpoint);
        let slot = match endpoint {
            Endpoint::Generation => &self.generation,
            Endpoint::Execution => &self.execution,
        };
        match slot.lock().expect("slot lock").take() {
            Some(channel) => Ok(Box::new(channel)),
            None => Err(TransportError::Connect {
                url: format!("fake://{endpoint:?}"),
                reason: "connection refused".into(),
            }),
        }
    }
}
