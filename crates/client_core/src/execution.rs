use std::collections::VecDeque;

use shared::protocol::{is_cancel_acknowledgment, GeneratedInstruction, CANCEL_FRAME};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::{
    classifier::{classify, request_line},
    display::{DisplayLine, DisplaySink},
    transport::{DuplexChannel, Frame},
    SessionState,
};

/// Every instruction gets a receipt acknowledgment and an outcome.
pub const REPLIES_PER_INSTRUCTION: u8 = 2;

pub const COMPLETION_NOTICE: &str = "End of command running.";
pub const CANCELLED_NOTICE: &str = "Command has been cancelled, end of command running.";
pub const BINARY_FRAME_NOTICE: &str = "Error: received a binary message from server, this is not supported";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionEffect {
    Send(Vec<u8>),
    Display(DisplayLine),
    Close(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPhase {
    Idle,
    AwaitingReplies,
    Done,
    Cancelled,
    Failed,
    Closed,
}

impl ExecutionPhase {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Idle | Self::AwaitingReplies)
    }
}

/// Reply counting for one execution session. Inputs are channel events and cancel
/// requests; outputs are effects for the driver to apply in order.
#[derive(Debug)]
pub struct ExecutionMachine {
    pending: VecDeque<GeneratedInstruction>,
    total: usize,
    sent: usize,
    reply_count: u8,
    phase: ExecutionPhase,
    current_tag: Option<String>,
    cancel_sent: bool,
}

impl ExecutionMachine {
    pub fn new(instructions: Vec<GeneratedInstruction>) -> Self {
        Self {
            total: instructions.len(),
            pending: instructions.into(),
            sent: 0,
            reply_count: 0,
            phase: ExecutionPhase::Idle,
            current_tag: None,
            cancel_sent: false,
        }
    }

    pub fn phase(&self) -> ExecutionPhase {
        self.phase
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Instructions sent so far. Doubles as the index of the next one.
    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn reply_count(&self) -> u8 {
        self.reply_count
    }

    pub fn on_open(&mut self) -> Vec<ExecutionEffect> {
        if self.phase != ExecutionPhase::Idle {
            return Vec::new();
        }
        let mut effects = Vec::new();
        if self.pending.is_empty() {
            self.finish(&mut effects);
            return effects;
        }
        self.phase = ExecutionPhase::AwaitingReplies;
        self.send_next(&mut effects);
        effects
    }

    pub fn on_frame(&mut self, frame: Frame) -> Vec<ExecutionEffect> {
        if self.phase != ExecutionPhase::AwaitingReplies {
            debug!(phase = ?self.phase, "ignoring frame outside of an active execution");
            return Vec::new();
        }
        match frame {
            Frame::Text(text) => self.on_text(&text),
            Frame::Binary(_) => {
                warn!(index = self.sent, "binary frame on the execution channel");
                self.phase = ExecutionPhase::Failed;
                vec![
                    ExecutionEffect::Display(DisplayLine::failure(BINARY_FRAME_NOTICE)),
                    ExecutionEffect::Close("binary messages are not supported".to_string()),
                ]
            }
            Frame::Close(reason) => self.on_close(reason),
        }
    }

    fn on_text(&mut self, text: &str) -> Vec<ExecutionEffect> {
        let mut effects = Vec::new();
        if is_cancel_acknowledgment(text) {
            info!(sent = self.sent, total = self.total, "server confirmed cancellation");
            self.phase = ExecutionPhase::Cancelled;
            effects.push(ExecutionEffect::Display(DisplayLine::plain(CANCELLED_NOTICE)));
            effects.push(ExecutionEffect::Close("cancelled".to_string()));
            return effects;
        }

        let classification = classify(text);
        effects.extend(
            classification
                .render(self.current_tag.as_deref())
                .into_iter()
                .map(ExecutionEffect::Display),
        );
        if classification.is_log() {
            return effects;
        }

        self.reply_count += 1;
        if self.reply_count < REPLIES_PER_INSTRUCTION {
            return effects;
        }
        if self.pending.is_empty() {
            self.finish(&mut effects);
        } else {
            self.send_next(&mut effects);
        }
        effects
    }

    /// The channel ended without a completion or cancellation.
    pub fn on_close(&mut self, reason: Option<String>) -> Vec<ExecutionEffect> {
        if self.phase.is_terminal() {
            return Vec::new();
        }
        info!(sent = self.sent, total = self.total, ?reason, "execution channel closed early");
        self.phase = ExecutionPhase::Closed;
        reason
            .filter(|reason| !reason.is_empty())
            .map(|reason| ExecutionEffect::Display(DisplayLine::plain(reason)))
            .into_iter()
            .collect()
    }

    /// Asks the server to stop. Only the first request is forwarded; the session
    /// stays open until the server acknowledges.
    pub fn request_cancel(&mut self) -> Vec<ExecutionEffect> {
        if self.phase != ExecutionPhase::AwaitingReplies || self.cancel_sent {
            debug!(phase = ?self.phase, "cancel request ignored");
            return Vec::new();
        }
        self.cancel_sent = true;
        info!(sent = self.sent, "sending cancel instruction");
        vec![
            ExecutionEffect::Send(CANCEL_FRAME.as_bytes().to_vec()),
            ExecutionEffect::Display(DisplayLine::plain("Cancel requested, waiting for the server to stop.")),
        ]
    }

    fn send_next(&mut self, effects: &mut Vec<ExecutionEffect>) {
        let Some(instruction) = self.pending.pop_front() else {
            return;
        };
        let view = instruction.view();
        self.current_tag = view.tag().map(str::to_string);
        debug!(index = self.sent, tag = ?self.current_tag, "sending instruction");
        effects.push(ExecutionEffect::Display(request_line(&instruction)));
        effects.push(ExecutionEffect::Send(instruction.to_frame_bytes()));
        self.sent += 1;
        self.reply_count = 0;
    }

    fn finish(&mut self, effects: &mut Vec<ExecutionEffect>) {
        info!(sent = self.sent, "all instructions completed");
        self.phase = ExecutionPhase::Done;
        effects.push(ExecutionEffect::Display(DisplayLine::plain(COMPLETION_NOTICE)));
        effects.push(ExecutionEffect::Close(COMPLETION_NOTICE.to_string()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionReport {
    pub phase: ExecutionPhase,
    pub sent: usize,
}

pub struct ExecutionDriver<'a> {
    sink: &'a dyn DisplaySink,
    state: Option<&'a watch::Sender<SessionState>>,
}

impl<'a> ExecutionDriver<'a> {
    pub fn new(sink: &'a dyn DisplaySink) -> Self {
        Self { sink, state: None }
    }

    pub fn with_state(mut self, state: &'a watch::Sender<SessionState>) -> Self {
        self.state = Some(state);
        self
    }

    /// Drives an already open execution channel to a terminal phase. Cancel requests
    /// arrive on `cancel_rx`.
    pub async fn run(
        &self,
        channel: &mut dyn DuplexChannel,
        instructions: Vec<GeneratedInstruction>,
        mut cancel_rx: mpsc::Receiver<()>,
    ) -> ExecutionReport {
        let mut machine = ExecutionMachine::new(instructions);
        let effects = machine.on_open();
        self.apply(channel, &mut machine, effects).await;

        let mut cancel_open = true;
        while !machine.is_terminal() {
            let effects = tokio::select! {
                frame = channel.recv() => match frame {
                    Some(Ok(frame)) => machine.on_frame(frame),
                    Some(Err(err)) => {
                        warn!(%err, "execution channel receive failed");
                        machine.on_close(Some(err.to_string()))
                    }
                    None => machine.on_close(None),
                },
                request = cancel_rx.recv(), if cancel_open => match request {
                    Some(()) => machine.request_cancel(),
                    None => {
                        cancel_open = false;
                        Vec::new()
                    }
                },
            };
            self.apply(channel, &mut machine, effects).await;
        }

        ExecutionReport {
            phase: machine.phase(),
            sent: machine.sent(),
        }
    }

    async fn apply(
        &self,
        channel: &mut dyn DuplexChannel,
        machine: &mut ExecutionMachine,
        effects: Vec<ExecutionEffect>,
    ) {
        let mut queue: VecDeque<ExecutionEffect> = effects.into();
        while let Some(effect) = queue.pop_front() {
            match effect {
                ExecutionEffect::Display(line) => self.sink.append(line),
                ExecutionEffect::Send(bytes) => {
                    if let Err(err) = channel.send(Frame::Binary(bytes)).await {
                        warn!(%err, "failed to send on the execution channel");
                        queue.extend(machine.on_close(Some(err.to_string())));
                    }
                }
                ExecutionEffect::Close(reason) => {
                    if let Err(err) = channel.close(&reason).await {
                        debug!(%err, "execution channel close failed");
                    }
                }
            }
        }
        if let Some(state) = self.state {
            if !machine.is_terminal() {
                state.send_replace(SessionState::Executing {
                    index: machine.sent(),
                    replies: machine.reply_count(),
                });
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/execution_tests.rs"]
mod tests;
