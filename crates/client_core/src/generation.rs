use shared::{
    command::CommandRequest,
    protocol::{GeneratedInstruction, GenerationMessage, GenerationStatus},
};
use tracing::{debug, info, warn};

use crate::{
    display::{DisplayLine, DisplaySink},
    error::PipelineError,
    transport::{DuplexChannel, Frame},
};

pub const GENERATION_FAILED_NOTICE: &str =
    "Due to an error in command generation, will not continue to orchestration.";

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Generated(Vec<GeneratedInstruction>),
    Failed { reason: String },
}

/// Collects instructions from the generation channel. Failures are sticky: once
/// flagged, collection continues but the outcome stays failed.
#[derive(Debug, Default)]
pub struct GenerationMachine {
    initiated: bool,
    failure: Option<String>,
    instructions: Vec<GeneratedInstruction>,
}

impl GenerationMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    pub fn on_frame(&mut self, frame: Frame) -> Vec<DisplayLine> {
        match frame {
            Frame::Text(text) => self.on_text(&text),
            Frame::Binary(_) => {
                self.fail("binary frame on the generation channel");
                vec![DisplayLine::failure(
                    "Error: received a binary message from server, this is not supported",
                )]
            }
            Frame::Close(_) => Vec::new(),
        }
    }

    fn on_text(&mut self, text: &str) -> Vec<DisplayLine> {
        match GenerationMessage::parse(text) {
            Ok(GenerationMessage::Status(status)) => self.on_status(status),
            Ok(GenerationMessage::Instruction(instruction)) => {
                if !self.initiated {
                    self.fail("instruction arrived before the initiation acknowledgment");
                    return vec![DisplayLine::failure(
                        "Received an instruction before the server acknowledged the command",
                    )];
                }
                debug!(index = self.instructions.len(), "instruction generated");
                self.instructions.push(instruction);
                Vec::new()
            }
            Err(err) => {
                self.fail(format!("malformed generation message: {err}"));
                vec![DisplayLine::failure(format!("Malformed message from server: {err}"))]
            }
        }
    }

    fn on_status(&mut self, status: GenerationStatus) -> Vec<DisplayLine> {
        if status.init_msg {
            if self.initiated {
                warn!("duplicate initiation acknowledgment");
            }
            self.initiated = true;
            if status.was_error {
                self.fail(format!("command was not understood: {}", status.message));
                return vec![DisplayLine::plain(format!(
                    "Command sent to server was not understood: {}",
                    status.message
                ))];
            }
            return vec![
                DisplayLine::plain("Executing the following command:"),
                DisplayLine::plain(status.message),
            ];
        }
        if status.was_error {
            self.fail(status.message.clone());
            return vec![DisplayLine::plain(format!(
                "{} Please see server logs for more details.",
                status.message
            ))];
        }
        vec![DisplayLine::plain(status.message)]
    }

    /// Receiving failed partway. Whatever was collected is incomplete.
    pub fn on_transport_error(&mut self, reason: impl Into<String>) {
        self.fail(reason);
    }

    pub fn finish(self) -> GenerationOutcome {
        if let Some(reason) = self.failure {
            return GenerationOutcome::Failed { reason };
        }
        if !self.initiated {
            return GenerationOutcome::Failed {
                reason: "channel closed before the initiation acknowledgment".to_string(),
            };
        }
        GenerationOutcome::Generated(self.instructions)
    }

    fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%reason, "command generation flagged a failure");
        if self.failure.is_none() {
            self.failure = Some(reason);
        }
    }
}

pub struct GenerationDriver<'a> {
    sink: &'a dyn DisplaySink,
}

impl<'a> GenerationDriver<'a> {
    pub fn new(sink: &'a dyn DisplaySink) -> Self {
        Self { sink }
    }

    /// Sends the request and collects instructions until the server closes the
    /// channel.
    pub async fn run(
        &self,
        channel: &mut dyn DuplexChannel,
        request: &CommandRequest,
    ) -> Result<GenerationOutcome, PipelineError> {
        let payload = request.to_json()?;
        channel.send(Frame::Text(payload)).await?;

        let mut machine = GenerationMachine::new();
        loop {
            match channel.recv().await {
                Some(Ok(Frame::Close(reason))) => {
                    debug!(?reason, "generation channel closed by server");
                    break;
                }
                Some(Ok(frame)) => {
                    for line in machine.on_frame(frame) {
                        self.sink.append(line);
                    }
                }
                Some(Err(err)) => {
                    machine.on_transport_error(err.to_string());
                    break;
                }
                None => break,
            }
        }
        if let Err(err) = channel.close("").await {
            debug!(%err, "generation channel close failed");
        }

        let outcome = machine.finish();
        match &outcome {
            GenerationOutcome::Generated(instructions) => {
                info!(count = instructions.len(), "command generation finished");
            }
            GenerationOutcome::Failed { reason } => {
                warn!(%reason, "command generation failed");
                self.sink.append(DisplayLine::plain(GENERATION_FAILED_NOTICE));
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
#[path = "tests/generation_tests.rs"]
mod tests;
