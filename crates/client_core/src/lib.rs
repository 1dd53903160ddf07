pub mod classifier;
pub mod command_builder;
pub mod display;
pub mod error;
pub mod execution;
pub mod generation;
pub mod state_refresh;
pub mod transport;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use shared::{command::CommandRequest, domain::DeploymentStatus, protocol::GeneratedInstruction};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub use command_builder::{build_command, FieldValue, FormState};
pub use display::{ConnectionIndicator, DisplayLine, DisplaySink, MemorySink, Tone};
pub use error::{PipelineError, StateQueryError};
pub use state_refresh::{HttpStateQuery, MissingStateQuery, StateQuery};
pub use transport::{ChannelConnector, DuplexChannel, Endpoint, Frame, TransportError, WsConnector};

use execution::{ExecutionDriver, ExecutionPhase, ExecutionReport};
use generation::{GenerationDriver, GenerationOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Generating,
    GenerationFailed,
    /// `index` instructions have been sent; `replies` have arrived for the latest.
    Executing { index: usize, replies: u8 },
    Done,
    Cancelled,
    Failed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    GenerationFailed,
    Done,
    Cancelled,
    Failed,
    Closed,
}

impl SessionOutcome {
    fn state(self) -> SessionState {
        match self {
            Self::GenerationFailed => SessionState::GenerationFailed,
            Self::Done => SessionState::Done,
            Self::Cancelled => SessionState::Cancelled,
            Self::Failed => SessionState::Failed,
            Self::Closed => SessionState::Closed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub outcome: SessionOutcome,
    pub instructions_generated: usize,
    pub instructions_sent: usize,
    /// Deployment state read after the session, if the lookup succeeded.
    pub deployment_status: Option<DeploymentStatus>,
}

/// Runs one command at a time through generation and execution, then refreshes the
/// deployment state.
pub struct CommandRunner {
    connector: Arc<dyn ChannelConnector>,
    state_query: Arc<dyn StateQuery>,
    sink: Arc<dyn DisplaySink>,
    indicator: ConnectionIndicator,
    state: watch::Sender<SessionState>,
    busy: AtomicBool,
    cancel: Mutex<Option<mpsc::Sender<()>>>,
}

impl CommandRunner {
    pub fn new(connector: Arc<dyn ChannelConnector>, sink: Arc<dyn DisplaySink>) -> Arc<Self> {
        Self::new_with_state_query(connector, Arc::new(MissingStateQuery), sink)
    }

    pub fn new_with_state_query(
        connector: Arc<dyn ChannelConnector>,
        state_query: Arc<dyn StateQuery>,
        sink: Arc<dyn DisplaySink>,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::Idle);
        Arc::new(Self {
            connector,
            state_query,
            sink,
            indicator: ConnectionIndicator::new(),
            state,
            busy: AtomicBool::new(false),
            cancel: Mutex::new(None),
        })
    }

    pub fn indicator(&self) -> &ConnectionIndicator {
        &self.indicator
    }

    pub fn session_state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Runs `request` to completion. Fails only when another session is active;
    /// every other failure is reported through the outcome and the display sink.
    pub async fn submit(&self, request: CommandRequest) -> Result<SessionReport, PipelineError> {
        let _guard = SessionGuard::acquire(&self.busy).ok_or(PipelineError::SessionBusy)?;
        let session_id = Uuid::new_v4();
        let span = info_span!("command_session", %session_id, target_name = %request.target_name);
        self.run_session(session_id, request).instrument(span).await
    }

    /// Forwards a cancellation request to the executing session.
    pub async fn cancel(&self) -> Result<(), PipelineError> {
        let guard = self.cancel.lock().await;
        let Some(tx) = guard.as_ref() else {
            return Err(PipelineError::NothingToCancel);
        };
        match tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(())) => Err(PipelineError::NothingToCancel),
        }
    }

    async fn run_session(&self, session_id: Uuid, request: CommandRequest) -> Result<SessionReport, PipelineError> {
        info!(command = ?request.sub_command.as_ref().map(|sub| sub.name()), "command session started");
        self.state.send_replace(SessionState::Generating);

        let (outcome, instructions_generated, instructions_sent) = match self.generate(&request).await {
            GenerationOutcome::Failed { .. } => (SessionOutcome::GenerationFailed, 0, 0),
            GenerationOutcome::Generated(instructions) if instructions.is_empty() => {
                self.sink
                    .append(DisplayLine::plain("No instructions were generated, nothing to run."));
                (SessionOutcome::Done, 0, 0)
            }
            GenerationOutcome::Generated(instructions) => {
                let generated = instructions.len();
                let report = self.execute(instructions).await;
                let outcome = match report.phase {
                    ExecutionPhase::Done => SessionOutcome::Done,
                    ExecutionPhase::Cancelled => SessionOutcome::Cancelled,
                    ExecutionPhase::Failed => SessionOutcome::Failed,
                    ExecutionPhase::Closed | ExecutionPhase::Idle | ExecutionPhase::AwaitingReplies => {
                        SessionOutcome::Closed
                    }
                };
                (outcome, generated, report.sent)
            }
        };

        self.indicator.set_inactive();
        self.state.send_replace(outcome.state());
        info!(?outcome, instructions_generated, instructions_sent, "command session ended");
        let deployment_status = self.refresh_status(&request.target_name).await;

        Ok(SessionReport {
            session_id,
            outcome,
            instructions_generated,
            instructions_sent,
            deployment_status,
        })
    }

    async fn generate(&self, request: &CommandRequest) -> GenerationOutcome {
        let mut channel = match self.connector.open(Endpoint::Generation).await {
            Ok(channel) => channel,
            Err(err) => {
                error!(%err, "failed to open the generation channel");
                self.sink
                    .append(DisplayLine::failure(format!("Could not reach the command generator: {err}")));
                return GenerationOutcome::Failed {
                    reason: err.to_string(),
                };
            }
        };
        self.sink.clear();
        self.indicator.set_active();

        match GenerationDriver::new(self.sink.as_ref())
            .run(channel.as_mut(), request)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(%err, "command generation aborted");
                self.sink
                    .append(DisplayLine::failure(format!("Command generation aborted: {err}")));
                if let Err(close_err) = channel.close("").await {
                    warn!(%close_err, "failed to close the generation channel");
                }
                GenerationOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn execute(&self, instructions: Vec<GeneratedInstruction>) -> ExecutionReport {
        let mut channel = match self.connector.open(Endpoint::Execution).await {
            Ok(channel) => channel,
            Err(err) => {
                error!(%err, "failed to open the execution channel");
                self.sink
                    .append(DisplayLine::failure(format!("Could not reach the orchestrator: {err}")));
                return ExecutionReport {
                    phase: ExecutionPhase::Failed,
                    sent: 0,
                };
            }
        };
        self.indicator.set_active();

        let (cancel_tx, cancel_rx) = mpsc::channel(1);
        *self.cancel.lock().await = Some(cancel_tx);
        let report = ExecutionDriver::new(self.sink.as_ref())
            .with_state(&self.state)
            .run(channel.as_mut(), instructions, cancel_rx)
            .await;
        self.cancel.lock().await.take();
        report
    }

    async fn refresh_status(&self, target_name: &str) -> Option<DeploymentStatus> {
        match self.state_query.fetch_status(target_name).await {
            Ok(status) => {
                info!(%status, "deployment state refreshed");
                self.sink.append(DisplayLine::plain(format!("Deployment state: {status}")));
                Some(status)
            }
            Err(err) => {
                warn!(%err, "could not refresh deployment state");
                None
            }
        }
    }
}

/// Holds the runner's single session slot until dropped.
struct SessionGuard<'a> {
    busy: &'a AtomicBool,
}

impl<'a> SessionGuard<'a> {
    fn acquire(busy: &'a AtomicBool) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { busy })
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
