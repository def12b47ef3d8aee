// Session driver
//
// Runs the state machine on its own task. Platform producers (location,
// geofence callbacks, UI, web) send commands through a SessionHandle; timer
// fires and delivery reports arrive on the machine's internal channel. Both
// are drained by one select loop, so at most one trigger touches state at a
// time.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use super::command::SessionCommand;
use super::state_machine::{InternalMessage, SessionStateMachine};
use crate::persistence::SessionSnapshot;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("session driver has stopped")]
    Stopped,

    #[error("session driver task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Sending side of a running driver
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    task: JoinHandle<SessionSnapshot>,
}

impl SessionHandle {
    pub fn send(&self, command: SessionCommand) -> Result<(), DriverError> {
        self.commands.send(command).map_err(|_| DriverError::Stopped)
    }

    /// A cloneable sender for additional producers
    pub fn sender(&self) -> mpsc::UnboundedSender<SessionCommand> {
        self.commands.clone()
    }

    /// Stop accepting commands, let queued deliveries finish, then stop the
    /// machine. Returns the final snapshot.
    ///
    /// Deliveries still retrying keep the driver alive until their budget is
    /// spent. Commands sent through [`sender`](Self::sender) clones keep it
    /// alive until those clones are dropped.
    pub async fn shutdown(self) -> Result<SessionSnapshot, DriverError> {
        drop(self.commands);
        Ok(self.task.await?)
    }
}

pub struct SessionDriver;

impl SessionDriver {
    /// Restore the machine from its snapshot and start processing.
    /// Must be called inside a tokio runtime.
    pub fn spawn(
        machine: SessionStateMachine,
        internal_rx: mpsc::UnboundedReceiver<InternalMessage>,
    ) -> SessionHandle {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(machine, commands_rx, internal_rx));
        SessionHandle { commands, task }
    }
}

#[instrument(skip_all)]
async fn run(
    mut machine: SessionStateMachine,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    mut internal: mpsc::UnboundedReceiver<InternalMessage>,
) -> SessionSnapshot {
    machine.restore().await;
    info!(state = %machine.state(), "session driver ready");

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => machine.handle_command(command).await,
                None => break,
            },
            Some(message) = internal.recv() => machine.handle_internal(message).await,
        }
    }

    debug!(
        outstanding = machine.emissions_outstanding(),
        "command channel closed, draining deliveries"
    );
    while machine.emissions_outstanding() > 0 {
        match internal.recv().await {
            Some(message) => machine.handle_internal(message).await,
            None => break,
        }
    }

    machine.shutdown();
    let snapshot = machine.snapshot();
    info!(state = %snapshot.state, "session driver stopped");
    snapshot
}
