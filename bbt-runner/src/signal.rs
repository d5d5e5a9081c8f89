// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interrupt handling.
//!
//! The first interrupt asks the run to stop gracefully: workers finish or abandon their current
//! case and exit. A second interrupt terminates the process immediately.

use crate::errors::SignalHandlerSetupError;
use crossbeam_channel::{Receiver, Sender};

/// The kind of signal handling to set up for a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalHandlerKind {
    /// Listen for termination signals (SIGINT, SIGTERM and SIGQUIT on Unix).
    Standard,
    /// Don't listen for signals. Interrupts can still be raised through an [`InterruptHandle`].
    Noop,
}

/// Delivers interrupts to a running [`Orchestrator`](crate::Orchestrator).
#[derive(Debug)]
pub struct InterruptController {
    sender: Sender<()>,
    receiver: Receiver<()>,
    #[cfg(unix)]
    signal_handle: Option<signal_hook::iterator::Handle>,
}

impl InterruptController {
    /// Creates a new controller, installing signal handlers if requested.
    pub fn new(kind: SignalHandlerKind) -> Result<Self, SignalHandlerSetupError> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        match kind {
            SignalHandlerKind::Noop => Ok(Self {
                sender,
                receiver,
                #[cfg(unix)]
                signal_handle: None,
            }),
            SignalHandlerKind::Standard => Self::with_signals(sender, receiver),
        }
    }

    #[cfg(unix)]
    fn with_signals(
        sender: Sender<()>,
        receiver: Receiver<()>,
    ) -> Result<Self, SignalHandlerSetupError> {
        let signal_handle = imp::spawn_signal_thread(sender.clone())?;
        Ok(Self {
            sender,
            receiver,
            signal_handle: Some(signal_handle),
        })
    }

    #[cfg(not(unix))]
    fn with_signals(
        sender: Sender<()>,
        receiver: Receiver<()>,
    ) -> Result<Self, SignalHandlerSetupError> {
        tracing::debug!("signal handling is not supported on this platform");
        Ok(Self { sender, receiver })
    }

    /// Returns a handle that can raise interrupts from any thread.
    pub fn handle(&self) -> InterruptHandle {
        InterruptHandle {
            sender: self.sender.clone(),
        }
    }

    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.receiver
    }
}

impl Drop for InterruptController {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(handle) = self.signal_handle.take() {
            handle.close();
        }
    }
}

/// Raises interrupts on a run, as if the operator had pressed Ctrl-C.
#[derive(Clone, Debug)]
pub struct InterruptHandle {
    sender: Sender<()>,
}

impl InterruptHandle {
    /// Asks the run to stop gracefully.
    pub fn interrupt(&self) {
        // The controller owns a receiver, so this only fails once it's gone.
        let _ = self.sender.send(());
    }
}

/// What to do in response to an interrupt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum InterruptAction {
    /// Forward the interrupt to the run.
    Graceful,
    /// Terminate the process.
    Abort,
}

#[derive(Debug, Default)]
pub(crate) struct InterruptState {
    received: usize,
}

impl InterruptState {
    pub(crate) fn on_interrupt(&mut self) -> InterruptAction {
        self.received += 1;
        if self.received == 1 {
            InterruptAction::Graceful
        } else {
            InterruptAction::Abort
        }
    }
}

#[cfg(unix)]
mod imp {
    use super::*;
    use signal_hook::{
        consts::TERM_SIGNALS,
        iterator::{exfiltrator::SignalOnly, Handle, SignalsInfo},
        low_level::emulate_default_handler,
    };

    pub(super) fn spawn_signal_thread(
        sender: Sender<()>,
    ) -> Result<Handle, SignalHandlerSetupError> {
        let mut signals = SignalsInfo::<SignalOnly>::new(TERM_SIGNALS)?;
        let handle = signals.handle();

        std::thread::Builder::new()
            .name("bbt-signals".to_owned())
            .spawn(move || {
                let mut state = InterruptState::default();
                for signal in &mut signals {
                    match state.on_interrupt() {
                        InterruptAction::Graceful => {
                            tracing::debug!(signal, "received termination signal");
                            let _ = sender.send(());
                        }
                        InterruptAction::Abort => {
                            tracing::warn!("Interrupted again, exiting immediately.");
                            let _ = emulate_default_handler(signal);
                            std::process::exit(1);
                        }
                    }
                }
            })?;

        Ok(handle)
    }
}
