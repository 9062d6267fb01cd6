use log::debug;
use std::io;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, channel};
use std::thread;

use super::search::{MinedNonce, MiningInput, MiningPolicy, MiningProgress, SearchOutcome, search};

/// Messages from a running search. Progress events come in increasing attempt
/// order; a search that is not cancelled ends with exactly one `Found` or `TimedOut`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MinerEvent {
    Progress(MiningProgress),
    Found(MinedNonce),
    TimedOut { attempts: u64, ceiling: u64 },
}

impl MinerEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MinerEvent::Progress(_))
    }
}

/// A nonce search running on its own thread. Dropping the task cancels it.
pub struct MiningTask {
    input: MiningInput,
    policy: MiningPolicy,
    cancel: Arc<AtomicBool>,
    events: Receiver<MinerEvent>,
}

impl MiningTask {
    pub fn spawn(input: MiningInput, policy: MiningPolicy) -> io::Result<Self> {
        let (sender, events) = channel();
        let cancel = Arc::new(AtomicBool::new(false));

        let worker_input = input.clone();
        let worker_cancel = Arc::clone(&cancel);
        thread::Builder::new()
            .name(format!("miner-{}", input.index))
            .spawn(move || {
                let outcome = search(&worker_input, &policy, &worker_cancel, |progress| {
                    // receiver gone means nobody is listening any more
                    match sender.send(MinerEvent::Progress(progress)) {
                        Ok(()) => ControlFlow::Continue(()),
                        Err(_) => ControlFlow::Break(()),
                    }
                });

                let terminal = match outcome {
                    SearchOutcome::Found(found) => {
                        debug!(
                            "MINER - block #{} nonce={} after {} attempts",
                            worker_input.index, found.nonce, found.attempts
                        );
                        MinerEvent::Found(found)
                    }
                    SearchOutcome::TimedOut { attempts, ceiling } => {
                        debug!(
                            "MINER - block #{} gave up at nonce ceiling {ceiling}",
                            worker_input.index
                        );
                        MinerEvent::TimedOut { attempts, ceiling }
                    }
                    SearchOutcome::Cancelled { attempts } => {
                        debug!(
                            "MINER - block #{} cancelled after {attempts} attempts",
                            worker_input.index
                        );
                        return;
                    }
                };
                let _ = sender.send(terminal);
            })?;

        Ok(Self {
            input,
            policy,
            cancel,
            events,
        })
    }

    pub fn input(&self) -> &MiningInput {
        &self.input
    }

    pub fn policy(&self) -> &MiningPolicy {
        &self.policy
    }

    /// Stop the search. No terminal event follows.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Events already emitted, without blocking.
    pub fn try_events(&self) -> Vec<MinerEvent> {
        self.events.try_iter().collect()
    }

    /// Next event, or `None` once the worker has exited and everything was read.
    pub fn recv(&self) -> Option<MinerEvent> {
        self.events.recv().ok()
    }

    /// Block until the terminal event. `None` if the search was cancelled.
    pub fn wait(self) -> Option<MinerEvent> {
        while let Some(event) = self.recv() {
            if event.is_terminal() {
                return Some(event);
            }
        }
        None
    }
}

impl Drop for MiningTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
