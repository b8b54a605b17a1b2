// src/engine.rs
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::RwLock;

use crate::decoder::{decode_line, is_end_marker};
use crate::drivers::{EngineError, SampleBuffer, Transport};
use crate::encoder::EncodedCommand;
use crate::technique::TechniqueProfile;
use crate::types::{AcquisitionState, SessionEvent, Technique};

/// What one session sends and how it reads the reply.
#[derive(Clone, Debug)]
pub struct AcquisitionPlan {
    pub technique: Technique,
    pub command: String,
    pub expected_samples: usize,
    pub min_fields: usize,
    pub accepts_end_marker: bool,
}

impl AcquisitionPlan {
    pub fn new(profile: &TechniqueProfile, encoded: EncodedCommand) -> Self {
        Self {
            technique: profile.technique,
            command: encoded.command,
            expected_samples: encoded.expected_samples,
            min_fields: profile.min_fields,
            accepts_end_marker: profile.accepts_end_marker,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub read_timeout: Duration,
    pub miss_threshold: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(100),
            miss_threshold: 100,
        }
    }
}

/// Everything a finished worker hands back.
pub struct SessionOutcome {
    pub state: AcquisitionState,
    pub samples: SampleBuffer,
    pub expected: usize,
    pub misses: usize,
    pub error: Option<EngineError>,
    pub transport: Box<dyn Transport>,
}

/// Foreground handle on a running acquisition.
pub struct SessionHandle {
    state: Arc<RwLock<AcquisitionState>>,
    shutdown_signal: Arc<AtomicBool>,
    received: Arc<AtomicUsize>,
    expected: usize,
    worker: Option<JoinHandle<SessionOutcome>>,
}

impl SessionHandle {
    pub fn state(&self) -> AcquisitionState {
        *self.state.read()
    }

    pub fn received(&self) -> usize {
        self.received.load(Ordering::Relaxed)
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Ask the worker to stop; it notices within one read timeout.
    pub fn request_stop(&self) {
        self.shutdown_signal.store(true, Ordering::SeqCst);
    }

    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown_signal)
    }

    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, JoinHandle::is_finished)
    }

    pub fn join(mut self) -> Result<SessionOutcome, EngineError> {
        let worker = self.worker.take().ok_or(EngineError::WorkerPanicked)?;
        worker.join().map_err(|_| EngineError::WorkerPanicked)
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.request_stop();
            // 等待后台线程退出
            if worker.join().is_err() {
                log::error!("acquisition worker panicked during shutdown");
            }
        }
    }
}

/// Start the receive loop on its own thread. The worker owns `transport`
/// until it reaches a terminal state.
pub fn spawn_session(
    transport: Box<dyn Transport>,
    plan: AcquisitionPlan,
    config: SessionConfig,
    events: Option<Sender<SessionEvent>>,
) -> SessionHandle {
    let state = Arc::new(RwLock::new(AcquisitionState::Idle));
    let shutdown_signal = Arc::new(AtomicBool::new(false));
    let received = Arc::new(AtomicUsize::new(0));
    let expected = plan.expected_samples;

    let worker = {
        let session = Session {
            transport,
            plan,
            config,
            events,
            state: Arc::clone(&state),
            shutdown_signal: Arc::clone(&shutdown_signal),
            received: Arc::clone(&received),
        };
        thread::spawn(move || session.run())
    };

    SessionHandle {
        state,
        shutdown_signal,
        received,
        expected,
        worker: Some(worker),
    }
}

struct Session {
    transport: Box<dyn Transport>,
    plan: AcquisitionPlan,
    config: SessionConfig,
    events: Option<Sender<SessionEvent>>,
    state: Arc<RwLock<AcquisitionState>>,
    shutdown_signal: Arc<AtomicBool>,
    received: Arc<AtomicUsize>,
}

impl Session {
    fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.events {
            tx.send(event).ok();
        }
    }

    fn set_state(&self, next: AcquisitionState) {
        *self.state.write() = next;
        log::debug!("{} session -> {next:?}", self.plan.technique);
        self.emit(SessionEvent::State(next));
    }

    fn run(mut self) -> SessionOutcome {
        let mut samples = SampleBuffer::with_capacity(self.plan.expected_samples);
        let mut misses = 0usize;
        let mut total_misses = 0usize;

        self.set_state(AcquisitionState::Sending);
        if let Err(e) = self.send_command() {
            log::error!("{}: failed to send command: {e}", self.transport.name());
            self.emit(SessionEvent::Log(format!("send failed: {e}")));
            self.set_state(AcquisitionState::Aborted);
            return self.finish(AcquisitionState::Aborted, samples, 0, Some(e));
        }
        self.set_state(AcquisitionState::Receiving);

        let (terminal, error) = loop {
            if self.shutdown_signal.load(Ordering::SeqCst) {
                break (AcquisitionState::Aborted, None);
            }
            if samples.len() >= self.plan.expected_samples {
                break (AcquisitionState::Completed, None);
            }

            match self.transport.read_line() {
                Ok(Some(line)) if self.plan.accepts_end_marker && is_end_marker(&line) => {
                    log::info!("{}: device sent END", self.plan.technique);
                    break (AcquisitionState::Completed, None);
                }
                Ok(Some(line)) => match decode_line(&line, samples.len(), self.plan.min_fields) {
                    Ok(sample) => {
                        samples.push(sample);
                        misses = 0;
                        let count = samples.len();
                        self.received.store(count, Ordering::Relaxed);
                        self.emit(SessionEvent::Progress {
                            received: count,
                            expected: self.plan.expected_samples,
                        });
                    }
                    Err(e) => {
                        log::debug!("{e}");
                        misses += 1;
                        total_misses += 1;
                    }
                },
                Ok(None) => {
                    misses += 1;
                    total_misses += 1;
                }
                Err(e) => {
                    if self.shutdown_signal.load(Ordering::SeqCst) {
                        break (AcquisitionState::Aborted, None);
                    }
                    log::error!("{}: read failed: {e}", self.transport.name());
                    break (AcquisitionState::Aborted, Some(e));
                }
            }

            if misses > self.config.miss_threshold {
                log::warn!(
                    "{}: no valid data for {misses} reads, giving up at {}/{}",
                    self.plan.technique,
                    samples.len(),
                    self.plan.expected_samples
                );
                break (AcquisitionState::TimedOut, None);
            }
        };

        self.set_state(terminal);
        log::info!(
            "{} session {:?}: {}/{} samples, {} misses",
            self.plan.technique,
            terminal,
            samples.len(),
            self.plan.expected_samples,
            total_misses
        );
        self.finish(terminal, samples, total_misses, error)
    }

    fn send_command(&mut self) -> Result<(), EngineError> {
        self.transport.set_read_timeout(self.config.read_timeout)?;
        self.transport.clear_input()?;
        self.transport.write_command(&self.plan.command)?;
        self.emit(SessionEvent::Log(format!("sent {}", self.plan.command)));
        Ok(())
    }

    fn finish(
        self,
        state: AcquisitionState,
        samples: SampleBuffer,
        misses: usize,
        error: Option<EngineError>,
    ) -> SessionOutcome {
        SessionOutcome {
            state,
            samples,
            expected: self.plan.expected_samples,
            misses,
            error,
            transport: self.transport,
        }
    }
}
