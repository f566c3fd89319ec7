//! Station abstraction and runner threads.
//!
//! Each stage of the pipeline implements `Station` and runs in its own
//! thread, connected to its neighbours by crossbeam channels. A station
//! exits when its input channel disconnects; the supervisor shuts the
//! pipeline down by dropping the ingress senders and letting the
//! disconnect cascade downstream.

use crate::pipeline::error::{ErrorReporter, StationError};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A processing station in the pipeline.
///
/// One input can yield any number of outputs: stages with internal
/// buffering (mel, embedding, wake word, VAD) drain everything that became
/// ready before waiting again.
pub trait Station: Send + 'static {
    /// The input type this station receives.
    type Input: Send + 'static;
    /// The output type this station produces.
    type Output: Send + 'static;

    /// Processes a single input item, returning the outputs it unlocked
    /// (possibly none).
    fn process(&mut self, input: Self::Input) -> Result<Vec<Self::Output>, StationError>;

    /// Returns the name of this station for logging and error reporting.
    fn name(&self) -> &'static str;

    /// Called when the station is shutting down.
    fn shutdown(&mut self) {}
}

/// Handle to a station thread.
///
/// The worker signals a completion channel just before exiting, which lets
/// the supervisor join with a wall-clock budget: a worker stuck inside an
/// inference call cannot block stop() forever.
pub struct StationRunner {
    handle: Option<JoinHandle<()>>,
    done_rx: Receiver<()>,
    station_name: &'static str,
}

impl StationRunner {
    /// Spawns a station with a single downstream channel.
    pub fn spawn<S: Station>(
        mut station: S,
        input_rx: Receiver<S::Input>,
        output_tx: Sender<S::Output>,
        error_reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let station_name = station.name();
        let (done_tx, done_rx) = bounded(1);

        let handle = thread::spawn(move || {
            'outer: while let Ok(input) = input_rx.recv() {
                match station.process(input) {
                    Ok(batch) => {
                        for output in batch {
                            if output_tx.send(output).is_err() {
                                // Downstream gone, shut down.
                                break 'outer;
                            }
                        }
                    }
                    Err(StationError::Recoverable(msg)) => {
                        error_reporter.report(station.name(), &StationError::Recoverable(msg));
                    }
                    Err(StationError::Fatal(msg)) => {
                        error_reporter.report(station.name(), &StationError::Fatal(msg));
                        break;
                    }
                }
            }

            station.shutdown();
            let _ = done_tx.send(());
        });

        Self {
            handle: Some(handle),
            done_rx,
            station_name,
        }
    }

    /// Spawns a station whose outputs are broadcast to several downstream
    /// channels.
    ///
    /// Every consumer sees every output in order; a consumer that
    /// disconnects is dropped from the broadcast set, and the station shuts
    /// down once no consumers remain.
    pub fn spawn_fanout<S: Station>(
        mut station: S,
        input_rx: Receiver<S::Input>,
        output_txs: Vec<Sender<S::Output>>,
        error_reporter: Arc<dyn ErrorReporter>,
    ) -> Self
    where
        S::Output: Clone,
    {
        let station_name = station.name();
        let (done_tx, done_rx) = bounded(1);

        let handle = thread::spawn(move || {
            let mut outputs = output_txs;

            'outer: while let Ok(input) = input_rx.recv() {
                match station.process(input) {
                    Ok(batch) => {
                        for output in batch {
                            outputs.retain(|tx| tx.send(output.clone()).is_ok());
                            if outputs.is_empty() {
                                break 'outer;
                            }
                        }
                    }
                    Err(StationError::Recoverable(msg)) => {
                        error_reporter.report(station.name(), &StationError::Recoverable(msg));
                    }
                    Err(StationError::Fatal(msg)) => {
                        error_reporter.report(station.name(), &StationError::Fatal(msg));
                        break;
                    }
                }
            }

            station.shutdown();
            let _ = done_tx.send(());
        });

        Self {
            handle: Some(handle),
            done_rx,
            station_name,
        }
    }

    /// Waits for the station thread to complete.
    pub fn join(mut self) -> Result<(), String> {
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| format!("Station '{}' thread panicked", self.station_name))
        } else {
            Ok(())
        }
    }

    /// Waits for the station thread with a wall-clock budget.
    ///
    /// On timeout the thread is left running detached (the OS reclaims it
    /// on process exit) and an error describing the straggler is returned.
    pub fn join_timeout(mut self, timeout: Duration) -> Result<(), String> {
        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    handle
                        .join()
                        .map_err(|_| format!("Station '{}' thread panicked", self.station_name))
                } else {
                    Ok(())
                }
            }
            Err(RecvTimeoutError::Timeout) => Err(format!(
                "Station '{}' did not stop within {:?}",
                self.station_name, timeout
            )),
        }
    }

    /// Returns the name of the station.
    pub fn name(&self) -> &'static str {
        self.station_name
    }
}
