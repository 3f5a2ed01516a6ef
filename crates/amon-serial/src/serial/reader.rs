//! Serial reader.
//!
//! Owns the single open connection and the one background task that polls
//! it.  Each cycle the task waits the poll interval, performs one bounded
//! read, frames complete lines and feeds every decoded signal to the alarm
//! state machine in arrival order.
//!
//! A read failure closes the transport, marks the reader `Lost` and ends
//! the task.  Nothing reconnects on its own; the caller has to `connect`
//! again.

use crate::serial::line::LineBuffer;
use crate::serial::transport::{SerialTransport, TransportOpener};
use crate::serial::types::*;
use amon_alarm::alarm::{decode, AlarmStateMachineState, DecodeError};
use amon_core::{Notification, Notifier, Timestamp};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

type StatusCell = Arc<RwLock<ReaderStatus>>;

fn read_status(cell: &StatusCell) -> ReaderStatus {
    cell.read().unwrap_or_else(|p| p.into_inner()).clone()
}

fn write_status(cell: &StatusCell, status: ReaderStatus) {
    *cell.write().unwrap_or_else(|p| p.into_inner()) = status;
}

struct ActiveConnection {
    port: String,
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct SerialReader {
    config: ReaderConfig,
    opener: Arc<dyn TransportOpener>,
    machine: AlarmStateMachineState,
    notifier: Notifier,
    connection: Mutex<Option<ActiveConnection>>,
    status: StatusCell,
    active_tasks: Arc<AtomicUsize>,
}

impl SerialReader {
    pub fn new(
        config: ReaderConfig,
        opener: Arc<dyn TransportOpener>,
        machine: AlarmStateMachineState,
        notifier: Notifier,
    ) -> Self {
        Self {
            config,
            opener,
            machine,
            notifier,
            connection: Mutex::new(None),
            status: Arc::new(RwLock::new(ReaderStatus::Disconnected)),
            active_tasks: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Open `port` and start polling it.
    pub async fn connect(&self, port: &str, baud_rate: u32) -> ConnectionResult<()> {
        let mut slot = self.connection.lock().await;

        if let ReaderStatus::Connected { port: current, .. } = self.status() {
            warn!("connect({}) refused: {} is already open", port, current);
            return Err(ConnectionError::already_open(port));
        }
        // A lost connection leaves a finished task behind.
        if let Some(stale) = slot.take() {
            if let Err(e) = stale.handle.await {
                warn!("Poll task for {} ended abnormally: {}", stale.port, e);
            }
        }

        let transport = self
            .opener
            .open(port, baud_rate, self.config.read_timeout())
            .await
            .map_err(|e| {
                warn!("{}", e);
                ConnectionError::open_failure(port, e)
            })?;

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        write_status(
            &self.status,
            ReaderStatus::Connected {
                port: port.to_string(),
                baud: baud_rate,
            },
        );
        self.notifier.publish(Notification::Connected {
            port: port.to_string(),
            baud: baud_rate,
        });

        let task = PollTask {
            port: port.to_string(),
            transport,
            machine: self.machine.clone(),
            notifier: self.notifier.clone(),
            status: self.status.clone(),
            lines: LineBuffer::new(self.config.max_line_length),
            poll_interval: self.config.poll_interval(),
            chunk_size: self.config.read_chunk_size.max(1),
            _guard: TaskGuard::new(self.active_tasks.clone()),
        };
        let handle = tokio::spawn(task.run(shutdown_rx));

        *slot = Some(ActiveConnection {
            port: port.to_string(),
            shutdown_tx,
            handle,
        });
        info!("Connected to {} at {} baud", port, baud_rate);
        Ok(())
    }

    /// Stop polling and close the connection.  Returns once the task has
    /// ended.  A no-op when nothing is open.
    pub async fn disconnect(&self) {
        let mut slot = self.connection.lock().await;
        let Some(conn) = slot.take() else {
            debug!("disconnect: no open connection");
            return;
        };

        // Fails only if the task already ended after a loss.
        let _ = conn.shutdown_tx.send(()).await;
        if let Err(e) = conn.handle.await {
            warn!("Poll task for {} ended abnormally: {}", conn.port, e);
        }

        let was_connected = self.status().is_connected();
        write_status(&self.status, ReaderStatus::Disconnected);
        if was_connected {
            self.notifier.publish(Notification::Disconnected {
                port: conn.port.clone(),
            });
            info!("Disconnected from {}", conn.port);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    pub fn status(&self) -> ReaderStatus {
        read_status(&self.status)
    }

    /// Number of running poll tasks: 0 or 1.
    pub fn active_tasks(&self) -> usize {
        self.active_tasks.load(Ordering::SeqCst)
    }
}

impl Drop for SerialReader {
    fn drop(&mut self) {
        // Aborting drops the task and with it the last transport handle.
        if let Some(conn) = self.connection.get_mut().take() {
            conn.handle.abort();
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Poll task
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct TaskGuard(Arc<AtomicUsize>);

impl TaskGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct PollTask {
    port: String,
    transport: Arc<dyn SerialTransport>,
    machine: AlarmStateMachineState,
    notifier: Notifier,
    status: StatusCell,
    lines: LineBuffer,
    poll_interval: Duration,
    chunk_size: usize,
    _guard: TaskGuard,
}

impl PollTask {
    async fn run(mut self, mut shutdown_rx: mpsc::Receiver<()>) {
        let mut buf = vec![0u8; self.chunk_size];

        let lost = loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break None,
                _ = tokio::time::sleep(self.poll_interval) => {
                    match self.transport.read(&mut buf).await {
                        Ok(0) => {}
                        Ok(n) => {
                            for line in self.lines.push(&buf[..n]) {
                                self.handle_line(&line).await;
                            }
                        }
                        Err(reason) => break Some(reason),
                    }
                }
            }
        };

        if let Err(e) = self.transport.close().await {
            warn!("Closing {} failed: {}", self.port, e);
        }

        match lost {
            None => debug!("Poll task for {} stopped", self.port),
            Some(reason) => {
                warn!("Connection to {} lost: {}", self.port, reason);
                write_status(
                    &self.status,
                    ReaderStatus::Lost {
                        port: self.port.clone(),
                        reason: reason.clone(),
                    },
                );
                self.notifier.publish(Notification::ConnectionLost {
                    port: self.port.clone(),
                    reason,
                });
            }
        }
    }

    async fn handle_line(&self, raw: &[u8]) {
        debug!("{} <- {:?}", self.port, String::from_utf8_lossy(raw));
        match decode(raw) {
            Ok(signal) => {
                let at = Timestamp::now();
                self.machine.lock().await.apply(signal, at).await;
            }
            Err(DecodeError::Empty) => {}
            Err(e) => warn!("Ignoring line from {}: {}", self.port, e),
        }
    }
}
