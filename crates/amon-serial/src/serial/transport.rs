//! Serial port transport abstraction.
//!
//! The reader only ever needs bounded reads and a close, so the seam is
//! small.  `SystemTransport` drives a real device through `serialport`;
//! `SimulatedTransport` is an in-memory stand-in for tests and demos.
//!
//! A read that times out without data returns `Ok(0)`.  Any `Err` means
//! the connection is gone.

use std::collections::VecDeque;
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An open serial link.
#[async_trait::async_trait]
pub trait SerialTransport: Send + Sync {
    /// Read up to `buf.len()` bytes, waiting at most the read timeout.
    async fn read(&self, buf: &mut [u8]) -> Result<usize, String>;

    /// Release the port.  Closing twice is harmless.
    async fn close(&self) -> Result<(), String>;

    fn is_open(&self) -> bool;

    fn port_name(&self) -> &str;
}

/// Opens transports by port name.
#[async_trait::async_trait]
pub trait TransportOpener: Send + Sync {
    async fn open(
        &self,
        port: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Arc<dyn SerialTransport>, String>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  System transport (serialport)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type PortSlot = Arc<StdMutex<Option<Box<dyn serialport::SerialPort>>>>;

fn lock_port(slot: &PortSlot) -> MutexGuard<'_, Option<Box<dyn serialport::SerialPort>>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A physical port.  Blocking reads run on the blocking pool; the
/// port's own timeout bounds how long each one takes.
pub struct SystemTransport {
    name: String,
    port: PortSlot,
}

#[async_trait::async_trait]
impl SerialTransport for SystemTransport {
    async fn read(&self, buf: &mut [u8]) -> Result<usize, String> {
        let slot = self.port.clone();
        let want = buf.len();
        let (n, chunk) = tokio::task::spawn_blocking(move || {
            let mut guard = lock_port(&slot);
            let port = guard.as_mut().ok_or_else(|| "Port not open".to_string())?;
            let mut chunk = vec![0u8; want];
            match port.read(&mut chunk) {
                Ok(n) => Ok((n, chunk)),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok((0, chunk)),
                Err(e) => Err(e.to_string()),
            }
        })
        .await
        .map_err(|e| format!("Read task failed: {}", e))??;
        buf[..n].copy_from_slice(&chunk[..n]);
        Ok(n)
    }

    async fn close(&self) -> Result<(), String> {
        // Dropping the handle releases the OS port.
        lock_port(&self.port).take();
        Ok(())
    }

    fn is_open(&self) -> bool {
        lock_port(&self.port).is_some()
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}

/// Opens real devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOpener;

#[async_trait::async_trait]
impl TransportOpener for SystemOpener {
    async fn open(
        &self,
        port: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Arc<dyn SerialTransport>, String> {
        let name = port.to_string();
        let handle = tokio::task::spawn_blocking({
            let name = name.clone();
            move || {
                serialport::new(&name, baud_rate)
                    .timeout(read_timeout)
                    .open()
                    .map_err(|e| format!("Failed to open serial port {}: {}", name, e))
            }
        })
        .await
        .map_err(|e| format!("Open task failed: {}", e))??;

        Ok(Arc::new(SystemTransport {
            name,
            port: Arc::new(StdMutex::new(Some(handle))),
        }))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Simulated transport (for testing & offline use)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A fully in-memory transport.
pub struct SimulatedTransport {
    name: String,
    open: AtomicBool,
    unplugged: AtomicBool,
    read_wait: Duration,
    rx_buf: Mutex<VecDeque<u8>>,
    rx_notify: Notify,
    reads: AtomicU64,
}

impl SimulatedTransport {
    /// An open transport for `port_name`.  Empty reads wait up to
    /// `read_wait` for injected data.
    pub fn new(port_name: impl Into<String>, read_wait: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: port_name.into(),
            open: AtomicBool::new(true),
            unplugged: AtomicBool::new(false),
            read_wait,
            rx_buf: Mutex::new(VecDeque::with_capacity(4096)),
            rx_notify: Notify::new(),
            reads: AtomicU64::new(0),
        })
    }

    /// Inject bytes into the receive buffer (simulate incoming data).
    pub async fn inject_rx(&self, data: &[u8]) {
        let mut buf = self.rx_buf.lock().await;
        buf.extend(data);
        self.rx_notify.notify_waiters();
    }

    /// Make every further read fail, as if the cable were pulled.
    pub fn simulate_disconnect(&self) {
        self.unplugged.store(true, Ordering::SeqCst);
        self.rx_notify.notify_waiters();
    }

    /// Number of reads attempted so far.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SerialTransport for SimulatedTransport {
    async fn read(&self, buf: &mut [u8]) -> Result<usize, String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.open.load(Ordering::SeqCst) {
            return Err("Port not open".to_string());
        }
        if self.unplugged.load(Ordering::SeqCst) {
            return Err(format!("Device on {} disconnected", self.name));
        }
        let mut rx = self.rx_buf.lock().await;
        if rx.is_empty() {
            drop(rx);
            tokio::select! {
                _ = self.rx_notify.notified() => {},
                _ = tokio::time::sleep(self.read_wait) => {},
            }
            if self.unplugged.load(Ordering::SeqCst) {
                return Err(format!("Device on {} disconnected", self.name));
            }
            rx = self.rx_buf.lock().await;
        }
        let count = buf.len().min(rx.len());
        for (slot, byte) in buf.iter_mut().zip(rx.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    async fn close(&self) -> Result<(), String> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}

/// Hands out [`SimulatedTransport`]s and remembers the last one so tests
/// can feed it.
#[derive(Default)]
pub struct SimulatedOpener {
    last: StdMutex<Option<Arc<SimulatedTransport>>>,
    fail_with: StdMutex<Option<String>>,
    opened: AtomicUsize,
}

impl SimulatedOpener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every open fail with `message` until cleared with `None`.
    pub fn fail_opens(&self, message: Option<&str>) {
        *self.fail_with.lock().unwrap_or_else(|p| p.into_inner()) = message.map(str::to_string);
    }

    /// The transport handed out by the most recent successful open.
    pub fn last_transport(&self) -> Option<Arc<SimulatedTransport>> {
        self.last.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TransportOpener for SimulatedOpener {
    async fn open(
        &self,
        port: &str,
        _baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Arc<dyn SerialTransport>, String> {
        if let Some(message) = self.fail_with.lock().unwrap_or_else(|p| p.into_inner()).clone() {
            return Err(format!("Failed to open serial port {}: {}", port, message));
        }
        // Keep simulated reads short so tests stay quick.
        let simulated = SimulatedTransport::new(port, read_timeout.min(Duration::from_millis(20)));
        *self.last.lock().unwrap_or_else(|p| p.into_inner()) = Some(simulated.clone());
        self.opened.fetch_add(1, Ordering::SeqCst);
        let transport: Arc<dyn SerialTransport> = simulated;
        Ok(transport)
    }
}
