//! Byte-Stream Transport for Line-Oriented Instruments
//!
//! The protocol core only needs two things from the physical link: send a
//! request and receive one terminated response line, failing if nothing
//! arrives in time. [`Transport`] captures exactly that, and
//! [`SerialTransport`] implements it over any async byte stream.
//!
//! # Types
//!
//! - [`SerialPortIO`]: Trait alias combining AsyncRead + AsyncWrite for serial ports
//! - [`DynSerial`]: Type-erased boxed serial port
//! - [`Transport`]: The send / receive-line interface sessions are written against
//! - [`SerialTransport`]: Buffered line transport over a [`DynSerial`]
//!
//! # Example
//!
//! ```rust,ignore
//! use tec_core::transport::{open_serial_async, SerialTransport, Transport};
//!
//! let port = open_serial_async("/dev/ttyUSB0", 57600, "TEC-1089").await?;
//! let mut transport = SerialTransport::new(Box::new(port));
//!
//! transport.send(b"#020000?IF").await?;
//! let line = transport.receive_line(Duration::from_secs(10)).await?;
//! ```

use crate::error::{TecError, TecResult};
use async_trait::async_trait;
use futures::FutureExt;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Line terminator used by MeCom devices in both directions.
pub const CARRIAGE_RETURN: u8 = b'\r';

// =============================================================================
// Serial Port Trait
// =============================================================================

/// Trait alias for async serial port I/O.
///
/// Any type implementing `AsyncRead + AsyncWrite + Unpin + Send` can be used
/// as a serial port:
/// - `tokio_serial::SerialStream` (real hardware)
/// - `tokio::io::DuplexStream` (testing)
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

// Blanket implementation for all types meeting the requirements
impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased boxed serial port.
pub type DynSerial = Box<dyn SerialPortIO>;

// =============================================================================
// Transport Trait
// =============================================================================

/// Duplex, line-oriented channel to one instrument.
///
/// Request/response is strictly synchronous: callers send one request and
/// then wait for exactly one response line. Implementations own the line
/// terminator in both directions.
#[async_trait]
pub trait Transport: Send {
    /// Send one request. The implementation appends the line terminator.
    async fn send(&mut self, data: &[u8]) -> TecResult<()>;

    /// Receive one response line with the terminator stripped.
    ///
    /// Returns [`TecError::Timeout`] if no complete line arrives within
    /// `timeout`.
    async fn receive_line(&mut self, timeout: Duration) -> TecResult<String>;

    /// Discard any input that is already waiting, without blocking.
    ///
    /// Returns the number of bytes thrown away.
    async fn discard_input(&mut self) -> TecResult<usize> {
        Ok(0)
    }

    /// Close the link. Further `send`/`receive_line` calls return
    /// [`TecError::NotConnected`].
    async fn close(&mut self) -> TecResult<()>;

    /// Whether the link is still open.
    fn is_connected(&self) -> bool;
}

// =============================================================================
// SerialTransport
// =============================================================================

/// [`Transport`] over a buffered async byte stream.
pub struct SerialTransport {
    port: Option<BufReader<DynSerial>>,
    terminator: u8,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("connected", &self.port.is_some())
            .field("terminator", &self.terminator)
            .finish()
    }
}

impl SerialTransport {
    /// Wrap a byte stream, using `\r` as the line terminator.
    pub fn new(port: DynSerial) -> Self {
        Self::with_terminator(port, CARRIAGE_RETURN)
    }

    /// Wrap a byte stream with a custom line terminator.
    pub fn with_terminator(port: DynSerial, terminator: u8) -> Self {
        Self {
            port: Some(BufReader::new(port)),
            terminator,
        }
    }

    /// Open a serial port and wrap it.
    pub async fn open(port_path: &str, baud_rate: u32, device_name: &str) -> anyhow::Result<Self> {
        let port = open_serial_async(port_path, baud_rate, device_name).await?;
        Ok(Self::new(Box::new(port)))
    }

    fn port_mut(&mut self) -> TecResult<&mut BufReader<DynSerial>> {
        self.port.as_mut().ok_or(TecError::NotConnected)
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> TecResult<()> {
        let terminator = self.terminator;
        let writer = self.port_mut()?.get_mut();
        writer.write_all(data).await?;
        writer.write_all(&[terminator]).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn receive_line(&mut self, timeout: Duration) -> TecResult<String> {
        let terminator = self.terminator;
        let port = self.port_mut()?;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let mut raw = Vec::new();
            let read = tokio::time::timeout_at(deadline, port.read_until(terminator, &mut raw))
                .await
                .map_err(|_| TecError::Timeout(timeout))??;

            if read == 0 {
                return Err(TecError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "transport closed by peer",
                )));
            }

            let line = String::from_utf8(raw).map_err(|e| {
                TecError::framing(
                    "response is not valid UTF-8",
                    String::from_utf8_lossy(e.as_bytes()).into_owned(),
                )
            })?;

            let trimmed = line.trim_matches(|c: char| c == terminator as char || c == '\n');
            if trimmed.is_empty() {
                tracing::debug!("skipping empty line");
                continue;
            }

            return Ok(trimmed.to_string());
        }
    }

    async fn discard_input(&mut self) -> TecResult<usize> {
        let port = self.port_mut()?;

        // Bytes already sitting in the BufReader
        let mut total = port.buffer().len();
        port.consume(total);

        // Bytes the stream can hand over without waiting
        let mut scratch = [0u8; 256];
        loop {
            match port.get_mut().read(&mut scratch).now_or_never() {
                None | Some(Ok(0)) => break,
                Some(Ok(n)) => total += n,
                Some(Err(e)) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Some(Err(e)) => return Err(e.into()),
            }
        }

        Ok(total)
    }

    async fn close(&mut self) -> TecResult<()> {
        if let Some(mut port) = self.port.take() {
            port.get_mut().shutdown().await?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}

// =============================================================================
// Serial Port Utilities
// =============================================================================

/// Open a serial port asynchronously using spawn_blocking.
///
/// Standard settings are applied: 8N1, no flow control.
///
/// # Errors
///
/// Returns an error if the port cannot be opened or spawn_blocking fails.
pub async fn open_serial_async(
    port_path: &str,
    baud_rate: u32,
    device_name: &str,
) -> anyhow::Result<tokio_serial::SerialStream> {
    use anyhow::Context;
    use tokio::task::spawn_blocking;
    use tokio_serial::SerialPortBuilderExt;

    let port_path_owned = port_path.to_string();
    let device_name_owned = device_name.to_string();

    spawn_blocking(move || {
        tokio_serial::new(&port_path_owned, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .context(format!(
                "Failed to open {} serial port: {}",
                device_name_owned, port_path_owned
            ))
    })
    .await
    .context("spawn_blocking for serial port opening failed")?
}
