//! Scripted stand-in for a TEC-1089 on the far end of a duplex pipe.

use crate::checksum::{checksum, checksum_hex};
use crate::codec::{encode_float32, encode_int32};
use tec_core::transport::{SerialTransport, Transport};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::task::JoinHandle;

/// How the fake answers one request.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// `!` + echoed header + payload + checksum
    Payload(String),
    /// Empty payload
    Ack,
    /// `+NN` device error
    Error(u8),
    /// Exactly this line
    Raw(String),
    /// Read the request, send nothing
    Silent,
}

impl Reply {
    pub(crate) fn float(v: f32) -> Self {
        Self::Payload(encode_float32(v))
    }

    pub(crate) fn int(v: i32) -> Self {
        Self::Payload(encode_int32(v))
    }

    pub(crate) fn text(s: &str) -> Self {
        Self::Payload(s.to_string())
    }
}

/// Append a valid checksum to `body`.
pub(crate) fn with_checksum(body: &str) -> String {
    format!("{}{}", body, checksum_hex(checksum(body.as_bytes())))
}

/// Connect a transport to a fake device that follows `script`.
///
/// The handle resolves to every request line the device received.
pub(crate) fn spawn(script: Vec<Reply>) -> (Box<dyn Transport>, JoinHandle<Vec<String>>) {
    let (host, device) = tokio::io::duplex(1024);
    let handle = tokio::spawn(run(device, script));
    (Box::new(SerialTransport::new(Box::new(host))), handle)
}

async fn run(io: DuplexStream, script: Vec<Reply>) -> Vec<String> {
    let mut io = BufReader::new(io);
    let mut seen = Vec::new();

    for reply in script {
        let mut raw = Vec::new();
        match io.read_until(b'\r', &mut raw).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let request = String::from_utf8_lossy(&raw)
            .trim_end_matches('\r')
            .to_string();
        let header = format!("!{}", &request[1..7]);

        let line = match reply {
            Reply::Payload(payload) => Some(with_checksum(&format!("{}{}", header, payload))),
            Reply::Ack => Some(with_checksum(&header)),
            Reply::Error(code) => Some(with_checksum(&format!("{}+{:02}", header, code))),
            Reply::Raw(line) => Some(line),
            Reply::Silent => None,
        };

        if let Some(line) = line {
            let writer = io.get_mut();
            if writer.write_all(line.as_bytes()).await.is_err()
                || writer.write_all(b"\r").await.is_err()
            {
                break;
            }
        }
        seen.push(request);
    }

    seen
}
