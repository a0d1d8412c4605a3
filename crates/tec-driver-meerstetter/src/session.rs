//! Device session: one connection to one controller address.
//!
//! A session owns the transport and the request sequence counter behind a
//! single async mutex, so exactly one request is in flight at a time no
//! matter how many tasks share the session.
//!
//! Every logical operation is one exchange:
//!
//! 1. build the request with the current sequence number, then increment it
//! 2. drop any stale input, send, wait for one response line
//! 3. validate framing and checksum, decode the payload
//!
//! A failed exchange (timeout, corrupt frame, device error) leaves the
//! session connected; the next call simply uses the next sequence number.

use crate::codec::{decode_float32, decode_int32, Value, ValueKind};
use crate::frame::{build_request, parse_acknowledgement, parse_response, Command, Response};
use crate::registers::{
    self, Register, OBJECT_TEMPERATURE, OUTPUT_CURRENT, OUTPUT_ENABLE, OUTPUT_VOLTAGE,
    RAMP_START_POINT, SAVE_TO_FLASH_DISABLED, SINK_TEMPERATURE, TARGET_TEMPERATURE,
    TEMPERATURE_STABILITY,
};
use std::time::Duration;
use tec_core::capabilities::StabilityState;
use tec_core::error::{TecError, TecResult};
use tec_core::transport::Transport;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Writes issued on connect, before the identity query.
pub const CONNECT_SETUP: [(Register, Value); 2] = [
    (SAVE_TO_FLASH_DISABLED, Value::Int32(1)),
    (RAMP_START_POINT, Value::Int32(1)),
];

struct SessionState {
    sequence: u16,
    link: Option<Box<dyn Transport>>,
}

/// Stateful request/response session with one controller.
pub struct DeviceSession {
    address: u8,
    instance: u8,
    timeout: Duration,
    state: Mutex<SessionState>,
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("address", &self.address)
            .field("instance", &self.instance)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl DeviceSession {
    /// Create a disconnected session.
    pub fn new(address: u8, instance: u8, timeout: Duration) -> Self {
        Self {
            address,
            instance,
            timeout,
            state: Mutex::new(SessionState {
                sequence: 0,
                link: None,
            }),
        }
    }

    /// Device address this session talks to
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Channel used for register access
    pub fn instance(&self) -> u8 {
        self.instance
    }

    /// Response timeout per request
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sequence number the next request will carry.
    pub async fn next_sequence(&self) -> u16 {
        self.state.lock().await.sequence
    }

    #[cfg(test)]
    pub(crate) async fn set_next_sequence(&self, sequence: u16) {
        self.state.lock().await.sequence = sequence;
    }

    /// Whether a transport is attached.
    pub async fn is_connected(&self) -> bool {
        self.state
            .lock()
            .await
            .link
            .as_ref()
            .is_some_and(|link| link.is_connected())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Attach a transport and perform the connect handshake.
    ///
    /// Issues the [`CONNECT_SETUP`] writes, then queries the identity. If any
    /// step fails the transport is closed and the session stays
    /// disconnected.
    #[instrument(skip(self, transport), fields(address = self.address), err)]
    pub async fn connect(&self, transport: Box<dyn Transport>) -> TecResult<String> {
        let mut state = self.state.lock().await;
        if state.link.is_some() {
            return Err(TecError::InvalidRequest(
                "session is already connected".into(),
            ));
        }
        state.link = Some(transport);

        match self.handshake(&mut state).await {
            Ok(identity) => {
                info!(identity = %identity, "TEC session connected");
                Ok(identity)
            }
            Err(e) => {
                if let Some(mut link) = state.link.take() {
                    if let Err(close_err) = link.close().await {
                        warn!(error = %close_err, "close after failed handshake");
                    }
                }
                Err(e)
            }
        }
    }

    async fn handshake(&self, state: &mut SessionState) -> TecResult<String> {
        for (register, value) in CONNECT_SETUP {
            let command = write_command(&self.channel(register), value)?;
            self.exchange_locked(state, command).await?;
            info!(register = register.name, %value, "applied connect setting");
        }
        let response = self.exchange_locked(state, Command::Identify).await?;
        Ok(response.payload)
    }

    /// Close the transport. Further operations fail with
    /// [`TecError::NotConnected`]. Closing twice is a no-op.
    #[instrument(skip(self), fields(address = self.address), err)]
    pub async fn close(&self) -> TecResult<()> {
        let link = self.state.lock().await.link.take();
        if let Some(mut link) = link {
            link.close().await?;
            info!("TEC session closed");
        }
        Ok(())
    }

    // =========================================================================
    // Exchange
    // =========================================================================

    async fn exchange(&self, command: Command) -> TecResult<Response> {
        let mut state = self.state.lock().await;
        self.exchange_locked(&mut state, command).await
    }

    async fn exchange_locked(
        &self,
        state: &mut SessionState,
        command: Command,
    ) -> TecResult<Response> {
        let SessionState { sequence, link } = state;
        let link = link.as_mut().ok_or(TecError::NotConnected)?;

        let request_sequence = *sequence;
        let request = build_request(self.address, request_sequence, &command);
        *sequence = sequence.wrapping_add(1);

        let stale = link.discard_input().await?;
        if stale > 0 {
            warn!(bytes = stale, "discarded stale input before request");
        }

        debug!(request = %request, "sending");
        link.send(request.as_bytes()).await?;

        let raw = link.receive_line(self.timeout).await?;
        debug!(response = %raw, "received");

        let parsed = if command.expects_payload() {
            parse_response(&raw)
        } else {
            parse_acknowledgement(&raw, request.checksum())
        };
        let response = parsed.inspect_err(|e| {
            if !matches!(e, TecError::Device { .. }) {
                warn!(error = %e, response = %raw, "malformed response");
            }
        })?;

        if response.sequence != request_sequence {
            warn!(
                sent = request_sequence,
                echoed = response.sequence,
                "response echoes a different sequence number"
            );
        }

        Ok(response)
    }

    // =========================================================================
    // Register access
    // =========================================================================

    /// Read a register from the table (or any [`Register`] built by hand).
    #[instrument(skip(self, register), fields(register = register.name, id = register.id), err)]
    pub async fn read_register(&self, register: &Register) -> TecResult<Value> {
        let command = read_command(register)?;
        let response = self.exchange(command).await?;
        response.value(register.kind)
    }

    /// Write a register. Read-only registers and values of the wrong kind
    /// are rejected before anything is sent.
    #[instrument(skip(self, register), fields(register = register.name, id = register.id), err)]
    pub async fn write_register(&self, register: &Register, value: Value) -> TecResult<()> {
        let command = write_command(register, value)?;
        self.exchange(command).await.map(|_| ())
    }

    /// Read an arbitrary int32 parameter on this session's instance.
    #[instrument(skip(self), err)]
    pub async fn read_int32(&self, id: u16) -> TecResult<i32> {
        let command = self.read_raw_command(id, ValueKind::Int32)?;
        let response = self.exchange(command).await?;
        decode_int32(&response.payload)
    }

    /// Read an arbitrary float32 parameter on this session's instance.
    #[instrument(skip(self), err)]
    pub async fn read_float32(&self, id: u16) -> TecResult<f32> {
        let command = self.read_raw_command(id, ValueKind::Float32)?;
        let response = self.exchange(command).await?;
        decode_float32(&response.payload)
    }

    /// Write an arbitrary int32 parameter on this session's instance.
    #[instrument(skip(self), err)]
    pub async fn write_int32(&self, id: u16, value: i32) -> TecResult<()> {
        let command = self.write_raw_command(id, Value::Int32(value))?;
        self.exchange(command).await.map(|_| ())
    }

    /// Write an arbitrary float32 parameter on this session's instance.
    #[instrument(skip(self), err)]
    pub async fn write_float32(&self, id: u16, value: f32) -> TecResult<()> {
        let command = self.write_raw_command(id, Value::Float32(value))?;
        self.exchange(command).await.map(|_| ())
    }

    fn read_raw_command(&self, id: u16, kind: ValueKind) -> TecResult<Command> {
        match registers::by_id(id) {
            Some(register) => {
                check_kind(register, kind)?;
                read_command(&self.channel(*register))
            }
            None => Ok(Command::Read {
                id,
                instance: self.instance,
            }),
        }
    }

    fn write_raw_command(&self, id: u16, value: Value) -> TecResult<Command> {
        // Table registers keep their access rules when addressed by id
        match registers::by_id(id) {
            Some(register) => write_command(&self.channel(*register), value),
            None => Ok(Command::Write {
                id,
                instance: self.instance,
                value,
            }),
        }
    }

    fn channel(&self, register: Register) -> Register {
        register.with_instance(self.instance)
    }

    async fn read_float(&self, register: Register) -> TecResult<f32> {
        match self.read_register(&self.channel(register)).await? {
            Value::Float32(v) => Ok(v),
            other => Err(TecError::Decode(format!(
                "{} returned {:?}, expected a float",
                register.name, other
            ))),
        }
    }

    async fn read_int(&self, register: Register) -> TecResult<i32> {
        match self.read_register(&self.channel(register)).await? {
            Value::Int32(v) => Ok(v),
            other => Err(TecError::Decode(format!(
                "{} returned {:?}, expected an integer",
                register.name, other
            ))),
        }
    }

    // =========================================================================
    // Logical operations
    // =========================================================================

    /// Object (load) temperature in °C
    pub async fn object_temperature(&self) -> TecResult<f32> {
        self.read_float(OBJECT_TEMPERATURE).await
    }

    /// Heat sink temperature in °C
    pub async fn sink_temperature(&self) -> TecResult<f32> {
        self.read_float(SINK_TEMPERATURE).await
    }

    /// Regulation target in °C
    pub async fn target_temperature(&self) -> TecResult<f32> {
        self.read_float(TARGET_TEMPERATURE).await
    }

    /// Set the regulation target in °C. Does not enable the output.
    pub async fn set_target_temperature(&self, celsius: f32) -> TecResult<()> {
        if !celsius.is_finite() {
            return Err(TecError::InvalidRequest(format!(
                "target temperature must be finite, got {}",
                celsius
            )));
        }
        self.write_register(&self.channel(TARGET_TEMPERATURE), Value::Float32(celsius))
            .await
    }

    /// Actual output current in A
    pub async fn output_current(&self) -> TecResult<f32> {
        self.read_float(OUTPUT_CURRENT).await
    }

    /// Actual output voltage in V
    pub async fn output_voltage(&self) -> TecResult<f32> {
        self.read_float(OUTPUT_VOLTAGE).await
    }

    /// Stability of the control loop. Unknown codes are a decode error.
    pub async fn stability_state(&self) -> TecResult<StabilityState> {
        let code = self.read_int(TEMPERATURE_STABILITY).await?;
        StabilityState::try_from(code)
    }

    /// Turn the output stage on
    pub async fn enable_control(&self) -> TecResult<()> {
        self.write_register(&self.channel(OUTPUT_ENABLE), Value::Int32(1))
            .await
    }

    /// Turn the output stage off
    pub async fn disable_control(&self) -> TecResult<()> {
        self.write_register(&self.channel(OUTPUT_ENABLE), Value::Int32(0))
            .await
    }

    /// Emergency stop (`ES`). Returns whatever payload the device sends.
    #[instrument(skip(self), fields(address = self.address), err)]
    pub async fn stop(&self) -> TecResult<String> {
        Ok(self.exchange(Command::Stop).await?.payload)
    }

    /// Reset the controller (`RS`).
    #[instrument(skip(self), fields(address = self.address), err)]
    pub async fn reset(&self) -> TecResult<String> {
        Ok(self.exchange(Command::Reset).await?.payload)
    }

    /// Identity string (`?IF`).
    #[instrument(skip(self), fields(address = self.address), err)]
    pub async fn identify(&self) -> TecResult<String> {
        Ok(self.exchange(Command::Identify).await?.payload)
    }
}

fn read_command(register: &Register) -> TecResult<Command> {
    if !register.access.readable() {
        return Err(TecError::InvalidRequest(format!(
            "register {} ({}) is write-only",
            register.name, register.id
        )));
    }
    Ok(Command::Read {
        id: register.id,
        instance: register.instance,
    })
}

fn write_command(register: &Register, value: Value) -> TecResult<Command> {
    if !register.access.writable() {
        return Err(TecError::InvalidRequest(format!(
            "register {} ({}) is read-only",
            register.name, register.id
        )));
    }
    check_kind(register, value.kind())?;
    Ok(Command::Write {
        id: register.id,
        instance: register.instance,
        value,
    })
}

fn check_kind(register: &Register, kind: ValueKind) -> TecResult<()> {
    if kind != register.kind {
        return Err(TecError::InvalidRequest(format!(
            "register {} holds {:?}, not {:?}",
            register.name, register.kind, kind
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_device::{self, Reply};
    use std::sync::Arc;
    use tokio::task::JoinHandle;

    const IDENTITY: &str = "TEC-1089-SV";

    fn session() -> DeviceSession {
        DeviceSession::new(2, 1, Duration::from_millis(200))
    }

    /// Session that has completed the handshake; `script` covers what follows.
    async fn connected(script: Vec<Reply>) -> (DeviceSession, JoinHandle<Vec<String>>) {
        let mut full = vec![Reply::Ack, Reply::Ack, Reply::text(IDENTITY)];
        full.extend(script);
        let (transport, device) = fake_device::spawn(full);

        let session = session();
        let identity = session.connect(transport).await.unwrap();
        assert_eq!(identity, IDENTITY);
        (session, device)
    }

    #[tokio::test]
    async fn connect_writes_setup_then_identifies() {
        let (session, device) = connected(vec![]).await;
        assert!(session.is_connected().await);
        assert_eq!(session.next_sequence().await, 3);

        session.close().await.unwrap();
        let seen = device.await.unwrap();
        assert_eq!(
            seen,
            vec![
                "#020000VS006C01000000014A88",
                "#020001VSC35A0100000001CDC7",
                "#020002?IF7816",
            ]
        );
    }

    #[tokio::test]
    async fn reads_object_temperature() {
        let (session, device) = connected(vec![Reply::float(25.0)]).await;

        assert_eq!(session.object_temperature().await.unwrap(), 25.0);

        session.close().await.unwrap();
        let seen = device.await.unwrap();
        assert_eq!(seen[3], "#020003?VR03E801AC05");
    }

    #[tokio::test]
    async fn logical_reads_use_register_table() {
        let (session, device) = connected(vec![
            Reply::float(31.5),
            Reply::float(20.0),
            Reply::float(1.25),
            Reply::float(-3.5),
        ])
        .await;

        assert_eq!(session.sink_temperature().await.unwrap(), 31.5);
        assert_eq!(session.target_temperature().await.unwrap(), 20.0);
        assert_eq!(session.output_current().await.unwrap(), 1.25);
        assert_eq!(session.output_voltage().await.unwrap(), -3.5);

        session.close().await.unwrap();
        let seen = device.await.unwrap();
        assert!(seen[3].starts_with("#020003?VR03E901"));
        assert!(seen[4].starts_with("#020004?VR0BB801"));
        assert!(seen[5].starts_with("#020005?VR03FC01"));
        assert!(seen[6].starts_with("#020006?VR03FD01"));
    }

    #[tokio::test]
    async fn stability_codes_decode() {
        let (session, device) =
            connected(vec![Reply::int(2), Reply::int(5), Reply::int(0)]).await;

        assert_eq!(
            session.stability_state().await.unwrap(),
            StabilityState::Stable
        );
        assert!(matches!(
            session.stability_state().await,
            Err(TecError::Decode(_))
        ));
        // Session stays usable after a decode failure
        assert_eq!(session.stability_state().await.unwrap(), StabilityState::Off);

        session.close().await.unwrap();
        let seen = device.await.unwrap();
        assert!(seen[3].starts_with("#020003?VR04B001335D"));
    }

    #[tokio::test]
    async fn control_writes() {
        let (session, device) = connected(vec![Reply::Ack, Reply::Ack, Reply::Ack]).await;

        session.set_target_temperature(25.0).await.unwrap();
        session.enable_control().await.unwrap();
        session.disable_control().await.unwrap();

        session.close().await.unwrap();
        let seen = device.await.unwrap();
        assert!(seen[3].starts_with("#020003VS0BB80141C80000"));
        assert!(seen[4].starts_with("#020004VS07DA0100000001"));
        assert!(seen[5].starts_with("#020005VS07DA0100000000"));
    }

    #[tokio::test]
    async fn ack_echoing_request_checksum_is_accepted() {
        let (transport, device) = fake_device::spawn(vec![Reply::Raw("!020001B28B".into())]);
        let session = session();
        {
            let mut state = session.state.lock().await;
            state.link = Some(transport);
        }
        session.set_next_sequence(1).await;

        session.enable_control().await.unwrap();

        session.close().await.unwrap();
        assert_eq!(device.await.unwrap(), vec!["#020001VS07DA0100000001B28B"]);
    }

    #[tokio::test]
    async fn bare_operations_return_payload() {
        let (session, _device) = connected(vec![
            Reply::Ack,
            Reply::Ack,
            Reply::text(IDENTITY),
        ])
        .await;

        assert_eq!(session.stop().await.unwrap(), "");
        assert_eq!(session.reset().await.unwrap(), "");
        assert_eq!(session.identify().await.unwrap(), IDENTITY);
    }

    #[tokio::test]
    async fn device_error_is_passed_through() {
        let (session, _device) = connected(vec![Reply::Error(6), Reply::float(25.0)]).await;

        match session.set_target_temperature(99.0).await {
            Err(TecError::Device { code, .. }) => assert_eq!(code, 6),
            other => panic!("expected device error, got {other:?}"),
        }
        assert_eq!(session.object_temperature().await.unwrap(), 25.0);
        assert_eq!(session.next_sequence().await, 5);
    }

    #[tokio::test]
    async fn timeout_consumes_sequence_number() {
        let (session, device) = connected(vec![Reply::Silent, Reply::float(21.0)]).await;

        let err = session.object_temperature().await.unwrap_err();
        assert!(matches!(err, TecError::Timeout(_)));
        assert!(err.is_transient());
        assert_eq!(session.next_sequence().await, 4);

        assert_eq!(session.object_temperature().await.unwrap(), 21.0);

        session.close().await.unwrap();
        let seen = device.await.unwrap();
        assert!(seen[3].starts_with("#020003"));
        assert!(seen[4].starts_with("#020004"));
    }

    #[tokio::test]
    async fn corrupt_response_is_checksum_mismatch() {
        let (session, _device) = connected(vec![
            Reply::Raw("!02000341C80000FFFF".into()),
            Reply::float(22.0),
        ])
        .await;

        assert!(matches!(
            session.object_temperature().await,
            Err(TecError::ChecksumMismatch { received: 0xFFFF, .. })
        ));
        assert_eq!(session.object_temperature().await.unwrap(), 22.0);
    }

    #[tokio::test]
    async fn invalid_writes_are_rejected_before_sending() {
        let (session, device) = connected(vec![]).await;

        let err = session
            .write_register(&OBJECT_TEMPERATURE, Value::Float32(1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, TecError::InvalidRequest(_)));

        let err = session
            .write_register(&TARGET_TEMPERATURE, Value::Int32(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TecError::InvalidRequest(_)));

        let err = session.write_float32(1001, 1.0).await.unwrap_err();
        assert!(matches!(err, TecError::InvalidRequest(_)));

        let err = session.set_target_temperature(f32::NAN).await.unwrap_err();
        assert!(matches!(err, TecError::InvalidRequest(_)));

        let err = session.read_register(&RAMP_START_POINT).await.unwrap_err();
        assert!(matches!(err, TecError::InvalidRequest(_)));

        assert_eq!(session.next_sequence().await, 3);
        session.close().await.unwrap();
        assert_eq!(device.await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn raw_reads_follow_the_register_table() {
        let (session, device) = connected(vec![Reply::int(2)]).await;

        let err = session.read_float32(1200).await.unwrap_err();
        assert!(matches!(err, TecError::InvalidRequest(_)));

        let err = session.read_int32(1000).await.unwrap_err();
        assert!(matches!(err, TecError::InvalidRequest(_)));

        let err = session.read_int32(108).await.unwrap_err();
        assert!(matches!(err, TecError::InvalidRequest(_)));

        assert_eq!(session.read_int32(1200).await.unwrap(), 2);

        assert_eq!(session.next_sequence().await, 4);
        session.close().await.unwrap();
        let seen = device.await.unwrap();
        assert_eq!(seen.len(), 4);
        assert!(seen[3].starts_with("#020003?VR04B001"));
    }

    #[tokio::test]
    async fn raw_parameter_access() {
        let (session, device) =
            connected(vec![Reply::int(-7), Reply::float(0.5), Reply::Ack, Reply::Ack]).await;

        assert_eq!(session.read_int32(0x1234).await.unwrap(), -7);
        assert_eq!(session.read_float32(0x1235).await.unwrap(), 0.5);
        session.write_int32(0x1236, -1).await.unwrap();
        session.write_float32(3000, 18.5).await.unwrap();

        session.close().await.unwrap();
        let seen = device.await.unwrap();
        assert!(seen[3].starts_with("#020003?VR123401"));
        assert!(seen[4].starts_with("#020004?VR123501"));
        assert!(seen[5].starts_with("#020005VS123601FFFFFFFF"));
        assert!(seen[6].starts_with("#020006VS0BB80141940000"));
    }

    #[tokio::test]
    async fn sequence_wraps_after_ffff() {
        let (session, device) = connected(vec![Reply::Ack, Reply::Ack]).await;
        session.set_next_sequence(0xFFFF).await;

        session.stop().await.unwrap();
        assert_eq!(session.next_sequence().await, 0);
        session.stop().await.unwrap();

        session.close().await.unwrap();
        let seen = device.await.unwrap();
        assert_eq!(seen[3], "#02FFFFESB0B1");
        assert!(seen[4].starts_with("#020000ES"));
    }

    #[tokio::test]
    async fn operations_require_connection() {
        let session = session();
        assert!(!session.is_connected().await);
        assert!(matches!(
            session.object_temperature().await,
            Err(TecError::NotConnected)
        ));
        assert!(matches!(session.stop().await, Err(TecError::NotConnected)));
        // Closing a session that was never opened is fine
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_disconnects() {
        let (session, _device) = connected(vec![]).await;

        session.close().await.unwrap();
        assert!(!session.is_connected().await);
        assert!(matches!(
            session.identify().await,
            Err(TecError::NotConnected)
        ));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn failed_handshake_leaves_session_disconnected() {
        let (transport, device) = fake_device::spawn(vec![Reply::Error(3)]);
        let session = session();

        let err = session.connect(transport).await.unwrap_err();
        assert!(matches!(err, TecError::Device { code: 3, .. }));
        assert!(!session.is_connected().await);
        assert_eq!(device.await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn second_connect_is_rejected() {
        let (session, _device) = connected(vec![]).await;
        let (transport, _other) = fake_device::spawn(vec![]);

        assert!(matches!(
            session.connect(transport).await,
            Err(TecError::InvalidRequest(_))
        ));
        assert!(session.is_connected().await);
    }

    #[tokio::test]
    async fn concurrent_callers_are_serialized() {
        let (session, device) = connected(vec![Reply::float(1.0), Reply::float(1.0)]).await;
        let session = Arc::new(session);

        let a = tokio::spawn({
            let session = session.clone();
            async move { session.object_temperature().await }
        });
        let b = tokio::spawn({
            let session = session.clone();
            async move { session.sink_temperature().await }
        });
        assert_eq!(a.await.unwrap().unwrap(), 1.0);
        assert_eq!(b.await.unwrap().unwrap(), 1.0);

        session.close().await.unwrap();
        let seen = device.await.unwrap();
        let mut sequences: Vec<&str> = seen[3..].iter().map(|r| &r[3..7]).collect();
        sequences.sort_unstable();
        assert_eq!(sequences, vec!["0003", "0004"]);
    }
}
