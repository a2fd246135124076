//! Shared fakes for the controller integration tests
//!
//! `FakeLine` stands in for the payphone hardware: tests feed it inbound
//! bytes, read back what the gateway wrote, and inject open or I/O failures.
//! `RecordingSignaling` stands in for the VoIP stack and records every request.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use payphone_core::{
    CallHandle, CallSignaling, ControllerConfig, LinkError, LinkPort, PhoneController,
    PortOpener, SignalingError, SipAccount,
};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const SERVER: &str = "pbx.example.org";

pub fn account() -> SipAccount {
    SipAccount {
        server: SERVER.to_string(),
        username: "payphone".to_string(),
        secret: "secret".to_string(),
    }
}

/// Short timings so supervision and dialing finish quickly
pub fn fast_config() -> ControllerConfig {
    ControllerConfig::default()
        .with_tick_interval(Duration::from_millis(50))
        .with_dial_timeout(Duration::from_millis(300))
        .with_restart_timing(Duration::from_millis(20), Duration::from_millis(60))
        .with_poll_intervals(Duration::from_millis(1), Duration::from_millis(5))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("payphone_core=debug")
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct LineInner {
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    opens: u32,
    failing_opens: u32,
    fail_next_io: bool,
    input_clears: u32,
}

/// In-memory payphone hardware
#[derive(Clone, Default)]
pub struct FakeLine {
    inner: Arc<Mutex<LineInner>>,
}

impl FakeLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` opens fail
    pub fn fail_opens(&self, count: u32) {
        self.inner.lock().failing_opens = count;
    }

    /// Fail the current port's next I/O call, then fail `failing_opens` reopens
    pub fn unplug(&self, failing_opens: u32) {
        let mut inner = self.inner.lock();
        inner.fail_next_io = true;
        inner.failing_opens = failing_opens;
    }

    /// Queue bytes as if the hardware had sent them
    pub fn feed(&self, bytes: &[u8]) {
        self.inner.lock().inbound.extend(bytes.iter().copied());
    }

    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().written.clone()
    }

    pub fn opens(&self) -> u32 {
        self.inner.lock().opens
    }

    pub fn input_clears(&self) -> u32 {
        self.inner.lock().input_clears
    }

    pub fn opener(&self) -> Arc<dyn PortOpener> {
        Arc::new(FakeOpener { line: self.clone() })
    }
}

struct FakeOpener {
    line: FakeLine,
}

impl PortOpener for FakeOpener {
    fn port_name(&self) -> &str {
        "/dev/fake-payphone"
    }

    fn open(&self) -> Result<Box<dyn LinkPort>, LinkError> {
        let mut inner = self.line.inner.lock();
        inner.opens += 1;
        if inner.failing_opens > 0 {
            inner.failing_opens -= 1;
            return Err(LinkError::no_device(self.port_name(), "unplugged"));
        }
        Ok(Box::new(FakePort {
            line: self.line.clone(),
        }))
    }
}

struct FakePort {
    line: FakeLine,
}

impl FakePort {
    fn check_io(inner: &mut LineInner) -> Result<(), LinkError> {
        if inner.fail_next_io {
            inner.fail_next_io = false;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged").into());
        }
        Ok(())
    }
}

impl LinkPort for FakePort {
    fn name(&self) -> &str {
        "/dev/fake-payphone"
    }

    fn bytes_to_read(&mut self) -> Result<u32, LinkError> {
        let mut inner = self.line.inner.lock();
        Self::check_io(&mut inner)?;
        Ok(inner.inbound.len() as u32)
    }

    fn read_byte(&mut self) -> Result<Option<u8>, LinkError> {
        let mut inner = self.line.inner.lock();
        Self::check_io(&mut inner)?;
        Ok(inner.inbound.pop_front())
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), LinkError> {
        let mut inner = self.line.inner.lock();
        Self::check_io(&mut inner)?;
        inner.written.push(byte);
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), LinkError> {
        self.line.inner.lock().input_clears += 1;
        Ok(())
    }
}

/// One request received by [`RecordingSignaling`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Register(String),
    PlaceCall(String),
    Answer(CallHandle, u16),
    Hangup(CallHandle),
    SendDtmf(CallHandle, char),
    ConnectAudio(CallHandle),
    Shutdown,
}

/// Signaling fake that records requests and issues `call-N` handles
#[derive(Default)]
pub struct RecordingSignaling {
    requests: Mutex<Vec<Request>>,
    next_call: Mutex<u32>,
    reject_registration: bool,
    reject_calls: bool,
}

impl RecordingSignaling {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rejecting_registration() -> Arc<Self> {
        Arc::new(Self {
            reject_registration: true,
            ..Default::default()
        })
    }

    pub fn rejecting_calls() -> Arc<Self> {
        Arc::new(Self {
            reject_calls: true,
            ..Default::default()
        })
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    pub fn placed_calls(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                Request::PlaceCall(destination) => Some(destination),
                _ => None,
            })
            .collect()
    }

    pub fn answers(&self) -> Vec<(CallHandle, u16)> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                Request::Answer(call, code) => Some((call, code)),
                _ => None,
            })
            .collect()
    }

    pub fn has(&self, request: &Request) -> bool {
        self.requests.lock().contains(request)
    }

    fn record(&self, request: Request) {
        self.requests.lock().push(request);
    }
}

#[async_trait]
impl CallSignaling for RecordingSignaling {
    async fn register_account(&self, account: &SipAccount) -> Result<(), SignalingError> {
        self.record(Request::Register(account.server.clone()));
        if self.reject_registration {
            return Err(SignalingError::registration(&account.server, "403 Forbidden"));
        }
        Ok(())
    }

    async fn place_call(&self, destination: &str) -> Result<CallHandle, SignalingError> {
        self.record(Request::PlaceCall(destination.to_string()));
        if self.reject_calls {
            return Err(SignalingError::call_failed("place-call", "503 Service Unavailable"));
        }
        let mut next = self.next_call.lock();
        *next += 1;
        Ok(CallHandle::new(format!("call-{}", *next)))
    }

    async fn answer(&self, call: &CallHandle, code: u16) -> Result<(), SignalingError> {
        self.record(Request::Answer(call.clone(), code));
        Ok(())
    }

    async fn hangup(&self, call: &CallHandle) -> Result<(), SignalingError> {
        self.record(Request::Hangup(call.clone()));
        Ok(())
    }

    async fn send_dtmf(&self, call: &CallHandle, digit: char) -> Result<(), SignalingError> {
        self.record(Request::SendDtmf(call.clone(), digit));
        Ok(())
    }

    async fn connect_audio(&self, call: &CallHandle) -> Result<(), SignalingError> {
        self.record(Request::ConnectAudio(call.clone()));
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), SignalingError> {
        self.record(Request::Shutdown);
        Ok(())
    }
}

pub fn controller(
    config: ControllerConfig,
    line: &FakeLine,
    signaling: Arc<RecordingSignaling>,
) -> PhoneController {
    PhoneController::new(
        config,
        account(),
        signaling,
        line.opener(),
        CancellationToken::new(),
    )
    .expect("valid controller configuration")
}

/// Poll `condition` until it holds or `limit` elapses
pub async fn eventually<F>(limit: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
