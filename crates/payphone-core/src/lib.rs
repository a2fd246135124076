//! # Payphone-Core
//!
//! Coordination core of a gateway that connects a mechanical payphone to a
//! VoIP call.
//!
//! This crate provides:
//! - A supervised serial link to the payphone hardware with bounded restarts
//! - Decoding of the single byte line protocol (digits, hook, follow key)
//! - Dial sequence collection with a sliding inter-digit timeout
//! - The single-line call state machine tying hook, ringer and call together
//! - [`PhoneController`], the loop that owns all of the above
//!
//! ## Architecture
//!
//! The serial worker and the controller loop communicate only through two
//! bounded queues. Call-signaling callbacks are funneled into a third queue,
//! so every state change happens inside the controller's single dispatch
//! point. The VoIP stack itself stays outside; the controller talks to it
//! through the [`CallSignaling`] trait.
//!
//! ```rust,no_run
//! use payphone_core::{ControllerConfig, PhoneController, SerialPortOpener};
//! # use payphone_core::{CallSignaling, SipAccount};
//! # use std::sync::Arc;
//! # use tokio_util::sync::CancellationToken;
//! # async fn example(signaling: Arc<dyn CallSignaling>, account: SipAccount)
//! #     -> payphone_core::PayphoneResult<()> {
//! let config = ControllerConfig::default();
//! let opener = SerialPortOpener::new("/dev/ttyAMA0", 9600, config.serial_read_timeout());
//!
//! let controller = PhoneController::new(
//!     config,
//!     account,
//!     signaling,
//!     Arc::new(opener),
//!     CancellationToken::new(),
//! )?;
//! controller.run().await
//! # }
//! ```

pub mod call;
pub mod config;
pub mod controller;
pub mod dial;
pub mod error;
pub mod line;
pub mod link;
pub mod phone;
pub mod supervisor;

pub use call::{
    CallHandle, CallSession, CallSignaling, CallState, NotificationForwarder, RemoteCallState,
    SignalingEventHandler, SignalingNotification,
};
pub use config::{ControllerConfig, LineSymbols, SerialConfig, SipAccount};
pub use controller::PhoneController;
pub use dial::{DialCollector, DialedNumber};
pub use error::{LinkError, PayphoneError, PayphoneResult, QueueFull, SignalingError};
pub use line::{HardwareEvent, HookState, LineCommand, LineEventDecoder, ReceivedEvent};
pub use link::{LinkPort, LinkState, PortOpener, SerialLink, SerialPortOpener};
pub use phone::{Action, ControllerState, ControllerStats, StatusSnapshot};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
