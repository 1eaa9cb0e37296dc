//! # pathtrigger - constraint-driven environment-event injection
//!
//! pathtrigger drives dynamic analysis of an Android application by
//! remotely controlling a running instance and injecting environment
//! events (location fixes, SMS messages, alarms, timer ticks) chosen to
//! steer execution down a statically identified code path.
//!
//! ## Core Concepts
//!
//! - **Path descriptor**: per-application analyzer output mapping path ids
//!   to ordered event chains
//! - **Constraint**: one environment event plus the symbolic conditions
//!   its injected data must satisfy
//! - **Control link**: line-oriented command/notification channel to the
//!   instrumented remote instance
//! - **Trigger session**: the orchestrator walking a chain, solving each
//!   constraint against live state and emitting trigger commands
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pathtrigger::channel::ControlLink;
//! use pathtrigger::device::AdbDevice;
//! use pathtrigger::session::{SessionConfig, TriggerSession};
//! use pathtrigger::transport::TcpTransport;
//!
//! let transport = Arc::new(TcpTransport::connect("127.0.0.1:12348")?);
//! let link = Arc::new(ControlLink::new(transport));
//! let device = Arc::new(AdbDevice::new("adb"));
//!
//! let mut session = TriggerSession::new(link, device, SessionConfig::default());
//! session.load_application("analysis/com.example.target".as_ref())?;
//! let report = session.trigger_path("1")?;
//! println!("{}/{} constraints fired", report.triggered(), report.outcomes().len());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channel;
pub mod device;
pub mod error;
pub mod path;
pub mod program;
pub mod session;
pub mod solver;
pub mod synth;
pub mod transport;

// Re-export primary types at crate root for convenience
pub use channel::{Command, ControlLink, Field, Inbound, ListenerKind, QueryCategory};
pub use device::{AdbDevice, DeviceControl};
pub use error::{ChannelError, ConstraintError, DeviceError, TriggerError, TriggerResult};
pub use path::{CallPath, Constraint, ConstraintKind, FieldMapping, PathDescriptor};
pub use program::{Assertion, Expr, FreeVariable, Sort, SymbolicProgram};
pub use session::{PathReport, SessionConfig, SessionState, TriggerSession};
pub use solver::{Observed, ResolvedValue, SolverModel};
pub use synth::ConcreteInput;
