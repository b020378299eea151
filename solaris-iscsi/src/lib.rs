//! Solaris iSCSI Initiator Management Library
//!
//! Manages the local iSCSI initiator (discovery, login/logout, session
//! enumeration) by driving `iscsiadm` and turning its listings into
//! targets, endpoints and sessions.
//!
//! This library provides:
//! - Parsers and correlation for `iscsiadm` output
//! - A connection manager contract shared by platform backends
//! - The Solaris backend and initiator package probe

pub mod config;
pub mod error;
pub mod iscsiadm;
pub mod metrics;
pub mod platform;
pub mod runner;
pub mod types;

pub use config::InitiatorConfig;
pub use error::{InitiatorError, Result};
pub use platform::{
    ConnectionManager, SoftwareInitiator, SolarisConnectionManager, SolarisSoftwareInitiator,
};
pub use runner::{CommandOutput, CommandRunner, ProcessCommandRunner};
pub use types::{DEFAULT_ISCSI_PORT, Endpoint, Hct, Iqn, Session, Target};
