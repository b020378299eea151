//! Platform backends for initiator management
//!
//! Every backend exposes the same connection-management contract. Backends
//! whose tooling is coarser than the contract report the gap as
//! [`InitiatorError::Unsupported`] instead of emulating it.
//!
//! # Usage
//!
//! ```ignore
//! use solaris_iscsi::platform::{ConnectionManager, SolarisConnectionManager};
//!
//! let manager = SolarisConnectionManager::with_process_runner(Default::default());
//! let target = manager.discover("10.0.0.5".parse()?, 3260)?;
//! let sessions = manager.login_all(&target)?;
//! ```

mod solaris;

use std::net::IpAddr;

use crate::error::{InitiatorError, Result};
use crate::types::{DEFAULT_ISCSI_PORT, Endpoint, Iqn, Session, Target};

pub use solaris::{SolarisConnectionManager, SolarisSoftwareInitiator, is_solaris_os};

/// iSCSI connection management for one host.
///
/// All operations act on host-wide initiator state and are not serialized
/// internally; callers must not issue mutating calls concurrently.
pub trait ConnectionManager {
    /// All targets reachable through the configured discovery addresses.
    fn get_discovered_targets(&self) -> Result<Vec<Target>>;

    /// Register `address:port` as a discovery address and return the target
    /// found through it.
    fn discover(&self, address: IpAddr, port: u16) -> Result<Target>;

    /// Remove `target`'s discovery address, or every discovery address when
    /// `target` is `None`.
    fn undiscover(&self, target: Option<&Target>) -> Result<()>;

    /// Log into a single endpoint of `target`.
    fn login(&self, target: &Target, endpoint: &Endpoint, num_of_connections: u32)
    -> Result<Session>;

    /// Log into every endpoint of `target` and return the resulting sessions.
    fn login_all(&self, target: &Target) -> Result<Vec<Session>>;

    /// Close a single session.
    fn logout(&self, session: &Session) -> Result<()>;

    /// Close every session to `target`.
    fn logout_all(&self, target: &Target) -> Result<()>;

    /// Active sessions, optionally restricted to one target.
    fn get_sessions(&self, target: Option<&Target>) -> Result<Vec<Session>>;

    /// Rescan for new LUNs.
    fn rescan(&self) -> Result<()>;

    /// The local initiator's node name.
    fn get_source_identifier(&self) -> Result<Iqn>;

    /// Replace the local initiator's node name.
    ///
    /// `iqn` is validated before anything is changed on the host.
    fn set_source_identifier(&self, iqn: &str) -> Result<()>;

    /// [`discover`](Self::discover) on the well-known iSCSI port.
    fn discover_default_port(&self, address: IpAddr) -> Result<Target> {
        self.discover(address, DEFAULT_ISCSI_PORT)
    }

    /// Look a discovered target up by name.
    fn find_target(&self, iqn: &Iqn) -> Result<Target> {
        self.get_discovered_targets()?
            .into_iter()
            .find(|target| target.iqn() == iqn)
            .ok_or_else(|| InitiatorError::TargetNotFound(iqn.to_string()))
    }
}

/// Presence of the host's iSCSI initiator software.
pub trait SoftwareInitiator {
    fn is_installed(&self) -> bool;
    fn install(&self) -> Result<()>;
    fn uninstall(&self) -> Result<()>;
}
