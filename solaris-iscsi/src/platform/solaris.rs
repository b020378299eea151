//! Solaris platform implementation
//!
//! Uses the native tools:
//! - iscsiadm for discovery, sessions and initiator configuration
//! - pkginfo for the initiator package check
//!
//! `iscsiadm` cannot log into or out of a single endpoint. Logins happen by
//! enabling SendTargets auto-login for everything discovered, and sessions
//! are torn down by removing the discovery address they came from.

use std::net::IpAddr;

use tracing::{debug, error, info, instrument, warn};

use super::{ConnectionManager, SoftwareInitiator};
use crate::config::InitiatorConfig;
use crate::error::{InitiatorError, Result};
use crate::iscsiadm::{self, DiscoveryRecord, parser, topology};
use crate::metrics::timed;
use crate::runner::{CommandOutput, CommandRunner, ProcessCommandRunner, command_line};
use crate::types::{Endpoint, Iqn, Session, Target};

/// Packages that make up the Solaris software initiator.
const INITIATOR_PACKAGES: [&str; 2] = ["SUNWiscsir", "SUNWiscsiu"];

/// Whether `os` (as reported by `std::env::consts::OS`) is a Solaris family system.
pub fn is_solaris_os(os: &str) -> bool {
    matches!(os, "solaris" | "illumos")
}

/// Connection manager backed by `iscsiadm`.
#[derive(Debug, Clone)]
pub struct SolarisConnectionManager<R: CommandRunner = ProcessCommandRunner> {
    runner: R,
    config: InitiatorConfig,
}

impl SolarisConnectionManager<ProcessCommandRunner> {
    /// Manager that runs the real host tools.
    pub fn with_process_runner(config: InitiatorConfig) -> Self {
        Self::new(ProcessCommandRunner, config)
    }
}

impl<R: CommandRunner> SolarisConnectionManager<R> {
    pub fn new(runner: R, config: InitiatorConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &InitiatorConfig {
        &self.config
    }

    /// Run an `iscsiadm` command that must succeed.
    fn iscsiadm(&self, args: &[&str]) -> Result<CommandOutput> {
        debug!(command = %command_line(&self.config.iscsiadm_path, args), "running");
        self.runner.run_checked(&self.config.iscsiadm_path, args)
    }

    /// Run an `iscsiadm` command whose exit code the caller inspects.
    fn iscsiadm_unchecked(&self, args: &[&str]) -> Result<CommandOutput> {
        debug!(command = %command_line(&self.config.iscsiadm_path, args), "running");
        self.runner.run(&self.config.iscsiadm_path, args)
    }

    fn list_discovery_addresses(&self) -> Result<Vec<Endpoint>> {
        let output = self.iscsiadm(iscsiadm::LIST_DISCOVERY_ADDRESSES)?;
        parser::parse_discovery_addresses(&output.stdout)
    }

    /// Configured discovery addresses plus everything discovered through them.
    fn discovery_state(&self) -> Result<(Vec<Endpoint>, Vec<DiscoveryRecord>)> {
        let addresses = self.list_discovery_addresses()?;
        if addresses.is_empty() {
            debug!("No discovery addresses configured");
            return Ok((addresses, Vec::new()));
        }

        let args = iscsiadm::LIST_DISCOVERED_TARGETS;
        let output = self.iscsiadm_unchecked(args)?;
        if !output.is_success() {
            let command = command_line(&self.config.iscsiadm_path, args);
            error!(command = %command, stderr = %output.stderr, "Discovery listing failed");
            return Err(InitiatorError::NoNetworkAccess {
                command,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        let records = parser::parse_discovered_targets(&output.stdout)?;
        Ok((addresses, records))
    }

    /// Remove one discovery address without failing on a non-zero exit.
    fn remove_discovery_address(&self, endpoint: Endpoint) -> Result<()> {
        let portal = endpoint.to_portal_string();
        info!(portal = %portal, "Removing discovery address");
        let output = self.iscsiadm_unchecked(&iscsiadm::remove_discovery_address(&portal))?;
        if !output.is_success() {
            warn!(
                portal = %portal,
                code = ?output.code,
                stderr = %output.stderr,
                "Failed to remove discovery address (ignored)"
            );
        }
        Ok(())
    }

    fn set_auto_login(&self, enabled: bool) -> Result<()> {
        let args = if enabled {
            iscsiadm::ENABLE_AUTO_LOGIN
        } else {
            iscsiadm::DISABLE_AUTO_LOGIN
        };
        debug!(enabled, "Setting auto-login");
        self.iscsiadm(args).map(|_| ())
    }

    /// Configure how many sessions the initiator opens per target.
    ///
    /// Solaris needs this set in advance; the count used is the largest
    /// number of endpoints any discovered target has. Returns the configured
    /// count, or 0 when nothing is discovered and nothing was changed.
    #[instrument(skip(self))]
    pub fn configure_session_count(&self) -> Result<usize> {
        timed("configure_session_count", || {
            let count = self
                .get_discovered_targets()?
                .iter()
                .map(|target| target.endpoints().len())
                .max()
                .unwrap_or(0);
            if count == 0 {
                debug!("No discovered targets, leaving session count unchanged");
                return Ok(0);
            }

            info!(count, "Changing number of configured sessions");
            self.iscsiadm(&iscsiadm::set_configured_sessions(&count.to_string()))?;
            Ok(count)
        })
    }
}

impl<R: CommandRunner> ConnectionManager for SolarisConnectionManager<R> {
    #[instrument(skip(self))]
    fn get_discovered_targets(&self) -> Result<Vec<Target>> {
        timed("get_discovered_targets", || {
            let (addresses, records) = self.discovery_state()?;
            topology::correlate_targets(&addresses, &records)
        })
    }

    #[instrument(skip(self))]
    fn discover(&self, address: IpAddr, port: u16) -> Result<Target> {
        timed("discover", || {
            let endpoint = Endpoint::new(address, port);
            let portal = endpoint.to_portal_string();
            info!(portal = %portal, "Discovering iSCSI targets");

            self.iscsiadm(iscsiadm::ENABLE_DISCOVERY)?;
            self.iscsiadm(&iscsiadm::add_discovery_address(&portal))?;

            let (_, records) = self.discovery_state()?;
            let mut candidates = topology::iqns_at(&records, |destination| *destination == endpoint);
            if candidates.is_empty() {
                candidates = topology::iqns_at(&records, |destination| destination.address == address);
            }
            let Some((first, skipped)) = candidates.split_first() else {
                return Err(InitiatorError::NoTargetDiscovered(portal));
            };
            if !skipped.is_empty() {
                let skipped: Vec<&str> = skipped.iter().map(|iqn| iqn.as_str()).collect();
                warn!(
                    portal = %portal,
                    target_iqn = %first,
                    skipped = ?skipped,
                    "Several targets behind discovery address; returning the first"
                );
            }
            let iqn = (*first).clone();

            let endpoints: Vec<Endpoint> = records
                .iter()
                .filter(|record| record.iqn == iqn)
                .map(|record| record.destination)
                .collect();
            let target = Target::new(iqn, endpoint, endpoints)?;
            info!(
                portal = %portal,
                target_iqn = %target.iqn(),
                endpoints = target.endpoints().len(),
                "Target discovered"
            );
            Ok(target)
        })
    }

    #[instrument(skip(self))]
    fn undiscover(&self, target: Option<&Target>) -> Result<()> {
        timed("undiscover", || match target {
            Some(target) => self.remove_discovery_address(target.discovery_endpoint()),
            None => {
                info!("Removing all discovery addresses");
                for endpoint in self.list_discovery_addresses()? {
                    self.remove_discovery_address(endpoint)?;
                }
                Ok(())
            }
        })
    }

    fn login(
        &self,
        target: &Target,
        endpoint: &Endpoint,
        num_of_connections: u32,
    ) -> Result<Session> {
        debug!(
            target_iqn = %target.iqn(),
            endpoint = %endpoint,
            num_of_connections,
            "Refusing single endpoint login"
        );
        Err(InitiatorError::Unsupported(
            "Solaris only logs into all available endpoints; use login_all".into(),
        ))
    }

    #[instrument(skip(self))]
    fn login_all(&self, target: &Target) -> Result<Vec<Session>> {
        timed("login_all", || {
            info!(target_iqn = %target.iqn(), "login_all on Solaris logs into all available targets");
            self.set_auto_login(true)?;
            self.get_sessions(Some(target))
        })
    }

    fn logout(&self, session: &Session) -> Result<()> {
        debug!(uid = %session.uid(), "Refusing single session logout");
        Err(InitiatorError::Unsupported(
            "logout from a single session is not supported on Solaris; use logout_all".into(),
        ))
    }

    /// Disable auto-login, drop the target's discovery address, re-enable
    /// auto-login.
    ///
    /// Sessions to every target go down while auto-login is disabled. Once
    /// the disable step succeeded, re-enabling is attempted even if removing
    /// the discovery address failed; the first error is returned. If the
    /// re-enable itself fails the host is left with auto-login disabled.
    #[instrument(skip(self))]
    fn logout_all(&self, target: &Target) -> Result<()> {
        timed("logout_all", || {
            warn!(
                target_iqn = %target.iqn(),
                "Logout on Solaris momentarily disconnects all sessions from all targets"
            );
            self.set_auto_login(false)?;
            let removed = self.undiscover(Some(target));
            let restored = self.set_auto_login(true);
            if let Err(e) = &restored {
                error!(error = %e, "Failed to re-enable auto-login; host left with auto-login disabled");
            }
            removed.and(restored)
        })
    }

    #[instrument(skip(self))]
    fn get_sessions(&self, target: Option<&Target>) -> Result<Vec<Session>> {
        timed("get_sessions", || {
            let output = self.iscsiadm(iscsiadm::LIST_SESSIONS)?;
            let records = parser::parse_sessions(&output.stdout)?;
            if records.is_empty() {
                return Ok(Vec::new());
            }

            let source_iqn = self.get_source_identifier()?;
            let sessions = match target {
                Some(target) => {
                    topology::correlate_sessions(std::slice::from_ref(target), &records, &source_iqn)
                }
                None => {
                    let targets = self.get_discovered_targets()?;
                    topology::correlate_sessions(&targets, &records, &source_iqn)
                }
            };
            debug!(count = sessions.len(), "Sessions found");
            Ok(sessions)
        })
    }

    fn rescan(&self) -> Result<()> {
        info!("iSCSI rescan requested; nothing to do on Solaris");
        Ok(())
    }

    fn get_source_identifier(&self) -> Result<Iqn> {
        let output = self.iscsiadm(iscsiadm::LIST_INITIATOR_NODE)?;
        parser::parse_initiator_node_name(&output.stdout)
    }

    /// Replace the initiator node name.
    ///
    /// This restarts the initiator and may drop active sessions. The previous
    /// name is not kept anywhere.
    #[instrument(skip(self))]
    fn set_source_identifier(&self, iqn: &str) -> Result<()> {
        timed("set_source_identifier", || {
            let new_iqn = Iqn::parse(iqn)?;
            let old_iqn = self.get_source_identifier()?;
            self.iscsiadm(&iscsiadm::set_initiator_node_name(new_iqn.as_str()))?;
            info!(old_iqn = %old_iqn, new_iqn = %new_iqn, "Initiator node name replaced");
            Ok(())
        })
    }
}

/// Presence probe for the Solaris software initiator packages.
#[derive(Debug, Clone)]
pub struct SolarisSoftwareInitiator<R: CommandRunner = ProcessCommandRunner> {
    runner: R,
    config: InitiatorConfig,
    os: String,
}

impl SolarisSoftwareInitiator<ProcessCommandRunner> {
    pub fn with_process_runner(config: InitiatorConfig) -> Self {
        Self::new(ProcessCommandRunner, config)
    }
}

impl<R: CommandRunner> SolarisSoftwareInitiator<R> {
    /// Probe for the host this process runs on.
    pub fn new(runner: R, config: InitiatorConfig) -> Self {
        Self {
            runner,
            config,
            os: std::env::consts::OS.to_string(),
        }
    }

    /// Override the operating system name used by [`SoftwareInitiator::is_installed`].
    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = os.into();
        self
    }

    fn package_installed(&self, package: &str) -> bool {
        match self.runner.run(&self.config.pkginfo_path, &["-q", package]) {
            Ok(output) => output.is_success(),
            Err(e) => {
                warn!(package = %package, error = %e, "Package query failed");
                false
            }
        }
    }
}

impl<R: CommandRunner> SoftwareInitiator for SolarisSoftwareInitiator<R> {
    fn is_installed(&self) -> bool {
        if !is_solaris_os(&self.os) {
            debug!(os = %self.os, "Not a Solaris host");
            return false;
        }
        INITIATOR_PACKAGES
            .iter()
            .all(|package| self.package_installed(package))
    }

    /// The initiator ships with the OS; nothing to install.
    fn install(&self) -> Result<()> {
        debug!("iSCSI initiator is part of the base system on Solaris");
        Ok(())
    }

    /// Not removable through the package tooling; does nothing.
    fn uninstall(&self) -> Result<()> {
        debug!("Refusing to remove the base system iSCSI initiator");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_solaris_os() {
        assert!(is_solaris_os("solaris"));
        assert!(is_solaris_os("illumos"));
        assert!(!is_solaris_os("linux"));
        assert!(!is_solaris_os("freebsd"));
        assert!(!is_solaris_os(""));
    }

    #[test]
    fn test_non_solaris_host_is_not_installed() {
        let probe = SolarisSoftwareInitiator::with_process_runner(InitiatorConfig::default())
            .with_os("linux");
        assert!(!probe.is_installed());
        assert!(probe.install().is_ok());
        assert!(probe.uninstall().is_ok());
    }
}
