//! Runtime configuration for the Solaris backend.

use crate::types::DEFAULT_ISCSI_PORT;

/// Default path of the iSCSI administration tool.
pub const DEFAULT_ISCSIADM_PATH: &str = "iscsiadm";

/// Default path of the SVR4 package query tool.
pub const DEFAULT_PKGINFO_PATH: &str = "pkginfo";

/// Where to find the host tools and which port discovery uses by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatorConfig {
    pub iscsiadm_path: String,
    pub pkginfo_path: String,
    pub default_port: u16,
}

impl Default for InitiatorConfig {
    fn default() -> Self {
        Self {
            iscsiadm_path: DEFAULT_ISCSIADM_PATH.to_string(),
            pkginfo_path: DEFAULT_PKGINFO_PATH.to_string(),
            default_port: DEFAULT_ISCSI_PORT,
        }
    }
}

impl InitiatorConfig {
    pub fn with_iscsiadm_path(mut self, path: impl Into<String>) -> Self {
        self.iscsiadm_path = path.into();
        self
    }

    pub fn with_pkginfo_path(mut self, path: impl Into<String>) -> Self {
        self.pkginfo_path = path.into();
        self
    }

    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }
}
