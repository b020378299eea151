//! `iscsiadm` command surface and output handling.
//!
//! - `parser`: line-oriented listings to intermediate records
//! - `topology`: records to targets and sessions

pub mod parser;
pub mod topology;

pub use parser::{DiscoveryRecord, SessionRecord};

/// `iscsiadm list discovery-address`
pub const LIST_DISCOVERY_ADDRESSES: &[&str] = &["list", "discovery-address"];
/// `iscsiadm list discovery-address -v`
pub const LIST_DISCOVERED_TARGETS: &[&str] = &["list", "discovery-address", "-v"];
/// `iscsiadm list target -v`
pub const LIST_SESSIONS: &[&str] = &["list", "target", "-v"];
/// `iscsiadm list initiator-node`
pub const LIST_INITIATOR_NODE: &[&str] = &["list", "initiator-node"];
/// `iscsiadm modify discovery -s enable` (SendTargets discovery)
pub const ENABLE_DISCOVERY: &[&str] = &["modify", "discovery", "-s", "enable"];
/// `iscsiadm modify discovery -t enable` (log into everything discovered)
pub const ENABLE_AUTO_LOGIN: &[&str] = &["modify", "discovery", "-t", "enable"];
/// `iscsiadm modify discovery -t disable`
pub const DISABLE_AUTO_LOGIN: &[&str] = &["modify", "discovery", "-t", "disable"];

/// `iscsiadm add discovery-address <portal>`
pub fn add_discovery_address(portal: &str) -> [&str; 3] {
    ["add", "discovery-address", portal]
}

/// `iscsiadm remove discovery-address <portal>`
pub fn remove_discovery_address(portal: &str) -> [&str; 3] {
    ["remove", "discovery-address", portal]
}

/// `iscsiadm modify initiator-node -N <name>`
pub fn set_initiator_node_name(name: &str) -> [&str; 4] {
    ["modify", "initiator-node", "-N", name]
}

/// `iscsiadm modify initiator-node -c <count>`
pub fn set_configured_sessions(count: &str) -> [&str; 4] {
    ["modify", "initiator-node", "-c", count]
}
