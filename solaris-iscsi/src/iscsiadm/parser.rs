//! Parsers for `iscsiadm` listings.
//!
//! Each listing has its own small line classifier and state machine. The
//! parsers are pure: they take the captured stdout and return records, so
//! they can be tested against fixture text without a live initiator.
//!
//! Only IPv4 `a.b.c.d:port` addresses are recognized. Anything else in an
//! address position is treated as "no address".

use std::net::Ipv4Addr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{InitiatorError, Result};
use crate::types::{Endpoint, Iqn};

const DISCOVERY_ADDRESS_MARKER: &str = "Discovery Address:";
const TARGET_NAME_MARKER: &str = "Target name:";
const TARGET_ADDRESS_MARKER: &str = "Target address:";
const SESSION_TARGET_MARKER: &str = "Target:";
const ISID_MARKER: &str = "ISID:";
const LOCAL_ADDRESS_MARKER: &str = "IP address (Local):";
const PEER_ADDRESS_MARKER: &str = "IP address (Peer):";
const LOGIN_PARAMETERS_MARKER: &str = "Login Parameters";
const INITIATOR_NODE_NAME_MARKER: &str = "Initiator node name: ";

static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\d.])(\d{1,3}(?:\.\d{1,3}){3}):(\d{1,5})(?:$|\D)")
        .expect("Invalid regex pattern")
});

/// One (target, destination) pair from the verbose discovery listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRecord {
    pub iqn: Iqn,
    pub destination: Endpoint,
}

/// One active session from the verbose target listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub iqn: Iqn,
    pub local: Endpoint,
    pub peer: Endpoint,
    /// ISID reported by the initiator.
    pub uid: String,
}

/// Find the first `a.b.c.d:port` in `text`.
///
/// The address must not run into other digits or dots on either side, so a
/// longer malformed address is rejected rather than truncated.
pub fn find_address(text: &str) -> Option<Endpoint> {
    let caps = ADDRESS_RE.captures(text)?;
    let address: Ipv4Addr = caps.get(1)?.as_str().parse().ok()?;
    let port: u16 = caps.get(2)?.as_str().parse().ok()?;
    Some(Endpoint::new(address, port))
}

/// Text following `marker` in `line`, if the marker is present.
fn after_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    line.find(marker).map(|idx| &line[idx + marker.len()..])
}

/// First whitespace-separated token after `marker`, parsed as an iSCSI name.
fn iqn_after_marker(line: &str, marker: &str, raw: &str) -> Result<Iqn> {
    let token = after_marker(line, marker)
        .and_then(|rest| rest.split_whitespace().next())
        .ok_or_else(|| InitiatorError::malformed(format!("'{}' line without a name", marker), raw))?;
    Iqn::parse(token).map_err(|e| InitiatorError::malformed(e.to_string(), raw))
}

// ============================================================================
// Discovery addresses (`iscsiadm list discovery-address`)
// ============================================================================

/// Parse the configured discovery addresses.
///
/// ```text
/// Discovery Address: 10.0.0.5:3260
/// Discovery Address: 10.0.0.6:3260
/// ```
pub fn parse_discovery_addresses(output: &str) -> Result<Vec<Endpoint>> {
    let mut addresses = Vec::new();
    for line in output.lines() {
        let Some(rest) = after_marker(line, DISCOVERY_ADDRESS_MARKER) else {
            continue;
        };
        let endpoint = find_address(rest).ok_or_else(|| {
            InitiatorError::malformed(format!("unrecognized discovery address in '{}'", line.trim()), output)
        })?;
        addresses.push(endpoint);
    }
    Ok(addresses)
}

// ============================================================================
// Discovered targets (`iscsiadm list discovery-address -v`)
// ============================================================================

enum TargetLine<'a> {
    Name(&'a str),
    Address(&'a str),
    Other,
}

fn classify_target_line(line: &str) -> TargetLine<'_> {
    if line.contains(TARGET_NAME_MARKER) {
        TargetLine::Name(line)
    } else if let Some(rest) = after_marker(line, TARGET_ADDRESS_MARKER) {
        TargetLine::Address(rest)
    } else {
        TargetLine::Other
    }
}

enum TargetState {
    Scanning,
    AwaitingAddress(Iqn),
}

/// Parse the verbose discovery listing into (target, destination) records.
///
/// A `Target name:` line must be immediately followed by its
/// `Target address:` line:
///
/// ```text
/// Discovery Address: 10.0.0.5:3260
///         Target name: iqn.2020-01.com.example:t1
///                 Target address: 10.0.0.5:3260, 1
/// ```
///
/// A name without that companion line is malformed output.
pub fn parse_discovered_targets(output: &str) -> Result<Vec<DiscoveryRecord>> {
    let mut records = Vec::new();
    let mut state = TargetState::Scanning;

    for line in output.lines() {
        state = match (state, classify_target_line(line)) {
            (TargetState::Scanning, TargetLine::Name(line)) => {
                TargetState::AwaitingAddress(iqn_after_marker(line, TARGET_NAME_MARKER, output)?)
            }
            (TargetState::Scanning, _) => TargetState::Scanning,
            (TargetState::AwaitingAddress(iqn), TargetLine::Address(rest)) => {
                let destination = find_address(rest).ok_or_else(|| {
                    InitiatorError::malformed(
                        format!("unrecognized target address for '{}'", iqn),
                        output,
                    )
                })?;
                records.push(DiscoveryRecord { iqn, destination });
                TargetState::Scanning
            }
            (TargetState::AwaitingAddress(iqn), _) => {
                return Err(InitiatorError::malformed(
                    format!("'{}' is not followed by a target address", iqn),
                    output,
                ));
            }
        };
    }

    if let TargetState::AwaitingAddress(iqn) = state {
        return Err(InitiatorError::malformed(
            format!("'{}' is not followed by a target address", iqn),
            output,
        ));
    }
    Ok(records)
}

// ============================================================================
// Sessions (`iscsiadm list target -v`)
// ============================================================================

enum SessionLine<'a> {
    Target(&'a str),
    Isid(&'a str),
    Local(&'a str),
    Peer(&'a str),
    LoginParameters,
    Other,
}

fn classify_session_line(line: &str) -> SessionLine<'_> {
    let trimmed = line.trim_start();
    if trimmed.starts_with(SESSION_TARGET_MARKER) {
        SessionLine::Target(trimmed)
    } else if let Some(rest) = after_marker(line, ISID_MARKER) {
        SessionLine::Isid(rest)
    } else if let Some(rest) = after_marker(line, LOCAL_ADDRESS_MARKER) {
        SessionLine::Local(rest)
    } else if let Some(rest) = after_marker(line, PEER_ADDRESS_MARKER) {
        SessionLine::Peer(rest)
    } else if line.contains(LOGIN_PARAMETERS_MARKER) {
        SessionLine::LoginParameters
    } else {
        SessionLine::Other
    }
}

#[derive(Default)]
struct SessionBlock {
    uid: Option<String>,
    local: Option<Endpoint>,
    peer: Option<Endpoint>,
}

enum SessionState {
    Outside,
    Inside(Iqn, SessionBlock),
    /// Block already produced its session or hit its terminator.
    Closed,
}

/// Parse the verbose target listing into session records.
///
/// A `Target:` line opens a block. The block ends at `Login Parameters`, at
/// the next `Target:` line, or once both the local and peer addresses are
/// known, whichever comes first:
///
/// ```text
/// Target: iqn.2020-01.com.example:t1
///         ISID: 4000002a0000
///         Connections: 1
///                 CID: 0
///                   IP address (Local): 10.0.0.1:32800
///                   IP address (Peer): 10.0.0.5:3260
///                   Login Parameters (Negotiated):
/// ```
///
/// A block that ends without both addresses yields no session.
pub fn parse_sessions(output: &str) -> Result<Vec<SessionRecord>> {
    let mut sessions = Vec::new();
    let mut state = SessionState::Outside;

    for line in output.lines() {
        let class = classify_session_line(line);
        if let SessionLine::Target(line) = class {
            let iqn = iqn_after_marker(line, SESSION_TARGET_MARKER, output)?;
            state = SessionState::Inside(iqn, SessionBlock::default());
            continue;
        }

        let SessionState::Inside(iqn, mut block) = state else {
            continue;
        };
        match class {
            SessionLine::Isid(rest) => {
                block.uid = rest.split_whitespace().next().map(str::to_string);
            }
            SessionLine::Local(rest) => block.local = find_address(rest),
            SessionLine::Peer(rest) => block.peer = find_address(rest),
            SessionLine::LoginParameters => {
                state = SessionState::Closed;
                continue;
            }
            SessionLine::Target(_) | SessionLine::Other => {}
        }

        state = match block {
            SessionBlock {
                uid,
                local: Some(local),
                peer: Some(peer),
            } => {
                let uid = uid.ok_or_else(|| {
                    InitiatorError::malformed(format!("session to '{}' has no ISID", iqn), output)
                })?;
                sessions.push(SessionRecord {
                    iqn,
                    local,
                    peer,
                    uid,
                });
                SessionState::Closed
            }
            block => SessionState::Inside(iqn, block),
        };
    }

    Ok(sessions)
}

// ============================================================================
// Initiator node (`iscsiadm list initiator-node`)
// ============================================================================

/// Extract the initiator's own name from the first line of the listing.
///
/// ```text
/// Initiator node name: iqn.1986-03.com.sun:01:0003ba2d0f67.46e47e5d
/// Initiator node alias: -
/// ```
pub fn parse_initiator_node_name(output: &str) -> Result<Iqn> {
    let first = output.lines().next().unwrap_or_default();
    let name = after_marker(first, INITIATOR_NODE_NAME_MARKER)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| InitiatorError::malformed("missing 'Initiator node name'", output))?;
    Iqn::parse(name).map_err(|e| InitiatorError::malformed(e.to_string(), output))
}
