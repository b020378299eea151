//! Domain types for the initiator topology.
//!
//! Targets and sessions are never stored; they are rebuilt from `iscsiadm`
//! output on every query. The constructors here enforce the invariants the
//! rest of the crate relies on (a target always has at least one data
//! endpoint, a session always points at one of its target's endpoints).

use std::fmt::{self, Display};
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{InitiatorError, Result};

/// Well-known iSCSI port.
pub const DEFAULT_ISCSI_PORT: u16 = 3260;

/// Maximum length of an iSCSI name in bytes.
const MAX_NAME_LEN: usize = 223;

static IQN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^iqn\.\d{4}-(0[1-9]|1[0-2])\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)*(:[A-Za-z0-9.:_-]+)?$",
    )
    .expect("Invalid regex pattern")
});

static EUI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^eui\.[0-9A-Fa-f]{16}$").expect("Invalid regex pattern"));

static NAA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^naa\.([0-9A-Fa-f]{16}|[0-9A-Fa-f]{32})$").expect("Invalid regex pattern")
});

// ============================================================================
// IQN (iSCSI Qualified Name)
// ============================================================================

/// A validated iSCSI node name.
///
/// Accepts the three RFC 3720/3980 forms:
/// - `iqn.YYYY-MM.reversed.domain[:unique]`
/// - `eui.` followed by 16 hex digits
/// - `naa.` followed by 16 or 32 hex digits
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Iqn(String);

impl Iqn {
    /// Parse and validate an iSCSI name.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(InitiatorError::InvalidIqn("name cannot be empty".into()));
        }
        if s.len() > MAX_NAME_LEN {
            return Err(InitiatorError::InvalidIqn(format!(
                "'{}' exceeds maximum length of {} characters",
                s, MAX_NAME_LEN
            )));
        }
        if IQN_RE.is_match(s) || EUI_RE.is_match(s) || NAA_RE.is_match(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(InitiatorError::InvalidIqn(format!(
                "'{}' is not a valid iqn., eui. or naa. name",
                s
            )))
        }
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Iqn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Iqn {
    type Err = InitiatorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for Iqn {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Endpoint
// ============================================================================

/// A network reachable point of a target or initiator (address:port).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Endpoint {
    pub address: IpAddr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: impl Into<IpAddr>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Format as the `address:port` argument `iscsiadm` expects.
    pub fn to_portal_string(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

// ============================================================================
// Target
// ============================================================================

/// A discovered iSCSI target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    iqn: Iqn,
    discovery_endpoint: Endpoint,
    endpoints: Vec<Endpoint>,
}

impl Target {
    /// Build a target, dropping duplicate endpoints while keeping order.
    ///
    /// Fails if `endpoints` is empty.
    pub fn new(
        iqn: Iqn,
        discovery_endpoint: Endpoint,
        endpoints: impl IntoIterator<Item = Endpoint>,
    ) -> Result<Self> {
        let mut unique: Vec<Endpoint> = Vec::new();
        for endpoint in endpoints {
            if !unique.contains(&endpoint) {
                unique.push(endpoint);
            }
        }
        if unique.is_empty() {
            return Err(InitiatorError::InvalidTarget(format!(
                "target '{}' has no data endpoints",
                iqn
            )));
        }
        Ok(Self {
            iqn,
            discovery_endpoint,
            endpoints: unique,
        })
    }

    pub fn iqn(&self) -> &Iqn {
        &self.iqn
    }

    /// The endpoint this target was discovered through.
    pub fn discovery_endpoint(&self) -> Endpoint {
        self.discovery_endpoint
    }

    /// All endpoints sessions can be established through.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn has_endpoint(&self, endpoint: &Endpoint) -> bool {
        self.endpoints.contains(endpoint)
    }
}

// ============================================================================
// Session
// ============================================================================

/// Host/channel/target triple of the SCSI device behind a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Hct {
    pub host: u32,
    pub channel: u32,
    pub target: u32,
}

/// An established connection between the local initiator and one target endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    target: Target,
    endpoint: Endpoint,
    source_address: IpAddr,
    source_iqn: Iqn,
    uid: String,
    // Not populated on Solaris yet.
    hct: Option<Hct>,
}

impl Session {
    /// Build a session. `endpoint` must be one of `target`'s endpoints.
    pub fn new(
        target: Target,
        endpoint: Endpoint,
        source_address: IpAddr,
        source_iqn: Iqn,
        uid: impl Into<String>,
        hct: Option<Hct>,
    ) -> Result<Self> {
        if !target.has_endpoint(&endpoint) {
            return Err(InitiatorError::InvalidTarget(format!(
                "endpoint {} is not an endpoint of target '{}'",
                endpoint,
                target.iqn()
            )));
        }
        Ok(Self {
            target,
            endpoint,
            source_address,
            source_iqn,
            uid: uid.into(),
            hct,
        })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn source_address(&self) -> IpAddr {
        self.source_address
    }

    pub fn source_iqn(&self) -> &Iqn {
        &self.source_iqn
    }

    /// Session identifier assigned by the initiator (the ISID).
    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn hct(&self) -> Option<Hct> {
        self.hct
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ep(last: u8, port: u16) -> Endpoint {
        Endpoint::new(Ipv4Addr::new(10, 0, 0, last), port)
    }

    #[test]
    fn test_iqn_parse_valid() {
        let names = [
            "iqn.2020-01.com.example:t1",
            "iqn.1986-03.com.sun:01:0003ba2d0f67.46e47e5d",
            "iqn.2009-11.com.infinidat:storage:infinibox-sn-1234",
            "iqn.2024-12.org.freebsd",
            "eui.02004567A425678D",
            "naa.52004567BA64678D",
            "naa.62004567BA64678D0123456789ABCDEF",
        ];
        for name in names {
            let iqn = Iqn::parse(name).unwrap();
            assert_eq!(iqn.as_str(), name);
            assert_eq!(iqn.to_string(), name);
        }
    }

    #[test]
    fn test_iqn_parse_invalid() {
        let names = [
            "",
            "iqn",
            "iqn.2020-13.com.example:t1",
            "iqn.20-01.com.example",
            "iqn.2020-01.:t1",
            "iqn.2020-01.com.example:",
            "iqn.2020-01.com.example:bad name",
            "eui.1234",
            "naa.1234567890ABCDEFX",
            "nqn.2024-01.org.freebsd.csi:vol1",
            "10.0.0.5:3260",
        ];
        for name in names {
            assert!(
                matches!(Iqn::parse(name), Err(InitiatorError::InvalidIqn(_))),
                "'{}' should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_iqn_too_long() {
        let long = format!("iqn.2020-01.com.example:{}", "a".repeat(MAX_NAME_LEN));
        assert!(Iqn::parse(&long).is_err());
    }

    #[test]
    fn test_iqn_from_str() {
        let iqn: Iqn = "iqn.2020-01.com.example:t1".parse().unwrap();
        assert_eq!(iqn.as_ref(), "iqn.2020-01.com.example:t1");
    }

    #[test]
    fn test_endpoint_display() {
        let endpoint = ep(5, 3260);
        assert_eq!(endpoint.to_string(), "10.0.0.5:3260");
        assert_eq!(endpoint.to_portal_string(), "10.0.0.5:3260");
        assert_eq!(endpoint, ep(5, 3260));
        assert_ne!(endpoint, ep(5, 3261));
    }

    #[test]
    fn test_target_dedups_endpoints() {
        let iqn = Iqn::parse("iqn.2020-01.com.example:t1").unwrap();
        let target = Target::new(iqn, ep(5, 3260), [ep(5, 3260), ep(6, 3260), ep(5, 3260)]).unwrap();
        assert_eq!(target.endpoints(), &[ep(5, 3260), ep(6, 3260)]);
        assert_eq!(target.discovery_endpoint(), ep(5, 3260));
    }

    #[test]
    fn test_target_requires_endpoint() {
        let iqn = Iqn::parse("iqn.2020-01.com.example:t1").unwrap();
        let result = Target::new(iqn, ep(5, 3260), []);
        assert!(matches!(result, Err(InitiatorError::InvalidTarget(_))));
    }

    #[test]
    fn test_session_endpoint_must_belong_to_target() {
        let iqn = Iqn::parse("iqn.2020-01.com.example:t1").unwrap();
        let source = Iqn::parse("iqn.1986-03.com.sun:01:host").unwrap();
        let target = Target::new(iqn, ep(5, 3260), [ep(5, 3260)]).unwrap();

        let session = Session::new(
            target.clone(),
            ep(5, 3260),
            Ipv4Addr::new(10, 0, 0, 1).into(),
            source.clone(),
            "4000002a0000",
            None,
        )
        .unwrap();
        assert_eq!(session.uid(), "4000002a0000");
        assert_eq!(session.target().iqn(), target.iqn());
        assert!(session.hct().is_none());

        let stray = Session::new(
            target,
            ep(9, 3260),
            Ipv4Addr::new(10, 0, 0, 1).into(),
            source,
            "4000002a0001",
            None,
        );
        assert!(stray.is_err());
    }

    #[test]
    fn test_target_serializes() {
        let iqn = Iqn::parse("iqn.2020-01.com.example:t1").unwrap();
        let target = Target::new(iqn, ep(5, 3260), [ep(5, 3260)]).unwrap();
        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(json["iqn"], "iqn.2020-01.com.example:t1");
        assert_eq!(json["discovery_endpoint"]["address"], "10.0.0.5");
        assert_eq!(json["endpoints"][0]["port"], 3260);
    }
}
