//! Correlation of parsed listings into targets and sessions.

use std::collections::HashSet;

use tracing::warn;

use super::parser::{DiscoveryRecord, SessionRecord};
use crate::error::{InitiatorError, Result};
use crate::types::{Endpoint, Iqn, Session, Target};

/// Unique target names in first-seen order.
fn unique_iqns(records: &[DiscoveryRecord]) -> Vec<&Iqn> {
    iqns_at(records, |_| true)
}

/// Unique target names with a destination accepted by `at`, in first-seen order.
pub fn iqns_at(records: &[DiscoveryRecord], at: impl Fn(&Endpoint) -> bool) -> Vec<&Iqn> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|record| at(&record.destination))
        .map(|record| &record.iqn)
        .filter(|iqn| seen.insert(*iqn))
        .collect()
}

/// Resolve which configured discovery address a target was found through.
///
/// An exact address:port match wins. Otherwise the first discovery address
/// sharing its IP address with one of the target's destinations is used.
/// The result is always an element of `discovery_addresses`.
pub fn resolve_discovery_endpoint(
    iqn: &Iqn,
    discovery_addresses: &[Endpoint],
    records: &[DiscoveryRecord],
) -> Option<Endpoint> {
    let destinations: Vec<Endpoint> = records
        .iter()
        .filter(|record| &record.iqn == iqn)
        .map(|record| record.destination)
        .collect();

    destinations
        .iter()
        .find(|destination| discovery_addresses.contains(destination))
        .or_else(|| {
            destinations.iter().find_map(|destination| {
                discovery_addresses
                    .iter()
                    .find(|discovery| discovery.address == destination.address)
            })
        })
        .copied()
}

/// Build one [`Target`] per unique IQN.
///
/// Every target must resolve to a discovery address; one that doesn't is an
/// error rather than being dropped.
pub fn correlate_targets(
    discovery_addresses: &[Endpoint],
    records: &[DiscoveryRecord],
) -> Result<Vec<Target>> {
    unique_iqns(records)
        .into_iter()
        .map(|iqn| {
            let discovery_endpoint = resolve_discovery_endpoint(iqn, discovery_addresses, records)
                .ok_or_else(|| InitiatorError::DiscoveryUnresolved(iqn.to_string()))?;
            let endpoints = records
                .iter()
                .filter(|record| &record.iqn == iqn)
                .map(|record| record.destination);
            Target::new(iqn.clone(), discovery_endpoint, endpoints)
        })
        .collect()
}

/// Join session records with the targets they belong to.
///
/// Records for unknown targets are ignored. Records whose peer is not one of
/// the target's endpoints are skipped with a warning. Repeated records
/// (same target, ISID and peer) produce one session.
pub fn correlate_sessions(
    targets: &[Target],
    records: &[SessionRecord],
    source_iqn: &Iqn,
) -> Vec<Session> {
    let mut seen = HashSet::new();
    let mut sessions = Vec::new();

    for target in targets {
        for record in records.iter().filter(|record| &record.iqn == target.iqn()) {
            if !seen.insert((&record.iqn, record.uid.as_str(), record.peer)) {
                continue;
            }
            match Session::new(
                target.clone(),
                record.peer,
                record.local.address,
                source_iqn.clone(),
                record.uid.clone(),
                None,
            ) {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    warn!(target_iqn = %record.iqn, uid = %record.uid, error = %e, "Skipping session");
                }
            }
        }
    }

    sessions
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const T1: &str = "iqn.2020-01.com.example:t1";
    const T2: &str = "iqn.2020-01.com.example:t2";

    fn ep(last: u8, port: u16) -> Endpoint {
        Endpoint::new(Ipv4Addr::new(10, 0, 0, last), port)
    }

    fn iqn(s: &str) -> Iqn {
        Iqn::parse(s).unwrap()
    }

    fn record(name: &str, destination: Endpoint) -> DiscoveryRecord {
        DiscoveryRecord {
            iqn: iqn(name),
            destination,
        }
    }

    fn session(name: &str, uid: &str, peer: Endpoint) -> SessionRecord {
        SessionRecord {
            iqn: iqn(name),
            local: ep(1, 32800),
            peer,
            uid: uid.to_string(),
        }
    }

    #[test]
    fn test_single_target_round_trip() {
        let targets = correlate_targets(&[ep(5, 3260)], &[record(T1, ep(5, 3260))]).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].iqn().as_str(), T1);
        assert_eq!(targets[0].discovery_endpoint(), ep(5, 3260));
        assert_eq!(targets[0].endpoints(), &[ep(5, 3260)]);
    }

    #[test]
    fn test_one_target_per_unique_iqn() {
        let records = [
            record(T1, ep(5, 3260)),
            record(T2, ep(5, 3260)),
            record(T1, ep(6, 3260)),
            record(T1, ep(5, 3260)),
        ];
        let targets = correlate_targets(&[ep(5, 3260)], &records).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].iqn().as_str(), T1);
        assert_eq!(targets[0].endpoints(), &[ep(5, 3260), ep(6, 3260)]);
        assert_eq!(targets[1].iqn().as_str(), T2);
        assert_eq!(targets[1].endpoints(), &[ep(5, 3260)]);
        for target in &targets {
            assert!(!target.endpoints().is_empty());
            assert!(target.has_endpoint(&target.discovery_endpoint()));
        }
    }

    #[test]
    fn test_discovery_endpoint_prefers_exact_match() {
        let records = [record(T1, ep(5, 3261)), record(T1, ep(5, 3260))];
        let resolved = resolve_discovery_endpoint(&iqn(T1), &[ep(5, 3260)], &records);
        assert_eq!(resolved, Some(ep(5, 3260)));
    }

    #[test]
    fn test_discovery_endpoint_falls_back_to_address() {
        let records = [record(T1, ep(6, 3260)), record(T1, ep(5, 3261))];
        let resolved = resolve_discovery_endpoint(&iqn(T1), &[ep(5, 3260)], &records);
        assert_eq!(resolved, Some(ep(5, 3260)));
    }

    #[test]
    fn test_iqns_at_portal() {
        let records = [
            record(T1, ep(5, 3260)),
            record(T2, ep(5, 3260)),
            record(T1, ep(5, 3260)),
            record(T2, ep(6, 3260)),
        ];
        let at_five: Vec<&str> = iqns_at(&records, |d| *d == ep(5, 3260))
            .into_iter()
            .map(Iqn::as_str)
            .collect();
        assert_eq!(at_five, vec![T1, T2]);
        assert_eq!(iqns_at(&records, |d| *d == ep(6, 3260)).len(), 1);
        assert!(iqns_at(&records, |d| *d == ep(7, 3260)).is_empty());
    }

    #[test]
    fn test_discovery_endpoint_comes_from_listing() {
        let discovery = [ep(7, 3260), ep(5, 3260)];
        let records = [record(T1, ep(5, 3261)), record(T2, ep(5, 3262))];
        let targets = correlate_targets(&discovery, &records).unwrap();
        assert_eq!(targets.len(), 2);
        for target in &targets {
            assert_eq!(target.discovery_endpoint(), ep(5, 3260));
            assert!(discovery.contains(&target.discovery_endpoint()));
            assert!(!target.has_endpoint(&target.discovery_endpoint()));
        }
    }

    #[test]
    fn test_each_target_resolves_its_own_discovery_address() {
        let records = [record(T1, ep(5, 3260)), record(T2, ep(6, 3260))];
        let targets = correlate_targets(&[ep(5, 3260), ep(6, 3260)], &records).unwrap();
        assert_eq!(targets[0].discovery_endpoint(), ep(5, 3260));
        assert_eq!(targets[1].discovery_endpoint(), ep(6, 3260));
    }

    #[test]
    fn test_unresolved_discovery_is_error() {
        let result = correlate_targets(&[ep(9, 3260)], &[record(T1, ep(5, 3260))]);
        match result {
            Err(InitiatorError::DiscoveryUnresolved(name)) => assert_eq!(name, T1),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_no_records_no_targets() {
        assert!(correlate_targets(&[ep(5, 3260)], &[]).unwrap().is_empty());
    }

    #[test]
    fn test_correlate_sessions() {
        let targets = correlate_targets(
            &[ep(5, 3260)],
            &[record(T1, ep(5, 3260)), record(T1, ep(6, 3260)), record(T2, ep(5, 3260))],
        )
        .unwrap();
        let records = [
            session(T1, "4000002a0000", ep(5, 3260)),
            session(T2, "4000002a0001", ep(5, 3260)),
            session(T1, "4000002a0002", ep(6, 3260)),
        ];
        let source = iqn("iqn.1986-03.com.sun:01:host");

        let sessions = correlate_sessions(&targets, &records, &source);
        assert_eq!(sessions.len(), 3);
        for s in &sessions {
            assert_eq!(s.source_iqn(), &source);
            assert!(s.target().has_endpoint(&s.endpoint()));
            assert!(s.hct().is_none());
        }

        let only_t2 = correlate_sessions(&targets[1..], &records, &source);
        assert_eq!(only_t2.len(), 1);
        assert_eq!(only_t2[0].target().iqn().as_str(), T2);
        assert_eq!(only_t2[0].uid(), "4000002a0001");
        assert_eq!(only_t2[0].source_address(), ep(1, 0).address);
    }

    #[test]
    fn test_correlate_sessions_dedups_and_skips_strays() {
        let targets = correlate_targets(&[ep(5, 3260)], &[record(T1, ep(5, 3260))]).unwrap();
        let records = [
            session(T1, "4000002a0000", ep(5, 3260)),
            session(T1, "4000002a0000", ep(5, 3260)),
            session(T1, "4000002a0003", ep(7, 3260)),
            session(T2, "4000002a0001", ep(5, 3260)),
        ];
        let source = iqn("iqn.1986-03.com.sun:01:host");
        let sessions = correlate_sessions(&targets, &records, &source);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].uid(), "4000002a0000");
    }
}
