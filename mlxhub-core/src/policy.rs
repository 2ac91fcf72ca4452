//! Group Policy (spec §4.D): capacity enforcement and eviction-candidate
//! selection for models sharing a `group`. Pure functions over snapshots so
//! they can run without holding the table lock across any I/O.

/// Peer snapshot: `(name, start_timestamp, is_running)`.
pub type PeerSnapshot = (String, Option<f64>, bool);

/// Given the running peers in a group (not including the model about to
/// start) and the group's `max_loaded`, decide whether capacity allows a new
/// start, and if not, which running peer to evict.
///
/// Eviction picks the oldest `start_timestamp` among running peers; ties are
/// broken by name for determinism.
pub fn eviction_candidate(peers: &[PeerSnapshot], max_loaded: u32) -> Option<String> {
    let running: Vec<&PeerSnapshot> = peers.iter().filter(|(_, _, running)| *running).collect();
    if (running.len() as u32) < max_loaded {
        return None;
    }
    running
        .into_iter()
        .min_by(|a, b| {
            let ts_a = a.1.unwrap_or(f64::MAX);
            let ts_b = b.1.unwrap_or(f64::MAX);
            ts_a.partial_cmp(&ts_b)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        })
        .map(|(name, _, _)| name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_eviction_when_under_capacity() {
        let peers = vec![("alpha".to_string(), Some(1.0), true)];
        assert_eq!(eviction_candidate(&peers, 2), None);
    }

    #[test]
    fn evicts_oldest_running_peer() {
        let peers = vec![
            ("alpha".to_string(), Some(100.0), true),
            ("beta".to_string(), Some(50.0), true),
            ("gamma".to_string(), None, false),
        ];
        assert_eq!(eviction_candidate(&peers, 2), Some("beta".to_string()));
    }

    #[test]
    fn ties_broken_by_name() {
        let peers = vec![
            ("zeta".to_string(), Some(10.0), true),
            ("alpha".to_string(), Some(10.0), true),
        ];
        assert_eq!(eviction_candidate(&peers, 1), Some("alpha".to_string()));
    }
}
