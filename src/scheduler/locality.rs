// src/scheduler/locality.rs

//! Which hosts hold copies of which artifacts.
//!
//! Entries are only ever added: a host recorded as holding an artifact is
//! never forgotten. The index is a best-effort hint, not an authoritative
//! cache directory.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::artifact::ArtifactId;

/// Worker host name.
pub type Host = String;

#[derive(Debug, Default, Clone)]
pub struct LocalityIndex {
    locations: HashMap<ArtifactId, BTreeSet<Host>>,
}

impl LocalityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `host` holds `id`. Returns `false` if it was already known.
    pub fn add(&mut self, id: ArtifactId, host: &str) -> bool {
        self.locations
            .entry(id)
            .or_default()
            .insert(host.to_string())
    }

    pub fn hosts_of(&self, id: &ArtifactId) -> Option<&BTreeSet<Host>> {
        self.locations.get(id)
    }

    pub fn holds(&self, id: &ArtifactId, host: &str) -> bool {
        self.locations
            .get(id)
            .is_some_and(|hosts| hosts.contains(host))
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Per-host fraction of `inputs` held by that host.
    ///
    /// Hosts holding none of the inputs are absent from the map.
    pub fn locality(&self, inputs: &BTreeSet<ArtifactId>) -> BTreeMap<Host, f64> {
        let mut tally: BTreeMap<Host, usize> = BTreeMap::new();
        for id in inputs {
            if let Some(hosts) = self.locations.get(id) {
                for host in hosts {
                    *tally.entry(host.clone()).or_default() += 1;
                }
            }
        }

        let total = inputs.len() as f64;
        tally
            .into_iter()
            .map(|(host, count)| (host, count as f64 / total))
            .collect()
    }

    /// Number of `inputs` held at `host`.
    pub fn local_count(&self, inputs: &BTreeSet<ArtifactId>, host: &str) -> usize {
        inputs.iter().filter(|id| self.holds(id, host)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn add_is_idempotent() {
        let mut idx = LocalityIndex::new();
        let id = Uuid::new_v4();
        assert!(idx.add(id, "h1"));
        assert!(!idx.add(id, "h1"));
        assert!(idx.add(id, "h2"));
        assert_eq!(idx.hosts_of(&id).unwrap().len(), 2);
    }

    #[test]
    fn locality_normalises_by_distinct_inputs() {
        let mut idx = LocalityIndex::new();
        let (a, b, c, d) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        idx.add(a, "h1");
        idx.add(b, "h1");
        idx.add(c, "h1");
        idx.add(d, "h1");
        idx.add(a, "h2");

        let inputs: BTreeSet<_> = [a, b, c, d].into_iter().collect();
        let loc = idx.locality(&inputs);
        assert_eq!(loc["h1"], 1.0);
        assert_eq!(loc["h2"], 0.25);
        assert!(loc.values().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(idx.local_count(&inputs, "h2"), 1);
    }
}
