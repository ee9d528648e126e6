//! Set reconciliation between a remote (registry) view and a local view.
//!
//! Used for both the blocked-set and the allowed-set passes of a sync cycle.

use std::collections::BTreeSet;

use crate::normalize_ip;

/// A side's view of IPs; duplicates collapse on insertion
pub type IpSet = BTreeSet<String>;

/// What each side is missing relative to the other
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// Present remotely, absent locally: apply on this node
    pub to_apply: IpSet,
    /// Present locally, absent remotely: report to the registry
    pub to_report_upstream: IpSet,
}

impl Diff {
    /// True when both sides already agree
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_apply.is_empty() && self.to_report_upstream.is_empty()
    }
}

/// Compute `(remote − local, local − remote)`.
#[must_use]
pub fn diff(remote: &IpSet, local: &IpSet) -> Diff {
    Diff {
        to_apply: remote.difference(local).cloned().collect(),
        to_report_upstream: local.difference(remote).cloned().collect(),
    }
}

/// Collect IP strings into a set, trimming whitespace and dropping blanks.
pub fn ip_set<I, S>(items: I) -> IpSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|ip| ip.as_ref().trim().to_string())
        .filter(|ip| !ip.is_empty())
        .collect()
}

/// Collect IP strings into a set of canonical addresses.
///
/// Every entry goes through [`normalize_ip`], so `2001:DB8::1` and
/// `2001:db8::1` land on the same element. Blank entries are skipped and
/// anything that does not parse as an address is returned separately.
pub fn canonical_ip_set<I, S>(items: I) -> (IpSet, Vec<String>)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut set = IpSet::new();
    let mut rejected = Vec::new();
    for item in items {
        let raw = item.as_ref().trim();
        if raw.is_empty() {
            continue;
        }
        match normalize_ip(raw) {
            Ok(ip) => {
                set.insert(ip);
            }
            Err(_) => rejected.push(raw.to_string()),
        }
    }
    (set, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_both_directions() {
        let remote = ip_set(["1.1.1.1", "2.2.2.2", "3.3.3.3"]);
        let local = ip_set(["3.3.3.3", "4.4.4.4"]);

        let d = diff(&remote, &local);
        assert_eq!(d.to_apply, ip_set(["1.1.1.1", "2.2.2.2"]));
        assert_eq!(d.to_report_upstream, ip_set(["4.4.4.4"]));
    }

    #[test]
    fn test_diff_identical_sets_is_empty() {
        let a = ip_set(["10.0.0.1", "10.0.0.2"]);
        assert!(diff(&a, &a).is_empty());
    }

    #[test]
    fn test_diff_with_empty_sides() {
        let a = ip_set(["10.0.0.1"]);
        let empty = IpSet::new();

        assert_eq!(diff(&a, &empty).to_apply, a);
        assert!(diff(&a, &empty).to_report_upstream.is_empty());
        assert_eq!(diff(&empty, &a).to_report_upstream, a);
        assert!(diff(&empty, &empty).is_empty());
    }

    #[test]
    fn test_duplicates_collapse() {
        let remote = ip_set(["5.5.5.5", "5.5.5.5", " 5.5.5.5 ", ""]);
        assert_eq!(remote.len(), 1);
        let d = diff(&remote, &IpSet::new());
        assert_eq!(d.to_apply.len(), 1);
    }

    #[test]
    fn test_canonical_set_merges_spellings() {
        let (local, rejected) =
            canonical_ip_set(["2001:DB8::1", " 10.0.0.5", "", "2001:0db8:0:0::1", "host.example"]);
        assert_eq!(local, ip_set(["10.0.0.5", "2001:db8::1"]));
        assert_eq!(rejected, ["host.example"]);

        let remote = ip_set(["2001:db8::1", "10.0.0.5"]);
        assert!(diff(&remote, &local).is_empty());
    }

    #[test]
    fn test_diff_matches_set_difference() {
        // Exhaustive over all subsets of a small universe.
        let universe = ["a", "b", "c", "d"];
        let subsets: Vec<IpSet> = (0..16u8)
            .map(|mask| {
                universe
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, ip)| (*ip).to_string())
                    .collect()
            })
            .collect();

        for a in &subsets {
            for b in &subsets {
                let d = diff(a, b);
                let expected_apply: IpSet = a.difference(b).cloned().collect();
                let expected_report: IpSet = b.difference(a).cloned().collect();
                assert_eq!(d.to_apply, expected_apply);
                assert_eq!(d.to_report_upstream, expected_report);
                assert!(d.to_apply.is_disjoint(&d.to_report_upstream));
            }
        }
    }
}
