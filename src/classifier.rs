use std::collections::HashSet;

use crate::models::{DisplayEntry, ScanResult};
use crate::store::{IgnoreList, KnownMap};

/// Turns raw scan results into the rows of the network list.
///
/// Results are visited in source order. Rows are unique by SSID; the first
/// visible radio for an SSID decides its color. Hidden networks (empty SSID)
/// and anything on the ignore lists are dropped.
pub(crate) fn classify(
    results: &[ScanResult],
    ignored: &IgnoreList,
    known: &KnownMap,
) -> Vec<DisplayEntry> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();

    for result in results {
        let ssid = result.ssid.as_str();
        if ssid.is_empty() || ignored.hides(ssid, &result.bssid) || seen.contains(ssid) {
            continue;
        }
        seen.insert(ssid);

        let bssid = result.bssid.to_ascii_lowercase();
        let color = known.get(&bssid).map(|network| network.color);
        out.push(DisplayEntry {
            ssid: ssid.to_string(),
            bssid,
            signal_dbm: result.signal_dbm,
            color,
        });
    }

    out
}

/// Every radio in `results` broadcasting `ssid`, lowercased and deduplicated.
pub(crate) fn resolve_bssids(results: &[ScanResult], ssid: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for result in results.iter().filter(|r| r.ssid == ssid) {
        let bssid = result.bssid.to_ascii_lowercase();
        if !out.contains(&bssid) {
            out.push(bssid);
        }
    }
    out
}
