//! Flat JSON persistence for known and ignored networks.
//!
//! ```text
//! <data dir>/
//! ├── known_networks.json   # { "<bssid>": { "ssid": "...", "color": "#rrggbb" } }
//! ├── ignored_ssids.json    # [ "...", ... ]
//! └── ignored_bssids.json   # [ "aa:bb:...", ... ]
//! ```
//!
//! Each table is rewritten in full whenever it changes.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::models::KnownNetwork;

const KNOWN_FILE: &str = "known_networks.json";
const IGNORED_SSIDS_FILE: &str = "ignored_ssids.json";
const IGNORED_BSSIDS_FILE: &str = "ignored_bssids.json";

pub(crate) type KnownMap = BTreeMap<String, KnownNetwork>;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The ignore lists. An ignored SSID hides every radio broadcasting that name;
/// an ignored BSSID hides one radio whatever it is called.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct IgnoreList {
    pub(crate) ssids: BTreeSet<String>,
    pub(crate) bssids: BTreeSet<String>,
}

impl IgnoreList {
    pub(crate) fn hides(&self, ssid: &str, bssid: &str) -> bool {
        self.ssids.contains(ssid) || self.bssids.contains(&bssid.to_ascii_lowercase())
    }
}

#[derive(Debug)]
pub(crate) struct Store {
    dir: PathBuf,
    known: KnownMap,
    ignored: IgnoreList,
}

impl Store {
    /// Opens the store in `dir`, creating the directory if needed. Missing files
    /// load as empty tables.
    pub(crate) fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;

        let known: KnownMap = read_json(&dir.join(KNOWN_FILE))?.unwrap_or_default();
        let ssids: BTreeSet<String> =
            read_json(&dir.join(IGNORED_SSIDS_FILE))?.unwrap_or_default();
        let bssids: BTreeSet<String> =
            read_json(&dir.join(IGNORED_BSSIDS_FILE))?.unwrap_or_default();

        // Older files may carry mixed-case MACs.
        let known = known
            .into_iter()
            .map(|(bssid, network)| (bssid.to_ascii_lowercase(), network))
            .collect();
        let bssids = bssids.into_iter().map(|b| b.to_ascii_lowercase()).collect();

        Ok(Self {
            dir,
            known,
            ignored: IgnoreList { ssids, bssids },
        })
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn known(&self) -> &KnownMap {
        &self.known
    }

    pub(crate) fn ignored(&self) -> &IgnoreList {
        &self.ignored
    }

    /// Stores `network` under `bssid`, overwriting any previous entry, and
    /// rewrites the known-networks file.
    pub(crate) fn remember(&mut self, bssid: &str, network: KnownNetwork) -> Result<(), StoreError> {
        let bssid = bssid.to_ascii_lowercase();
        tracing::info!(%bssid, ssid = %network.ssid, color = %network.color, "remembering network");
        self.known.insert(bssid, network);
        write_json(&self.dir.join(KNOWN_FILE), &self.known)
    }

    /// Adds `ssid` and every BSSID in `bssids` to the ignore lists and rewrites
    /// both files.
    pub(crate) fn ignore<I, S>(&mut self, ssid: &str, bssids: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ignored.ssids.insert(ssid.to_string());
        for bssid in bssids {
            self.ignored.bssids.insert(bssid.as_ref().to_ascii_lowercase());
        }
        tracing::info!(
            %ssid,
            ignored_ssids = self.ignored.ssids.len(),
            ignored_bssids = self.ignored.bssids.len(),
            "ignoring network"
        );
        write_json(&self.dir.join(IGNORED_SSIDS_FILE), &self.ignored.ssids)?;
        write_json(&self.dir.join(IGNORED_BSSIDS_FILE), &self.ignored.bssids)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    buf.push(b'\n');

    let tmp = path.with_extension("json.tmp");
    let io_err = |source: io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    fs::write(&tmp, &buf).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}
