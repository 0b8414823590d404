use std::collections::HashMap;

use zbus::blocking::{Connection, Proxy};
use zvariant::{OwnedObjectPath, OwnedValue};

use crate::models::{InterfaceInfo, InterfaceStatus, ScanResult};
use crate::scan::{ScanError, SourceResult, WifiSource};

const IWD_SERVICE: &str = "net.connman.iwd";
const OBJECT_MANAGER_IFACE: &str = "org.freedesktop.DBus.ObjectManager";
const DEVICE_IFACE: &str = "net.connman.iwd.Device";
const STATION_IFACE: &str = "net.connman.iwd.Station";
const NETWORK_IFACE: &str = "net.connman.iwd.Network";
const BSS_IFACE: &str = "net.connman.iwd.BasicServiceSet";

// Replies to Station.Scan meaning a scan is already running.
const SCAN_BUSY_ERRORS: [&str; 2] = ["net.connman.iwd.Busy", "net.connman.iwd.InProgress"];

type PropMap = HashMap<String, OwnedValue>;
type InterfaceMap = HashMap<String, PropMap>;
type ManagedObjects = HashMap<OwnedObjectPath, InterfaceMap>;

fn unavailable(err: impl std::fmt::Display) -> ScanError {
    ScanError::Unavailable(err.to_string())
}

/// iwd over the system bus.
#[derive(Debug)]
pub(crate) struct IwdDbus {
    conn: Connection,
}

impl IwdDbus {
    pub(crate) fn new() -> SourceResult<Self> {
        let conn = Connection::system().map_err(unavailable)?;
        Ok(Self { conn })
    }

    fn proxy<'a>(&'a self, path: &'a str, iface: &'a str) -> SourceResult<Proxy<'a>> {
        Proxy::new(&self.conn, IWD_SERVICE, path, iface).map_err(unavailable)
    }

    fn managed_objects(&self) -> SourceResult<ManagedObjects> {
        self.proxy("/", OBJECT_MANAGER_IFACE)?
            .call("GetManagedObjects", &())
            .map_err(unavailable)
    }

    fn bss_address(&self, bss_path: &str) -> SourceResult<String> {
        let address: String = self
            .proxy(bss_path, BSS_IFACE)?
            .get_property("Address")
            .map_err(|e| unavailable(format!("Failed to read BSS address at {bss_path}: {e}")))?;
        Ok(address.to_ascii_lowercase())
    }

    fn network_bsses(&self, network_path: &str) -> SourceResult<Vec<String>> {
        let bsses: Vec<OwnedObjectPath> = match self
            .proxy(network_path, NETWORK_IFACE)?
            .get_property("ExtendedServiceSet")
        {
            Ok(bsses) => bsses,
            Err(err) => {
                tracing::debug!(network = %network_path, error = %err, "no readable ExtendedServiceSet");
                Vec::new()
            }
        };
        Ok(readable(
            bsses.iter().map(|path| path.as_str()),
            |path| self.bss_address(path),
            "dropping unreadable access point",
        ))
    }
}

/// Reads every path with `read`, skipping the ones that fail. iwd may drop an
/// object between listing it and reading its properties.
fn readable<'p, T>(
    paths: impl IntoIterator<Item = &'p str>,
    read: impl Fn(&str) -> SourceResult<T>,
    what: &str,
) -> Vec<T> {
    paths
        .into_iter()
        .filter_map(|path| match read(path) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::debug!(%path, error = %err, "{what}");
                None
            }
        })
        .collect()
}

/// One result per radio, in network order. Networks whose name cannot be
/// read are skipped.
fn collect_results(
    ordered: &[(String, i16)],
    name_of: impl Fn(&str) -> SourceResult<String>,
    bsses_of: impl Fn(&str) -> SourceResult<Vec<String>>,
) -> SourceResult<Vec<ScanResult>> {
    let mut out = Vec::new();
    for (network_path, signal) in ordered {
        let Some(ssid) = readable([network_path.as_str()], &name_of, "dropping unreadable network")
            .pop()
        else {
            continue;
        };

        for bssid in bsses_of(network_path)? {
            out.push(ScanResult {
                signal_dbm: Some(signal / 100),
                ..ScanResult::new(ssid.clone(), bssid)
            });
        }
    }
    Ok(out)
}

fn is_connected_state(state: &str) -> bool {
    matches!(state, "connected" | "roaming")
}

impl WifiSource for IwdDbus {
    fn list_interfaces(&self) -> SourceResult<Vec<InterfaceInfo>> {
        let objects = self.managed_objects()?;
        let mut out = Vec::new();

        for (path, interfaces) in objects {
            // Only devices in station mode can scan.
            if !interfaces.contains_key(DEVICE_IFACE) || !interfaces.contains_key(STATION_IFACE) {
                continue;
            }

            let name: String = self
                .proxy(path.as_str(), DEVICE_IFACE)?
                .get_property("Name")
                .map_err(|e| unavailable(format!("Failed to read device name at {}: {e}", path.as_str())))?;
            out.push(InterfaceInfo {
                name,
                path: path.as_str().to_string(),
            });
        }

        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    fn request_scan(&self, iface: &InterfaceInfo) -> SourceResult<()> {
        let station = self.proxy(&iface.path, STATION_IFACE)?;
        match station.call::<_, _, ()>("Scan", &()) {
            Ok(()) => Ok(()),
            Err(zbus::Error::MethodError(name, _, _))
                if SCAN_BUSY_ERRORS.contains(&name.as_str()) =>
            {
                tracing::debug!(interface = %iface.name, "scan already in progress");
                Ok(())
            }
            Err(err) => Err(unavailable(err)),
        }
    }

    fn is_scanning(&self, iface: &InterfaceInfo) -> SourceResult<bool> {
        self.proxy(&iface.path, STATION_IFACE)?
            .get_property("Scanning")
            .map_err(unavailable)
    }

    /// One result per radio, strongest network first.
    fn scan_results(&self, iface: &InterfaceInfo) -> SourceResult<Vec<ScanResult>> {
        let station = self.proxy(&iface.path, STATION_IFACE)?;
        // Signal strength is reported in 100 * dBm.
        let ordered: Vec<(OwnedObjectPath, i16)> = station
            .call("GetOrderedNetworks", &())
            .map_err(unavailable)?;

        let ordered: Vec<(String, i16)> = ordered
            .into_iter()
            .map(|(path, signal)| (path.as_str().to_string(), signal))
            .collect();

        collect_results(
            &ordered,
            |path| {
                self.proxy(path, NETWORK_IFACE)?
                    .get_property("Name")
                    .map_err(|e| unavailable(format!("Failed to read network name at {path}: {e}")))
            },
            |path| self.network_bsses(path),
        )
    }

    fn interface_status(&self, iface: &InterfaceInfo) -> SourceResult<InterfaceStatus> {
        let station = self.proxy(&iface.path, STATION_IFACE)?;
        let state: String = station.get_property("State").map_err(unavailable)?;
        if !is_connected_state(&state) {
            return Ok(InterfaceStatus::Disconnected);
        }

        let network: Option<OwnedObjectPath> = station.get_property("ConnectedNetwork").ok();
        let ssid = match network.as_ref() {
            Some(path) => self
                .proxy(path.as_str(), NETWORK_IFACE)?
                .get_property::<String>("Name")
                .ok(),
            None => None,
        };

        // Older iwd releases lack ConnectedAccessPoint; fall back to the first
        // radio of the connected network.
        let bssid = match station.get_property::<OwnedObjectPath>("ConnectedAccessPoint") {
            Ok(bss) => Some(self.bss_address(bss.as_str())?),
            Err(_) => match network.as_ref() {
                Some(path) => self.network_bsses(path.as_str())?.into_iter().next(),
                None => None,
            },
        };

        Ok(match bssid {
            Some(bssid) => InterfaceStatus::Connected { ssid, bssid },
            None => {
                tracing::debug!(interface = %iface.name, "connected but no access point reported");
                InterfaceStatus::Disconnected
            }
        })
    }
}
