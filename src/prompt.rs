use crate::models::{InterfaceStatus, KnownNetwork, Rgb, ScanResult};
use crate::store::KnownMap;

const DEFAULT_PICK: Rgb = Rgb([0x33, 0x99, 0xff]);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PromptStage {
    /// "Would you like to assign a color?"
    Ask,
    Pick { color: Rgb },
}

/// The dialog raised after connecting to a BSSID without a color.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ColorPrompt {
    pub(crate) bssid: String,
    pub(crate) ssid: String,
    pub(crate) stage: PromptStage,
}

impl ColorPrompt {
    pub(crate) fn accept(&mut self) {
        if self.stage == PromptStage::Ask {
            self.stage = PromptStage::Pick { color: DEFAULT_PICK };
        }
    }

    pub(crate) fn picked(&self) -> Option<Rgb> {
        match self.stage {
            PromptStage::Pick { color } => Some(color),
            PromptStage::Ask => None,
        }
    }

    pub(crate) fn set_color(&mut self, rgb: [u8; 3]) {
        if let PromptStage::Pick { color } = &mut self.stage {
            color.0 = rgb;
        }
    }

    /// The entry to store once the user confirms a color.
    pub(crate) fn into_known(self) -> Option<(String, KnownNetwork)> {
        let color = self.picked()?;
        Some((
            self.bssid,
            KnownNetwork {
                ssid: self.ssid,
                color,
            },
        ))
    }
}

/// The prompt to raise for the current connection, if its BSSID has no color
/// yet. The SSID comes from the interface status, or from the scan result
/// for the same radio.
pub(crate) fn unknown_connection(
    status: &InterfaceStatus,
    results: &[ScanResult],
    known: &KnownMap,
) -> Option<ColorPrompt> {
    let InterfaceStatus::Connected { ssid, bssid } = status else {
        return None;
    };
    let bssid = bssid.to_ascii_lowercase();
    if known.contains_key(&bssid) {
        return None;
    }

    let ssid = ssid
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| {
            results
                .iter()
                .find(|r| r.bssid.eq_ignore_ascii_case(&bssid) && !r.ssid.is_empty())
                .map(|r| r.ssid.clone())
        })?;

    Some(ColorPrompt {
        bssid,
        ssid,
        stage: PromptStage::Ask,
    })
}

/// Opens `candidate` unless a prompt is already showing. Returns whether it
/// was opened.
pub(crate) fn offer(current: &mut Option<ColorPrompt>, candidate: Option<ColorPrompt>) -> bool {
    let Some(candidate) = candidate else {
        return false;
    };
    if let Some(open) = current.as_ref() {
        tracing::debug!(
            open = %open.bssid,
            skipped = %candidate.bssid,
            "color prompt already open"
        );
        return false;
    }

    tracing::info!(bssid = %candidate.bssid, ssid = %candidate.ssid, "new connection without a color");
    *current = Some(candidate);
    true
}
