use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use eframe::egui;

use crate::classifier::{classify, resolve_bssids};
use crate::cycle::{ScanCycle, ScanPhase};
use crate::models::{DisplayEntry, Rgb, ScanResult};
use crate::prompt::{self, ColorPrompt, PromptStage};
use crate::scan::{ScanError, ScanReport, ScanTrigger, ScanWorker, select_interface};
use crate::store::Store;

#[derive(Clone, Debug, PartialEq, Eq)]
struct Notice {
    title: String,
    body: String,
}

enum PromptAction {
    Keep,
    Dismiss,
    Save,
}

pub(crate) struct WifiIdentifierApp {
    initialized: bool,
    store: Store,
    worker: ScanWorker,
    cycle: ScanCycle,
    last_results: Vec<ScanResult>,
    entries: Vec<DisplayEntry>,
    selected: BTreeSet<String>,
    prompt: Option<ColorPrompt>,
    notice: Option<Notice>,
    status_line: String,
}

impl WifiIdentifierApp {
    pub(crate) fn new(store: Store, worker: ScanWorker, cycle: ScanCycle) -> Self {
        Self {
            initialized: false,
            store,
            worker,
            cycle,
            last_results: Vec::new(),
            entries: Vec::new(),
            selected: BTreeSet::new(),
            prompt: None,
            notice: None,
            status_line: String::new(),
        }
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.status_line = status.into();
    }

    fn render_entries(&mut self) {
        self.entries = classify(&self.last_results, self.store.ignored(), self.store.known());
        let entries = &self.entries;
        self.selected.retain(|ssid| entries.iter().any(|e| &e.ssid == ssid));
    }

    fn start_scan(&mut self, ctx: &egui::Context, trigger: ScanTrigger) {
        let generation = self.cycle.begin(trigger);
        self.entries.clear();
        self.selected.clear();
        if trigger == ScanTrigger::User {
            self.set_status("Scanning...");
        }

        tracing::info!(generation, ?trigger, "starting scan");
        let ctx = ctx.clone();
        self.worker
            .spawn(generation, trigger, move || ctx.request_repaint());
    }

    fn handle_report(&mut self, report: ScanReport, now: Instant) {
        if !self.cycle.finish(report.generation) {
            return;
        }

        let elapsed_ms = millis(report.elapsed);
        match report.outcome {
            Ok(snapshot) => {
                tracing::info!(
                    generation = report.generation,
                    trigger = ?report.trigger,
                    interface = %snapshot.interface.name,
                    radios = snapshot.results.len(),
                    elapsed_ms,
                    "scan finished"
                );
                let candidate =
                    prompt::unknown_connection(&snapshot.status, &snapshot.results, self.store.known());
                prompt::offer(&mut self.prompt, candidate);

                self.last_results = snapshot.results;
                self.render_entries();
                self.set_status("Scan complete.");
            }
            Err(ScanError::Cancelled) => {
                tracing::debug!(generation = report.generation, "scan cancelled");
            }
            Err(err) => {
                tracing::warn!(generation = report.generation, elapsed_ms, error = %err, "scan failed");
                self.set_status(format!("Scan failed: {err}"));
            }
        }

        self.cycle.rendered(now);
    }

    fn ignore_selected(&mut self) {
        if self.selected.is_empty() {
            self.notice = Some(Notice {
                title: "Nothing selected".to_string(),
                body: "Select a network first.".to_string(),
            });
            return;
        }

        // Resolve against what the daemon sees now, not the rows on screen.
        let fresh = select_interface(self.worker.source(), self.worker.interface())
            .and_then(|iface| self.worker.source().scan_results(&iface));
        let fresh = match fresh {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!(error = %err, "could not refresh scan results for ignore");
                self.set_status(format!("Could not look up access points: {err}"));
                Vec::new()
            }
        };

        let selected = std::mem::take(&mut self.selected);
        for ssid in &selected {
            let bssids = resolve_bssids(&fresh, ssid);
            if let Err(err) = self.store.ignore(ssid, &bssids) {
                tracing::error!(%ssid, error = %err, "failed to save ignore lists");
                self.set_status(format!("Failed to save ignore lists: {err}"));
            }
            self.entries.retain(|entry| &entry.ssid != ssid);
        }
    }

    fn save_prompt(&mut self, prompt: ColorPrompt) {
        let Some((bssid, network)) = prompt.into_known() else {
            return;
        };
        let ssid = network.ssid.clone();
        match self.store.remember(&bssid, network) {
            Ok(()) => {
                self.notice = Some(Notice {
                    title: "Saved".to_string(),
                    body: format!("Color saved for '{ssid}'"),
                });
                self.set_status(format!("Color saved for '{ssid}'"));
            }
            Err(err) => {
                tracing::error!(%bssid, error = %err, "failed to save known networks");
                self.set_status(format!("Failed to save color for '{ssid}': {err}"));
            }
        }
        self.render_entries();
    }

    fn draw_controls(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let enabled = self.cycle.controls_enabled();
        ui.vertical_centered(|ui| {
            if ui
                .add_enabled(enabled, egui::Button::new("Scan WiFi").min_size([160.0, 28.0].into()))
                .clicked()
            {
                self.start_scan(ctx, ScanTrigger::User);
            }
            if ui
                .add_enabled(
                    enabled,
                    egui::Button::new("Ignore Network").min_size([160.0, 28.0].into()),
                )
                .clicked()
            {
                self.ignore_selected();
            }

            let mut auto_refresh = self.cycle.auto_refresh();
            let label = format!("Auto-Refresh Every {}s", self.cycle.interval().as_secs());
            if ui.checkbox(&mut auto_refresh, label).changed() {
                tracing::debug!(auto_refresh, "auto-refresh toggled");
                self.cycle.set_auto_refresh(auto_refresh, Instant::now());
            }
        });
    }

    fn draw_networks(&mut self, ui: &mut egui::Ui) {
        ui.strong("SSID");
        ui.separator();
        egui::ScrollArea::vertical().show(ui, |ui| {
            for entry in &self.entries {
                let mut text = egui::RichText::new(&entry.ssid);
                if let Some(color) = entry.color {
                    let [r, g, b] = color.0;
                    text = text
                        .background_color(egui::Color32::from_rgb(r, g, b))
                        .color(text_color_on(color));
                }
                let hover = match entry.signal_dbm {
                    Some(dbm) => format!("{} ({dbm} dBm)", entry.bssid),
                    None => entry.bssid.clone(),
                };
                let is_selected = self.selected.contains(&entry.ssid);
                if ui
                    .selectable_label(is_selected, text)
                    .on_hover_text(hover)
                    .clicked()
                {
                    if is_selected {
                        self.selected.remove(&entry.ssid);
                    } else {
                        self.selected.insert(entry.ssid.clone());
                    }
                }
            }
        });
    }

    fn draw_prompt(&mut self, ctx: &egui::Context) {
        let Some(mut prompt) = self.prompt.take() else {
            return;
        };

        let modal = egui::Modal::new(egui::Id::new("color_prompt")).show(ctx, |ui| {
            match prompt.stage {
                PromptStage::Ask => {
                    ui.heading("New WiFi Detected");
                    ui.label(format!(
                        "You just connected to '{}'. Would you like to assign a color?",
                        prompt.ssid
                    ));
                    ui.horizontal(|ui| {
                        if ui.button("Yes").clicked() {
                            prompt.accept();
                        }
                        if ui.button("No").clicked() {
                            return PromptAction::Dismiss;
                        }
                        PromptAction::Keep
                    })
                    .inner
                }
                PromptStage::Pick { color } => {
                    ui.heading(format!("Pick a color for '{}'", prompt.ssid));
                    let mut rgb = color.0;
                    if ui.color_edit_button_srgb(&mut rgb).changed() {
                        prompt.set_color(rgb);
                    }
                    ui.horizontal(|ui| {
                        if ui.button("Save").clicked() {
                            return PromptAction::Save;
                        }
                        if ui.button("Cancel").clicked() {
                            return PromptAction::Dismiss;
                        }
                        PromptAction::Keep
                    })
                    .inner
                }
            }
        });

        let action = if modal.should_close() {
            PromptAction::Dismiss
        } else {
            modal.inner
        };
        match action {
            PromptAction::Keep => self.prompt = Some(prompt),
            PromptAction::Dismiss => {
                tracing::debug!(bssid = %prompt.bssid, "color prompt dismissed");
            }
            PromptAction::Save => self.save_prompt(prompt),
        }
    }

    fn draw_notice(&mut self, ctx: &egui::Context) {
        let Some(notice) = self.notice.as_ref() else {
            return;
        };

        let modal = egui::Modal::new(egui::Id::new("notice")).show(ctx, |ui| {
            ui.heading(&notice.title);
            ui.label(&notice.body);
            ui.button("OK").clicked()
        });
        if modal.inner || modal.should_close() {
            self.notice = None;
        }
    }
}

impl eframe::App for WifiIdentifierApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        if !self.initialized {
            self.initialized = true;
            if self.cycle.auto_refresh() {
                self.start_scan(ctx, ScanTrigger::Auto);
            }
        }

        if let Some(report) = self.worker.poll() {
            self.handle_report(report, now);
        }
        if self.cycle.auto_due(now) {
            self.start_scan(ctx, ScanTrigger::Auto);
        }
        if let Some(wait) = self.cycle.until_auto(now) {
            ctx.request_repaint_after(wait);
        }

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.heading("WiFi Identifier");
            });
            self.draw_controls(ui, ctx);
        });

        egui::TopBottomPanel::bottom("status_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if matches!(self.cycle.phase(), ScanPhase::Scanning { .. }) {
                    ui.spinner();
                }
                ui.label(self.status_line.as_str());
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| self.draw_networks(ui));

        // A notice stacks above the prompt it may follow.
        self.draw_prompt(ctx);
        self.draw_notice(ctx);
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn text_color_on(background: Rgb) -> egui::Color32 {
    let [r, g, b] = background.0.map(u32::from);
    if r * 299 + g * 587 + b * 114 > 128_000 {
        egui::Color32::BLACK
    } else {
        egui::Color32::WHITE
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::{TempDir, tempdir};

    use super::*;
    use crate::models::{InterfaceStatus, KnownNetwork};
    use crate::scan::tests::{FakeSource, wlan0};
    use crate::scan::{ScanSnapshot, ScanTimings};

    const CAFE_1: &str = "aa:bb:cc:00:00:01";
    const CAFE_2: &str = "aa:bb:cc:00:00:02";

    fn cafe_results() -> Vec<ScanResult> {
        vec![
            ScanResult::new("Cafe", "AA:BB:CC:00:00:01"),
            ScanResult::new("Cafe", "AA:BB:CC:00:00:02"),
            ScanResult::new("Home", "aa:bb:cc:00:00:05"),
        ]
    }

    fn app_with(source: FakeSource) -> (WifiIdentifierApp, TempDir) {
        let dir = tempdir().expect("tempdir");
        let store = Store::open(dir.path()).expect("store");
        let worker = ScanWorker::new(
            Arc::new(source),
            None,
            ScanTimings {
                poll_interval: Duration::from_millis(1),
                timeout: Duration::from_secs(5),
            },
        );
        let app = WifiIdentifierApp::new(store, worker, ScanCycle::new(Duration::from_secs(10)));
        (app, dir)
    }

    fn deliver(app: &mut WifiIdentifierApp, results: Vec<ScanResult>, status: InterfaceStatus) {
        let generation = app.cycle.begin(ScanTrigger::User);
        app.handle_report(
            ScanReport {
                generation,
                trigger: ScanTrigger::User,
                elapsed: Duration::from_millis(5),
                outcome: Ok(ScanSnapshot {
                    interface: wlan0(),
                    results,
                    status,
                }),
            },
            Instant::now(),
        );
    }

    fn connected_to(bssid: &str) -> InterfaceStatus {
        InterfaceStatus::Connected {
            ssid: Some("Cafe".to_string()),
            bssid: bssid.to_string(),
        }
    }

    #[test]
    fn known_network_row_is_colored() {
        let (mut app, _dir) = app_with(FakeSource::with_results(cafe_results()));
        app.store
            .remember(
                CAFE_1,
                KnownNetwork {
                    ssid: "Cafe".to_string(),
                    color: Rgb([0xff, 0, 0]),
                },
            )
            .expect("remember");

        deliver(&mut app, cafe_results(), connected_to(CAFE_1));
        let names: Vec<_> = app.entries.iter().map(|e| e.ssid.as_str()).collect();
        assert_eq!(names, ["Cafe", "Home"]);
        assert_eq!(app.entries[0].color, Some(Rgb([0xff, 0, 0])));
        assert_eq!(app.prompt, None);
        assert_eq!(app.status_line, "Scan complete.");
        assert!(app.cycle.controls_enabled());
    }

    #[test]
    fn unknown_connection_prompts_once_per_scan() {
        let (mut app, _dir) = app_with(FakeSource::with_results(cafe_results()));
        deliver(&mut app, cafe_results(), connected_to(CAFE_2));
        let prompt = app.prompt.clone().expect("prompt");
        assert_eq!(prompt.bssid, CAFE_2);

        deliver(&mut app, cafe_results(), connected_to(CAFE_2));
        assert_eq!(app.prompt, Some(prompt));
    }

    #[test]
    fn saving_prompt_persists_and_recolors() {
        let (mut app, dir) = app_with(FakeSource::with_results(cafe_results()));
        deliver(&mut app, cafe_results(), connected_to(CAFE_1));

        let mut prompt = app.prompt.take().expect("prompt");
        prompt.accept();
        prompt.set_color([0, 0x80, 0]);
        app.save_prompt(prompt);

        assert_eq!(app.entries[0].color, Some(Rgb([0, 0x80, 0])));
        assert_eq!(app.notice.as_ref().map(|n| n.title.as_str()), Some("Saved"));

        let reopened = Store::open(dir.path()).expect("reopen");
        assert!(reopened.known().contains_key(CAFE_1));
    }

    #[test]
    fn declined_prompt_saves_nothing() {
        let (mut app, dir) = app_with(FakeSource::with_results(cafe_results()));
        deliver(&mut app, cafe_results(), connected_to(CAFE_1));
        let prompt = app.prompt.take().expect("prompt");
        app.save_prompt(prompt);

        assert!(app.store.known().is_empty());
        assert!(!dir.path().join("known_networks.json").exists());
    }

    #[test]
    fn ignore_without_selection_warns() {
        let (mut app, dir) = app_with(FakeSource::with_results(cafe_results()));
        deliver(&mut app, cafe_results(), InterfaceStatus::Disconnected);
        app.ignore_selected();

        assert_eq!(
            app.notice,
            Some(Notice {
                title: "Nothing selected".to_string(),
                body: "Select a network first.".to_string(),
            })
        );
        assert_eq!(app.entries.len(), 2);
        assert!(!dir.path().join("ignored_ssids.json").exists());
    }

    #[test]
    fn ignore_resolves_bssids_from_fresh_results() {
        let (mut app, dir) = app_with(FakeSource::with_results(cafe_results()));
        // The list on screen only saw one Cafe radio.
        deliver(
            &mut app,
            vec![ScanResult::new("Cafe", CAFE_1), ScanResult::new("Home", "aa:bb:cc:00:00:05")],
            InterfaceStatus::Disconnected,
        );
        app.selected.insert("Cafe".to_string());
        app.ignore_selected();

        let names: Vec<_> = app.entries.iter().map(|e| e.ssid.as_str()).collect();
        assert_eq!(names, ["Home"]);
        assert!(app.selected.is_empty());

        let reopened = Store::open(dir.path()).expect("reopen");
        assert!(reopened.ignored().ssids.contains("Cafe"));
        assert!(reopened.ignored().bssids.contains(CAFE_1));
        assert!(reopened.ignored().bssids.contains(CAFE_2));

        deliver(&mut app, cafe_results(), InterfaceStatus::Disconnected);
        let names: Vec<_> = app.entries.iter().map(|e| e.ssid.as_str()).collect();
        assert_eq!(names, ["Home"]);
    }

    #[test]
    fn failed_scan_reports_and_reenables_controls() {
        let (mut app, _dir) = app_with(FakeSource::with_results(cafe_results()));
        let generation = app.cycle.begin(ScanTrigger::User);
        app.handle_report(
            ScanReport {
                generation,
                trigger: ScanTrigger::User,
                elapsed: Duration::from_secs(15),
                outcome: Err(ScanError::Timeout(Duration::from_secs(15))),
            },
            Instant::now(),
        );
        assert_eq!(app.status_line, "Scan failed: scan timed out after 15s");
        assert!(app.entries.is_empty());
        assert!(app.cycle.controls_enabled());
    }

    #[test]
    fn scan_cycle_end_to_end() {
        let source = FakeSource {
            busy_polls: 2,
            ..FakeSource::with_results(cafe_results())
        };
        let (mut app, _dir) = app_with(source);
        let ctx = egui::Context::default();

        app.selected.insert("Stale".to_string());
        app.start_scan(&ctx, ScanTrigger::User);
        assert_eq!(app.status_line, "Scanning...");
        assert!(!app.cycle.controls_enabled());
        assert!(app.entries.is_empty());
        assert!(app.selected.is_empty());

        let deadline = Instant::now() + Duration::from_secs(5);
        let report = loop {
            if let Some(report) = app.worker.poll() {
                break report;
            }
            assert!(Instant::now() < deadline, "scan never finished");
            std::thread::sleep(Duration::from_millis(1));
        };
        app.handle_report(report, Instant::now());

        assert_eq!(app.entries.len(), 2);
        assert_eq!(app.status_line, "Scan complete.");
        assert!(app.cycle.controls_enabled());
    }

    #[test]
    fn manual_refresh_keeps_auto_refresh_alive() {
        let (mut app, _dir) = app_with(FakeSource::default());
        let start = Instant::now();
        app.cycle.set_auto_refresh(true, start);

        deliver(&mut app, cafe_results(), InterfaceStatus::Disconnected);

        assert!(app.cycle.controls_enabled());
        assert!(app.cycle.until_auto(start).is_some());
        assert!(app.cycle.auto_due(start + Duration::from_secs(60)));
    }

    #[test]
    fn elapsed_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn text_contrast() {
        assert_eq!(text_color_on(Rgb([0xff, 0xff, 0x00])), egui::Color32::BLACK);
        assert_eq!(text_color_on(Rgb([0x00, 0x00, 0x80])), egui::Color32::WHITE);
    }
}
