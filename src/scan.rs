use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::models::{InterfaceInfo, InterfaceStatus, ScanResult};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum ScanError {
    #[error("wireless service unavailable: {0}")]
    Unavailable(String),
    #[error("no wireless interface found")]
    NoInterface,
    #[error("scan timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("scan cancelled")]
    Cancelled,
}

pub(crate) type SourceResult<T> = Result<T, ScanError>;

/// The wireless daemon as seen by the app.
pub(crate) trait WifiSource: Send + Sync {
    fn list_interfaces(&self) -> SourceResult<Vec<InterfaceInfo>>;
    fn request_scan(&self, iface: &InterfaceInfo) -> SourceResult<()>;
    fn is_scanning(&self, iface: &InterfaceInfo) -> SourceResult<bool>;
    fn scan_results(&self, iface: &InterfaceInfo) -> SourceResult<Vec<ScanResult>>;
    fn interface_status(&self, iface: &InterfaceInfo) -> SourceResult<InterfaceStatus>;
}

/// Picks `preferred` by name, or the first interface when none is configured.
pub(crate) fn select_interface(
    source: &dyn WifiSource,
    preferred: Option<&str>,
) -> SourceResult<InterfaceInfo> {
    let interfaces = source.list_interfaces()?;
    let found = match preferred {
        Some(name) => interfaces.into_iter().find(|iface| iface.name == name),
        None => interfaces.into_iter().next(),
    };
    found.ok_or(ScanError::NoInterface)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ScanTimings {
    pub(crate) poll_interval: Duration,
    pub(crate) timeout: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ScanTrigger {
    User,
    Auto,
}

/// What a finished scan saw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ScanSnapshot {
    pub(crate) interface: InterfaceInfo,
    pub(crate) results: Vec<ScanResult>,
    pub(crate) status: InterfaceStatus,
}

#[derive(Debug)]
pub(crate) struct ScanReport {
    pub(crate) generation: u64,
    pub(crate) trigger: ScanTrigger,
    pub(crate) elapsed: Duration,
    pub(crate) outcome: SourceResult<ScanSnapshot>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub(crate) fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Requests a scan and waits for the daemon to finish it.
///
/// The scanning flag is polled every `poll_interval`; if it is still set once
/// `timeout` has passed the scan is reported as timed out.
pub(crate) fn run_scan(
    source: &dyn WifiSource,
    preferred: Option<&str>,
    timings: ScanTimings,
    cancel: &CancelToken,
) -> SourceResult<ScanSnapshot> {
    let interface = select_interface(source, preferred)?;
    source.request_scan(&interface)?;

    let started = Instant::now();
    loop {
        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        if !source.is_scanning(&interface)? {
            break;
        }
        if started.elapsed() >= timings.timeout {
            return Err(ScanError::Timeout(timings.timeout));
        }
        thread::sleep(timings.poll_interval);
    }

    if cancel.is_cancelled() {
        return Err(ScanError::Cancelled);
    }
    let results = source.scan_results(&interface)?;
    let status = source.interface_status(&interface)?;
    Ok(ScanSnapshot {
        interface,
        results,
        status,
    })
}

struct InFlight {
    generation: u64,
    cancel: CancelToken,
}

/// Runs one background thread per scan cycle and hands the report back to
/// the UI thread over a channel.
pub(crate) struct ScanWorker {
    source: Arc<dyn WifiSource>,
    interface: Option<String>,
    timings: ScanTimings,
    tx: Sender<ScanReport>,
    rx: Receiver<ScanReport>,
    in_flight: Option<InFlight>,
}

impl ScanWorker {
    pub(crate) fn new(
        source: Arc<dyn WifiSource>,
        interface: Option<String>,
        timings: ScanTimings,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            source,
            interface,
            timings,
            tx,
            rx,
            in_flight: None,
        }
    }

    pub(crate) fn source(&self) -> &dyn WifiSource {
        self.source.as_ref()
    }

    pub(crate) fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    /// Starts scan `generation`, cancelling whatever was still running.
    /// `wake` is called once the report has been sent.
    pub(crate) fn spawn<W>(&mut self, generation: u64, trigger: ScanTrigger, wake: W)
    where
        W: Fn() + Send + 'static,
    {
        self.cancel();

        let cancel = CancelToken::default();
        let source = Arc::clone(&self.source);
        let interface = self.interface.clone();
        let timings = self.timings;
        let tx = self.tx.clone();
        let token = cancel.clone();

        tracing::debug!(generation, ?trigger, "spawning scan worker");
        thread::spawn(move || {
            let started = Instant::now();
            let outcome = run_scan(source.as_ref(), interface.as_deref(), timings, &token);
            let report = ScanReport {
                generation,
                trigger,
                elapsed: started.elapsed(),
                outcome,
            };
            if tx.send(report).is_ok() {
                wake();
            }
        });

        self.in_flight = Some(InFlight {
            generation,
            cancel,
        });
    }

    /// Cancels the in-flight scan, if any. Its report will be discarded.
    pub(crate) fn cancel(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            tracing::debug!(generation = in_flight.generation, "cancelling scan");
            in_flight.cancel.cancel();
        }
    }

    /// Returns the report of the current scan once it is ready. Reports from
    /// cancelled or superseded scans are dropped.
    pub(crate) fn poll(&mut self) -> Option<ScanReport> {
        loop {
            let report = match self.rx.try_recv() {
                Ok(report) => report,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            };
            let current = self.in_flight.as_ref().map(|f| f.generation);
            if current == Some(report.generation) {
                self.in_flight = None;
                return Some(report);
            }
            tracing::debug!(generation = report.generation, "dropping stale scan report");
        }
    }
}

impl Drop for ScanWorker {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use super::*;

    /// Scripted source: reports "scanning" for a number of polls, then the
    /// configured results.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        pub(crate) interfaces: Vec<InterfaceInfo>,
        pub(crate) results: Mutex<Vec<ScanResult>>,
        pub(crate) status: Mutex<InterfaceStatus>,
        pub(crate) busy_polls: usize,
        pub(crate) never_finishes: bool,
        pub(crate) polls: AtomicUsize,
        pub(crate) scans_requested: AtomicUsize,
    }

    impl FakeSource {
        pub(crate) fn with_results(results: Vec<ScanResult>) -> Self {
            Self {
                interfaces: vec![wlan0()],
                results: Mutex::new(results),
                ..Self::default()
            }
        }
    }

    pub(crate) fn wlan0() -> InterfaceInfo {
        InterfaceInfo {
            name: "wlan0".to_string(),
            path: "/net/connman/iwd/0/4".to_string(),
        }
    }

    impl WifiSource for FakeSource {
        fn list_interfaces(&self) -> SourceResult<Vec<InterfaceInfo>> {
            Ok(self.interfaces.clone())
        }

        fn request_scan(&self, _iface: &InterfaceInfo) -> SourceResult<()> {
            self.scans_requested.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn is_scanning(&self, _iface: &InterfaceInfo) -> SourceResult<bool> {
            let polls = self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(self.never_finishes || polls < self.busy_polls)
        }

        fn scan_results(&self, _iface: &InterfaceInfo) -> SourceResult<Vec<ScanResult>> {
            Ok(self.results.lock().unwrap().clone())
        }

        fn interface_status(&self, _iface: &InterfaceInfo) -> SourceResult<InterfaceStatus> {
            Ok(self.status.lock().unwrap().clone())
        }
    }

    fn timings(timeout_ms: u64) -> ScanTimings {
        ScanTimings {
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn wait_for_report(worker: &mut ScanWorker) -> ScanReport {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(report) = worker.poll() {
                return report;
            }
            assert!(Instant::now() < deadline, "no scan report");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn run_scan_waits_for_scanning_flag_to_clear() {
        let source = FakeSource {
            busy_polls: 3,
            ..FakeSource::with_results(vec![ScanResult::new("Cafe", "aa:bb:cc:00:00:01")])
        };
        let snapshot = run_scan(&source, None, timings(5_000), &CancelToken::default())
            .expect("scan");
        assert_eq!(snapshot.interface, wlan0());
        assert_eq!(snapshot.results.len(), 1);
        assert_eq!(source.polls.load(Ordering::SeqCst), 4);
        assert_eq!(source.scans_requested.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn run_scan_times_out() {
        let source = FakeSource {
            never_finishes: true,
            ..FakeSource::with_results(Vec::new())
        };
        let err = run_scan(&source, None, timings(20), &CancelToken::default())
            .expect_err("should time out");
        assert_eq!(err, ScanError::Timeout(Duration::from_millis(20)));
    }

    #[test]
    fn run_scan_honours_cancellation() {
        let source = FakeSource {
            never_finishes: true,
            ..FakeSource::with_results(Vec::new())
        };
        let token = CancelToken::default();
        token.cancel();
        let err = run_scan(&source, None, timings(5_000), &token).expect_err("cancelled");
        assert_eq!(err, ScanError::Cancelled);
    }

    #[test]
    fn run_scan_without_interface() {
        let source = FakeSource::default();
        let err = run_scan(&source, None, timings(10), &CancelToken::default())
            .expect_err("no interface");
        assert_eq!(err, ScanError::NoInterface);
        assert_eq!(source.scans_requested.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn select_interface_by_name() {
        let wlan1 = InterfaceInfo {
            name: "wlan1".to_string(),
            path: "/net/connman/iwd/0/5".to_string(),
        };
        let source = FakeSource {
            interfaces: vec![wlan0(), wlan1.clone()],
            ..FakeSource::default()
        };
        assert_eq!(select_interface(&source, Some("wlan1")), Ok(wlan1));
        assert_eq!(select_interface(&source, None), Ok(wlan0()));
        assert_eq!(
            select_interface(&source, Some("wlp3s0")),
            Err(ScanError::NoInterface)
        );
    }

    #[test]
    fn worker_delivers_report_and_wakes() {
        let source = Arc::new(FakeSource::with_results(vec![ScanResult::new(
            "Home",
            "aa:bb:cc:00:00:05",
        )]));
        let mut worker = ScanWorker::new(source, None, timings(5_000));
        let woken = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&woken);
        worker.spawn(1, ScanTrigger::User, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let report = wait_for_report(&mut worker);
        assert_eq!(report.generation, 1);
        assert_eq!(report.trigger, ScanTrigger::User);
        assert_eq!(report.outcome.expect("snapshot").results.len(), 1);
        assert_eq!(woken.load(Ordering::SeqCst), 1);
        assert!(worker.poll().is_none());
    }

    #[test]
    fn worker_drops_superseded_reports() {
        let source = Arc::new(FakeSource {
            never_finishes: true,
            ..FakeSource::with_results(Vec::new())
        });
        let mut worker = ScanWorker::new(source, None, timings(200));
        worker.spawn(1, ScanTrigger::Auto, || {});
        worker.spawn(2, ScanTrigger::User, || {});

        let report = wait_for_report(&mut worker);
        assert_eq!(report.generation, 2);
        assert_eq!(report.outcome, Err(ScanError::Timeout(Duration::from_millis(200))));
    }
}
