use std::time::{Duration, Instant};

use crate::scan::ScanTrigger;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ScanPhase {
    Idle,
    Scanning { generation: u64, trigger: ScanTrigger },
    Rendering { trigger: ScanTrigger },
}

/// Idle -> Scanning -> Rendering -> Idle, plus the auto-refresh schedule.
#[derive(Debug)]
pub(crate) struct ScanCycle {
    phase: ScanPhase,
    last_generation: u64,
    auto_refresh: bool,
    interval: Duration,
    next_auto: Option<Instant>,
}

impl ScanCycle {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            phase: ScanPhase::Idle,
            last_generation: 0,
            auto_refresh: false,
            interval,
            next_auto: None,
        }
    }

    pub(crate) fn phase(&self) -> ScanPhase {
        self.phase
    }

    /// Scan and Ignore are only usable while nothing is in flight.
    pub(crate) fn controls_enabled(&self) -> bool {
        self.phase == ScanPhase::Idle
    }

    pub(crate) fn auto_refresh(&self) -> bool {
        self.auto_refresh
    }

    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }

    pub(crate) fn set_auto_refresh(&mut self, enabled: bool, now: Instant) {
        self.auto_refresh = enabled;
        self.next_auto = enabled.then(|| now + self.interval);
    }

    /// Enters Scanning and returns the new generation. A scan already in
    /// flight is superseded. A user scan leaves a pending auto scan in place.
    pub(crate) fn begin(&mut self, trigger: ScanTrigger) -> u64 {
        self.last_generation += 1;
        if trigger == ScanTrigger::Auto {
            self.next_auto = None;
        }
        self.phase = ScanPhase::Scanning {
            generation: self.last_generation,
            trigger,
        };
        self.last_generation
    }

    /// Moves to Rendering if `generation` is the scan in flight.
    pub(crate) fn finish(&mut self, generation: u64) -> bool {
        match self.phase {
            ScanPhase::Scanning {
                generation: current,
                trigger,
            } if current == generation => {
                self.phase = ScanPhase::Rendering { trigger };
                true
            }
            _ => false,
        }
    }

    /// Back to Idle once the results are on screen. While auto-refresh is on,
    /// an auto cycle schedules the next one, and a user cycle restores the
    /// schedule if the auto cycle it superseded had consumed it.
    pub(crate) fn rendered(&mut self, now: Instant) {
        if let ScanPhase::Rendering { trigger } = self.phase {
            self.phase = ScanPhase::Idle;
            let reschedule = trigger == ScanTrigger::Auto || self.next_auto.is_none();
            if self.auto_refresh && reschedule {
                self.next_auto = Some(now + self.interval);
            }
        }
    }

    pub(crate) fn auto_due(&self, now: Instant) -> bool {
        self.phase == ScanPhase::Idle && self.next_auto.is_some_and(|due| due <= now)
    }

    pub(crate) fn until_auto(&self, now: Instant) -> Option<Duration> {
        self.next_auto.map(|due| due.saturating_duration_since(now))
    }
}
