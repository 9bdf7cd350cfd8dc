use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use crate::scenario::ScenarioTag;

pub const DEFAULT_CLEANUP_DELAY_DAYS: i64 = 7;
pub const DEFAULT_TRACKING_DAYS: i64 = 7;

/// Process-wide, hot-mutable knobs. Injected once at startup and shared via
/// `Arc`; admin commands mutate them at runtime.
#[derive(Debug)]
pub struct RuntimeSettings {
    debug_mode: AtomicBool,
    recruitment_cleanup_delay_days: AtomicI64,
    new_recruit_tracking_days: AtomicI64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            debug_mode: AtomicBool::new(false),
            recruitment_cleanup_delay_days: AtomicI64::new(DEFAULT_CLEANUP_DELAY_DAYS),
            new_recruit_tracking_days: AtomicI64::new(DEFAULT_TRACKING_DAYS),
        }
    }
}

impl RuntimeSettings {
    pub fn debug_mode(&self) -> bool {
        self.debug_mode.load(Ordering::Relaxed)
    }

    /// Flip the debug flag, returning the new value.
    pub fn toggle_debug_mode(&self) -> bool {
        !self.debug_mode.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn recruitment_cleanup_delay_days(&self) -> i64 {
        self.recruitment_cleanup_delay_days.load(Ordering::Relaxed)
    }

    pub fn set_recruitment_cleanup_delay_days(&self, days: i64) {
        self.recruitment_cleanup_delay_days
            .store(days.max(1), Ordering::Relaxed);
    }

    pub fn new_recruit_tracking_days(&self) -> i64 {
        self.new_recruit_tracking_days.load(Ordering::Relaxed)
    }

    pub fn set_new_recruit_tracking_days(&self, days: i64) {
        self.new_recruit_tracking_days
            .store(days.max(1), Ordering::Relaxed);
    }

    /// The default monitoring window for a scenario, in days.
    pub fn scenario_window_days(&self, scenario: ScenarioTag) -> i64 {
        match scenario {
            ScenarioTag::NewRecruit => self.new_recruit_tracking_days(),
            ScenarioTag::RecruitmentProcess => self.recruitment_cleanup_delay_days(),
        }
    }

    /// Same as `scenario_window_days` but in seconds.
    pub fn scenario_window_secs(&self, scenario: ScenarioTag) -> i64 {
        self.scenario_window_days(scenario) * 24 * 60 * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_flips_and_reports_new_value() {
        let s = RuntimeSettings::default();
        assert!(!s.debug_mode());
        assert!(s.toggle_debug_mode());
        assert!(s.debug_mode());
        assert!(!s.toggle_debug_mode());
    }

    #[test]
    fn day_knobs_clamp_to_one() {
        let s = RuntimeSettings::default();
        s.set_recruitment_cleanup_delay_days(0);
        assert_eq!(s.recruitment_cleanup_delay_days(), 1);
        s.set_new_recruit_tracking_days(-3);
        assert_eq!(s.new_recruit_tracking_days(), 1);
        s.set_new_recruit_tracking_days(14);
        assert_eq!(s.scenario_window_days(ScenarioTag::NewRecruit), 14);
        assert_eq!(
            s.scenario_window_secs(ScenarioTag::RecruitmentProcess),
            7 * 86_400
        );
    }
}
