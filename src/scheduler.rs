use log::debug;

/// One display-refresh notification from the host.
///
/// `time_value` over `time_scale` is a rational timestamp in seconds. The
/// pair comes straight from whatever clock the display driver exposes, so the
/// scale is arbitrary: a video display link reports its own timescale, the
/// bundled runners use nanoseconds.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RefreshEvent {
    pub time_value: i64,
    /// Units of `time_value` per second. Must be positive.
    pub time_scale: i64,
    /// True when the update preceding this one was dropped because the
    /// machine was still busy with an earlier one.
    pub did_skip_previous: bool,
    /// The display's nominal refresh rate in Hz, used to size the backlog cap.
    pub nominal_frequency: f64,
}

/// Policy for limiting catch-up work once the machine has fallen behind.
///
/// Both constants are empirically tuned rather than derived, so they are
/// parameters: hosts with different latency tolerances can adjust them.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ThrottlePolicy {
    /// Consecutive skipped refreshes tolerated before requests are capped.
    pub max_skipped_frames: u32,
    /// Size of the cap, in nominal frames' worth of cycles.
    pub frame_cap: f64,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            max_skipped_frames: 4,
            frame_cap: 1.0,
        }
    }
}

/// Converts a stream of [`RefreshEvent`]s into per-tick cycle counts whose
/// long-run total matches the requested rate exactly.
///
/// Dividing elapsed time into whole cycles discards a remainder of up to one
/// timescale unit on every tick. The scheduler carries that remainder into
/// the next tick instead, so truncation never costs cycles over time: after
/// N ticks the summed requests equal `floor(elapsed * rate / scale)` for the
/// whole span.
///
/// State is strictly sequential. Callers must deliver events one at a time
/// and in timestamp order; see [`Session`](crate::Session) for the guard
/// that arranges this.
pub struct CycleScheduler {
    /// The machine's clock rate. Zero means "not configured yet" and yields
    /// zero-cycle requests until a real rate is known.
    cycles_per_second: i64,
    /// Timestamp of the previous event; `None` until the first event has
    /// established a baseline.
    last_time: Option<i64>,
    /// Division remainder in timescale units, always in `[0, time_scale)`.
    cycle_count_error: i64,
    /// Length of the current run of consecutive skipped refreshes.
    skipped_frames: u32,
    throttle: ThrottlePolicy,
}

impl CycleScheduler {
    pub fn new(cycles_per_second: i64) -> Self {
        Self::with_throttle(cycles_per_second, ThrottlePolicy::default())
    }

    pub fn with_throttle(cycles_per_second: i64, throttle: ThrottlePolicy) -> Self {
        assert!(cycles_per_second >= 0, "clock rate cannot be negative");
        Self {
            cycles_per_second,
            last_time: None,
            cycle_count_error: 0,
            skipped_frames: 0,
            throttle,
        }
    }

    /// Feed one refresh notification, returning how many cycles to run now.
    ///
    /// The first event only establishes a timing baseline and returns `None`;
    /// there is nothing meaningful to derive a count from before that. Every
    /// later event returns `Some`, possibly of zero cycles.
    ///
    /// Panics if `time_scale` is not positive or if `time_value` regresses:
    /// both are caller contract breaches, and tolerating them silently would
    /// corrupt the remainder invariant for the rest of the session.
    pub fn on_refresh(&mut self, event: RefreshEvent) -> Option<i32> {
        assert!(
            event.time_scale > 0,
            "refresh event carries a non-positive timescale"
        );

        let last = match self.last_time {
            Some(last) => last,
            None => {
                self.last_time = Some(event.time_value);
                return None;
            }
        };
        assert!(
            event.time_value >= last,
            "refresh timestamps must be non-decreasing"
        );
        self.last_time = Some(event.time_value);

        if event.did_skip_previous {
            self.skipped_frames += 1;
        } else {
            self.skipped_frames = 0;
        }

        // All inputs are non-negative, so `total` is too and the remainder
        // lands in [0, time_scale). The product can exceed 64 bits for large
        // timescales, hence the widening.
        let elapsed = event.time_value - last;
        let total = i128::from(elapsed) * i128::from(self.cycles_per_second)
            + i128::from(self.cycle_count_error);
        let mut cycles = total / i128::from(event.time_scale);
        self.cycle_count_error = (total % i128::from(event.time_scale)) as i64;

        // A machine that has failed to keep pace for a sustained run of
        // refreshes may be facing a prohibitive backlog (the host waking from
        // sleep, for instance). Cap the request at one nominal frame's worth
        // so catch-up cannot stall responsiveness further. The untracked
        // backlog is abandoned, not queued.
        if self.skipped_frames > self.throttle.max_skipped_frames {
            if self.skipped_frames == self.throttle.max_skipped_frames.saturating_add(1) {
                debug!(
                    "machine behind after {} skipped refreshes; capping catch-up work",
                    self.skipped_frames
                );
            }
            let frame_worth = (self.cycles_per_second as f64 / event.nominal_frequency
                * self.throttle.frame_cap) as i128;
            cycles = cycles.min(frame_worth);
        }

        Some(cycles.min(i128::from(i32::MAX)) as i32)
    }

    /// Forget the current timing baseline; the next event re-establishes it
    /// and returns `None`. Use after deliberately stopping the clock (e.g. a
    /// host pause), where the gap must not be mistaken for a backlog.
    pub fn rebase(&mut self) {
        self.last_time = None;
        self.cycle_count_error = 0;
        self.skipped_frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use test_case::test_case;

    fn event(time_value: i64, time_scale: i64) -> RefreshEvent {
        RefreshEvent {
            time_value,
            time_scale,
            did_skip_previous: false,
            nominal_frequency: 60.0,
        }
    }

    fn skipped(time_value: i64, time_scale: i64) -> RefreshEvent {
        RefreshEvent {
            did_skip_previous: true,
            ..event(time_value, time_scale)
        }
    }

    #[test]
    fn first_event_only_establishes_a_baseline() {
        let mut scheduler = CycleScheduler::new(1_000_000);
        assert_eq!(scheduler.on_refresh(event(12_345, 60)), None);
        assert_eq!(scheduler.on_refresh(event(12_346, 60)), Some(16_666));
    }

    #[test_case(1_194_720 ; "atari 2600 colour clock third")]
    #[test_case(985_248 ; "pal c64 clock")]
    #[test_case(1_022_727 ; "ntsc c64 clock")]
    fn unit_steps_never_drift(cycles_per_second: i64) {
        let mut scheduler = CycleScheduler::new(cycles_per_second);
        assert_eq!(scheduler.on_refresh(event(0, 60)), None);

        // 600 ticks of 1/60s is exactly ten seconds of emulated time.
        let total: i64 = (1..=600)
            .map(|t| i64::from(scheduler.on_refresh(event(t, 60)).unwrap()))
            .sum();
        assert_eq!(total, cycles_per_second * 10);
    }

    #[test]
    fn identical_timestamps_are_legal() {
        let mut scheduler = CycleScheduler::new(1_000_000);
        scheduler.on_refresh(event(5, 60));
        assert_eq!(scheduler.on_refresh(event(5, 60)), Some(0));
    }

    #[test]
    fn unconfigured_rate_runs_nothing() {
        let mut scheduler = CycleScheduler::new(0);
        assert_eq!(scheduler.on_refresh(event(0, 60)), None);
        assert_eq!(scheduler.on_refresh(event(600, 60)), Some(0));
        assert_eq!(scheduler.on_refresh(event(6_000, 60)), Some(0));
    }

    #[test]
    fn backlog_is_capped_after_sustained_skips() {
        let mut scheduler = CycleScheduler::new(1_000_000);
        assert_eq!(scheduler.on_refresh(event(0, 1)), None);

        // Four skipped refreshes are tolerated at full size.
        for t in 1..=4 {
            assert_eq!(scheduler.on_refresh(skipped(t, 1)), Some(1_000_000));
        }

        // The fifth is capped to one 60 Hz frame's worth, even across a
        // ten-second gap that would otherwise ask for ten million cycles.
        assert_eq!(scheduler.on_refresh(skipped(14, 1)), Some(16_666));
    }

    #[test]
    fn cap_never_raises_a_small_request() {
        let mut scheduler = CycleScheduler::new(1_000_000);
        scheduler.on_refresh(event(0, 1_000));

        // Deep into a skipped run, but each tick only covers a millisecond:
        // well under the cap, so requests pass through unchanged.
        for t in 1..=10 {
            assert_eq!(scheduler.on_refresh(skipped(t, 1_000)), Some(1_000));
        }
    }

    #[test]
    fn skip_run_resets_on_a_kept_frame() {
        let mut scheduler = CycleScheduler::new(1_000_000);
        scheduler.on_refresh(event(0, 1));
        for t in 1..=4 {
            scheduler.on_refresh(skipped(t, 1));
        }

        // One kept frame ends the run; two further skips are below the
        // threshold again, so a large gap is not capped.
        scheduler.on_refresh(event(5, 1));
        scheduler.on_refresh(skipped(6, 1));
        assert_eq!(scheduler.on_refresh(skipped(16, 1)), Some(10_000_000));
    }

    #[test]
    fn throttle_policy_is_configurable() {
        let throttle = ThrottlePolicy {
            max_skipped_frames: 0,
            frame_cap: 2.0,
        };
        let mut scheduler = CycleScheduler::with_throttle(1_000_000, throttle);
        scheduler.on_refresh(event(0, 1));
        assert_eq!(scheduler.on_refresh(skipped(10, 1)), Some(33_333));
    }

    #[test]
    fn rebase_forgets_the_baseline() {
        let mut scheduler = CycleScheduler::new(1_000_000);
        scheduler.on_refresh(event(0, 60));
        scheduler.on_refresh(event(1, 60));
        scheduler.rebase();
        assert_eq!(scheduler.on_refresh(event(1_000_000, 60)), None);
        assert_eq!(scheduler.on_refresh(event(1_000_001, 60)), Some(16_666));
    }

    #[test]
    #[should_panic(expected = "non-positive timescale")]
    fn zero_timescale_is_a_contract_breach() {
        CycleScheduler::new(1).on_refresh(event(0, 0));
    }

    #[test]
    #[should_panic(expected = "non-decreasing")]
    fn time_regression_is_a_contract_breach() {
        let mut scheduler = CycleScheduler::new(1);
        scheduler.on_refresh(event(10, 60));
        scheduler.on_refresh(event(9, 60));
    }

    proptest! {
        #[test]
        fn remainder_stays_in_range(
            steps in proptest::collection::vec(0i64..100_000, 1..100),
            time_scale in 1i64..1_000_000,
            cycles_per_second in 0i64..50_000_000,
        ) {
            let mut scheduler = CycleScheduler::new(cycles_per_second);
            let mut t = 0;
            scheduler.on_refresh(event(t, time_scale));
            for step in steps {
                t += step;
                scheduler.on_refresh(event(t, time_scale));
                prop_assert!(scheduler.cycle_count_error >= 0);
                prop_assert!(scheduler.cycle_count_error < time_scale);
            }
        }

        // Ranges are sized so no single request exceeds i32::MAX; the
        // saturating conversion would otherwise mask cycles legitimately.
        #[test]
        fn accounting_is_exact_over_any_sequence(
            steps in proptest::collection::vec(0i64..1_000, 1..100),
            time_scale in 1i64..1_000,
            cycles_per_second in 0i64..1_000_000,
        ) {
            let mut scheduler = CycleScheduler::new(cycles_per_second);
            let first = 7;
            let mut t = first;
            scheduler.on_refresh(event(t, time_scale));

            let mut total: i64 = 0;
            for step in steps {
                t += step;
                total += i64::from(scheduler.on_refresh(event(t, time_scale)).unwrap());
            }

            let expected = i128::from(t - first) * i128::from(cycles_per_second)
                / i128::from(time_scale);
            prop_assert_eq!(i128::from(total), expected);
        }
    }
}
