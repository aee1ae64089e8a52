use super::*;
use crate::hal::{CompareChannel, EventTimer, OutputDriver};
use std::vec::Vec;

struct MockTimer {
    count: u16,
    compares: Vec<(CompareChannel, u16)>,
}

impl MockTimer {
    fn new() -> Self {
        Self {
            count: 0,
            compares: Vec::new(),
        }
    }

    fn last_compare(&self) -> (CompareChannel, u16) {
        *self.compares.last().unwrap()
    }
}

impl EventTimer for MockTimer {
    fn count(&self) -> u16 {
        self.count
    }
    fn set_compare(&mut self, channel: CompareChannel, value: u16) {
        self.compares.push((channel, value));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    InjOpen(u8),
    InjClose(u8),
    CoilOn(u8),
    CoilOff(u8),
}

struct MockOutputs {
    ops: Vec<Op>,
}

impl MockOutputs {
    fn new() -> Self {
        Self { ops: Vec::new() }
    }
}

impl OutputDriver for MockOutputs {
    fn injector_open(&mut self, idx: u8) {
        self.ops.push(Op::InjOpen(idx));
    }
    fn injector_close(&mut self, idx: u8) {
        self.ops.push(Op::InjClose(idx));
    }
    fn coil_begin_charge(&mut self, idx: u8) {
        self.ops.push(Op::CoilOn(idx));
    }
    fn coil_end_charge(&mut self, idx: u8) {
        self.ops.push(Op::CoilOff(idx));
    }
}

#[test]
fn injector_opens_and_closes_on_time() {
    let mut sched = Schedules::new();
    let mut out = MockOutputs::new();

    sched.schedule_injection(0, 1_000, 27_000, 4_000, &mut out);
    assert!(sched.injectors[0].scheduled);

    sched.poll_injectors(27_999, &mut out);
    assert!(out.ops.is_empty());

    sched.poll_injectors(28_000, &mut out);
    assert_eq!(out.ops, [Op::InjOpen(0)]);
    assert!(sched.injectors[0].open);

    sched.poll_injectors(31_999, &mut out);
    assert_eq!(out.ops.len(), 1);

    sched.poll_injectors(32_000, &mut out);
    assert_eq!(out.ops, [Op::InjOpen(0), Op::InjClose(0)]);
    assert!(!sched.injectors[0].scheduled);
    assert!(!sched.injectors[0].open);
}

#[test]
fn injector_reschedule_while_open_closes_first() {
    let mut sched = Schedules::new();
    let mut out = MockOutputs::new();

    sched.schedule_injection(0, 0, 100, 5_000, &mut out);
    sched.poll_injectors(100, &mut out);
    assert_eq!(out.ops, [Op::InjOpen(0)]);

    // New revolution arrives before the pulse finished.
    sched.schedule_injection(0, 2_000, 100, 5_000, &mut out);
    assert_eq!(out.ops, [Op::InjOpen(0), Op::InjClose(0)]);
    assert!(sched.injectors[0].scheduled);
    assert!(!sched.injectors[0].open);
    assert_eq!(sched.injectors[0].open_time_us, 2_100);
}

#[test]
fn late_injector_opening_still_runs_full_pulse() {
    let mut sched = Schedules::new();
    let mut out = MockOutputs::new();

    sched.schedule_injection(1, 0, 100, 3_000, &mut out);
    // The poller first looks long after the opening moment.
    sched.poll_injectors(2_000, &mut out);
    assert_eq!(out.ops, [Op::InjOpen(1)]);
    // Close deadline is still open_time + pw.
    sched.poll_injectors(3_099, &mut out);
    assert_eq!(out.ops.len(), 1);
    sched.poll_injectors(3_100, &mut out);
    assert_eq!(out.ops, [Op::InjOpen(1), Op::InjClose(1)]);
}

#[test]
fn coil_schedule_computes_dwell_window() {
    let mut sched = Schedules::new();
    let mut out = MockOutputs::new();
    let mut timer = MockTimer::new();
    timer.count = 100;

    // 36 ms revolution, 15 deg advance, 3 ms dwell:
    // spark at 345 deg, dwell 30 deg, start at 315 deg = 31 500 us.
    assert!(sched.schedule_ignition(0, 36_000, 15, 3_000, &mut timer, &mut out));
    let coil = &sched.coils[0];
    assert_eq!(coil.status, ScheduleStatus::Pending);
    let expected_start = 100 + us_to_ticks(31_500);
    assert_eq!(coil.start_compare, expected_start);
    assert_eq!(coil.duration, us_to_ticks(3_000));
    assert_eq!(timer.last_compare(), (CompareChannel::A, expected_start));
}

#[test]
fn coil_channel_b_serves_index_one() {
    let mut sched = Schedules::new();
    let mut out = MockOutputs::new();
    let mut timer = MockTimer::new();

    assert!(sched.schedule_ignition(1, 36_000, 15, 3_000, &mut timer, &mut out));
    assert_eq!(timer.last_compare().0, CompareChannel::B);
}

#[test]
fn dwell_capped_at_half_revolution() {
    let mut sched = Schedules::new();
    let mut out = MockOutputs::new();
    let mut timer = MockTimer::new();

    // 4 ms revolution (15 000 RPM), 3 ms dwell would be 270 deg.
    assert!(sched.schedule_ignition(0, 4_000, 10, 3_000, &mut timer, &mut out));
    // Capped to 180 deg = 2 ms.
    assert_eq!(sched.coils[0].duration, us_to_ticks(2_000));
}

#[test]
fn stale_start_is_rejected() {
    let mut sched = Schedules::new();
    let mut out = MockOutputs::new();
    let mut timer = MockTimer::new();

    // Degenerate 50 us period: the dwell start computes to 23 us, under the
    // 25 us stale threshold.
    assert!(!sched.schedule_ignition(0, 50, 10, 1_000, &mut timer, &mut out));
    assert_eq!(sched.coils[0].status, ScheduleStatus::Off);
    assert!(timer.compares.is_empty());
}

#[test]
fn compare_match_walks_pending_running_off() {
    let mut sched = Schedules::new();
    let mut out = MockOutputs::new();
    let mut timer = MockTimer::new();

    assert!(sched.schedule_ignition(0, 36_000, 15, 3_000, &mut timer, &mut out));
    let end = sched.coils[0].end_compare;

    // First match: begin charging, retarget the compare to the spark.
    let sparks = sched.on_compare_match(CompareChannel::A, &mut timer, &mut out);
    assert_eq!(sparks, 0);
    assert_eq!(sched.coils[0].status, ScheduleStatus::Running);
    assert_eq!(out.ops, [Op::CoilOn(0)]);
    assert_eq!(timer.last_compare(), (CompareChannel::A, end));

    // Second match: spark.
    let sparks = sched.on_compare_match(CompareChannel::A, &mut timer, &mut out);
    assert_eq!(sparks, 1);
    assert_eq!(sched.coils[0].status, ScheduleStatus::Off);
    assert_eq!(out.ops, [Op::CoilOn(0), Op::CoilOff(0)]);
}

#[test]
fn secondary_coil_chains_on_shared_channel() {
    let mut sched = Schedules::new();
    let mut out = MockOutputs::new();
    let mut timer = MockTimer::new();

    assert!(sched.schedule_ignition(0, 36_000, 15, 3_000, &mut timer, &mut out));
    let armed_for_primary = timer.last_compare();
    // Coil 2 starts later (less advance, short dwell). While coil 0 owns
    // channel A the compare register must not be touched.
    assert!(sched.schedule_ignition(2, 36_000, 0, 1_000, &mut timer, &mut out));
    assert_eq!(timer.last_compare(), armed_for_primary);

    // Coil 0 charges, then sparks; the pending coil 2 takes over channel A.
    sched.on_compare_match(CompareChannel::A, &mut timer, &mut out);
    timer.count = sched.coils[0].end_compare;
    let sparks = sched.on_compare_match(CompareChannel::A, &mut timer, &mut out);
    assert_eq!(sparks, 1);
    assert_eq!(
        timer.last_compare(),
        (CompareChannel::A, sched.coils[2].start_compare)
    );

    // Channel fires for coil 2's own window.
    sched.on_compare_match(CompareChannel::A, &mut timer, &mut out);
    assert_eq!(sched.coils[2].status, ScheduleStatus::Running);
    let sparks = sched.on_compare_match(CompareChannel::A, &mut timer, &mut out);
    assert_eq!(sparks, 1);
    assert_eq!(sched.coils[2].status, ScheduleStatus::Off);
}

#[test]
fn stale_secondary_fires_immediately() {
    let mut sched = Schedules::new();
    let mut out = MockOutputs::new();
    let mut timer = MockTimer::new();

    assert!(sched.schedule_ignition(0, 36_000, 15, 3_000, &mut timer, &mut out));
    assert!(sched.schedule_ignition(2, 36_000, 0, 1_000, &mut timer, &mut out));

    sched.on_compare_match(CompareChannel::A, &mut timer, &mut out);
    // By the time the spark lands, coil 2's start already passed.
    timer.count = sched.coils[2].start_compare.wrapping_add(10);
    sched.on_compare_match(CompareChannel::A, &mut timer, &mut out);
    assert_eq!(sched.coils[2].status, ScheduleStatus::Running);
    assert!(out.ops.contains(&Op::CoilOn(2)));
}

#[test]
fn protection_cut_clears_everything() {
    use crate::types::cut;
    let mut sched = Schedules::new();
    let mut out = MockOutputs::new();
    let mut timer = MockTimer::new();

    sched.schedule_injection(0, 0, 100, 5_000, &mut out);
    sched.poll_injectors(100, &mut out);
    assert!(sched.injectors[0].open);
    assert!(sched.schedule_ignition(0, 36_000, 15, 3_000, &mut timer, &mut out));
    sched.on_compare_match(CompareChannel::A, &mut timer, &mut out);

    out.ops.clear();
    sched.apply_cut(cut::FUEL | cut::SPARK, &mut out);
    assert!(out.ops.contains(&Op::InjClose(0)));
    assert!(out.ops.contains(&Op::CoilOff(0)));
    assert_eq!(sched.coils[0].status, ScheduleStatus::Off);
    assert!(!sched.injectors[0].scheduled);
}

#[test]
fn fuel_only_cut_leaves_spark_alone() {
    use crate::types::cut;
    let mut sched = Schedules::new();
    let mut out = MockOutputs::new();
    let mut timer = MockTimer::new();

    sched.schedule_injection(0, 0, 100, 5_000, &mut out);
    assert!(sched.schedule_ignition(0, 36_000, 15, 3_000, &mut timer, &mut out));

    sched.apply_cut(cut::FUEL, &mut out);
    assert_eq!(sched.coils[0].status, ScheduleStatus::Pending);
    assert!(!sched.injectors[0].scheduled);
}
