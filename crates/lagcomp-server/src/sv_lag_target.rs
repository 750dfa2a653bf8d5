// sv_lag_target.rs -- pick the time a pass rewinds to

use lagcomp_common::q_shared::{ticks_to_time, time_to_ticks, UserCmd};

use crate::sv_lag_world::{Flow, LagWorld, SubjectId};

/// Largest disagreement between the command's tick and measured latency we trust.
pub const MAX_TICK_DRIFT_SECONDS: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetTime {
    pub tick: i32,
    /// Simulation time in seconds every subject is rewound to.
    pub time: f32,
    /// Clamped network + interpolation latency.
    pub correction: f32,
    /// The command's tick was rejected and latency used instead.
    pub latency_override: bool,
}

/// The requester's own send tick is preferred; it is replaced by a latency
/// based estimate when the two disagree by more than MAX_TICK_DRIFT_SECONDS,
/// so a desynced or lying client cannot pick an arbitrary rewind.
pub fn resolve_target_time(world: &dyn LagWorld, requester: SubjectId, cmd: &UserCmd, max_unlag: f32) -> TargetTime {
    let interval = world.tick_interval();
    let tick_count = world.tick_count();

    // correct is the amount of time we have to correct game time
    let mut correct = world.latency(requester, Flow::Outgoing);

    // view interpolation latency, whole ticks
    let lerp_ticks = time_to_ticks(world.interp_amount(requester), interval);
    correct += ticks_to_time(lerp_ticks, interval);
    // min/max rather than clamp: a NaN bound must not panic
    correct = correct.max(0.0).min(max_unlag);

    // the command tick is client data, any value can arrive here
    let mut target_tick = cmd.tick_count.saturating_sub(lerp_ticks);

    let behind = i64::from(tick_count) - i64::from(target_tick);
    let delta = correct - (behind as f64 * f64::from(interval)) as f32;
    let latency_override = delta.is_nan() || delta.abs() > MAX_TICK_DRIFT_SECONDS;
    if latency_override {
        target_tick = tick_count - time_to_ticks(correct, interval);
    }

    TargetTime {
        tick: target_tick,
        time: ticks_to_time(target_tick, interval),
        correction: correct,
        latency_override,
    }
}
