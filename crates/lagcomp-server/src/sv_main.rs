// sv_main.rs -- server frame hooks for lag compensation
//
// The host calls sv_frame_end once per frame after game think, and wraps
// every hit-scan a client triggers in sv_lag_compensated_trace.

use lagcomp_common::common::{com_dprintf, com_printf};
use lagcomp_common::cvar::CvarContext;
use lagcomp_common::q_shared::UserCmd;

use crate::sv_lag_compensation::{LagCompError, LagCompensation};
use crate::sv_lag_cvars::sv_lag_register_cvars;
use crate::sv_lag_world::{Flow, LagWorld, SubjectId};

/// Everything the lag compensation hooks need across frames.
pub struct ServerContext {
    pub cvars: CvarContext,
    pub lag_compensation: LagCompensation,
}

impl Default for ServerContext {
    fn default() -> Self {
        let mut cvars = CvarContext::new();
        sv_lag_register_cvars(&mut cvars);
        Self {
            cvars,
            lag_compensation: LagCompensation::new(),
        }
    }
}

impl ServerContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A new map is loaded; old positions mean nothing there.
pub fn sv_spawn_server(ctx: &mut ServerContext, mapname: &str) {
    ctx.lag_compensation.clear_history();
    com_dprintf(&format!("SpawnServer: {}, lag compensation history cleared\n", mapname));
}

/// End of the server frame, after all entities have thought.
pub fn sv_frame_end(ctx: &mut ServerContext, world: &dyn LagWorld) {
    let changed = ctx.cvars.take_modified("sv_");
    if !changed.is_empty() {
        com_dprintf(&format!("lag compensation settings changed: {}\n", changed.join(", ")));
    }
    ctx.lag_compensation.record_tick(world, &ctx.cvars);
}

/// Console command: print the lag compensation cvars and history sizes.
/// Returns the number of subjects with history.
pub fn sv_unlag_status_f(ctx: &ServerContext, world: &dyn LagWorld) -> usize {
    ctx.cvars.list("sv_");

    let lc = &ctx.lag_compensation;
    let mut tracked = 0;
    let mut records = 0;
    for id in lc.tracks.ids() {
        let Some(track) = lc.track(id).filter(|t| !t.is_empty()) else {
            continue;
        };
        tracked += 1;
        records += track.len();
        let Some((newest, oldest)) = track.head().zip(track.tail()) else {
            continue;
        };
        let mut line = format!(
            "{:>10} {:4} records  {:.3} .. {:.3}",
            id.to_string(),
            track.len(),
            oldest.simulation_time,
            newest.simulation_time
        );
        if id.is_player() && world.subject_exists(id) {
            line += &format!(
                "  out {:.0} ms  in {:.0} ms",
                world.latency(id, Flow::Outgoing) * 1000.0,
                world.latency(id, Flow::Incoming) * 1000.0
            );
        }
        com_printf(&format!("{}\n", line));
    }
    com_printf(&format!("{} subjects tracked, {} records\n", tracked, records));
    if let Some(requester) = lc.current_requester() {
        com_printf(&format!("pass in progress for {}\n", requester));
    }
    tracked
}

/// Run `hitscan` with every other subject where `requester` saw it, then put
/// the world back. When no pass can be opened the hit-scan runs against the
/// live world.
pub fn sv_lag_compensated_trace<R>(
    ctx: &mut ServerContext,
    world: &mut dyn LagWorld,
    requester: SubjectId,
    cmd: &UserCmd,
    hitscan: impl FnOnce(&mut dyn LagWorld) -> R,
) -> R {
    match ctx.lag_compensation.start_pass(world, &ctx.cvars, requester, cmd) {
        Ok(()) => {
            let result = hitscan(&mut *world);
            ctx.lag_compensation.finish_pass(world, requester);
            result
        }
        // the active pass belongs to someone else, don't finish it for them
        Err(LagCompError::PassInProgress { .. }) => hitscan(world),
        Err(err @ LagCompError::UnknownSubject(_)) => {
            com_printf(&format!("sv_lag_compensated_trace: {}\n", err));
            hitscan(world)
        }
    }
}
