// sv_lag_record.rs -- per-tick history recording
//
// Runs once per server frame after game think, before any pass of the frame.

use lagcomp_common::cvar::CvarContext;
use lagcomp_common::q_shared::MAX_OVERLAYS;

use crate::sv_lag_compensation::LagCompensation;
use crate::sv_lag_cvars::LagCompConfig;
use crate::sv_lag_history::{LagFlags, LagRecord};
use crate::sv_lag_world::{LagWorld, SubjectId};

/// Sample the live state of one subject.
pub fn capture_record(world: &dyn LagWorld, id: SubjectId) -> LagRecord {
    let mut record = LagRecord::default();
    if world.is_alive(id) {
        record.flags |= LagFlags::ALIVE;
    }
    record.simulation_time = world.simulation_time(id);
    record.angles = world.angles(id);
    record.origin = world.origin(id);
    let (mins, maxs) = world.bounds(id);
    record.mins = mins;
    record.maxs = maxs;

    let layer_count = world.overlay_count(id).min(MAX_OVERLAYS);
    for index in 0..layer_count {
        if let Some(layer) = world.overlay(id, index) {
            record.layers[index] = layer;
        }
    }
    record.layer_count = layer_count;
    record.master_sequence = world.sequence(id);
    record.master_cycle = world.cycle(id);
    record
}

impl LagCompensation {
    /// Append this tick's state to every tracked subject's history.
    pub fn record_tick(&mut self, world: &dyn LagWorld, cvars: &CvarContext) {
        self.config = LagCompConfig::from_cvars(cvars);

        // no history while nothing can be compensated
        if !self.config.enabled || world.max_clients() <= 1 {
            self.clear_history();
            self.session.requester = None;
            return;
        }

        self.teleport_dist_sqr = self.config.teleport_dist_sqr();
        self.sync_slots(world);

        // remove all records before that time
        let dead_time = world.cur_time() - self.config.max_unlag;

        for slot in 0..self.tracks.player_slots() {
            self.record_subject(world, SubjectId::player(slot), dead_time);
        }
        for slot in 0..self.tracks.npc_slots() {
            self.record_subject(world, SubjectId::npc(slot), dead_time);
        }

        // a pass that never finished does not survive the frame
        self.session.requester = None;
    }

    fn record_subject(&mut self, world: &dyn LagWorld, id: SubjectId, dead_time: f32) {
        let Some(track) = self.tracks.get_mut(id) else {
            return;
        };

        if !world.subject_exists(id) {
            track.clear();
            return;
        }

        track.evict_older_than(dead_time);

        // don't add a new entry for the same or an older time
        let simulation_time = world.simulation_time(id);
        if track.head().is_some_and(|head| head.simulation_time >= simulation_time) {
            return;
        }

        track.push_head(capture_record(world, id));
    }
}
