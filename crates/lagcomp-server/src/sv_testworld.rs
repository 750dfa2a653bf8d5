// sv_testworld.rs -- in-memory LagWorld for unit tests
//
// Subjects are axis-aligned boxes; the map is a list of solid boxes.
// Sweeps use the slab test against boxes grown by the mover's extents.

use std::collections::HashSet;

use lagcomp_common::q_shared::{vector_add, vector_subtract, UserCmd, Vec3};

use crate::sv_lag_history::LayerRecord;
use crate::sv_lag_world::{CollisionGroup, Flow, LagTrace, LagWorld, SubjectId, SubjectKind};

pub const PLAYER_MINS: Vec3 = [-16.0, -16.0, 0.0];
pub const PLAYER_MAXS: Vec3 = [16.0, 16.0, 72.0];

#[derive(Clone, Debug)]
pub struct TestSubject {
    pub exists: bool,
    pub alive: bool,
    pub bot: bool,
    pub observer: bool,
    pub wants_lag_compensation: bool,
    pub origin: Vec3,
    pub angles: Vec3,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub simulation_time: f32,
    pub sequence: i32,
    pub cycle: f32,
    pub layers: Vec<LayerRecord>,
    pub latency_out: f32,
    pub latency_in: f32,
    pub interp: f32,
    pub bone_cache_flushes: u32,
    pub hitbox_draws: u32,
    pub checked_moves: u32,
}

impl Default for TestSubject {
    fn default() -> Self {
        Self {
            exists: false,
            alive: true,
            bot: false,
            observer: false,
            wants_lag_compensation: true,
            origin: [0.0; 3],
            angles: [0.0; 3],
            mins: PLAYER_MINS,
            maxs: PLAYER_MAXS,
            simulation_time: 0.0,
            sequence: 0,
            cycle: 0.0,
            layers: Vec::new(),
            latency_out: 0.0,
            latency_in: 0.0,
            interp: 0.0,
            bone_cache_flushes: 0,
            hitbox_draws: 0,
            checked_moves: 0,
        }
    }
}

pub struct TestWorld {
    pub tick: i32,
    pub interval: f32,
    pub players: Vec<TestSubject>,
    pub npcs: Vec<TestSubject>,
    /// World-space solid boxes (mins, maxs).
    pub solids: Vec<(Vec3, Vec3)>,
    /// (requester, candidate) pairs the game rules refuse.
    pub refused: HashSet<(SubjectId, SubjectId)>,
}

impl TestWorld {
    pub fn new(max_clients: usize) -> Self {
        Self {
            tick: 0,
            interval: 0.01,
            players: vec![TestSubject::default(); max_clients],
            npcs: Vec::new(),
            solids: Vec::new(),
            refused: HashSet::new(),
        }
    }

    pub fn spawn_player(&mut self, slot: usize, origin: Vec3) {
        let simulation_time = self.now();
        self.players[slot] = TestSubject {
            exists: true,
            origin,
            simulation_time,
            ..Default::default()
        };
    }

    pub fn spawn_npc(&mut self, slot: usize, origin: Vec3) {
        if self.npcs.len() <= slot {
            self.npcs.resize(slot + 1, TestSubject::default());
        }
        let simulation_time = self.now();
        self.npcs[slot] = TestSubject {
            exists: true,
            origin,
            simulation_time,
            ..Default::default()
        };
    }

    fn now(&self) -> f32 {
        self.tick as f32 * self.interval
    }

    /// Run `ticks` frames; every existing subject simulates on each.
    pub fn advance(&mut self, ticks: i32) {
        self.tick += ticks;
        let now = self.now();
        for subject in self.players.iter_mut().chain(self.npcs.iter_mut()) {
            if subject.exists {
                subject.simulation_time = now;
            }
        }
    }

    pub fn subject(&self, id: SubjectId) -> &TestSubject {
        match id.kind {
            SubjectKind::Player => &self.players[id.slot],
            SubjectKind::Npc => &self.npcs[id.slot],
        }
    }

    pub fn subject_mut(&mut self, id: SubjectId) -> &mut TestSubject {
        match id.kind {
            SubjectKind::Player => &mut self.players[id.slot],
            SubjectKind::Npc => &mut self.npcs[id.slot],
        }
    }

    fn lookup(&self, id: SubjectId) -> Option<&TestSubject> {
        match id.kind {
            SubjectKind::Player => self.players.get(id.slot),
            SubjectKind::Npc => self.npcs.get(id.slot),
        }
        .filter(|s| s.exists)
    }

    /// Every obstacle a mover can hit, as world boxes.
    fn obstacles(&self, mover: SubjectId, ignore: Option<SubjectId>) -> Vec<(Vec3, Vec3, Option<SubjectId>)> {
        let mut out: Vec<(Vec3, Vec3, Option<SubjectId>)> =
            self.solids.iter().map(|(mins, maxs)| (*mins, *maxs, None)).collect();

        let players = (0..self.players.len()).map(SubjectId::player);
        let npcs = (0..self.npcs.len()).map(SubjectId::npc);
        for other in players.chain(npcs) {
            if other == mover || Some(other) == ignore {
                continue;
            }
            if let Some(s) = self.lookup(other).filter(|s| s.alive) {
                out.push((vector_add(&s.origin, &s.mins), vector_add(&s.origin, &s.maxs), Some(other)));
            }
        }
        out
    }
}

fn point_inside(p: &Vec3, mins: &Vec3, maxs: &Vec3) -> bool {
    (0..3).all(|i| p[i] > mins[i] && p[i] < maxs[i])
}

/// Entry fraction of the segment start->end into the box, if it enters within [0, 1].
fn segment_entry(start: &Vec3, end: &Vec3, mins: &Vec3, maxs: &Vec3) -> Option<f32> {
    let dir = vector_subtract(end, start);
    let mut t_min = 0.0f32;
    let mut t_max = 1.0f32;

    for i in 0..3 {
        if dir[i].abs() < 1e-6 {
            // parallel to slab
            if start[i] <= mins[i] || start[i] >= maxs[i] {
                return None;
            }
        } else {
            let inv_d = 1.0 / dir[i];
            let mut t1 = (mins[i] - start[i]) * inv_d;
            let mut t2 = (maxs[i] - start[i]) * inv_d;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min >= t_max {
                return None;
            }
        }
    }

    Some(t_min)
}

impl LagWorld for TestWorld {
    fn tick_count(&self) -> i32 {
        self.tick
    }

    fn cur_time(&self) -> f32 {
        self.now()
    }

    fn tick_interval(&self) -> f32 {
        self.interval
    }

    fn max_clients(&self) -> usize {
        self.players.len()
    }

    fn max_npcs(&self) -> usize {
        self.npcs.len()
    }

    fn subject_exists(&self, id: SubjectId) -> bool {
        self.lookup(id).is_some()
    }

    fn is_alive(&self, id: SubjectId) -> bool {
        self.subject(id).alive
    }

    fn is_bot(&self, id: SubjectId) -> bool {
        self.subject(id).bot
    }

    fn is_observer(&self, id: SubjectId) -> bool {
        self.subject(id).observer
    }

    fn wants_lag_compensation(&self, requester: SubjectId) -> bool {
        self.subject(requester).wants_lag_compensation
    }

    fn wants_compensation_on(&self, requester: SubjectId, candidate: SubjectId, _cmd: &UserCmd) -> bool {
        !self.refused.contains(&(requester, candidate))
    }

    fn origin(&self, id: SubjectId) -> Vec3 {
        self.subject(id).origin
    }

    fn set_origin(&mut self, id: SubjectId, origin: &Vec3) {
        self.subject_mut(id).origin = *origin;
    }

    fn set_origin_checked(&mut self, id: SubjectId, origin: &Vec3, _check_stuck: bool) {
        let subject = self.subject_mut(id);
        subject.origin = *origin;
        subject.checked_moves += 1;
    }

    fn angles(&self, id: SubjectId) -> Vec3 {
        self.subject(id).angles
    }

    fn set_angles(&mut self, id: SubjectId, angles: &Vec3) {
        self.subject_mut(id).angles = *angles;
    }

    fn bounds(&self, id: SubjectId) -> (Vec3, Vec3) {
        let s = self.subject(id);
        (s.mins, s.maxs)
    }

    fn set_size(&mut self, id: SubjectId, mins: &Vec3, maxs: &Vec3) {
        let s = self.subject_mut(id);
        s.mins = *mins;
        s.maxs = *maxs;
    }

    fn simulation_time(&self, id: SubjectId) -> f32 {
        self.subject(id).simulation_time
    }

    fn set_simulation_time(&mut self, id: SubjectId, time: f32) {
        self.subject_mut(id).simulation_time = time;
    }

    fn sequence(&self, id: SubjectId) -> i32 {
        self.subject(id).sequence
    }

    fn set_sequence(&mut self, id: SubjectId, sequence: i32) {
        self.subject_mut(id).sequence = sequence;
    }

    fn cycle(&self, id: SubjectId) -> f32 {
        self.subject(id).cycle
    }

    fn set_cycle(&mut self, id: SubjectId, cycle: f32) {
        self.subject_mut(id).cycle = cycle;
    }

    fn overlay_count(&self, id: SubjectId) -> usize {
        self.subject(id).layers.len()
    }

    fn overlay(&self, id: SubjectId, index: usize) -> Option<LayerRecord> {
        self.subject(id).layers.get(index).copied()
    }

    fn set_overlay(&mut self, id: SubjectId, index: usize, layer: &LayerRecord) {
        if let Some(slot) = self.subject_mut(id).layers.get_mut(index) {
            *slot = *layer;
        }
    }

    fn invalidate_bone_cache(&mut self, id: SubjectId) {
        self.subject_mut(id).bone_cache_flushes += 1;
    }

    fn draw_server_hitboxes(&mut self, id: SubjectId, _duration: f32) {
        self.subject_mut(id).hitbox_draws += 1;
    }

    fn latency(&self, id: SubjectId, flow: Flow) -> f32 {
        match flow {
            Flow::Outgoing => self.subject(id).latency_out,
            Flow::Incoming => self.subject(id).latency_in,
        }
    }

    fn interp_amount(&self, id: SubjectId) -> f32 {
        self.subject(id).interp
    }

    fn trace_entity(
        &self,
        id: SubjectId,
        start: &Vec3,
        end: &Vec3,
        _mask: i32,
        ignore: Option<SubjectId>,
        _group: CollisionGroup,
    ) -> LagTrace {
        let (mins, maxs) = self.bounds(id);
        let mut tr = LagTrace::default();

        for (o_mins, o_maxs, owner) in self.obstacles(id, ignore) {
            // grow the obstacle by the mover's box and sweep a point
            let grown_mins = vector_subtract(&o_mins, &maxs);
            let grown_maxs = vector_subtract(&o_maxs, &mins);

            if point_inside(start, &grown_mins, &grown_maxs) {
                tr.startsolid = true;
                tr.allsolid = point_inside(end, &grown_mins, &grown_maxs);
                tr.fraction = 0.0;
                tr.hit = owner;
                return tr;
            }

            if let Some(entry) = segment_entry(start, end, &grown_mins, &grown_maxs) {
                if entry < tr.fraction {
                    tr.fraction = entry;
                    tr.hit = owner;
                }
            }
        }

        tr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_hits_wall() {
        let mut world = TestWorld::new(2);
        world.spawn_player(0, [0.0, 0.0, 0.0]);
        world.solids.push(([100.0, -500.0, -500.0], [200.0, 500.0, 500.0]));
        let id = SubjectId::player(0);
        let tr = world.trace_entity(id, &[0.0; 3], &[168.0, 0.0, 0.0], 0, Some(id), CollisionGroup::PlayerMovement);
        // box front reaches the wall at x = 84
        assert!(!tr.startsolid);
        assert!((tr.fraction - 0.5).abs() < 1e-4);
        assert_eq!(tr.hit, None);
    }

    #[test]
    fn test_trace_reports_blocking_subject() {
        let mut world = TestWorld::new(2);
        world.spawn_player(0, [0.0, 0.0, 0.0]);
        world.spawn_player(1, [100.0, 0.0, 0.0]);
        let id = SubjectId::player(0);
        let tr = world.trace_entity(id, &[0.0; 3], &[100.0, 0.0, 0.0], 0, Some(id), CollisionGroup::PlayerMovement);
        assert_eq!(tr.hit, Some(SubjectId::player(1)));
        assert!(tr.fraction < 1.0);

        let stuck = world.trace_entity(id, &[90.0, 0.0, 0.0], &[90.0, 0.0, 0.0], 0, Some(id), CollisionGroup::PlayerMovement);
        assert!(stuck.is_stuck());
    }
}
