// sv_lag_rewind.rs -- move one subject back to the pass target time
//
// Walk the track newest to oldest for the records bracketing the target,
// blend them, optionally keep the result out of solids, then write it into
// the live entity while remembering what was there.

use lagcomp_common::common::com_dprintf;
use lagcomp_common::q_shared::{
    angle_delta, distance_sqr, lerp, lerp_angles, vector_lerp, vector_length_2d_sqr, vector_length_sqr,
    vector_subtract, wrap_cycle, Vec3, MASK_MONSTERSOLID, MASK_PLAYERSOLID, MAX_OVERLAYS,
};

use crate::sv_lag_compensation::LagCompensation;
use crate::sv_lag_history::{LagFlags, LagRecord, LagTrack, LayerRecord};
use crate::sv_lag_world::{CollisionGroup, LagWorld, SubjectId, SubjectKind};

/// Angles closer than this are left alone.
pub const LAG_COMPENSATION_EPS_SQR: f32 = 0.1 * 0.1;
/// Origins and box extents closer than this are left alone.
pub const LAG_COMPENSATION_ERROR_EPS_SQR: f32 = 4.0 * 4.0;
/// Stop short of the traced fraction so we don't end up touching the blocker.
pub const FRACTION_SCALE: f32 = 0.95;
/// Backstop for blocker recursion; the touched set should already stop cycles.
pub const MAX_REWIND_DEPTH: usize = 4;
/// Seconds the sv_showlagcompensation hitboxes stay up.
pub const HITBOX_DRAW_DURATION: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LostTrack {
    /// The subject was dead at some point between now and the target.
    NotAlive,
    /// Two consecutive positions are further apart than the teleport distance.
    Teleported,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bracket {
    Empty,
    Lost(LostTrack),
    Found {
        /// At or before the target time, or the oldest record.
        record: LagRecord,
        /// The next newer record, if the walk went past one.
        prev: Option<LagRecord>,
    },
}

/// Player histories ignore vertical motion (jumps, falls); npcs use full 3D.
pub fn displacement_sqr(kind: SubjectKind, delta: &Vec3) -> f32 {
    match kind {
        SubjectKind::Player => vector_length_2d_sqr(delta),
        SubjectKind::Npc => vector_length_sqr(delta),
    }
}

pub fn movement_mask(kind: SubjectKind) -> (i32, CollisionGroup) {
    match kind {
        SubjectKind::Player => (MASK_PLAYERSOLID, CollisionGroup::PlayerMovement),
        SubjectKind::Npc => (MASK_MONSTERSOLID, CollisionGroup::NpcMovement),
    }
}

/// Walk `track` from the live position back until a record at or before
/// `target_time`. Any dead record or teleport-sized jump on the way loses the track.
pub fn find_bracket(
    track: &LagTrack,
    kind: SubjectKind,
    live_origin: &Vec3,
    target_time: f32,
    teleport_dist_sqr: f32,
) -> Bracket {
    let mut prev_org = *live_origin;
    let mut prev: Option<&LagRecord> = None;
    let mut record: Option<&LagRecord> = None;

    for current in track.iter() {
        prev = record;
        record = Some(current);

        if !current.is_alive() {
            return Bracket::Lost(LostTrack::NotAlive);
        }

        let delta = vector_subtract(&current.origin, &prev_org);
        if displacement_sqr(kind, &delta) > teleport_dist_sqr {
            return Bracket::Lost(LostTrack::Teleported);
        }

        if current.simulation_time <= target_time {
            break;
        }

        prev_org = current.origin;
    }

    match record {
        Some(record) => Bracket::Found {
            record: *record,
            prev: prev.copied(),
        },
        None => Bracket::Empty,
    }
}

/// Blend factor from `older_time` toward `newer_time`. Only defined strictly
/// between the two, so the result is always in (0, 1); we never extrapolate.
pub fn interpolation_fraction(older_time: f32, newer_time: f32, target_time: f32) -> Option<f32> {
    if older_time < target_time && target_time < newer_time {
        Some((target_time - older_time) / (newer_time - older_time))
    } else {
        None
    }
}

/// Cycles run 0..1 and wrap. An older cycle above the newer one means the
/// animation looped in between, so blend toward newer + 1 and fold back.
pub fn lerp_cycle(frac: f32, older: f32, newer: f32) -> f32 {
    if older > newer {
        wrap_cycle(lerp(frac, older, newer + 1.0))
    } else {
        lerp(frac, older, newer)
    }
}

/// Transform a subject is moved to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewindPose {
    pub origin: Vec3,
    pub angles: Vec3,
    pub mins: Vec3,
    pub maxs: Vec3,
    /// 0 when a single record was used verbatim.
    pub frac: f32,
}

impl RewindPose {
    pub fn blend(record: &LagRecord, prev: Option<&LagRecord>, target_time: f32) -> Self {
        let frac = prev.and_then(|prev| {
            interpolation_fraction(record.simulation_time, prev.simulation_time, target_time)
                .map(|frac| (prev, frac))
        });

        match frac {
            Some((prev, frac)) => Self {
                origin: vector_lerp(frac, &record.origin, &prev.origin),
                angles: lerp_angles(frac, &record.angles, &prev.angles),
                mins: vector_lerp(frac, &record.mins, &prev.mins),
                maxs: vector_lerp(frac, &record.maxs, &prev.maxs),
                frac,
            },
            // exact record, or nothing to interpolate with
            None => Self {
                origin: record.origin,
                angles: record.angles,
                mins: record.mins,
                maxs: record.maxs,
                frac: 0.0,
            },
        }
    }
}

impl LagCompensation {
    /// Move one subject to `target_time`. Silently does nothing when the
    /// history cannot be trusted; the live position is always a valid fallback.
    pub(crate) fn backtrack_subject(&mut self, world: &mut dyn LagWorld, id: SubjectId, target_time: f32, depth: usize) {
        let Some(track) = self.tracks.get(id) else {
            return;
        };
        if track.is_empty() {
            return;
        }

        let live_origin = world.origin(id);
        let (record, prev) = match find_bracket(track, id.kind, &live_origin, target_time, self.teleport_dist_sqr) {
            Bracket::Found { record, prev } => (record, prev),
            Bracket::Lost(reason) => {
                if self.config.debug {
                    com_dprintf(&format!("BacktrackSubject: lost track of {} ({:?})\n", id, reason));
                }
                return;
            }
            Bracket::Empty => {
                if self.config.debug {
                    com_dprintf(&format!("No valid positions in history for BacktrackSubject ( {} )\n", id));
                }
                return;
            }
        };

        let mut pose = RewindPose::blend(&record, prev.as_ref(), target_time);

        self.set_rewinding(id, true);
        if self.config.fix_stuck {
            pose.origin = self.fix_stuck(world, id, &pose.origin, target_time, depth);
        }
        let flags = self.apply_pose(world, id, &pose, &record, prev.as_ref());
        self.set_rewinding(id, false);

        if flags.is_empty() {
            return; // we didn't change anything
        }

        if self.config.flush_bone_cache {
            world.invalidate_bone_cache(id);
        }

        if let Some(touched) = self.session.touched.get_mut(id) {
            *touched = true;
        }
        self.session.need_to_restore = true;

        if self.config.show_compensation == 1 {
            world.draw_server_hitboxes(id, HITBOX_DRAW_DURATION);
        }
    }

    fn set_rewinding(&mut self, id: SubjectId, on: bool) {
        if let Some(flag) = self.session.rewinding.get_mut(id) {
            *flag = on;
        }
    }

    fn is_rewinding(&self, id: SubjectId) -> bool {
        self.session.rewinding.get(id).copied().unwrap_or(false)
    }

    /// Can the subject blocking a rewind be rewound out of the way first.
    fn can_push_blocker(&self, blocker: SubjectId, depth: usize) -> bool {
        depth < MAX_REWIND_DEPTH
            && self.session.requester != Some(blocker)
            && self.tracks.get(blocker).is_some_and(|track| !track.is_empty())
            && !self.is_touched(blocker)
            && !self.is_rewinding(blocker)
    }

    /// Keep `wanted` out of solids. Returns where the subject may actually go.
    fn fix_stuck(
        &mut self,
        world: &mut dyn LagWorld,
        id: SubjectId,
        wanted: &Vec3,
        target_time: f32,
        depth: usize,
    ) -> Vec3 {
        let (mask, group) = movement_mask(id.kind);

        let probe = world.trace_entity(id, wanted, wanted, mask, Some(id), group);
        if !probe.is_stuck() {
            return *wanted;
        }

        // find who's blocking
        let live = world.origin(id);
        let mut tr = world.trace_entity(id, &live, wanted, mask, Some(id), group);
        if let Some(blocker) = tr.hit {
            if self.can_push_blocker(blocker, depth) {
                // forced: the blocker's own eligibility does not matter here
                self.backtrack_subject(world, blocker, target_time, depth + 1);
                tr = world.trace_entity(id, &live, wanted, mask, Some(id), group);
            }
        }

        if tr.startsolid {
            if self.config.debug {
                com_dprintf(&format!("BacktrackSubject: {} stuck at its live position, not moving\n", id));
            }
            live
        } else if tr.fraction < 1.0 {
            vector_lerp(tr.fraction * FRACTION_SCALE, &live, wanted)
        } else {
            *wanted
        }
    }

    /// Write `pose` and the record's animation into the live subject, filling
    /// the subject's change record. Returns the changed attribute bits.
    fn apply_pose(
        &mut self,
        world: &mut dyn LagWorld,
        id: SubjectId,
        pose: &RewindPose,
        record: &LagRecord,
        prev: Option<&LagRecord>,
    ) -> LagFlags {
        let Some(entry) = self.session.records.get_mut(id) else {
            return LagFlags::empty();
        };

        let mut flags = LagFlags::empty();

        // always remember the pristine simulation time in case we need to restore it
        entry.restore.simulation_time = world.simulation_time(id);

        let live_angles = world.angles(id);
        if vector_length_sqr(&angle_delta(&live_angles, &pose.angles)) > LAG_COMPENSATION_EPS_SQR {
            flags |= LagFlags::ANGLES_CHANGED;
            entry.restore.angles = live_angles;
            world.set_angles(id, &pose.angles);
            entry.change.angles = pose.angles;
        }

        let (live_mins, live_maxs) = world.bounds(id);
        if distance_sqr(&live_mins, &pose.mins) > LAG_COMPENSATION_ERROR_EPS_SQR
            || distance_sqr(&live_maxs, &pose.maxs) > LAG_COMPENSATION_ERROR_EPS_SQR
        {
            flags |= LagFlags::SIZE_CHANGED;
            entry.restore.mins = live_mins;
            entry.restore.maxs = live_maxs;
            world.set_size(id, &pose.mins, &pose.maxs);
            entry.change.mins = pose.mins;
            entry.change.maxs = pose.maxs;
        }

        // origin last, it relinks the entity
        let live_origin = world.origin(id);
        if distance_sqr(&live_origin, &pose.origin) > LAG_COMPENSATION_ERROR_EPS_SQR {
            flags |= LagFlags::ORIGIN_CHANGED;
            entry.restore.origin = live_origin;
            world.set_origin(id, &pose.origin);
            entry.change.origin = pose.origin;
        }

        // comparing every layer costs more than just restoring them
        flags |= LagFlags::ANIMATION_CHANGED;
        apply_animation(world, id, record, prev, pose.frac, &mut entry.restore);

        entry.flags = flags;
        entry.restore.flags = flags;
        entry.change.flags = flags;
        flags
    }
}

/// Put the bracket's animation on the subject, saving the live values in `restore`.
fn apply_animation(
    world: &mut dyn LagWorld,
    id: SubjectId,
    record: &LagRecord,
    prev: Option<&LagRecord>,
    frac: f32,
    restore: &mut LagRecord,
) {
    restore.master_sequence = world.sequence(id);
    restore.master_cycle = world.cycle(id);

    // can't interpolate across a sequence change
    let blend_with = prev.filter(|prev| frac > 0.0 && prev.master_sequence == record.master_sequence);

    world.set_sequence(id, record.master_sequence);
    match blend_with {
        Some(prev) => world.set_cycle(id, lerp_cycle(frac, record.master_cycle, prev.master_cycle)),
        None => world.set_cycle(id, record.master_cycle),
    }

    let layer_count = world.overlay_count(id).min(MAX_OVERLAYS);
    restore.layer_count = layer_count;
    for index in 0..layer_count {
        let Some(current) = world.overlay(id, index) else {
            continue;
        };
        restore.layers[index] = current;

        // layer did not exist when the record was taken
        if index >= record.layer_count {
            continue;
        }

        let from = record.layers[index];
        let to = blend_with
            .filter(|prev| index < prev.layer_count)
            .map(|prev| prev.layers[index])
            .filter(|to| to.order == from.order && to.sequence == from.sequence);

        let layer = match to {
            Some(to) => LayerRecord {
                sequence: from.sequence,
                order: from.order,
                cycle: lerp_cycle(frac, from.cycle, to.cycle),
                weight: lerp(frac, from.weight, to.weight),
            },
            None => from,
        };
        world.set_overlay(id, index, &layer);
    }
}
