// sv_lag_restore.rs -- put rewound subjects back once the hit-scan ran
//
// Every attribute is compared against the value the rewind wrote. If the
// simulation changed it in between, the simulation's value is kept.

use lagcomp_common::common::com_dprintf;
use lagcomp_common::q_shared::{vector_add, vector_lerp, vector_subtract, Vec3};

use crate::sv_lag_compensation::{ChangeRecord, LagCompensation};
use crate::sv_lag_history::LagFlags;
use crate::sv_lag_rewind::{displacement_sqr, movement_mask, FRACTION_SCALE};
use crate::sv_lag_world::{LagWorld, SubjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Placed exactly where asked.
    Restored,
    /// Something is in the way; placed short of it.
    Partial,
    /// Already embedded at the live position; left alone.
    Stuck,
}

/// Move a subject to `wanted` without leaving it inside something.
pub fn restore_subject_to(world: &mut dyn LagWorld, id: SubjectId, wanted: &Vec3, debug: bool) -> RestoreOutcome {
    let (mask, group) = movement_mask(id.kind);

    let tr = world.trace_entity(id, wanted, wanted, mask, Some(id), group);
    if !tr.is_stuck() {
        world.set_origin_checked(id, wanted, true);
        return RestoreOutcome::Restored;
    }

    // try to move as far toward wanted as we can
    let live = world.origin(id);
    let tr = world.trace_entity(id, &live, wanted, mask, Some(id), group);
    if tr.startsolid || tr.allsolid {
        if debug {
            com_dprintf(&format!("RestoreSubjectTo() could not restore {}, stuck at its live position\n", id));
        }
        return RestoreOutcome::Stuck;
    }

    let pos = vector_lerp(tr.fraction * FRACTION_SCALE, &live, wanted);
    world.set_origin_checked(id, &pos, true);
    if debug {
        com_dprintf(&format!(
            "RestoreSubjectTo() {} blocked at fraction {:.3}, placed short\n",
            id, tr.fraction
        ));
    }
    RestoreOutcome::Partial
}

impl LagCompensation {
    /// End the pass opened by `start_pass`. Safe to call twice.
    pub fn finish_pass(&mut self, world: &mut dyn LagWorld, requester: SubjectId) {
        if self.config.debug && self.session.requester.is_some_and(|active| active != requester) {
            com_dprintf(&format!(
                "FinishLagCompensation: {} finishing a pass started by {:?}\n",
                requester, self.session.requester
            ));
        }

        // pass is over even if nothing moved
        self.session.requester = None;

        if !self.session.need_to_restore {
            return; // no subjects were changed
        }

        let touched: Vec<SubjectId> = self
            .session
            .touched
            .ids()
            .filter(|&id| self.is_touched(id))
            .collect();

        for id in touched {
            if !world.subject_exists(id) {
                continue;
            }
            let Some(entry) = self.session.records.get(id).copied() else {
                continue;
            };
            self.restore_subject(world, id, &entry);
        }

        self.session.need_to_restore = false;
        self.session.touched.fill_default();
    }

    fn restore_subject(&self, world: &mut dyn LagWorld, id: SubjectId, entry: &ChangeRecord) {
        let restore = &entry.restore;
        let change = &entry.change;
        let debug = self.config.debug;

        if entry.flags.contains(LagFlags::SIZE_CHANGED) {
            let (mins, maxs) = world.bounds(id);
            // see if simulation made any changes, if no, then do the restore, otherwise,
            // leave new values in
            if mins == change.mins && maxs == change.maxs {
                world.set_size(id, &restore.mins, &restore.maxs);
            } else if debug {
                com_dprintf(&format!("Restore: {} size changed during the hit-scan, keeping it\n", id));
            }
        }

        if entry.flags.contains(LagFlags::ANGLES_CHANGED) {
            if world.angles(id) == change.angles {
                world.set_angles(id, &restore.angles);
            } else if debug {
                com_dprintf(&format!("Restore: {} angles changed during the hit-scan, keeping them\n", id));
            }
        }

        if entry.flags.contains(LagFlags::ORIGIN_CHANGED) {
            // keep whatever small movement the simulation added on top of the rewound position
            let delta = vector_subtract(&world.origin(id), &change.origin);
            if displacement_sqr(id.kind, &delta) <= self.teleport_dist_sqr {
                let wanted = vector_add(&restore.origin, &delta);
                restore_subject_to(world, id, &wanted, debug);
            } else if debug {
                com_dprintf(&format!("Restore: {} was moved too far during the hit-scan, leaving it\n", id));
            }
        }

        if entry.flags.contains(LagFlags::ANIMATION_CHANGED) {
            world.set_sequence(id, restore.master_sequence);
            world.set_cycle(id, restore.master_cycle);
            for (index, layer) in restore.active_layers().iter().enumerate() {
                world.set_overlay(id, index, layer);
            }
        }

        if entry.flags.intersects(LagFlags::CHANGE_MASK) {
            world.set_simulation_time(id, restore.simulation_time);
        }
    }
}
