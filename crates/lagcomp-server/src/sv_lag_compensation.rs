// sv_lag_compensation.rs -- Server-side lag compensation for fair hit detection
//
// When a lagged client fires, every other subject is moved back to where the
// client saw it, the hit-scan runs, and everything is put back before the next
// subsystem looks at the world.
//
// Per tick:
//   record_tick                       (sv_lag_record)
//   start_pass -> resolve target time (sv_lag_target)
//              -> backtrack subjects  (sv_lag_rewind)
//   <hit-scan>
//   finish_pass                       (sv_lag_restore)

use lagcomp_common::common::com_warning;
use lagcomp_common::cvar::CvarContext;
use lagcomp_common::q_shared::{UserCmd, MAX_CLIENTS};

use crate::sv_lag_cvars::LagCompConfig;
use crate::sv_lag_history::{LagFlags, LagRecord, LagTrack, SlotTable};
use crate::sv_lag_target::resolve_target_time;
use crate::sv_lag_world::{LagWorld, SubjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LagCompError {
    #[error("lag compensation pass already active for {active}, refusing {requested}")]
    PassInProgress {
        active: SubjectId,
        requested: SubjectId,
    },
    #[error("{0} cannot request lag compensation")]
    UnknownSubject(SubjectId),
}

/// What a rewind did to one subject: the pristine values to put back and the
/// values it wrote, so restore can tell whether the simulation touched them since.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChangeRecord {
    pub flags: LagFlags,
    pub restore: LagRecord,
    pub change: LagRecord,
}

/// State of the one in-flight pass.
#[derive(Clone, Debug, Default)]
pub(crate) struct PassSession {
    pub(crate) requester: Option<SubjectId>,
    pub(crate) target_time: f32,
    /// Subjects moved this pass. Doubles as the visited set for stuck recovery.
    pub(crate) touched: SlotTable<bool>,
    /// Subjects whose backtrack is on the stack right now.
    pub(crate) rewinding: SlotTable<bool>,
    pub(crate) records: SlotTable<ChangeRecord>,
    pub(crate) need_to_restore: bool,
}

/// Lag compensation state for the entire server.
pub struct LagCompensation {
    pub(crate) tracks: SlotTable<LagTrack>,
    pub(crate) session: PassSession,
    pub(crate) config: LagCompConfig,
    /// Refreshed from sv_lagcompensation_teleport_dist every record_tick.
    pub(crate) teleport_dist_sqr: f32,
}

impl Default for LagCompensation {
    fn default() -> Self {
        let config = LagCompConfig::default();
        Self {
            tracks: SlotTable::new(),
            session: PassSession::default(),
            teleport_dist_sqr: config.teleport_dist_sqr(),
            config,
        }
    }
}

impl LagCompensation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Config snapshot taken by the last record_tick / start_pass.
    pub fn config(&self) -> &LagCompConfig {
        &self.config
    }

    pub fn teleport_dist_sqr(&self) -> f32 {
        self.teleport_dist_sqr
    }

    /// History of one slot, newest record first.
    pub fn track(&self, id: SubjectId) -> Option<&LagTrack> {
        self.tracks.get(id)
    }

    pub fn is_pass_active(&self) -> bool {
        self.session.requester.is_some()
    }

    pub fn current_requester(&self) -> Option<SubjectId> {
        self.session.requester
    }

    /// Did the current / last pass move anything that still has to be put back.
    pub fn needs_restore(&self) -> bool {
        self.session.need_to_restore
    }

    pub fn target_time(&self) -> f32 {
        self.session.target_time
    }

    pub fn is_touched(&self, id: SubjectId) -> bool {
        self.session.touched.get(id).copied().unwrap_or(false)
    }

    pub fn change_record(&self, id: SubjectId) -> Option<&ChangeRecord> {
        self.session.records.get(id)
    }

    /// Forget every track (map change, compensation disabled).
    pub fn clear_history(&mut self) {
        for track in self.tracks.values_mut() {
            track.clear();
        }
    }

    /// Size the per-slot tables for the world's current slot counts.
    pub(crate) fn sync_slots(&mut self, world: &dyn LagWorld) {
        let players = world.max_clients().min(MAX_CLIENTS);
        let npcs = if self.config.npcs { world.max_npcs() } else { 0 };
        if self.tracks.player_slots() == players && self.tracks.npc_slots() == npcs {
            return;
        }
        self.tracks.resize(players, npcs);
        self.session.touched.resize(players, npcs);
        self.session.rewinding.resize(players, npcs);
        self.session.records.resize(players, npcs);
    }

    /// Begin a pass for `requester`: rewind every eligible subject to the time
    /// the requester saw. Must be paired with `finish_pass` once the hit-scan ran,
    /// also when this returns Ok without rewinding anything.
    pub fn start_pass(
        &mut self,
        world: &mut dyn LagWorld,
        cvars: &CvarContext,
        requester: SubjectId,
        cmd: &UserCmd,
    ) -> Result<(), LagCompError> {
        // a pass in progress here means the caller lost a finish_pass
        if let Some(active) = self.session.requester {
            com_warning(&format!(
                "Trying to start a new lag compensation session while one is already active! ({} active, {} refused)\n",
                active, requester
            ));
            return Err(LagCompError::PassInProgress { active, requested: requester });
        }

        if !requester.is_player()
            || requester.slot >= world.max_clients().min(MAX_CLIENTS)
            || !world.subject_exists(requester)
        {
            return Err(LagCompError::UnknownSubject(requester));
        }

        self.config = LagCompConfig::from_cvars(cvars);
        self.sync_slots(world);

        // Assume no subjects need to be restored
        self.session.touched.fill_default();
        self.session.rewinding.fill_default();
        self.session.need_to_restore = false;
        self.session.requester = Some(requester);

        if !self.config.enabled
            || world.max_clients() <= 1
            || !world.wants_lag_compensation(requester)
            || world.is_bot(requester)
            || world.is_observer(requester)
        {
            return Ok(());
        }

        self.session.records.fill_default();

        let target = resolve_target_time(world, requester, cmd, self.config.max_unlag);
        self.session.target_time = target.time;

        for slot in 0..self.tracks.player_slots() {
            self.offer_candidate(world, requester, SubjectId::player(slot), cmd);
        }
        for slot in 0..self.tracks.npc_slots() {
            self.offer_candidate(world, requester, SubjectId::npc(slot), cmd);
        }

        Ok(())
    }

    fn offer_candidate(&mut self, world: &mut dyn LagWorld, requester: SubjectId, candidate: SubjectId, cmd: &UserCmd) {
        // Don't lag compensate yourself
        if candidate == requester || !world.subject_exists(candidate) {
            return;
        }
        // already moved as somebody's blocker
        if self.is_touched(candidate) {
            return;
        }
        if !world.wants_compensation_on(requester, candidate, cmd) {
            return;
        }
        let target_time = self.session.target_time;
        self.backtrack_subject(world, candidate, target_time, 0);
    }
}
