// sv_lag_world.rs -- what lag compensation needs from the rest of the server
//
// The entity system, collision, animation and network channel are owned by
// the game. Lag compensation only reaches them through `LagWorld`.

use lagcomp_common::q_shared::{UserCmd, Vec3};

use crate::sv_lag_history::LayerRecord;

// ============================================================
// Subject identity
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectKind {
    Player,
    /// Non-player AI, only tracked when `sv_unlag_npcs` is set.
    Npc,
}

/// Stable slot handle. Entities can be destroyed and recreated in the same
/// slot; history is keyed by slot, never by entity pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubjectId {
    pub kind: SubjectKind,
    pub slot: usize,
}

impl SubjectId {
    pub const fn player(slot: usize) -> Self {
        Self { kind: SubjectKind::Player, slot }
    }

    pub const fn npc(slot: usize) -> Self {
        Self { kind: SubjectKind::Npc, slot }
    }

    pub fn is_player(&self) -> bool {
        self.kind == SubjectKind::Player
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            SubjectKind::Player => write!(f, "player {}", self.slot),
            SubjectKind::Npc => write!(f, "npc {}", self.slot),
        }
    }
}

/// Direction of a network channel latency measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionGroup {
    PlayerMovement,
    NpcMovement,
}

// ============================================================
// Trace
// ============================================================

/// Result of sweeping a subject's bounding box through the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LagTrace {
    pub allsolid: bool,
    pub startsolid: bool,
    pub fraction: f32,
    /// Subject that stopped the sweep, if it was another tracked entity.
    pub hit: Option<SubjectId>,
}

impl Default for LagTrace {
    fn default() -> Self {
        Self {
            allsolid: false,
            startsolid: false,
            fraction: 1.0,
            hit: None,
        }
    }
}

impl LagTrace {
    pub fn is_stuck(&self) -> bool {
        self.startsolid || self.allsolid
    }
}

// ============================================================
// LagWorld
// ============================================================

/// Server services consumed by lag compensation.
///
/// Accessors on a slot whose entity does not exist are allowed to return
/// defaults; callers check `subject_exists` first.
pub trait LagWorld {
    // ---- Clock ----
    fn tick_count(&self) -> i32;
    /// Current simulation time in seconds.
    fn cur_time(&self) -> f32;
    fn tick_interval(&self) -> f32;

    // ---- Slots ----
    fn max_clients(&self) -> usize;
    fn max_npcs(&self) -> usize {
        0
    }
    fn subject_exists(&self, id: SubjectId) -> bool;

    // ---- Flags ----
    fn is_alive(&self, id: SubjectId) -> bool;
    fn is_bot(&self, id: SubjectId) -> bool;
    fn is_observer(&self, id: SubjectId) -> bool;
    /// Client-side opt-in for being compensated as a shooter.
    fn wants_lag_compensation(&self, _requester: SubjectId) -> bool {
        true
    }
    /// Game rule deciding whether `candidate` is rewound for this shot
    /// (team, visibility set, range...).
    fn wants_compensation_on(&self, requester: SubjectId, candidate: SubjectId, cmd: &UserCmd) -> bool;

    // ---- Transform ----
    fn origin(&self, id: SubjectId) -> Vec3;
    /// Raw origin write; no relink or stuck check.
    fn set_origin(&mut self, id: SubjectId, origin: &Vec3);
    /// Teleport-safe reposition with relink (`check_stuck` asks the physics to settle).
    fn set_origin_checked(&mut self, id: SubjectId, origin: &Vec3, check_stuck: bool);
    fn angles(&self, id: SubjectId) -> Vec3;
    fn set_angles(&mut self, id: SubjectId, angles: &Vec3);
    /// Pre-scale bounding box, local space.
    fn bounds(&self, id: SubjectId) -> (Vec3, Vec3);
    fn set_size(&mut self, id: SubjectId, mins: &Vec3, maxs: &Vec3);
    fn simulation_time(&self, id: SubjectId) -> f32;
    fn set_simulation_time(&mut self, id: SubjectId, time: f32);

    // ---- Animation ----
    fn sequence(&self, id: SubjectId) -> i32;
    fn set_sequence(&mut self, id: SubjectId, sequence: i32);
    fn cycle(&self, id: SubjectId) -> f32;
    fn set_cycle(&mut self, id: SubjectId, cycle: f32);
    fn overlay_count(&self, id: SubjectId) -> usize;
    fn overlay(&self, id: SubjectId, index: usize) -> Option<LayerRecord>;
    fn set_overlay(&mut self, id: SubjectId, index: usize, layer: &LayerRecord);
    fn invalidate_bone_cache(&mut self, _id: SubjectId) {}
    /// Debug overlay of the rewound hitboxes.
    fn draw_server_hitboxes(&mut self, _id: SubjectId, _duration: f32) {}

    // ---- Network ----
    fn latency(&self, id: SubjectId, flow: Flow) -> f32;
    /// Client view interpolation amount in seconds.
    fn interp_amount(&self, id: SubjectId) -> f32;

    // ---- Collision ----
    fn trace_entity(
        &self,
        id: SubjectId,
        start: &Vec3,
        end: &Vec3,
        mask: i32,
        ignore: Option<SubjectId>,
        group: CollisionGroup,
    ) -> LagTrace;
}
