// sv_lag_cvars.rs -- lag compensation tunables

use lagcomp_common::cvar::{CvarContext, CvarDef};
use lagcomp_common::q_shared::{CVAR_CHEAT, CVAR_SERVERINFO, CVAR_ZERO};

pub const SV_UNLAG: &str = "sv_unlag";
pub const SV_MAXUNLAG: &str = "sv_maxunlag";
pub const SV_LAGCOMPENSATION_TELEPORT_DIST: &str = "sv_lagcompensation_teleport_dist";
pub const SV_UNLAG_FIXSTUCK: &str = "sv_unlag_fixstuck";
pub const SV_LAGFLUSHBONECACHE: &str = "sv_lagflushbonecache";
pub const SV_SHOWLAGCOMPENSATION: &str = "sv_showlagcompensation";
pub const SV_UNLAG_DEBUG: &str = "sv_unlag_debug";
pub const SV_UNLAG_NPCS: &str = "sv_unlag_npcs";

/// Upper bound accepted for sv_maxunlag.
pub const MAX_UNLAG_LIMIT: f32 = 1.0;

pub const LAG_CVARS: &[CvarDef] = &[
    CvarDef {
        name: SV_UNLAG,
        default: "1",
        flags: CVAR_SERVERINFO,
        description: "Enables player lag compensation",
    },
    CvarDef {
        name: SV_MAXUNLAG,
        default: "1.0",
        flags: CVAR_ZERO,
        description: "Maximum lag compensation in seconds",
    },
    CvarDef {
        name: SV_LAGCOMPENSATION_TELEPORT_DIST,
        default: "64",
        flags: CVAR_CHEAT,
        description: "How far a player got moved by game code before we can't lag compensate their position back",
    },
    CvarDef {
        name: SV_UNLAG_FIXSTUCK,
        default: "0",
        flags: CVAR_ZERO,
        description: "Disallow backtracking a player for lag compensation if it will cause them to become stuck",
    },
    CvarDef {
        name: SV_LAGFLUSHBONECACHE,
        default: "1",
        flags: CVAR_ZERO,
        description: "Flushes entity bone cache on lag compensation",
    },
    CvarDef {
        name: SV_SHOWLAGCOMPENSATION,
        default: "0",
        flags: CVAR_CHEAT,
        description: "Show lag compensated hitboxes whenever a player is lag compensated",
    },
    CvarDef {
        name: SV_UNLAG_DEBUG,
        default: "0",
        flags: CVAR_ZERO,
        description: "Print lag compensation diagnostics",
    },
    CvarDef {
        name: SV_UNLAG_NPCS,
        default: "0",
        flags: CVAR_ZERO,
        description: "Also lag compensate non-player AI",
    },
];

pub fn sv_lag_register_cvars(cvars: &mut CvarContext) {
    cvars.register(LAG_CVARS);
}

/// Typed snapshot of the tunables, taken once per tick / pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LagCompConfig {
    pub enabled: bool,
    /// Seconds, within [0, MAX_UNLAG_LIMIT].
    pub max_unlag: f32,
    pub teleport_dist: f32,
    pub fix_stuck: bool,
    pub flush_bone_cache: bool,
    pub show_compensation: i32,
    pub debug: bool,
    pub npcs: bool,
}

impl Default for LagCompConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_unlag: 1.0,
            teleport_dist: 64.0,
            fix_stuck: false,
            flush_bone_cache: true,
            show_compensation: 0,
            debug: false,
            npcs: false,
        }
    }
}

impl LagCompConfig {
    /// Read the current values. Cvars that were never registered keep their defaults.
    pub fn from_cvars(cvars: &CvarContext) -> Self {
        let d = Self::default();
        let flag = |name: &str, fallback: bool| cvars.value_or(name, fallback as i32 as f32) != 0.0;
        // "nan" and "inf" parse as floats; neither is a usable distance or time
        let finite = |name: &str, fallback: f32| {
            let v = cvars.value_or(name, fallback);
            if v.is_finite() { v } else { fallback }
        };

        Self {
            enabled: flag(SV_UNLAG, d.enabled),
            max_unlag: finite(SV_MAXUNLAG, d.max_unlag).clamp(0.0, MAX_UNLAG_LIMIT),
            teleport_dist: finite(SV_LAGCOMPENSATION_TELEPORT_DIST, d.teleport_dist).max(0.0),
            fix_stuck: flag(SV_UNLAG_FIXSTUCK, d.fix_stuck),
            flush_bone_cache: flag(SV_LAGFLUSHBONECACHE, d.flush_bone_cache),
            show_compensation: cvars.value_or(SV_SHOWLAGCOMPENSATION, d.show_compensation as f32) as i32,
            debug: flag(SV_UNLAG_DEBUG, d.debug),
            npcs: flag(SV_UNLAG_NPCS, d.npcs),
        }
    }

    pub fn teleport_dist_sqr(&self) -> f32 {
        self.teleport_dist * self.teleport_dist
    }
}
