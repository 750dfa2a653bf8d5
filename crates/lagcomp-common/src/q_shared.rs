// q_shared.rs -- foundational types and math shared by the lag compensation crates

// ============================================================
// Basic types
// ============================================================

pub type Vec3 = [f32; 3];

// angle indexes
pub const PITCH: usize = 0; // up / down
pub const YAW: usize = 1; // left / right
pub const ROLL: usize = 2; // fall over

// ============================================================
// Limits
// ============================================================

pub const MAX_CLIENTS: usize = 256;

/// Maximum number of animation overlay layers an entity can carry.
pub const MAX_OVERLAYS: usize = 15;

// ============================================================
// Contents and masks
// ============================================================

pub const CONTENTS_SOLID: i32 = 1;
pub const CONTENTS_WINDOW: i32 = 2;
pub const CONTENTS_PLAYERCLIP: i32 = 0x10000;
pub const CONTENTS_MONSTERCLIP: i32 = 0x20000;
pub const CONTENTS_MONSTER: i32 = 0x2000000;

pub const MASK_PLAYERSOLID: i32 =
    CONTENTS_SOLID | CONTENTS_PLAYERCLIP | CONTENTS_WINDOW | CONTENTS_MONSTER;
pub const MASK_MONSTERSOLID: i32 =
    CONTENTS_SOLID | CONTENTS_MONSTERCLIP | CONTENTS_WINDOW | CONTENTS_MONSTER;

// ============================================================
// Cvar flags
// ============================================================

pub const CVAR_ZERO: i32 = 0;
pub const CVAR_SERVERINFO: i32 = 4; // added to serverinfo when changed
pub const CVAR_NOSET: i32 = 8; // don't allow change from console at all
pub const CVAR_CHEAT: i32 = 32; // only changeable with cheats enabled

// ============================================================
// Usercmd
// ============================================================

/// One client input command as seen by the server.
///
/// `tick_count` is the server tick the client claims it was rendering when the
/// command was generated; lag compensation prefers it over measured latency.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UserCmd {
    pub command_number: i32,
    pub tick_count: i32,
    pub msec: u8,
    pub buttons: u8,
    pub angles: Vec3,
    pub forwardmove: i16,
    pub sidemove: i16,
    pub upmove: i16,
}

// ============================================================
// Tick / time conversion
// ============================================================

/// Round a duration in seconds to the nearest whole number of ticks.
#[inline]
pub fn time_to_ticks(seconds: f32, tick_interval: f32) -> i32 {
    (0.5 + seconds / tick_interval).floor() as i32
}

#[inline]
pub fn ticks_to_time(ticks: i32, tick_interval: f32) -> f32 {
    tick_interval * ticks as f32
}

// ============================================================
// MATHLIB -- Vector operations
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn vector_add(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn vector_length_sqr(v: &Vec3) -> f32 {
    dot_product(v, v)
}

/// Squared length on the horizontal plane only (z ignored).
#[inline]
pub fn vector_length_2d_sqr(v: &Vec3) -> f32 {
    v[0] * v[0] + v[1] * v[1]
}

#[inline]
pub fn distance_sqr(a: &Vec3, b: &Vec3) -> f32 {
    vector_length_sqr(&vector_subtract(a, b))
}

#[inline]
pub fn lerp(frac: f32, from: f32, to: f32) -> f32 {
    from + frac * (to - from)
}

/// Component-wise linear blend: `from` at frac 0, `to` at frac 1.
pub fn vector_lerp(frac: f32, from: &Vec3, to: &Vec3) -> Vec3 {
    [
        lerp(frac, from[0], to[0]),
        lerp(frac, from[1], to[1]),
        lerp(frac, from[2], to[2]),
    ]
}

/// Blend between two angles in degrees along the short way around.
pub fn lerp_angle(a2: f32, a1_in: f32, frac: f32) -> f32 {
    let mut a1 = a1_in;
    if a1 - a2 > 180.0 {
        a1 -= 360.0;
    }
    if a1 - a2 < -180.0 {
        a1 += 360.0;
    }
    a2 + frac * (a1 - a2)
}

pub fn lerp_angles(frac: f32, from: &Vec3, to: &Vec3) -> Vec3 {
    [
        lerp_angle(from[PITCH], to[PITCH], frac),
        lerp_angle(from[YAW], to[YAW], frac),
        lerp_angle(from[ROLL], to[ROLL], frac),
    ]
}

/// Signed per-axis difference between two angle triples, each folded into [-180, 180).
pub fn angle_delta(a: &Vec3, b: &Vec3) -> Vec3 {
    let mut out = vector_subtract(a, b);
    for d in out.iter_mut() {
        *d = (*d + 180.0).rem_euclid(360.0) - 180.0;
    }
    out
}

/// Fold a playback cycle back into [0, 1).
#[inline]
pub fn wrap_cycle(cycle: f32) -> f32 {
    let wrapped = cycle.rem_euclid(1.0);
    if wrapped >= 1.0 {
        0.0
    } else {
        wrapped
    }
}

// ============================================================
// Tests
// ============================================================
