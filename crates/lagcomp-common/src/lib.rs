#![allow(clippy::too_many_arguments, clippy::manual_range_contains)]

pub mod common;
pub mod cvar;
pub mod q_shared;
