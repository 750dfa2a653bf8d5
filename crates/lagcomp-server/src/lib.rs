#![allow(clippy::too_many_arguments, clippy::float_cmp, clippy::manual_range_contains,
         clippy::new_without_default, clippy::needless_range_loop)]

// Server-side lag compensation: history recording, rewind and restore.

pub mod sv_lag_world;
pub mod sv_lag_history;
pub mod sv_lag_cvars;
pub mod sv_lag_compensation;
pub mod sv_lag_target;
pub mod sv_lag_record;
pub mod sv_lag_rewind;
pub mod sv_lag_restore;
pub mod sv_main;

#[cfg(test)]
mod sv_testworld;

pub use sv_lag_compensation::{ChangeRecord, LagCompError, LagCompensation};
pub use sv_lag_cvars::{sv_lag_register_cvars, LagCompConfig};
pub use sv_lag_history::{LagFlags, LagRecord, LagTrack, LayerRecord};
pub use sv_lag_restore::{restore_subject_to, RestoreOutcome};
pub use sv_lag_world::{CollisionGroup, Flow, LagTrace, LagWorld, SubjectId, SubjectKind};
pub use sv_main::{sv_frame_end, sv_lag_compensated_trace, sv_spawn_server, sv_unlag_status_f, ServerContext};
