//! §4.8 PlayerCore: the top-level state machine a host embeds to drive
//! one playback session — tune, retune, seek, rate changes and
//! progress reporting — on top of the lower `aamp-stream` coordinator.

pub mod player;
pub mod rate;
pub mod retune;
pub mod url_rewrite;

pub use player::PlayerCore;
pub use rate::{frame_step_delta_sec, trick_step_for_elapsed, TrickStep};
pub use retune::RetuneScheduler;
pub use url_rewrite::normalize_manifest_url;
