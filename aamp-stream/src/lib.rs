//! §4.7 StreamAbstraction: the HLS/DASH coordinator that turns a
//! manifest URL into a running set of `MediaTrack`s, keeps them synced
//! with live manifest refreshes, and drives ABR profile switching.

pub mod coordinator;
pub mod format;
pub mod ramp;
pub mod sync;

pub use coordinator::{StreamAbstraction, StreamCapabilities};
pub use format::{sniff_format, ManifestFormat};
pub use ramp::RampDownHandle;
pub use sync::sync_audio_play_target;
