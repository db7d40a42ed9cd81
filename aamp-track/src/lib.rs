//! §4.4 MediaTrack: per-elementary-stream fetch/inject loops, buffer
//! health monitoring and cross-track injection pacing. Depends on
//! `aamp-buffer` for the producer/consumer ring, `aamp-net` for
//! transport, `aamp-drm` for decrypt, and `aamp-playlist` only for the
//! `PlaylistSnapshot`/`IndexNode` shape it scans.

pub mod health;
pub mod pacer;
pub mod track;

pub use health::{classify, BufferHealth};
pub use pacer::TrackPacer;
pub use track::{AdvanceMode, MediaTrack, RampDownRequester, TrackCapabilities};
