//! Shared data model for the AAMP streaming core.
//!
//! This crate has no I/O and no async runtime dependency: it only defines
//! the types that flow between `aamp-buffer`, `aamp-net`, `aamp-drm`,
//! `aamp-playlist`, `aamp-abr`, `aamp-track`, `aamp-stream` and
//! `aamp-player`, plus the error and event taxonomies every one of those
//! crates converts into.

pub mod capability;
pub mod error;
pub mod event;
pub mod fragment;
pub mod media;
pub mod playlist;
pub mod sink;
pub mod state;

pub use capability::{DownloadsGate, ThroughputSample, ThroughputSink};
pub use error::{AampError, AampResult, TuneFailureCode};
pub use event::{AampEvent, EventListener};
pub use fragment::Fragment;
pub use media::{AudioFormat, MediaType, Profile, Variant, VariantType, VideoFormat};
pub use playlist::{
    DeferredLicense, DrmMetadata, DrmMethod, IndexNode, PlaylistSnapshot, PlaylistType,
    TimedMetadataTag,
};
pub use sink::{SendOutcome, StreamSink};
pub use state::PlayerState;
