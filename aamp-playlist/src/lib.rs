//! Protocol-specific manifest parsing: HLS media/master playlists and
//! DASH MPD documents, both producing the same `PlaylistSnapshot` shape so
//! `MediaTrack` and `StreamAbstraction` don't need to know which family
//! they're indexing. Parse failures are a sum type rather than a panic or
//! unwound exception — see `error::ParseOutcome`.

pub mod dash;
pub mod error;
pub mod hls;

pub use dash::{index_representation, parse_mpd, profiles_from_mpd, Mpd};
pub use error::{ParseErrorKind, ParseOutcome, ParseWarning};
pub use hls::{index_media_playlist, parse_master_playlist, MasterPlaylist};
