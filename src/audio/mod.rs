//! # Audio Module
//!
//! Per-guild music queues and everything that moves a track from "requested"
//! to "heard in the voice channel".
//!
//! ## Architecture
//!
//! ### [`queue`] - Guild Queue Store
//! - One `GuildMusicState` per guild behind its own async mutex
//! - Live queue of track ids plus the append-only history they point into
//! - Cancellable advance and progress timers
//!
//! ### [`player`] - Playback Controller
//! - Starts the front track once it is `READY` and a voice connection exists
//! - Advances when the advance timer fires, on skip and on delete
//! - Publishes [`player::PlaybackEvent`]s for the chat side
//!
//! ### [`fetcher`] - Track Fetcher
//! - Streams the audio of a locator to `<music_dir>/<track id>.<ext>`
//! - Reports completion or failure back to the controller
//!
//! ### [`voice`] - Voice Session Manager
//! - Songbird-backed join, play, stop and leave
//!
//! ## Track lifecycle
//!
//! ```text
//! DOWNLOAD -> READY -> PLAYING -> DONE
//!     |         |         |
//!     v         v         v
//!   ERROR     SKIP      SKIP
//! ```

pub mod fetcher;
pub mod player;
pub mod queue;
pub mod track;
pub mod voice;

#[cfg(test)]
pub mod testing;
