//! # Audio Module
//!
//! Per-guild playback for Guild Jukebox.
//!
//! ## Architecture
//!
//! ### [`session`] - Playback Session
//! - FIFO queue whose head is the track playing (or about to)
//! - Idle / playing / paused transitions driven by commands and by
//!   engine and voice-connection signals
//! - Exactly-once teardown on stop or disconnection
//!
//! ### [`registry`] - Session Registry
//! - At most one live session per guild
//! - One signal pump task per session, so a guild's signals are handled
//!   one at a time and in order
//!
//! ### [`backend`] - Capabilities
//! - Traits for the voice transport, the playback engine and the stream
//!   opener, plus the notification sink
//! - [`driver`] implements them on top of songbird and yt-dlp
//!
//! ### [`track`] - Track Descriptor
//! - Immutable resolved track and the queue listing format

pub mod backend;
pub mod driver;
pub mod registry;
pub mod session;
pub mod track;

#[cfg(test)]
pub mod testing;
