//! # Audio Module
//!
//! Multi-guild playback core.
//!
//! ## Architecture
//!
//! ### [`player`] - Facade
//! - Entry point for the command layer, keyed by guild
//! - Joins the uploaded-file catalogue with the sessions (play by number, replay)
//!
//! ### [`registry`] - Session registry
//! - Concurrent map from guild to its [`session::Session`], created lazily
//!
//! ### [`session`] - State machine
//! - `Idle → Resolving → Playing ⇄ Paused`, serialized per guild on its own task
//! - Auto-advance on completion, cleanup of transient downloads
//!
//! ### [`queue`] - Queue Management
//! - FIFO with insert-at-front, shuffle, removal and paging
//!
//! ### [`progress`] - Progress reporter
//! - Cancellable ticker publishing elapsed time for the active track
//!
//! ### [`transport`] - Voice transport
//! - Contract the session drives, implemented over songbird

pub mod player;
pub mod progress;
pub mod queue;
pub mod registry;
pub mod session;
pub mod transport;
