//! Discord embeds for the chat layer.

pub mod embeds;
