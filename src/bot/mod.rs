//! # Bot Module
//!
//! Discord surface of the jukebox: a serenity [`EventHandler`] that turns
//! prefixed text commands into [`AudioPlayer`] calls and renders the results,
//! plus the [`ChatNotifier`] that announces session events (now playing,
//! progress edits, failures) in the guild's text channel.
//!
//! The bot layer owns per-request parsing ("is this a number?"); everything
//! stateful lives in the audio core.

use serenity::{
    all::{Context, EventHandler, Message, Ready},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info};

pub mod commands;
pub mod handlers;
pub mod notifier;

pub use notifier::ChatNotifier;

use crate::{audio::player::AudioPlayer, config::Config};

/// Main Discord event handler.
///
/// Holds the shared [`AudioPlayer`] and the notifier the sessions publish to;
/// both are shared with `main` through [`Arc`].
pub struct JukeboxBot {
    config: Arc<Config>,
    pub player: Arc<AudioPlayer>,
    pub notifier: Arc<ChatNotifier>,
}

impl JukeboxBot {
    pub fn new(config: Arc<Config>, player: Arc<AudioPlayer>, notifier: Arc<ChatNotifier>) -> Self {
        Self {
            config,
            player,
            notifier,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.config.command_prefix
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
        info!("⌨️ Prefijo de comandos: {}", self.prefix());
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if let Err(e) = handlers::handle_message(&ctx, &msg, self).await {
            error!("Error manejando comando: {:?}", e);
        }
    }
}
