use dashmap::DashMap;
use serenity::{
    builder::{CreateEmbed, CreateMessage, EditMessage},
    http::Http,
    model::id::{ChannelId, GuildId, MessageId},
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::audio::progress::ProgressUpdate;
use crate::audio::session::{EventSink, SessionEvent};
use crate::ui::embeds;

/// Lo que hay que hacer en Discord con un evento de sesión
enum Delivery {
    /// Mensaje nuevo; si `track` es verdadero su id queda como "reproduciendo ahora"
    Post { embed: CreateEmbed, track: bool },
    /// Editar el mensaje "reproduciendo ahora"; `release` lo olvida después
    Edit { embed: CreateEmbed, release: bool },
}

fn delivery_for(event: SessionEvent) -> Delivery {
    match event {
        SessionEvent::NowPlaying {
            title,
            duration_secs,
            volume_percent,
        } => Delivery::Post {
            embed: embeds::create_now_playing_embed(&title, duration_secs, volume_percent),
            track: true,
        },
        SessionEvent::Progress { title, update } => Delivery::Edit {
            release: update == ProgressUpdate::Faded,
            embed: embeds::create_progress_embed(&title, update),
        },
        SessionEvent::ResolutionFailed { title, reason } => Delivery::Post {
            embed: embeds::create_error_embed(
                "No se pudo reproducir",
                &format!("**{}**\n{}\n\n⏭️ Pasando a la siguiente", title, reason),
            ),
            track: false,
        },
        SessionEvent::TransportUnavailable { reason } => Delivery::Post {
            embed: embeds::create_warning_embed(
                "Sin conexión de voz",
                &format!("{}\n\n💡 Usa `join` para conectarme y seguir con la cola", reason),
            ),
            track: false,
        },
        SessionEvent::QueueFinished => Delivery::Post {
            embed: embeds::create_info_embed("Cola terminada", "No quedan canciones en la cola"),
            track: false,
        },
    }
}

/// Publica los eventos de las sesiones en el canal de texto de cada guild.
///
/// Un único task entrega los mensajes en orden, así las ediciones de progreso
/// nunca se adelantan al mensaje que editan.
pub struct ChatNotifier {
    channels: DashMap<GuildId, ChannelId>,
    outbox: mpsc::UnboundedSender<(GuildId, ChannelId, SessionEvent)>,
}

impl ChatNotifier {
    pub fn spawn(http: Arc<Http>) -> Arc<Self> {
        let (outbox, rx) = mpsc::unbounded_channel();
        tokio::spawn(deliver_loop(http, rx));
        Arc::new(Self {
            channels: DashMap::new(),
            outbox,
        })
    }

    /// Canal donde se anuncian los eventos del guild (el último usado para comandos)
    pub fn bind(&self, guild_id: GuildId, channel: ChannelId) {
        self.channels.insert(guild_id, channel);
    }
}

impl EventSink for ChatNotifier {
    fn publish(&self, guild_id: GuildId, event: SessionEvent) {
        let Some(channel) = self.channels.get(&guild_id).map(|c| *c) else {
            debug!("Sin canal de texto para guild {}, evento descartado", guild_id);
            return;
        };
        let _ = self.outbox.send((guild_id, channel, event));
    }
}

async fn deliver_loop(
    http: Arc<Http>,
    mut rx: mpsc::UnboundedReceiver<(GuildId, ChannelId, SessionEvent)>,
) {
    let mut now_playing: HashMap<GuildId, (ChannelId, MessageId)> = HashMap::new();

    while let Some((guild_id, channel, event)) = rx.recv().await {
        match delivery_for(event) {
            Delivery::Post { embed, track } => {
                match channel
                    .send_message(http.as_ref(), CreateMessage::new().embed(embed))
                    .await
                {
                    Ok(message) if track => {
                        now_playing.insert(guild_id, (channel, message.id));
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Error enviando mensaje a guild {}: {}", guild_id, e),
                }
            }
            Delivery::Edit { embed, release } => {
                let Some((channel, message_id)) = now_playing.get(&guild_id).copied() else {
                    continue;
                };
                if let Err(e) = channel
                    .edit_message(http.as_ref(), message_id, EditMessage::new().embed(embed))
                    .await
                {
                    debug!("No se pudo actualizar el progreso en guild {}: {}", guild_id, e);
                }
                if release {
                    now_playing.remove(&guild_id);
                }
            }
        }
    }
}
