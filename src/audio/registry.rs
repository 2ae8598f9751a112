use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::info;

use super::session::{EventSink, Session, SessionSettings};
use super::transport::TransportFactory;
use crate::sources::Resolver;

/// Sesiones por guild. Se crean bajo demanda y viven lo que dure el proceso.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Session>,
    settings: SessionSettings,
    transports: Arc<dyn TransportFactory>,
    resolver: Arc<dyn Resolver>,
    events: Arc<dyn EventSink>,
}

impl SessionRegistry {
    pub fn new(
        settings: SessionSettings,
        transports: Arc<dyn TransportFactory>,
        resolver: Arc<dyn Resolver>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            settings,
            transports,
            resolver,
            events,
        }
    }

    /// Obtiene la sesión del guild, creándola si es la primera referencia
    pub fn get_or_create(&self, guild_id: GuildId) -> Session {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                info!("🎛️ Nueva sesión de reproducción para guild {}", guild_id);
                Session::spawn(
                    guild_id,
                    self.settings,
                    self.transports.create(guild_id),
                    self.resolver.clone(),
                    self.events.clone(),
                )
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Session> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}
