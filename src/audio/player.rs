use serenity::model::id::{ChannelId, GuildId};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::queue::QueuePage;
use super::registry::SessionRegistry;
use super::session::{Session, SessionStatus};
use crate::catalogue::UploadCatalogue;
use crate::error::{PlayerError, PlayerResult};
use crate::sources::{SourceKind, TrackReference};

/// Punto de entrada de la capa de comandos: sesiones por guild más el catálogo
pub struct AudioPlayer {
    sessions: SessionRegistry,
    catalogue: Arc<UploadCatalogue>,
    page_size: usize,
}

impl AudioPlayer {
    pub fn new(sessions: SessionRegistry, catalogue: Arc<UploadCatalogue>, page_size: usize) -> Self {
        Self {
            sessions,
            catalogue,
            page_size: page_size.max(1),
        }
    }

    pub fn catalogue(&self) -> &UploadCatalogue {
        &self.catalogue
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn session(&self, guild_id: GuildId) -> Session {
        self.sessions.get_or_create(guild_id)
    }

    /// Conecta al canal de voz y arranca la cola si estaba esperando conexión
    pub async fn join(&self, guild_id: GuildId, channel: ChannelId) -> PlayerResult<()> {
        self.session(guild_id).connect(channel).await
    }

    /// Detiene todo y sale del canal de voz
    pub async fn leave(&self, guild_id: GuildId) -> PlayerResult<()> {
        match self.sessions.get(guild_id) {
            Some(session) => session.disconnect().await,
            None => Err(PlayerError::InvalidState(
                "no estoy en un canal de voz".to_string(),
            )),
        }
    }

    pub fn is_connected(&self, guild_id: GuildId) -> bool {
        self.sessions
            .get(guild_id)
            .is_some_and(|session| session.is_connected())
    }

    /// Encola un enlace remoto; devuelve la posición en la cola
    pub async fn play(&self, guild_id: GuildId, url: &str) -> PlayerResult<usize> {
        let url = url.trim();
        if url.is_empty() {
            return Err(PlayerError::validation("falta el enlace a reproducir"));
        }

        let position = self.session(guild_id).enqueue(TrackReference::remote(url)).await?;
        info!("➕ Agregado a la cola de guild {}: {}", guild_id, url);
        Ok(position)
    }

    /// Encola el archivo subido `number`; devuelve su título y la posición
    pub async fn play_upload(&self, guild_id: GuildId, number: usize) -> PlayerResult<(String, usize)> {
        let track = self.catalogue.track_for(guild_id, number).await?;
        let title = track.title().to_string();
        let position = self.session(guild_id).enqueue(track).await?;
        Ok((title, position))
    }

    /// Vuelve a poner al frente lo último que sonó.
    ///
    /// Un archivo subido que fue borrado del catálogo ya no se puede repetir.
    pub async fn replay(&self, guild_id: GuildId) -> PlayerResult<String> {
        let session = self.session(guild_id);
        let track = session
            .status()
            .last_played
            .ok_or_else(|| PlayerError::not_found("no hay ninguna canción anterior"))?;

        if track.kind() == SourceKind::Local {
            let filename = Path::new(track.identifier())
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !self.catalogue.contains(guild_id, &filename).await {
                return Err(PlayerError::not_found(format!(
                    "'{}' ya no está en los archivos subidos",
                    track.title()
                )));
            }
        }

        let title = track.title().to_string();
        session.replay(track).await?;
        Ok(title)
    }

    pub async fn pause(&self, guild_id: GuildId) -> PlayerResult<()> {
        self.session(guild_id).pause().await
    }

    pub async fn resume(&self, guild_id: GuildId) -> PlayerResult<()> {
        self.session(guild_id).resume().await
    }

    pub async fn skip(&self, guild_id: GuildId) -> PlayerResult<()> {
        self.session(guild_id).skip().await
    }

    pub async fn stop(&self, guild_id: GuildId) -> PlayerResult<()> {
        self.session(guild_id).stop().await
    }

    pub async fn set_volume(&self, guild_id: GuildId, level: i64) -> PlayerResult<()> {
        self.session(guild_id).set_volume(level).await
    }

    pub fn shuffle(&self, guild_id: GuildId) -> PlayerResult<usize> {
        let session = self.session(guild_id);
        let len = session.queue_snapshot().len();
        if len < 2 {
            return Err(PlayerError::validation("no hay suficientes canciones para mezclar"));
        }
        session.shuffle();
        Ok(len)
    }

    /// Vacía la cola sin tocar lo que está sonando
    pub fn clear(&self, guild_id: GuildId) -> usize {
        self.session(guild_id).clear()
    }

    pub fn remove(&self, guild_id: GuildId, position: usize) -> PlayerResult<TrackReference> {
        self.session(guild_id).remove(position)
    }

    pub fn queue_page(&self, guild_id: GuildId, page: usize) -> PlayerResult<QueuePage> {
        self.session(guild_id).queue_page(page, self.page_size)
    }

    pub fn status(&self, guild_id: GuildId) -> SessionStatus {
        self.session(guild_id).status()
    }
}
