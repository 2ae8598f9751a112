use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    tracks::{PlayMode, TrackHandle},
    CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, info, warn};

use crate::error::{PlayerError, PlayerResult};

/// Se invoca una sola vez cuando termina el intento de reproducción (fin, stop o error)
pub type CompletionHook = Box<dyn FnOnce() + Send + 'static>;

/// Contrato con el transporte de audio que la sesión controla.
///
/// Una instancia por guild. La sesión nunca habla con la conexión de voz
/// salvo a través de este trait.
#[async_trait]
pub trait AudioTransport: Send + Sync {
    async fn connect(&self, channel: ChannelId) -> PlayerResult<()>;

    async fn disconnect(&self) -> PlayerResult<()>;

    fn is_connected(&self) -> bool;

    /// Empieza a reproducir `handle`; `on_complete` se ejecuta exactamente una vez
    async fn play(&self, handle: &Path, volume: f32, on_complete: CompletionHook)
        -> PlayerResult<()>;

    async fn stop(&self);

    async fn pause(&self) -> PlayerResult<()>;

    async fn resume(&self) -> PlayerResult<()>;

    async fn is_playing(&self) -> bool;

    async fn is_paused(&self) -> bool;

    async fn set_volume(&self, volume: f32) -> PlayerResult<()>;
}

/// Crea el transporte de cada guild al crear su sesión
pub trait TransportFactory: Send + Sync {
    fn create(&self, guild_id: GuildId) -> Arc<dyn AudioTransport>;
}

/// Transporte sobre una llamada de songbird
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    connected: Arc<AtomicBool>,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, guild_id: GuildId) -> Self {
        Self {
            manager,
            guild_id,
            connected: Arc::new(AtomicBool::new(false)),
            current: Mutex::new(None),
        }
    }

    fn current(&self) -> Option<TrackHandle> {
        self.current.lock().clone()
    }

    async fn play_mode(&self) -> Option<PlayMode> {
        let track = self.current()?;
        track.get_info().await.ok().map(|info| info.playing)
    }
}

#[async_trait]
impl AudioTransport for SongbirdTransport {
    async fn connect(&self, channel: ChannelId) -> PlayerResult<()> {
        info!("🔗 Conectando al canal {} en guild {}", channel, self.guild_id);

        let call = self
            .manager
            .join(self.guild_id, channel)
            .await
            .map_err(|e| PlayerError::Transport(format!("error al unirse al canal: {:?}", e)))?;

        {
            let mut call = call.lock().await;
            call.remove_all_global_events();
            call.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DisconnectWatcher {
                    guild_id: self.guild_id,
                    connected: self.connected.clone(),
                },
            );
        }

        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> PlayerResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        *self.current.lock() = None;

        if self.manager.get(self.guild_id).is_some() {
            self.manager
                .remove(self.guild_id)
                .await
                .map_err(|e| PlayerError::Transport(format!("error al salir del canal: {:?}", e)))?;
            info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.manager.get(self.guild_id).is_some()
    }

    async fn play(
        &self,
        handle: &Path,
        volume: f32,
        on_complete: CompletionHook,
    ) -> PlayerResult<()> {
        let call = self
            .manager
            .get(self.guild_id)
            .filter(|_| self.connected.load(Ordering::SeqCst))
            .ok_or_else(|| PlayerError::Transport("no hay conexión de voz".to_string()))?;

        let input = songbird::input::File::new(handle.to_path_buf());
        let track = {
            let mut call = call.lock().await;
            call.play_input(input.into())
        };

        if let Err(e) = track.set_volume(volume) {
            warn!("No se pudo ajustar el volumen inicial: {:?}", e);
        }

        let [on_end, on_error] = CompletionNotifier::pair(on_complete);
        for (event, notifier) in [(TrackEvent::End, on_end), (TrackEvent::Error, on_error)] {
            track
                .add_event(Event::Track(event), notifier)
                .map_err(|e| PlayerError::Transport(format!("error al registrar evento: {}", e)))?;
        }

        *self.current.lock() = Some(track);
        debug!("▶️ Transporte reproduciendo {}", handle.display());
        Ok(())
    }

    async fn stop(&self) {
        if let Some(track) = self.current.lock().take() {
            let _ = track.stop();
        }
    }

    async fn pause(&self) -> PlayerResult<()> {
        let track = self
            .current()
            .ok_or_else(|| PlayerError::Transport("no hay track activo".to_string()))?;
        track
            .pause()
            .map_err(|e| PlayerError::Transport(e.to_string()))
    }

    async fn resume(&self) -> PlayerResult<()> {
        let track = self
            .current()
            .ok_or_else(|| PlayerError::Transport("no hay track activo".to_string()))?;
        track.play().map_err(|e| PlayerError::Transport(e.to_string()))
    }

    async fn is_playing(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Play))
    }

    async fn is_paused(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Pause))
    }

    async fn set_volume(&self, volume: f32) -> PlayerResult<()> {
        if let Some(track) = self.current() {
            track
                .set_volume(volume)
                .map_err(|e| PlayerError::Transport(e.to_string()))?;
        }
        Ok(())
    }
}

pub struct SongbirdTransportFactory {
    manager: Arc<Songbird>,
}

impl SongbirdTransportFactory {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

impl TransportFactory for SongbirdTransportFactory {
    fn create(&self, guild_id: GuildId) -> Arc<dyn AudioTransport> {
        Arc::new(SongbirdTransport::new(self.manager.clone(), guild_id))
    }
}

/// Handler para cuando termina (o falla) un track
struct CompletionNotifier {
    hook: Arc<Mutex<Option<CompletionHook>>>,
}

impl CompletionNotifier {
    /// Fin y error comparten el mismo hook; el primero que llegue lo consume
    fn pair(on_complete: CompletionHook) -> [Self; 2] {
        let hook = Arc::new(Mutex::new(Some(on_complete)));
        [Self { hook: hook.clone() }, Self { hook }]
    }
}

#[async_trait]
impl VoiceEventHandler for CompletionNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        let hook = self.hook.lock().take();
        if let Some(hook) = hook {
            hook();
        }
        None
    }
}

/// Marca el transporte como desconectado cuando se cae el driver de voz
struct DisconnectWatcher {
    guild_id: GuildId,
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl VoiceEventHandler for DisconnectWatcher {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        warn!("🔌 Bot desconectado del canal de voz en guild {}", self.guild_id);
        self.connected.store(false, Ordering::SeqCst);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn end_followed_by_error_runs_hook_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let [on_end, on_error] = CompletionNotifier::pair(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(on_end.act(&EventContext::Track(&[])).await.is_none());
        assert!(on_error.act(&EventContext::Track(&[])).await.is_none());
        assert!(on_end.act(&EventContext::Track(&[])).await.is_none());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
