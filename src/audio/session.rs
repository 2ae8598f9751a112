//! Per-guild playback session.
//!
//! A [`Session`] is a cheap, cloneable handle. Every state transition runs on a
//! single tokio task (the session worker) that drains a command channel, so
//! `advance`, `skip`, `stop` and completion handling never overlap for the
//! same guild. The queue sits behind its own lock so listings never wait on a
//! transition.
//!
//! Resolution happens on a spawned task that reports back to the worker; a
//! result for an attempt that was skipped or stopped meanwhile is discarded.
//! Completion hooks fired by the transport only post a message tagged with
//! their attempt id, which makes duplicates and late arrivals harmless.

use parking_lot::{Mutex, RwLock};
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::progress::{ProgressReporter, ProgressSettings, ProgressUpdate, PublishFn};
use super::queue::{QueuePage, TrackQueue};
use super::transport::{AudioTransport, CompletionHook};
use crate::error::{PlayerError, PlayerResult};
use crate::sources::{ResolvedTrack, Resolver, TrackReference};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Resolving,
    Playing,
    Paused,
}

/// Notificaciones que la sesión publica hacia la capa de chat
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    NowPlaying {
        title: String,
        duration_secs: u64,
        volume_percent: u32,
    },
    Progress {
        title: String,
        update: ProgressUpdate,
    },
    ResolutionFailed {
        title: String,
        reason: String,
    },
    TransportUnavailable {
        reason: String,
    },
    QueueFinished,
}

pub trait EventSink: Send + Sync {
    fn publish(&self, guild_id: GuildId, event: SessionEvent);
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Volumen inicial, 0.0 - 2.0
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub progress: ProgressSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_volume: 1.0,
            max_queue_size: 1000,
            progress: ProgressSettings::default(),
        }
    }
}

/// Vista de solo lectura del estado de la sesión
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub state: PlaybackState,
    pub volume_percent: u32,
    pub usage_count: u64,
    pub now_playing: Option<TrackReference>,
    pub last_played: Option<TrackReference>,
}

type Reply<T> = oneshot::Sender<PlayerResult<T>>;

/// Resultado de intentar avanzar la cola
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Advance {
    Started,
    QueueEmpty,
    /// Hay tracks pero no se puede reproducir (sesión ocupada o sin conexión)
    Withheld,
}

enum Command {
    Enqueue(TrackReference, Reply<usize>),
    Replay(TrackReference, Reply<()>),
    Advance,
    Pause(Reply<()>),
    Resume(Reply<()>),
    Skip(Reply<()>),
    Stop(Reply<()>),
    SetVolume(i64, Reply<()>),
    Resolved {
        attempt: u64,
        track: TrackReference,
        result: PlayerResult<ResolvedTrack>,
    },
    Completed {
        attempt: u64,
    },
}

/// Handle de la sesión de un guild
#[derive(Clone)]
pub struct Session {
    guild_id: GuildId,
    queue: Arc<Mutex<TrackQueue>>,
    status: Arc<RwLock<SessionStatus>>,
    transport: Arc<dyn AudioTransport>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Session {
    /// Crea la sesión y lanza su worker. Requiere un runtime de tokio activo.
    pub fn spawn(
        guild_id: GuildId,
        settings: SessionSettings,
        transport: Arc<dyn AudioTransport>,
        resolver: Arc<dyn Resolver>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let volume = settings.default_volume.clamp(0.0, 2.0);
        let queue = Arc::new(Mutex::new(TrackQueue::new(settings.max_queue_size)));
        let status = Arc::new(RwLock::new(SessionStatus {
            state: PlaybackState::Idle,
            volume_percent: volume_to_percent(volume),
            usage_count: 0,
            now_playing: None,
            last_played: None,
        }));

        let worker = SessionWorker {
            guild_id,
            settings,
            queue: queue.clone(),
            status: status.clone(),
            transport: transport.clone(),
            resolver,
            events,
            commands: tx.downgrade(),
            state: PlaybackState::Idle,
            volume,
            usage_count: 0,
            attempt: 0,
            active: None,
            last_played: None,
        };
        tokio::spawn(worker.run(rx));

        debug!("🆕 Sesión creada para guild {}", guild_id);
        Self {
            guild_id,
            queue,
            status,
            transport,
            commands: tx,
        }
    }

    #[cfg(test)]
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Agrega a la cola; si no hay nada sonando arranca la reproducción.
    /// Devuelve la posición en la cola al momento de agregarlo.
    pub async fn enqueue(&self, track: TrackReference) -> PlayerResult<usize> {
        self.request(|reply| Command::Enqueue(track, reply)).await
    }

    /// Pone `track` al frente de la cola y arranca si está en reposo
    pub async fn replay(&self, track: TrackReference) -> PlayerResult<()> {
        self.request(|reply| Command::Replay(track, reply)).await
    }

    pub async fn pause(&self) -> PlayerResult<()> {
        self.request(Command::Pause).await
    }

    pub async fn resume(&self) -> PlayerResult<()> {
        self.request(Command::Resume).await
    }

    pub async fn skip(&self) -> PlayerResult<()> {
        self.request(Command::Skip).await
    }

    /// Detiene, limpia la cola y reinicia el contador de uso
    pub async fn stop(&self) -> PlayerResult<()> {
        self.request(Command::Stop).await
    }

    /// Volumen en porcentaje, 0-200
    pub async fn set_volume(&self, level: i64) -> PlayerResult<()> {
        self.request(|reply| Command::SetVolume(level, reply)).await
    }

    /// Pide al worker que intente avanzar (p. ej. tras reconectar)
    pub fn advance(&self) {
        let _ = self.commands.send(Command::Advance);
    }

    pub async fn connect(&self, channel: ChannelId) -> PlayerResult<()> {
        self.transport.connect(channel).await?;
        self.advance();
        Ok(())
    }

    pub async fn disconnect(&self) -> PlayerResult<()> {
        self.stop().await?;
        self.transport.disconnect().await
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn shuffle(&self) {
        self.queue.lock().shuffle();
    }

    pub fn clear(&self) -> usize {
        self.queue.lock().clear()
    }

    /// Quita de la cola la posición indicada (base 1)
    pub fn remove(&self, position: usize) -> PlayerResult<TrackReference> {
        let index = position
            .checked_sub(1)
            .ok_or_else(|| PlayerError::validation("las posiciones empiezan en 1"))?;
        self.queue.lock().remove(index)
    }

    pub fn queue_snapshot(&self) -> Vec<TrackReference> {
        self.queue.lock().snapshot()
    }

    pub fn queue_page(&self, page: usize, per_page: usize) -> PlayerResult<QueuePage> {
        self.queue.lock().page(page, per_page)
    }

    pub fn status(&self) -> SessionStatus {
        self.status.read().clone()
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> PlayerResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| PlayerError::InvalidState("la sesión ya no está activa".to_string()))?;
        response
            .await
            .map_err(|_| PlayerError::InvalidState("la sesión ya no está activa".to_string()))?
    }
}

struct ActivePlayback {
    resolved: ResolvedTrack,
    reporter: Option<ProgressReporter>,
}

/// Dueño exclusivo de la máquina de estados de un guild
struct SessionWorker {
    guild_id: GuildId,
    settings: SessionSettings,
    queue: Arc<Mutex<TrackQueue>>,
    status: Arc<RwLock<SessionStatus>>,
    transport: Arc<dyn AudioTransport>,
    resolver: Arc<dyn Resolver>,
    events: Arc<dyn EventSink>,
    commands: mpsc::WeakUnboundedSender<Command>,
    state: PlaybackState,
    volume: f32,
    usage_count: u64,
    // Identifica el intento de reproducción vigente (resolviendo o sonando)
    attempt: u64,
    active: Option<ActivePlayback>,
    last_played: Option<TrackReference>,
}

impl SessionWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            self.handle(command).await;
            self.publish_status();
        }

        // Todos los handles se soltaron: liberar lo que quede
        self.finish_playback().await;
        debug!("Sesión del guild {} finalizada", self.guild_id);
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Enqueue(track, reply) => {
                let result = self.queue.lock().append(track);
                if result.is_ok() && self.state == PlaybackState::Idle {
                    self.advance().await;
                }
                self.respond(reply, result);
            }
            Command::Replay(track, reply) => {
                info!("🔁 Repitiendo: {}", track.title());
                self.queue.lock().insert_front(track);
                if self.state == PlaybackState::Idle {
                    self.advance().await;
                }
                self.respond(reply, Ok(()));
            }
            Command::Advance => {
                self.advance().await;
            }
            Command::Pause(reply) => {
                let result = self.pause().await;
                self.respond(reply, result);
            }
            Command::Resume(reply) => {
                let result = self.resume().await;
                self.respond(reply, result);
            }
            Command::Skip(reply) => {
                let result = self.skip().await;
                self.respond(reply, result);
            }
            Command::Stop(reply) => {
                self.stop().await;
                self.respond(reply, Ok(()));
            }
            Command::SetVolume(level, reply) => {
                let result = self.set_volume(level).await;
                self.respond(reply, result);
            }
            Command::Resolved {
                attempt,
                track,
                result,
            } => {
                self.on_resolved(attempt, track, result).await;
            }
            Command::Completed { attempt } => {
                self.on_completed(attempt).await;
            }
        }
    }

    /// Saca el siguiente track y lanza su resolución
    async fn advance(&mut self) -> Advance {
        if self.state != PlaybackState::Idle {
            return Advance::Withheld;
        }

        if self.queue.lock().is_empty() {
            debug!("📭 Cola vacía para guild {}", self.guild_id);
            return Advance::QueueEmpty;
        }

        if !self.transport.is_connected() {
            warn!("🔇 Guild {} sin conexión de voz, reproducción en espera", self.guild_id);
            self.notify(SessionEvent::TransportUnavailable {
                reason: "no hay conexión de voz".to_string(),
            });
            return Advance::Withheld;
        }

        let next = self.queue.lock().pop_front();
        let Ok(next) = next else {
            return Advance::QueueEmpty;
        };

        self.attempt += 1;
        self.state = PlaybackState::Resolving;
        self.spawn_resolution(self.attempt, next);
        Advance::Started
    }

    fn spawn_resolution(&self, attempt: u64, track: TrackReference) {
        let resolver = self.resolver.clone();
        let commands = self.commands.clone();

        tokio::spawn(async move {
            let lookup = {
                let track = track.clone();
                tokio::spawn(async move { resolver.resolve(&track).await })
            };
            // Si el resolver entra en pánico el intento cuenta como fallido
            let result = match lookup.await {
                Ok(result) => result,
                Err(e) => {
                    error!("💥 El resolver abortó con '{}': {}", track.title(), e);
                    Err(PlayerError::resolution(track.title(), e))
                }
            };
            let Some(commands) = commands.upgrade() else {
                if let Ok(resolved) = result {
                    resolved.release().await;
                }
                return;
            };

            if let Err(mpsc::error::SendError(Command::Resolved {
                result: Ok(resolved),
                ..
            })) = commands.send(Command::Resolved {
                attempt,
                track,
                result,
            }) {
                resolved.release().await;
            }
        });
    }

    async fn on_resolved(
        &mut self,
        attempt: u64,
        track: TrackReference,
        result: PlayerResult<ResolvedTrack>,
    ) {
        if attempt != self.attempt || self.state != PlaybackState::Resolving {
            debug!("Descartando resolución obsoleta de '{}'", track.title());
            if let Ok(resolved) = result {
                resolved.release().await;
            }
            return;
        }

        match result {
            Ok(resolved) => self.start_playback(track, resolved).await,
            Err(e) => {
                warn!("❌ Falló la resolución de '{}': {}", track.title(), e);
                let reason = match e {
                    PlayerError::Resolution { reason, .. } => reason,
                    other => other.to_string(),
                };
                self.notify(SessionEvent::ResolutionFailed {
                    title: track.title().to_string(),
                    reason,
                });

                self.state = PlaybackState::Idle;
                self.advance_or_finish().await;
            }
        }
    }

    async fn start_playback(&mut self, track: TrackReference, resolved: ResolvedTrack) {
        let attempt = self.attempt;
        let commands = self.commands.clone();
        let on_complete: CompletionHook = Box::new(move || {
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(Command::Completed { attempt });
            }
        });

        if let Err(e) = self
            .transport
            .play(resolved.handle(), self.volume, on_complete)
            .await
        {
            error!("Error al iniciar reproducción en guild {}: {}", self.guild_id, e);
            resolved.release().await;
            // Se reintenta cuando vuelva la conexión
            self.queue.lock().insert_front(track);
            self.state = PlaybackState::Idle;
            self.notify(SessionEvent::TransportUnavailable {
                reason: e.to_string(),
            });
            return;
        }

        let title = resolved
            .title()
            .map(str::to_string)
            .unwrap_or_else(|| track.title().to_string());
        let duration_secs = resolved.duration_secs();

        self.usage_count += 1;
        let reporter = (duration_secs > 0).then(|| {
            ProgressReporter::spawn(
                duration_secs,
                self.usage_count,
                self.settings.progress,
                self.progress_publisher(title.clone()),
            )
        });

        self.active = Some(ActivePlayback { resolved, reporter });
        self.last_played = Some(track.with_title(title.clone()));
        self.state = PlaybackState::Playing;

        info!("🎵 Reproduciendo: {} (guild {})", title, self.guild_id);
        self.notify(SessionEvent::NowPlaying {
            title,
            duration_secs,
            volume_percent: volume_to_percent(self.volume),
        });
    }

    async fn on_completed(&mut self, attempt: u64) {
        if attempt != self.attempt || self.active.is_none() {
            debug!("Ignorando fin de intento obsoleto {}", attempt);
            return;
        }

        debug!("Track terminado, reproduciendo siguiente...");
        self.finish_playback().await;
        self.advance_or_finish().await;
    }

    /// Lógica común de fin de intento: corta el progreso y borra el temporal
    async fn finish_playback(&mut self) {
        if let Some(active) = self.active.take() {
            if let Some(reporter) = &active.reporter {
                reporter.cancel();
            }
            active.resolved.release().await;
        }
        self.state = PlaybackState::Idle;
    }

    async fn advance_or_finish(&mut self) {
        if self.advance().await == Advance::QueueEmpty {
            self.notify(SessionEvent::QueueFinished);
        }
    }

    async fn pause(&mut self) -> PlayerResult<()> {
        if self.state != PlaybackState::Playing {
            return Err(PlayerError::InvalidState("no hay nada reproduciéndose".to_string()));
        }

        self.transport.pause().await?;
        if let Some(reporter) = self.active.as_ref().and_then(|a| a.reporter.as_ref()) {
            reporter.pause();
        }
        self.state = PlaybackState::Paused;
        info!("⏸️ Reproducción pausada");
        Ok(())
    }

    async fn resume(&mut self) -> PlayerResult<()> {
        if self.state != PlaybackState::Paused {
            return Err(PlayerError::InvalidState("la reproducción no está en pausa".to_string()));
        }

        self.transport.resume().await?;
        if let Some(reporter) = self.active.as_ref().and_then(|a| a.reporter.as_ref()) {
            reporter.resume();
        }
        self.state = PlaybackState::Playing;
        info!("▶️ Reproducción reanudada");
        Ok(())
    }

    async fn skip(&mut self) -> PlayerResult<()> {
        match self.state {
            PlaybackState::Playing | PlaybackState::Paused => {
                self.cancel_reporter();
                self.transport.stop().await;
                self.finish_playback().await;
            }
            PlaybackState::Resolving => {
                // El resultado en vuelo se descartará al llegar
                self.attempt += 1;
                self.state = PlaybackState::Idle;
            }
            PlaybackState::Idle => {
                return Err(PlayerError::InvalidState("no hay nada reproduciéndose".to_string()));
            }
        }

        info!("⏭️ Track saltado en guild {}", self.guild_id);
        self.advance_or_finish().await;
        Ok(())
    }

    async fn stop(&mut self) {
        self.queue.lock().clear();
        self.usage_count = 0;

        match self.state {
            PlaybackState::Playing | PlaybackState::Paused => {
                self.cancel_reporter();
                self.transport.stop().await;
                self.finish_playback().await;
            }
            PlaybackState::Resolving => {
                self.attempt += 1;
                self.state = PlaybackState::Idle;
            }
            PlaybackState::Idle => {}
        }

        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
    }

    async fn set_volume(&mut self, level: i64) -> PlayerResult<()> {
        if !(0..=200).contains(&level) {
            return Err(PlayerError::validation(format!(
                "el volumen debe estar entre 0 y 200, recibido {}",
                level
            )));
        }

        self.volume = level as f32 / 100.0;
        if matches!(self.state, PlaybackState::Playing | PlaybackState::Paused) {
            self.transport.set_volume(self.volume).await?;
        }

        info!("🔊 Volumen ajustado a {}%", level);
        Ok(())
    }

    fn cancel_reporter(&self) {
        if let Some(reporter) = self.active.as_ref().and_then(|a| a.reporter.as_ref()) {
            reporter.cancel();
        }
    }

    fn progress_publisher(&self, title: String) -> PublishFn {
        let events = self.events.clone();
        let guild_id = self.guild_id;
        Arc::new(move |update| {
            events.publish(
                guild_id,
                SessionEvent::Progress {
                    title: title.clone(),
                    update,
                },
            )
        })
    }

    fn respond<T>(&self, reply: Reply<T>, result: PlayerResult<T>) {
        // El estado visible ya refleja la transición cuando el llamador recibe la respuesta
        self.publish_status();
        let _ = reply.send(result);
    }

    fn notify(&self, event: SessionEvent) {
        self.events.publish(self.guild_id, event);
    }

    fn publish_status(&self) {
        let mut status = self.status.write();
        status.state = self.state;
        status.volume_percent = volume_to_percent(self.volume);
        status.usage_count = self.usage_count;
        status.now_playing = self.active.as_ref().and(self.last_played.clone());
        status.last_played = self.last_played.clone();
    }
}

fn volume_to_percent(volume: f32) -> u32 {
    (volume * 100.0).round() as u32
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sources::SourceKind;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Transporte falso: registra llamadas y guarda el hook de fin
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        disconnected: AtomicBool,
        fail_play: AtomicBool,
        pub(crate) log: Mutex<Vec<String>>,
        hook: Mutex<Option<CompletionHook>>,
        pub(crate) volume: Mutex<Option<f32>>,
    }

    impl FakeTransport {
        /// Simula el fin natural del track actual
        pub(crate) fn finish_current(&self) {
            let hook = self.hook.lock().take();
            if let Some(hook) = hook {
                hook();
            }
        }

        pub(crate) fn plays(&self) -> Vec<String> {
            self.log
                .lock()
                .iter()
                .filter(|entry| entry.starts_with("play:"))
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl AudioTransport for FakeTransport {
        async fn connect(&self, _channel: ChannelId) -> PlayerResult<()> {
            self.disconnected.store(false, Ordering::SeqCst);
            self.log.lock().push("connect".to_string());
            Ok(())
        }

        async fn disconnect(&self) -> PlayerResult<()> {
            self.disconnected.store(true, Ordering::SeqCst);
            self.log.lock().push("disconnect".to_string());
            Ok(())
        }

        fn is_connected(&self) -> bool {
            !self.disconnected.load(Ordering::SeqCst)
        }

        async fn play(
            &self,
            handle: &Path,
            volume: f32,
            on_complete: CompletionHook,
        ) -> PlayerResult<()> {
            if self.fail_play.load(Ordering::SeqCst) {
                return Err(PlayerError::Transport("conexión perdida".to_string()));
            }
            let name = handle.file_name().unwrap().to_string_lossy().to_string();
            self.log.lock().push(format!("play:{}", name));
            *self.volume.lock() = Some(volume);
            *self.hook.lock() = Some(on_complete);
            Ok(())
        }

        async fn stop(&self) {
            self.log.lock().push("stop".to_string());
            // Como songbird: detener dispara el evento de fin
            self.finish_current();
        }

        async fn pause(&self) -> PlayerResult<()> {
            self.log.lock().push("pause".to_string());
            Ok(())
        }

        async fn resume(&self) -> PlayerResult<()> {
            self.log.lock().push("resume".to_string());
            Ok(())
        }

        async fn is_playing(&self) -> bool {
            self.hook.lock().is_some()
        }

        async fn is_paused(&self) -> bool {
            false
        }

        async fn set_volume(&self, volume: f32) -> PlayerResult<()> {
            *self.volume.lock() = Some(volume);
            Ok(())
        }
    }

    /// Fábrica falsa: guarda el transporte creado para cada guild
    #[derive(Default)]
    pub(crate) struct FakeFactory {
        pub(crate) created: Mutex<HashMap<GuildId, Arc<FakeTransport>>>,
    }

    impl FakeFactory {
        pub(crate) fn transport(&self, guild_id: GuildId) -> Arc<FakeTransport> {
            self.created.lock()[&guild_id].clone()
        }
    }

    impl crate::audio::transport::TransportFactory for FakeFactory {
        fn create(&self, guild_id: GuildId) -> Arc<dyn AudioTransport> {
            let transport = Arc::new(FakeTransport::default());
            self.created.lock().insert(guild_id, transport.clone());
            transport
        }
    }

    /// Resolver falso: los identificadores que empiezan con "bad" fallan y los
    /// que empiezan con "crash" hacen que el resolver entre en pánico.
    /// Los remotos crean un archivo temporal real dentro de `dir`.
    pub(crate) struct FakeResolver {
        dir: PathBuf,
        gate: Option<Arc<Semaphore>>,
        durations: HashMap<String, u64>,
    }

    impl FakeResolver {
        pub(crate) fn new(dir: &Path) -> Self {
            Self {
                dir: dir.to_path_buf(),
                gate: None,
                durations: HashMap::new(),
            }
        }

        pub(crate) fn gated(dir: &Path, gate: Arc<Semaphore>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(dir)
            }
        }

        pub(crate) fn artifact(&self, identifier: &str) -> PathBuf {
            self.dir.join(format!("{}.tmp", identifier))
        }
    }

    #[async_trait]
    impl Resolver for FakeResolver {
        async fn resolve(&self, track: &TrackReference) -> PlayerResult<ResolvedTrack> {
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            if track.identifier().starts_with("crash") {
                panic!("resolver roto para {}", track.identifier());
            }
            if track.identifier().starts_with("bad") {
                return Err(PlayerError::resolution(track.title(), "descarga fallida"));
            }

            let duration = self.durations.get(track.identifier()).copied().unwrap_or(180);
            let path = self.artifact(track.identifier());
            let transient = track.kind() == SourceKind::Remote;
            std::fs::write(&path, b"audio").unwrap();
            Ok(ResolvedTrack::new(path, duration, transient))
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) events: Mutex<Vec<SessionEvent>>,
    }

    impl EventSink for RecordingSink {
        fn publish(&self, _guild_id: GuildId, event: SessionEvent) {
            self.events.lock().push(event);
        }
    }

    impl RecordingSink {
        fn failures(&self) -> usize {
            self.events
                .lock()
                .iter()
                .filter(|e| matches!(e, SessionEvent::ResolutionFailed { .. }))
                .count()
        }
    }

    struct Harness {
        session: Session,
        transport: Arc<FakeTransport>,
        resolver: Arc<FakeResolver>,
        sink: Arc<RecordingSink>,
        _dir: tempfile::TempDir,
    }

    fn harness_with(build: impl FnOnce(&Path) -> FakeResolver) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::default());
        let resolver = Arc::new(build(dir.path()));
        let sink = Arc::new(RecordingSink::default());
        let session = Session::spawn(
            GuildId::new(1),
            SessionSettings::default(),
            transport.clone(),
            resolver.clone(),
            sink.clone(),
        );
        Harness {
            session,
            transport,
            resolver,
            sink,
            _dir: dir,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeResolver::new)
    }

    fn track(id: &str) -> TrackReference {
        TrackReference::remote(id).with_title(id.to_uppercase())
    }

    pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("la condición no se cumplió a tiempo");
    }

    async fn wait_playing(session: &Session, title: &str) {
        wait_until(|| {
            let status = session.status();
            status.state == PlaybackState::Playing
                && status.now_playing.as_ref().map(|t| t.title()) == Some(title)
        })
        .await;
    }

    fn queued_titles(session: &Session) -> Vec<String> {
        session
            .queue_snapshot()
            .iter()
            .map(|t| t.title().to_string())
            .collect()
    }

    #[tokio::test]
    async fn skip_advances_through_queue() {
        let h = harness();
        for id in ["a", "b", "c"] {
            h.session.enqueue(track(id)).await.unwrap();
        }

        wait_playing(&h.session, "A").await;
        assert_eq!(h.session.status().usage_count, 1);
        assert_eq!(queued_titles(&h.session), vec!["B", "C"]);

        h.session.skip().await.unwrap();
        wait_playing(&h.session, "B").await;

        // El fin disparado por stop() pertenece al intento viejo y se ignora
        tokio::time::sleep(Duration::from_millis(50)).await;
        let status = h.session.status();
        assert_eq!(status.usage_count, 2);
        assert_eq!(status.now_playing.unwrap().title(), "B");
        assert_eq!(queued_titles(&h.session), vec!["C"]);
        assert_eq!(h.transport.plays(), vec!["play:a.tmp", "play:b.tmp"]);
    }

    #[tokio::test]
    async fn natural_end_of_last_track_returns_to_idle_and_cleans_up() {
        let h = harness();
        h.session.enqueue(track("a")).await.unwrap();
        wait_playing(&h.session, "A").await;
        let artifact = h.resolver.artifact("a");
        assert!(artifact.exists());

        h.transport.finish_current();
        wait_until(|| h.session.status().state == PlaybackState::Idle).await;

        let status = h.session.status();
        assert_eq!(status.now_playing, None);
        assert_eq!(status.last_played.unwrap().title(), "A");
        assert!(!artifact.exists());
        wait_until(|| {
            h.sink
                .events
                .lock()
                .last()
                .is_some_and(|e| *e == SessionEvent::QueueFinished)
        })
        .await;
    }

    #[tokio::test]
    async fn stop_mid_playback_removes_artifact_and_clears_queue() {
        let h = harness();
        h.session.enqueue(track("a")).await.unwrap();
        h.session.enqueue(track("b")).await.unwrap();
        wait_playing(&h.session, "A").await;

        h.session.stop().await.unwrap();

        let status = h.session.status();
        assert_eq!(status.state, PlaybackState::Idle);
        assert_eq!(status.usage_count, 0);
        assert!(h.session.queue_snapshot().is_empty());
        assert!(!h.resolver.artifact("a").exists());
    }

    #[tokio::test]
    async fn stop_then_enqueue_plays_once() {
        let h = harness();
        h.session.enqueue(track("a")).await.unwrap();
        wait_playing(&h.session, "A").await;

        h.session.stop().await.unwrap();
        h.session.enqueue(track("b")).await.unwrap();
        wait_playing(&h.session, "B").await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.transport.plays(), vec!["play:a.tmp", "play:b.tmp"]);
        assert_eq!(h.session.status().usage_count, 1);
    }

    #[tokio::test]
    async fn concurrent_enqueues_start_a_single_playback() {
        let h = harness();
        let (first, second) = tokio::join!(
            h.session.enqueue(track("a")),
            h.session.enqueue(track("b"))
        );
        first.unwrap();
        second.unwrap();

        wait_until(|| h.session.status().state == PlaybackState::Playing).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.transport.plays().len(), 1);
        assert_eq!(h.session.queue_snapshot().len(), 1);
    }

    #[tokio::test]
    async fn volume_is_validated_and_forwarded_live() {
        let h = harness();
        h.session.enqueue(track("a")).await.unwrap();
        wait_playing(&h.session, "A").await;

        let err = h.session.set_volume(250).await.unwrap_err();
        assert!(matches!(err, PlayerError::Validation(_)));
        assert_eq!(h.session.status().state, PlaybackState::Playing);
        assert_eq!(h.session.status().volume_percent, 100);

        h.session.set_volume(150).await.unwrap();
        assert_eq!(*h.transport.volume.lock(), Some(1.5));
        assert_eq!(h.session.status().state, PlaybackState::Playing);
        assert!(h.session.set_volume(-1).await.is_err());
        assert!(h.session.set_volume(0).await.is_ok());
    }

    #[tokio::test]
    async fn volume_set_while_idle_applies_to_next_track() {
        let h = harness();
        h.session.set_volume(40).await.unwrap();
        assert_eq!(*h.transport.volume.lock(), None);

        h.session.enqueue(track("a")).await.unwrap();
        wait_playing(&h.session, "A").await;
        assert_eq!(*h.transport.volume.lock(), Some(0.4));
    }

    #[tokio::test]
    async fn failed_resolutions_are_skipped() {
        let h = harness();
        h.session.enqueue(track("bad-1")).await.unwrap();
        h.session.enqueue(track("bad-2")).await.unwrap();
        h.session.enqueue(track("good")).await.unwrap();

        wait_playing(&h.session, "GOOD").await;
        assert_eq!(h.sink.failures(), 2);
        assert_eq!(h.session.status().usage_count, 1);
        assert_eq!(h.transport.plays(), vec!["play:good.tmp"]);
    }

    #[tokio::test]
    async fn resolver_panic_counts_as_failure_and_advances() {
        let h = harness();
        h.session.enqueue(track("crash")).await.unwrap();
        h.session.enqueue(track("good")).await.unwrap();

        wait_playing(&h.session, "GOOD").await;
        assert_eq!(h.sink.failures(), 1);
        assert_eq!(h.transport.plays(), vec!["play:good.tmp"]);
    }

    #[tokio::test]
    async fn resolver_panic_on_last_track_returns_to_idle() {
        let h = harness();
        h.session.enqueue(track("crash")).await.unwrap();

        wait_until(|| h.session.status().state == PlaybackState::Idle).await;
        assert_eq!(h.sink.failures(), 1);

        // La sesión sigue aceptando trabajo
        h.session.enqueue(track("after")).await.unwrap();
        wait_playing(&h.session, "AFTER").await;
    }

    #[tokio::test]
    async fn stop_during_resolution_discards_result() {
        let gate = Arc::new(Semaphore::new(0));
        let h = harness_with(|dir| FakeResolver::gated(dir, gate.clone()));

        h.session.enqueue(track("a")).await.unwrap();
        assert_eq!(h.session.status().state, PlaybackState::Resolving);

        h.session.stop().await.unwrap();
        assert_eq!(h.session.status().state, PlaybackState::Idle);

        gate.add_permits(1);
        let artifact = h.resolver.artifact("a");
        wait_until(|| !artifact.exists() && gate.available_permits() == 0).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!artifact.exists());
        assert!(h.transport.plays().is_empty());
        assert_eq!(h.session.status().state, PlaybackState::Idle);
    }

    #[tokio::test]
    async fn skip_during_resolution_moves_to_next_entry() {
        let gate = Arc::new(Semaphore::new(0));
        let h = harness_with(|dir| FakeResolver::gated(dir, gate.clone()));

        h.session.enqueue(track("a")).await.unwrap();
        h.session.enqueue(track("b")).await.unwrap();
        h.session.skip().await.unwrap();
        assert_eq!(h.session.status().state, PlaybackState::Resolving);

        gate.add_permits(2);
        wait_playing(&h.session, "B").await;
        wait_until(|| !h.resolver.artifact("a").exists()).await;
        assert_eq!(h.transport.plays(), vec!["play:b.tmp"]);
    }

    #[tokio::test]
    async fn pause_and_resume_are_guarded() {
        let h = harness();
        assert!(matches!(
            h.session.pause().await,
            Err(PlayerError::InvalidState(_))
        ));

        h.session.enqueue(track("a")).await.unwrap();
        wait_playing(&h.session, "A").await;

        assert!(h.session.resume().await.is_err());
        h.session.pause().await.unwrap();
        assert_eq!(h.session.status().state, PlaybackState::Paused);
        h.session.resume().await.unwrap();
        assert_eq!(h.session.status().state, PlaybackState::Playing);
        assert_eq!(h.session.queue_snapshot().len(), 0);
    }

    #[tokio::test]
    async fn missing_connection_withholds_playback_until_connect() {
        let h = harness();
        h.transport.disconnect().await.unwrap();

        h.session.enqueue(track("a")).await.unwrap();
        assert_eq!(h.session.status().state, PlaybackState::Idle);
        assert_eq!(queued_titles(&h.session), vec!["A"]);
        assert!(h
            .sink
            .events
            .lock()
            .iter()
            .any(|e| matches!(e, SessionEvent::TransportUnavailable { .. })));

        h.session.connect(ChannelId::new(9)).await.unwrap();
        wait_playing(&h.session, "A").await;
    }

    #[tokio::test]
    async fn transport_failure_requeues_track_and_cleans_up() {
        let h = harness();
        h.transport.fail_play.store(true, Ordering::SeqCst);

        h.session.enqueue(track("a")).await.unwrap();
        wait_until(|| {
            h.sink
                .events
                .lock()
                .iter()
                .any(|e| matches!(e, SessionEvent::TransportUnavailable { .. }))
        })
        .await;

        wait_until(|| h.session.status().state == PlaybackState::Idle).await;
        assert_eq!(queued_titles(&h.session), vec!["A"]);
        assert!(!h.resolver.artifact("a").exists());
        assert_eq!(h.session.status().usage_count, 0);
    }

    #[tokio::test]
    async fn replay_puts_track_in_front() {
        let h = harness();
        h.session.enqueue(track("a")).await.unwrap();
        wait_playing(&h.session, "A").await;
        h.session.enqueue(track("b")).await.unwrap();

        let last = h.session.status().last_played.unwrap();
        h.session.replay(last).await.unwrap();
        assert_eq!(queued_titles(&h.session), vec!["A", "B"]);

        h.session.skip().await.unwrap();
        wait_until(|| h.transport.plays().len() == 2).await;
        assert_eq!(h.transport.plays(), vec!["play:a.tmp", "play:a.tmp"]);
    }
}
