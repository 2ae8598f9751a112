pub mod local;
pub mod ytdlp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{PlayerError, PlayerResult};

pub use local::LocalFileProbe;
pub use ytdlp::YtDlpClient;

/// Origen de un track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Enlace reproducible (YouTube, SoundCloud, URL directa...)
    Remote,
    /// Archivo subido al catálogo del guild
    Local,
}

/// Referencia inmutable a contenido reproducible, todavía sin resolver
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackReference {
    kind: SourceKind,
    identifier: String,
    display_title: String,
}

impl TrackReference {
    pub fn remote(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            kind: SourceKind::Remote,
            display_title: url.clone(),
            identifier: url,
        }
    }

    pub fn local(path: impl AsRef<Path>, title: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Local,
            identifier: path.as_ref().to_string_lossy().into_owned(),
            display_title: title.into(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.display_title = title.into();
        self
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn title(&self) -> &str {
        &self.display_title
    }
}

/// Resultado de resolver un [`TrackReference`]: un archivo listo para el transporte.
///
/// Si `transient` es verdadero el archivo existe solo para este intento de
/// reproducción y debe borrarse con [`ResolvedTrack::release`] cuando termina.
#[derive(Debug, PartialEq, Eq)]
pub struct ResolvedTrack {
    handle: PathBuf,
    duration_secs: u64,
    transient: bool,
    title: Option<String>,
}

impl ResolvedTrack {
    pub fn new(handle: PathBuf, duration_secs: u64, transient: bool) -> Self {
        Self {
            handle,
            duration_secs,
            transient,
            title: None,
        }
    }

    /// Título descubierto durante la resolución (p. ej. metadata de yt-dlp)
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn handle(&self) -> &Path {
        &self.handle
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Libera el artefacto temporal. Consumir `self` garantiza una sola llamada
    /// por resolución; el borrado tolera que el archivo ya no exista.
    pub async fn release(self) {
        if !self.is_transient() {
            return;
        }

        match tokio::fs::remove_file(&self.handle).await {
            Ok(()) => debug!("🧹 Artefacto temporal eliminado: {}", self.handle.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "No se pudo eliminar artefacto temporal {}: {}",
                self.handle.display(),
                e
            ),
        }
    }
}

/// Convierte referencias en archivos reproducibles.
///
/// Implementaciones no deben tocar la cola ni el estado de la sesión.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, track: &TrackReference) -> PlayerResult<ResolvedTrack>;
}

/// Resolver de producción: yt-dlp para remotos, symphonia para locales
pub struct SourceResolver {
    remote: YtDlpClient,
    local: LocalFileProbe,
}

impl SourceResolver {
    pub fn new(remote: YtDlpClient, local: LocalFileProbe) -> Self {
        Self { remote, local }
    }
}

#[async_trait]
impl Resolver for SourceResolver {
    async fn resolve(&self, track: &TrackReference) -> PlayerResult<ResolvedTrack> {
        info!("🔎 Resolviendo: {}", track.title());

        match track.kind() {
            SourceKind::Remote => {
                if !YtDlpClient::is_valid_url(track.identifier()) {
                    return Err(PlayerError::resolution(
                        track.title(),
                        "formato de enlace no soportado",
                    ));
                }
                self.remote.download(track).await
            }
            SourceKind::Local => self.local.resolve(track).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn release_deletes_transient_file_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.webm");
        std::fs::write(&path, b"audio").unwrap();

        ResolvedTrack::new(path.clone(), 3, true).release().await;
        assert!(!path.exists());

        // Segundo borrado sobre un archivo inexistente no debe fallar
        ResolvedTrack::new(path.clone(), 3, true).release().await;
    }

    #[tokio::test]
    async fn release_keeps_non_transient_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.mp3");
        std::fs::write(&path, b"audio").unwrap();

        ResolvedTrack::new(path.clone(), 0, false).release().await;
        assert!(path.exists());
    }

    #[tokio::test]
    async fn unsupported_remote_reference_is_a_resolution_error() {
        let resolver = SourceResolver::new(
            YtDlpClient::new("yt-dlp", std::env::temp_dir(), 60, 3600),
            LocalFileProbe::new(),
        );
        let result = resolver.resolve(&TrackReference::remote("not a link")).await;
        assert!(matches!(result, Err(PlayerError::Resolution { .. })));
    }
}
