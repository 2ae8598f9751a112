use async_process::{Command, Output};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{ResolvedTrack, TrackReference};
use crate::error::{PlayerError, PlayerResult};

/// Cliente de yt-dlp: consulta metadata y descarga el audio a un archivo temporal
pub struct YtDlpClient {
    binary: String,
    download_dir: PathBuf,
    timeout: Duration,
    max_duration_secs: u64,
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

/// Información extraída de `yt-dlp --dump-json`
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: String,
    duration: Option<f64>,
    is_live: Option<bool>,
}

impl YtDlpClient {
    pub fn new(
        binary: impl Into<String>,
        download_dir: PathBuf,
        timeout_secs: u64,
        max_duration_secs: u64,
    ) -> Self {
        Self {
            binary: binary.into(),
            download_dir,
            timeout: Duration::from_secs(timeout_secs),
            max_duration_secs,
            rate_limiter: Semaphore::new(3),
        }
    }

    /// Verifica si la referencia es un enlace http(s) utilizable
    pub fn is_valid_url(candidate: &str) -> bool {
        match url::Url::parse(candidate) {
            Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
            Err(_) => false,
        }
    }

    /// Metadata y descarga. El resultado siempre es transitorio.
    pub async fn download(&self, track: &TrackReference) -> PlayerResult<ResolvedTrack> {
        let info = self.fetch_info(track).await?;

        if info.is_live.unwrap_or(false) {
            return Err(PlayerError::resolution(
                track.title(),
                "las transmisiones en vivo no se pueden descargar",
            ));
        }

        let duration_secs = info.duration.map(|d| d.max(0.0).round() as u64).unwrap_or(0);
        if duration_secs > self.max_duration_secs {
            return Err(PlayerError::resolution(
                track.title(),
                format!(
                    "dura {}s, el máximo permitido es {}s",
                    duration_secs, self.max_duration_secs
                ),
            ));
        }

        let stem = download_stem(&info.id);
        let template = self.download_dir.join(format!("{}.%(ext)s", stem));

        info!("⬇️ Descargando '{}' ({}s)", info.title, duration_secs);
        let output = self
            .run(
                track,
                &[
                    "--no-playlist",
                    "--no-warnings",
                    "--no-progress",
                    "-f",
                    "bestaudio/best",
                    "--no-simulate",
                    "--print",
                    "after_move:filepath",
                    "-o",
                    &template.to_string_lossy(),
                    track.identifier(),
                ],
            )
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                self.discard_partial(&stem).await;
                return Err(e);
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_downloaded_path(&stdout) {
            Some(path) if path.exists() => {
                debug!("📁 Descargado en {}", path.display());
                Ok(ResolvedTrack::new(path, duration_secs, true).with_title(info.title))
            }
            _ => {
                self.discard_partial(&stem).await;
                Err(PlayerError::resolution(
                    track.title(),
                    "yt-dlp no reportó el archivo descargado",
                ))
            }
        }
    }

    async fn fetch_info(&self, track: &TrackReference) -> PlayerResult<YtDlpInfo> {
        debug!("📊 Obteniendo info de: {}", track.identifier());

        let output = self
            .run(
                track,
                &["--no-playlist", "--dump-json", "--no-warnings", track.identifier()],
            )
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_info(&stdout).map_err(|e| {
            PlayerError::resolution(track.title(), format!("respuesta de yt-dlp inválida: {}", e))
        })
    }

    async fn run(&self, track: &TrackReference, args: &[&str]) -> PlayerResult<Output> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| PlayerError::resolution(track.title(), e))?;

        let mut cmd = Command::new(&self.binary);
        cmd.args(args).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                PlayerError::resolution(
                    track.title(),
                    format!("yt-dlp excedió {}s", self.timeout.as_secs()),
                )
            })?
            .map_err(|e| {
                PlayerError::resolution(track.title(), format!("error al ejecutar yt-dlp: {}", e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PlayerError::resolution(
                track.title(),
                format!("yt-dlp error: {}", stderr.trim()),
            ));
        }

        Ok(output)
    }

    /// Elimina descargas a medias que compartan el prefijo del intento
    async fn discard_partial(&self, stem: &str) {
        let Ok(mut entries) = tokio::fs::read_dir(&self.download_dir).await else {
            return;
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(stem) {
                if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                    warn!("No se pudo limpiar descarga parcial {:?}: {}", name, e);
                }
            }
        }
    }

    /// Borra descargas que quedaron de un proceso anterior; ninguna sesión las posee
    pub async fn purge_stale(&self) -> usize {
        let Ok(mut entries) = tokio::fs::read_dir(&self.download_dir).await else {
            return 0;
        };

        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
            if is_file && tokio::fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            info!("🧹 {} descargas huérfanas eliminadas", removed);
        }
        removed
    }

    /// Comprueba que el binario de yt-dlp responde
    pub async fn verify(&self) -> anyhow::Result<String> {
        let output = Command::new(&self.binary).arg("--version").output().await?;
        if !output.status.success() {
            anyhow::bail!("yt-dlp no disponible");
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

fn parse_info(stdout: &str) -> Result<YtDlpInfo, serde_json::Error> {
    // Con --no-playlist yt-dlp imprime un único objeto JSON
    let line = stdout.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    serde_json::from_str(line)
}

fn parse_downloaded_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(PathBuf::from)
}

/// Nombre base único para el archivo descargado
fn download_stem(video_id: &str) -> String {
    let id: String = video_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}-{:016x}", id, fastrand::u64(..))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_url_detection() {
        assert!(YtDlpClient::is_valid_url(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        ));
        assert!(YtDlpClient::is_valid_url("http://example.com/song.mp3"));
        assert!(!YtDlpClient::is_valid_url("ftp://example.com/song.mp3"));
        assert!(!YtDlpClient::is_valid_url("never gonna give you up"));
    }

    #[test]
    fn test_parse_info() {
        let json = r#"{"id":"dQw4w9WgXcQ","title":"Never Gonna Give You Up","duration":212.6,"is_live":false,"uploader":"Rick"}"#;
        let info = parse_info(json).unwrap();
        assert_eq!(info.id, "dQw4w9WgXcQ");
        assert_eq!(info.title, "Never Gonna Give You Up");
        assert_eq!(info.duration, Some(212.6));
        assert_eq!(info.is_live, Some(false));

        assert!(parse_info("ERROR: nope").is_err());
    }

    #[test]
    fn test_parse_downloaded_path_takes_last_line() {
        let stdout = "\n/tmp/cache/abc-01.webm\n\n";
        assert_eq!(
            parse_downloaded_path(stdout),
            Some(PathBuf::from("/tmp/cache/abc-01.webm"))
        );
        assert_eq!(parse_downloaded_path("   \n"), None);
    }

    #[test]
    fn test_download_stem_is_unique_and_safe() {
        let a = download_stem("../weird id");
        let b = download_stem("../weird id");
        assert!(a.starts_with("___weird_id-"));
        assert!(!a.contains('/'));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_missing_binary_is_resolution_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = YtDlpClient::new(
            "definitely-not-yt-dlp-binary",
            dir.path().to_path_buf(),
            5,
            3600,
        );
        let result = client
            .download(&TrackReference::remote("https://example.com/a"))
            .await;
        assert!(matches!(result, Err(PlayerError::Resolution { .. })));
    }

    #[tokio::test]
    async fn test_discard_partial_only_touches_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc-1.webm.part"), b"x").unwrap();
        std::fs::write(dir.path().join("other.webm"), b"x").unwrap();

        let client = YtDlpClient::new("yt-dlp", dir.path().to_path_buf(), 5, 3600);
        client.discard_partial("abc-1").await;

        assert!(!dir.path().join("abc-1.webm.part").exists());
        assert!(dir.path().join("other.webm").exists());
    }

    #[tokio::test]
    async fn test_purge_stale_empties_download_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a-1.webm"), b"x").unwrap();
        std::fs::write(dir.path().join("b-2.m4a.part"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("keep")).unwrap();

        let client = YtDlpClient::new("yt-dlp", dir.path().to_path_buf(), 5, 3600);
        assert_eq!(client.purge_stale().await, 2);
        assert!(dir.path().join("keep").exists());
        assert_eq!(client.purge_stale().await, 0);
    }
}
