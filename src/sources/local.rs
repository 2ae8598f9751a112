use std::path::{Path, PathBuf};
use symphonia::core::{
    formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};
use tracing::{debug, warn};

use super::{ResolvedTrack, TrackReference};
use crate::error::{PlayerError, PlayerResult};

/// Resuelve archivos subidos: solo verifica que existan y lee su duración
#[derive(Debug, Default, Clone)]
pub struct LocalFileProbe;

impl LocalFileProbe {
    pub fn new() -> Self {
        Self
    }

    pub async fn resolve(&self, track: &TrackReference) -> PlayerResult<ResolvedTrack> {
        let path = PathBuf::from(track.identifier());

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(PlayerError::resolution(track.title(), "no es un archivo"));
            }
            Err(e) => {
                return Err(PlayerError::resolution(
                    track.title(),
                    format!("archivo no disponible: {}", e),
                ));
            }
        }

        // symphonia es bloqueante
        let probe_path = path.clone();
        let duration_secs = tokio::task::spawn_blocking(move || probe_duration(&probe_path))
            .await
            .unwrap_or_else(|e| {
                warn!("Falló el análisis de duración: {}", e);
                None
            })
            .unwrap_or(0);

        debug!("⏱️ Duración de {}: {}s", path.display(), duration_secs);
        Ok(ResolvedTrack::new(path, duration_secs, false))
    }
}

/// Duración en segundos según los metadatos del contenedor; `None` si no se puede leer
pub fn probe_duration(path: &Path) -> Option<u64> {
    let file = std::fs::File::open(path).ok()?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .ok()?;

    let track = probed.format.default_track()?;
    let params = &track.codec_params;
    let frames = params.n_frames?;

    match (params.time_base, params.sample_rate) {
        (Some(time_base), _) => Some(time_base.calc_time(frames).seconds),
        (None, Some(rate)) if rate > 0 => Some(frames / u64::from(rate)),
        _ => None,
    }
}
