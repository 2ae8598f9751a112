//! Uploaded-file catalogue.
//!
//! Keeps, per guild, the ordered list of uploaded audio files and a
//! filename → tags map. Files are addressed by their 1-based number in the
//! list, the same number users see in listings. Every mutation is written
//! through the [`CatalogueStore`] before returning.

use regex::Regex;
use serenity::model::id::GuildId;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::error::{PlayerError, PlayerResult};
use crate::sources::TrackReference;
use crate::storage::{CatalogueSnapshot, CatalogueStore};

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac", "m4a", "aac", "opus", "webm"];

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogueEntry {
    pub number: usize,
    pub filename: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CataloguePage {
    pub entries: Vec<CatalogueEntry>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_files: usize,
}

pub struct UploadCatalogue {
    store: Arc<dyn CatalogueStore>,
    uploads_dir: PathBuf,
    state: Mutex<CatalogueSnapshot>,
}

impl UploadCatalogue {
    /// Carga el catálogo una sola vez al arrancar
    pub async fn load(store: Arc<dyn CatalogueStore>, uploads_dir: PathBuf) -> Self {
        let snapshot = store.load().await;
        Self {
            store,
            uploads_dir,
            state: Mutex::new(snapshot),
        }
    }

    /// Ruta en disco de un archivo subido
    pub fn file_path(&self, guild_id: GuildId, filename: &str) -> PathBuf {
        self.uploads_dir
            .join(guild_id.get().to_string())
            .join(filename)
    }

    pub async fn list_files(&self, guild_id: GuildId) -> Vec<String> {
        let state = self.state.lock().await;
        state.files.get(&guild_id.get()).cloned().unwrap_or_default()
    }

    pub async fn contains(&self, guild_id: GuildId, filename: &str) -> bool {
        self.list_files(guild_id).await.iter().any(|f| f == filename)
    }

    /// Página de la lista de archivos (páginas base 1)
    pub async fn page(
        &self,
        guild_id: GuildId,
        page: usize,
        per_page: usize,
    ) -> PlayerResult<CataloguePage> {
        if per_page == 0 {
            return Err(PlayerError::validation("el tamaño de página debe ser mayor a 0"));
        }

        let state = self.state.lock().await;
        let files = state.files.get(&guild_id.get()).cloned().unwrap_or_default();
        let total_pages = files.len().div_ceil(per_page).max(1);
        if page == 0 || page > total_pages {
            return Err(PlayerError::validation(format!(
                "página {} fuera de rango (1-{})",
                page, total_pages
            )));
        }

        let start = (page - 1) * per_page;
        let entries = files
            .iter()
            .enumerate()
            .skip(start)
            .take(per_page)
            .map(|(index, filename)| CatalogueEntry {
                number: index + 1,
                filename: filename.clone(),
                tags: tags_of(&state, guild_id, filename),
            })
            .collect();

        Ok(CataloguePage {
            entries,
            current_page: page,
            total_pages,
            total_files: files.len(),
        })
    }

    /// Nombre del archivo con número `number` (base 1)
    pub async fn file_by_number(&self, guild_id: GuildId, number: usize) -> PlayerResult<String> {
        let state = self.state.lock().await;
        lookup(&state, guild_id, number).map(str::to_string)
    }

    /// Referencia reproducible al archivo `number`
    pub async fn track_for(&self, guild_id: GuildId, number: usize) -> PlayerResult<TrackReference> {
        let filename = self.file_by_number(guild_id, number).await?;
        Ok(TrackReference::local(
            self.file_path(guild_id, &filename),
            display_title(&filename),
        ))
    }

    /// Guarda una subida en disco y la registra. Devuelve el nombre final.
    pub async fn store_upload(
        &self,
        guild_id: GuildId,
        original_name: &str,
        bytes: &[u8],
    ) -> PlayerResult<String> {
        let filename = sanitize_filename(original_name)?;
        let path = self.file_path(guild_id, &filename);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        self.add_file(guild_id, &filename).await?;
        Ok(filename)
    }

    /// Registra un archivo; si ya existía devuelve su número actual
    pub async fn add_file(&self, guild_id: GuildId, filename: &str) -> PlayerResult<usize> {
        let mut state = self.state.lock().await;
        let mut draft = state.clone();
        let files = draft.files.entry(guild_id.get()).or_default();

        if let Some(index) = files.iter().position(|f| f == filename) {
            return Ok(index + 1);
        }

        files.push(filename.to_string());
        let number = files.len();
        self.commit(&mut state, draft).await?;

        info!("📥 Archivo #{} registrado en guild {}: {}", number, guild_id, filename);
        Ok(number)
    }

    /// Elimina el archivo `number`, sus tags y el archivo en disco
    pub async fn remove_file(&self, guild_id: GuildId, number: usize) -> PlayerResult<String> {
        let mut state = self.state.lock().await;
        let filename = lookup(&state, guild_id, number)?.to_string();

        let mut draft = state.clone();
        if let Some(files) = draft.files.get_mut(&guild_id.get()) {
            files.remove(number - 1);
        }
        if let Some(tags) = draft.tags.get_mut(&guild_id.get()) {
            tags.remove(&filename);
        }
        self.commit(&mut state, draft).await?;
        drop(state);

        let path = self.file_path(guild_id, &filename);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("No se pudo borrar {}: {}", path.display(), e);
            }
        }

        info!("🗑️ Archivo eliminado en guild {}: {}", guild_id, filename);
        Ok(filename)
    }

    /// Agrega tags al archivo `number`; devuelve los tags resultantes
    pub async fn add_tags(
        &self,
        guild_id: GuildId,
        number: usize,
        tags: &[String],
    ) -> PlayerResult<Vec<String>> {
        let tags = normalize_tags(tags)?;
        let mut state = self.state.lock().await;
        let filename = lookup(&state, guild_id, number)?.to_string();

        let mut draft = state.clone();
        let current = draft
            .tags
            .entry(guild_id.get())
            .or_default()
            .entry(filename)
            .or_default();
        for tag in tags {
            if !current.contains(&tag) {
                current.push(tag);
            }
        }
        let result = current.clone();

        self.commit(&mut state, draft).await?;
        Ok(result)
    }

    /// Quita tags del archivo `number`; devuelve los tags restantes
    pub async fn remove_tags(
        &self,
        guild_id: GuildId,
        number: usize,
        tags: &[String],
    ) -> PlayerResult<Vec<String>> {
        let tags = normalize_tags(tags)?;
        let mut state = self.state.lock().await;
        let filename = lookup(&state, guild_id, number)?.to_string();

        let mut draft = state.clone();
        let guild_tags = draft.tags.entry(guild_id.get()).or_default();
        let remaining = match guild_tags.get_mut(&filename) {
            Some(current) => {
                current.retain(|t| !tags.contains(t));
                current.clone()
            }
            None => Vec::new(),
        };
        if remaining.is_empty() {
            guild_tags.remove(&filename);
        }

        self.commit(&mut state, draft).await?;
        Ok(remaining)
    }

    /// Persiste `draft` y solo entonces lo publica; si falla la memoria queda como estaba
    async fn commit(
        &self,
        state: &mut MutexGuard<'_, CatalogueSnapshot>,
        draft: CatalogueSnapshot,
    ) -> PlayerResult<()> {
        self.store.save(&draft).await?;
        **state = draft;
        Ok(())
    }

    /// Archivos del guild que tienen `tag`, con su número
    pub async fn filter_by_tag(
        &self,
        guild_id: GuildId,
        tag: &str,
    ) -> PlayerResult<Vec<CatalogueEntry>> {
        let tag = normalize_tag(tag);
        if tag.is_empty() {
            return Err(PlayerError::validation("el tag no puede estar vacío"));
        }

        let state = self.state.lock().await;
        let files = state.files.get(&guild_id.get()).cloned().unwrap_or_default();
        Ok(files
            .iter()
            .enumerate()
            .map(|(index, filename)| CatalogueEntry {
                number: index + 1,
                filename: filename.clone(),
                tags: tags_of(&state, guild_id, filename),
            })
            .filter(|entry| entry.tags.contains(&tag))
            .collect())
    }
}

fn lookup(state: &CatalogueSnapshot, guild_id: GuildId, number: usize) -> PlayerResult<&str> {
    number
        .checked_sub(1)
        .and_then(|index| state.files.get(&guild_id.get())?.get(index))
        .map(String::as_str)
        .ok_or_else(|| PlayerError::not_found(format!("archivo #{}", number)))
}

fn tags_of(state: &CatalogueSnapshot, guild_id: GuildId, filename: &str) -> Vec<String> {
    state
        .tags
        .get(&guild_id.get())
        .and_then(|tags| tags.get(filename))
        .cloned()
        .unwrap_or_default()
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().trim_start_matches('#').to_lowercase()
}

fn normalize_tags(tags: &[String]) -> PlayerResult<Vec<String>> {
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags.iter().map(|t| normalize_tag(t)) {
        if !tag.is_empty() && !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }

    if normalized.is_empty() {
        return Err(PlayerError::validation("la lista de tags está vacía"));
    }
    Ok(normalized)
}

/// Título legible: el nombre sin extensión
pub fn display_title(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string())
}

/// Nombre seguro para guardar en disco; rechaza extensiones que no son audio
pub fn sanitize_filename(original: &str) -> PlayerResult<String> {
    let unsafe_chars = Regex::new(r"[^\w.\- ]")
        .map_err(|e| PlayerError::validation(format!("regex inválida: {}", e)))?;

    let base = Path::new(original)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned = unsafe_chars.replace_all(base.trim(), "_");
    let cleaned = cleaned.trim_start_matches('.').to_string();

    let extension = Path::new(&cleaned)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    match extension {
        Some(ext) if AUDIO_EXTENSIONS.contains(&ext.as_str()) && cleaned.len() > ext.len() + 1 => {
            Ok(cleaned)
        }
        _ => Err(PlayerError::validation(format!(
            "'{}' no es un archivo de audio soportado",
            original
        ))),
    }
}
