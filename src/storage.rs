use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn};

use crate::error::PlayerResult;

/// Archivos subidos y sus tags, por guild
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogueSnapshot {
    /// guild -> nombres de archivo, en orden de subida
    #[serde(default)]
    pub files: HashMap<u64, Vec<String>>,
    /// guild -> archivo -> tags
    #[serde(default)]
    pub tags: HashMap<u64, HashMap<String, Vec<String>>>,
}

/// Persistencia del catálogo
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogueStore: Send + Sync {
    /// Nunca falla: un almacén ausente o corrupto se lee como vacío
    async fn load(&self) -> CatalogueSnapshot;

    async fn save(&self, snapshot: &CatalogueSnapshot) -> PlayerResult<()>;
}

/// Manager de almacenamiento basado en archivos JSON
pub struct JsonStorage {
    data_dir: PathBuf,
}

impl JsonStorage {
    pub async fn new(data_dir: PathBuf) -> anyhow::Result<Self> {
        // Crear directorio de datos si no existe
        fs::create_dir_all(&data_dir).await?;
        info!("📁 Storage inicializado en: {}", data_dir.display());
        Ok(Self { data_dir })
    }

    fn catalogue_path(&self) -> PathBuf {
        self.data_dir.join("catalogue.json")
    }
}

#[async_trait]
impl CatalogueStore for JsonStorage {
    async fn load(&self) -> CatalogueSnapshot {
        let path = self.catalogue_path();

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("📂 Sin catálogo previo, empezando vacío");
                return CatalogueSnapshot::default();
            }
            Err(e) => {
                warn!("Error leyendo {}: {}", path.display(), e);
                return CatalogueSnapshot::default();
            }
        };

        match serde_json::from_str::<CatalogueSnapshot>(&content) {
            Ok(snapshot) => {
                let total: usize = snapshot.files.values().map(Vec::len).sum();
                info!(
                    "📂 Catálogo cargado: {} archivos en {} guilds",
                    total,
                    snapshot.files.len()
                );
                snapshot
            }
            Err(e) => {
                warn!("Catálogo corrupto en {}, empezando vacío: {}", path.display(), e);
                CatalogueSnapshot::default()
            }
        }
    }

    async fn save(&self, snapshot: &CatalogueSnapshot) -> PlayerResult<()> {
        let path = self.catalogue_path();
        let tmp = path.with_extension("json.tmp");

        let content = serde_json::to_string_pretty(snapshot)?;
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}
