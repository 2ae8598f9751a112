use rand::seq::SliceRandom;
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::error::{PlayerError, PlayerResult};
use crate::sources::TrackReference;

/// Cola FIFO de referencias de un guild. Solo su sesión la muta.
#[derive(Debug)]
pub struct TrackQueue {
    items: VecDeque<TrackReference>,
    max_size: usize,
}

impl TrackQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega un track al final y devuelve su posición (1 = siguiente)
    pub fn append(&mut self, track: TrackReference) -> PlayerResult<usize> {
        if self.len() >= self.max_size {
            return Err(PlayerError::validation(format!(
                "La cola está llena (máximo {} canciones)",
                self.max_size
            )));
        }

        info!("➕ Agregado a la cola: {}", track.title());
        self.items.push_back(track);
        Ok(self.len())
    }

    /// Obtiene el siguiente track (FIFO)
    pub fn pop_front(&mut self) -> PlayerResult<TrackReference> {
        let next = self.items.pop_front().ok_or(PlayerError::EmptyQueue)?;
        debug!("➡️ Siguiente en cola (FIFO): {}", next.title());
        Ok(next)
    }

    /// Inserta al frente; usado por replay, por eso ignora el límite
    pub fn insert_front(&mut self, track: TrackReference) {
        debug!("⏮️ Insertado al frente: {}", track.title());
        self.items.push_front(track);
    }

    /// Mezcla la cola (Fisher-Yates)
    pub fn shuffle(&mut self) {
        let mut rng = rand::thread_rng();
        self.items.make_contiguous().shuffle(&mut rng);
        info!("🔀 Cola mezclada ({} canciones)", self.items.len());
    }

    /// Limpia la cola y devuelve cuántos tracks se quitaron
    pub fn clear(&mut self) -> usize {
        let cleared = self.items.len();
        self.items.clear();
        info!("🗑️ Cola limpiada: {} tracks removidos", cleared);
        cleared
    }

    /// Elimina el track en `index` (base 0)
    pub fn remove(&mut self, index: usize) -> PlayerResult<TrackReference> {
        let removed = self
            .items
            .remove(index)
            .ok_or_else(|| PlayerError::not_found(format!("posición {} en la cola", index + 1)))?;
        debug!("❌ Track eliminado en posición {}", index);
        Ok(removed)
    }

    /// Copia de la cola para mostrar; no expone el almacenamiento interno
    pub fn snapshot(&self) -> Vec<TrackReference> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Obtiene una página de la cola (páginas base 1)
    pub fn page(&self, page: usize, per_page: usize) -> PlayerResult<QueuePage> {
        if per_page == 0 {
            return Err(PlayerError::validation("el tamaño de página debe ser mayor a 0"));
        }

        let total_items = self.items.len();
        let total_pages = total_items.div_ceil(per_page).max(1);
        if page == 0 || page > total_pages {
            return Err(PlayerError::validation(format!(
                "página {} fuera de rango (1-{})",
                page, total_pages
            )));
        }

        let start = (page - 1) * per_page;
        Ok(QueuePage {
            items: self.items.iter().skip(start).take(per_page).cloned().collect(),
            first_position: start + 1,
            current_page: page,
            total_pages,
            total_items,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuePage {
    pub items: Vec<TrackReference>,
    /// Posición (base 1) del primer item de la página
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}
