use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::{
    audio::{progress::ProgressUpdate, queue::QueuePage, session::SessionStatus},
    catalogue::{CatalogueEntry, CataloguePage},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Guild Jukebox";

const PROGRESS_SEGMENTS: usize = 20;

/// Embed del mensaje "reproduciendo ahora"; los ticks de progreso lo editan
pub fn create_now_playing_embed(title: &str, duration_secs: u64, volume_percent: u32) -> CreateEmbed {
    let duration = if duration_secs > 0 {
        format_duration(duration_secs)
    } else {
        "Desconocida".to_string()
    };

    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", title))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", duration, true)
        .field("🔊 Volumen", format!("{}%", volume_percent), true);

    if duration_secs > 0 {
        embed = embed.field("📊 Progreso", progress_line(0, duration_secs), false);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Reemplazo del embed de "reproduciendo ahora" tras un tick
pub fn create_progress_embed(title: &str, update: ProgressUpdate) -> CreateEmbed {
    let (heading, color, progress) = match update {
        ProgressUpdate::Tick { elapsed, total } => (
            "🎵 Reproduciendo Ahora",
            colors::SUCCESS_GREEN,
            progress_line(elapsed, total),
        ),
        ProgressUpdate::Finished { total } => (
            "✅ Terminado",
            colors::MUSIC_PURPLE,
            progress_line(total, total),
        ),
        ProgressUpdate::Faded => (
            "💤 Sonó antes",
            colors::NEUTRAL_GRAY,
            String::new(),
        ),
    };

    let mut embed = CreateEmbed::default()
        .title(heading)
        .description(format!("**{}**", title))
        .color(color);

    if !progress.is_empty() {
        embed = embed.field("📊 Progreso", progress, false);
    }

    embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(title: &str, position: usize) -> CreateEmbed {
    CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!("**{}** se ha agregado a la cola de reproducción", title))
        .color(colors::SUCCESS_GREEN)
        .field("📍 Posición", position.to_string(), true)
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente si no hay música sonando",
        ))
        .timestamp(Timestamp::now())
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(page: &QueuePage, status: &SessionStatus) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if let Some(current) = &status.now_playing {
        embed = embed.field("▶️ Reproduciendo", format!("**{}**", current.title()), false);
    }

    if page.total_items == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `play <enlace>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    let listing = page
        .items
        .iter()
        .enumerate()
        .map(|(offset, track)| format!("`{}.` {}", page.first_position + offset, track.title()))
        .collect::<Vec<_>>()
        .join("\n");

    embed
        .field(format!("⏭️ Siguientes ({})", page.total_items), listing, false)
        .footer(CreateEmbedFooter::new(format!(
            "Página {}/{} • Volumen {}%",
            page.current_page, page.total_pages, status.volume_percent
        )))
        .timestamp(Timestamp::now())
}

/// Lista de archivos subidos del guild
pub fn create_files_embed(page: &CataloguePage) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("📁 Archivos Subidos")
        .color(colors::MUSIC_PURPLE);

    if page.total_files == 0 {
        return embed
            .description("No hay archivos subidos.\n\n💡 Adjunta un audio con `upload`")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    embed
        .description(format_entries(&page.entries))
        .footer(CreateEmbedFooter::new(format!(
            "Página {}/{} • {} archivos • Usa playfile <número>",
            page.current_page, page.total_pages, page.total_files
        )))
}

/// Archivos que tienen un tag
pub fn create_tagged_embed(tag: &str, entries: &[CatalogueEntry]) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title(format!("🏷️ Archivos con #{}", tag))
        .color(colors::MUSIC_PURPLE);

    if entries.is_empty() {
        return embed
            .description("Ningún archivo tiene ese tag")
            .color(colors::NEUTRAL_GRAY);
    }

    embed.description(format_entries(entries))
}

fn format_entries(entries: &[CatalogueEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            if entry.tags.is_empty() {
                format!("`{}.` {}", entry.number, entry.filename)
            } else {
                format!(
                    "`{}.` {} · {}",
                    entry.number,
                    entry.filename,
                    entry
                        .tags
                        .iter()
                        .map(|t| format!("#{}", t))
                        .collect::<Vec<_>>()
                        .join(" ")
                )
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Crea un embed de volumen con indicador visual
pub fn create_volume_embed(volume_percent: u32) -> CreateEmbed {
    let status_emoji = match volume_percent {
        0 => "🔇",
        1..=50 => "🔉",
        _ => "🔊",
    };

    CreateEmbed::default()
        .title(format!("{} Control de Volumen", status_emoji))
        .description(format!("**Volumen actual: {}%**", volume_percent))
        .field("📊 Nivel", volume_bar(volume_percent), false)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new("💡 Usa volume <0-200> para ajustar"))
        .timestamp(Timestamp::now())
}

pub fn create_help_embed(prefix: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Guild Jukebox - Comandos")
        .color(colors::INFO_BLUE)
        .field(
            "🔊 Conexión",
            format!("`{p}join` • `{p}leave`", p = prefix),
            false,
        )
        .field(
            "🎵 Reproducción",
            format!(
                "`{p}play <enlace>` • `{p}pause` • `{p}resume` • `{p}skip` • `{p}stop`\n\
                `{p}volume <0-200>` • `{p}replay` • `{p}np`",
                p = prefix
            ),
            false,
        )
        .field(
            "📜 Cola",
            format!(
                "`{p}queue [página]` • `{p}shuffle` • `{p}clear` • `{p}remove <posición>`",
                p = prefix
            ),
            false,
        )
        .field(
            "📁 Archivos",
            format!(
                "`{p}upload` (con adjunto) • `{p}files [página]` • `{p}playfile <número>`\n\
                `{p}delete <número>` • `{p}tag <número> <tags...>` • `{p}untag <número> <tags...>`\n\
                `{p}tagged <tag>`",
                p = prefix
            ),
            false,
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de error estandarizado
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

pub fn create_warning_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("⚠️ {}", title))
        .description(description)
        .color(colors::WARNING_ORANGE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito estandarizado
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// `0:10 ▬▬🔘▬▬ 3:00`
fn progress_line(elapsed: u64, total: u64) -> String {
    format!(
        "`{}` {} `{}`",
        format_duration(elapsed.min(total)),
        progress_bar(elapsed, total),
        format_duration(total)
    )
}

/// Barra de progreso con el marcador en la posición proporcional
pub fn progress_bar(elapsed: u64, total: u64) -> String {
    let position = if total == 0 {
        0
    } else {
        let ratio = elapsed.min(total) as f64 / total as f64;
        ((ratio * PROGRESS_SEGMENTS as f64).round() as usize).min(PROGRESS_SEGMENTS - 1)
    };

    let mut bar = "▬".repeat(position);
    bar.push('🔘');
    bar.push_str(&"▬".repeat(PROGRESS_SEGMENTS - 1 - position));
    bar
}

/// Crea una barra visual de volumen (200% llena la barra)
pub fn volume_bar(volume_percent: u32) -> String {
    let segments = 20;
    let filled = ((volume_percent.min(200) as usize) * segments) / 200;
    let bar = "█".repeat(filled) + &"▒".repeat(segments - filled);
    format!("`[{}]`", bar)
}

/// Formatea segundos como `m:ss` o `h:mm:ss`
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
