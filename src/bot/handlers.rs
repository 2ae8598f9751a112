use anyhow::Result;
use serenity::{
    builder::{CreateEmbed, CreateMessage},
    model::{channel::Message, id::GuildId},
    prelude::Context,
};
use tracing::{info, warn};

use super::commands::{parse_invocation, parse_number, parse_page, parse_volume, Invocation};
use super::JukeboxBot;
use crate::{error::PlayerError, ui::embeds};

/// Maneja un mensaje que puede ser un comando con prefijo
pub async fn handle_message(ctx: &Context, msg: &Message, bot: &JukeboxBot) -> Result<()> {
    if msg.author.bot {
        return Ok(());
    }
    let Some(invocation) = parse_invocation(bot.prefix(), &msg.content) else {
        return Ok(());
    };
    let Some(guild_id) = msg.guild_id else {
        return reply(
            ctx,
            msg,
            embeds::create_error_embed("Solo en servidores", "Los comandos funcionan dentro de un servidor"),
        )
        .await;
    };

    info!(
        "📝 Comando {} usado por {} en guild {}",
        invocation.name, msg.author.name, guild_id
    );
    bot.notifier.bind(guild_id, msg.channel_id);

    let embed = match run(ctx, msg, bot, guild_id, &invocation).await {
        Ok(embed) => embed,
        Err(e) => error_embed(&e),
    };
    reply(ctx, msg, embed).await
}

async fn run(
    ctx: &Context,
    msg: &Message,
    bot: &JukeboxBot,
    guild_id: GuildId,
    invocation: &Invocation<'_>,
) -> Result<CreateEmbed, PlayerError> {
    let player = &bot.player;

    match invocation.name.as_str() {
        "join" => {
            let channel_id = msg.guild(&ctx.cache).and_then(|guild| {
                guild
                    .voice_states
                    .get(&msg.author.id)
                    .and_then(|state| state.channel_id)
            });
            let Some(channel_id) = channel_id else {
                return Err(PlayerError::InvalidState(
                    "no estás en un canal de voz".to_string(),
                ));
            };

            player.join(guild_id, channel_id).await?;
            Ok(embeds::create_success_embed("Conectado", &format!("Unido a <#{}>", channel_id)))
        }
        "leave" => {
            player.leave(guild_id).await?;
            Ok(embeds::create_success_embed("Desconectado", "👋 Salí del canal de voz"))
        }
        "play" | "p" => {
            let url = invocation.rest(0);
            let position = player.play(guild_id, &url).await?;
            Ok(embeds::create_track_added_embed(&url, position))
        }
        "playfile" | "pf" => {
            let number = parse_number(invocation.arg(0), "número de archivo")?;
            let (title, position) = player.play_upload(guild_id, number).await?;
            Ok(embeds::create_track_added_embed(&title, position))
        }
        "upload" => upload(msg, bot, guild_id).await,
        "files" => {
            let page = parse_page(invocation.arg(0))?;
            let listing = player.catalogue().page(guild_id, page, player.page_size()).await?;
            Ok(embeds::create_files_embed(&listing))
        }
        "delete" => {
            let number = parse_number(invocation.arg(0), "número de archivo")?;
            let filename = player.catalogue().remove_file(guild_id, number).await?;
            Ok(embeds::create_success_embed("Archivo eliminado", &format!("🗑️ {}", filename)))
        }
        "tag" | "untag" => {
            let number = parse_number(invocation.arg(0), "número de archivo")?;
            let tags: Vec<String> = invocation.args.iter().skip(1).map(|t| t.to_string()).collect();
            let catalogue = player.catalogue();
            let current = if invocation.name == "tag" {
                catalogue.add_tags(guild_id, number, &tags).await?
            } else {
                catalogue.remove_tags(guild_id, number, &tags).await?
            };
            let listing = if current.is_empty() {
                "sin tags".to_string()
            } else {
                current.iter().map(|t| format!("#{}", t)).collect::<Vec<_>>().join(" ")
            };
            Ok(embeds::create_success_embed(
                "Tags actualizados",
                &format!("Archivo #{}: {}", number, listing),
            ))
        }
        "tagged" => {
            let tag = invocation.rest(0);
            let entries = player.catalogue().filter_by_tag(guild_id, &tag).await?;
            Ok(embeds::create_tagged_embed(tag.trim_start_matches('#'), &entries))
        }
        "skip" | "s" => {
            player.skip(guild_id).await?;
            Ok(embeds::create_success_embed("Saltada", "⏭️ Pasando a la siguiente"))
        }
        "stop" => {
            player.stop(guild_id).await?;
            Ok(embeds::create_success_embed("Detenido", "⏹️ Reproducción detenida y cola vaciada"))
        }
        "pause" => {
            player.pause(guild_id).await?;
            Ok(embeds::create_success_embed("Pausado", "⏸️ Reproducción pausada"))
        }
        "resume" => {
            player.resume(guild_id).await?;
            Ok(embeds::create_success_embed("Reanudado", "▶️ Reproducción reanudada"))
        }
        "volume" | "vol" => {
            if invocation.arg(0).is_none() {
                return Ok(embeds::create_volume_embed(player.status(guild_id).volume_percent));
            }
            let level = parse_volume(invocation.arg(0))?;
            player.set_volume(guild_id, level).await?;
            Ok(embeds::create_volume_embed(player.status(guild_id).volume_percent))
        }
        "queue" | "q" => {
            let page = parse_page(invocation.arg(0))?;
            let listing = player.queue_page(guild_id, page)?;
            Ok(embeds::create_queue_embed(&listing, &player.status(guild_id)))
        }
        "remove" => {
            let position = parse_number(invocation.arg(0), "número de posición")?;
            let removed = player.remove(guild_id, position)?;
            Ok(embeds::create_success_embed("Quitada de la cola", removed.title()))
        }
        "shuffle" => {
            let count = player.shuffle(guild_id)?;
            Ok(embeds::create_success_embed("Cola mezclada", &format!("🔀 {} canciones", count)))
        }
        "clear" => {
            let removed = player.clear(guild_id);
            Ok(embeds::create_success_embed(
                "Cola vaciada",
                &format!("🧹 {} canciones eliminadas", removed),
            ))
        }
        "replay" => {
            let title = player.replay(guild_id).await?;
            Ok(embeds::create_success_embed("Repitiendo", &format!("🔁 **{}**", title)))
        }
        "np" | "nowplaying" => {
            let status = player.status(guild_id);
            Ok(match status.now_playing {
                Some(track) => embeds::create_info_embed(
                    "Reproduciendo ahora",
                    &format!("🎵 **{}**\n🔊 {}%", track.title(), status.volume_percent),
                ),
                None => embeds::create_info_embed("Nada sonando", "😴 No hay nada reproduciéndose"),
            })
        }
        "help" | "h" => Ok(embeds::create_help_embed(bot.prefix())),
        other => Err(PlayerError::not_found(format!(
            "comando '{}'; usa {}help",
            other,
            bot.prefix()
        ))),
    }
}

/// Guarda los adjuntos del mensaje en el catálogo del guild
async fn upload(msg: &Message, bot: &JukeboxBot, guild_id: GuildId) -> Result<CreateEmbed, PlayerError> {
    if msg.attachments.is_empty() {
        return Err(PlayerError::validation("adjunta al menos un archivo de audio"));
    }

    let catalogue = bot.player.catalogue();
    let mut saved = Vec::new();
    let mut rejected = Vec::new();

    for attachment in &msg.attachments {
        let bytes = match attachment.download().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Error descargando adjunto {}: {}", attachment.filename, e);
                rejected.push(format!("{} (descarga fallida)", attachment.filename));
                continue;
            }
        };

        match catalogue.store_upload(guild_id, &attachment.filename, &bytes).await {
            Ok(filename) => saved.push(filename),
            Err(e) => rejected.push(format!("{} ({})", attachment.filename, e)),
        }
    }

    if saved.is_empty() {
        return Err(PlayerError::validation(rejected.join("\n")));
    }

    let mut description = saved
        .iter()
        .map(|name| format!("📥 {}", name))
        .collect::<Vec<_>>()
        .join("\n");
    if !rejected.is_empty() {
        description.push_str(&format!("\n\n⚠️ Rechazados:\n{}", rejected.join("\n")));
    }
    Ok(embeds::create_success_embed("Archivos subidos", &description))
}

fn error_title(error: &PlayerError) -> &'static str {
    match error {
        PlayerError::Resolution { .. } => "No se pudo reproducir",
        PlayerError::Validation(_) => "Valor inválido",
        PlayerError::Transport(_) => "Sin conexión de voz",
        PlayerError::NotFound(_) => "No encontrado",
        PlayerError::EmptyQueue => "Cola vacía",
        PlayerError::InvalidState(_) => "No se puede hacer ahora",
        PlayerError::Storage(_) => "Error de almacenamiento",
    }
}

fn error_embed(error: &PlayerError) -> CreateEmbed {
    embeds::create_error_embed(error_title(error), &error.to_string())
}

async fn reply(ctx: &Context, msg: &Message, embed: CreateEmbed) -> Result<()> {
    msg.channel_id
        .send_message(&ctx.http, CreateMessage::new().embed(embed))
        .await?;
    Ok(())
}
