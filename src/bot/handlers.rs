use anyhow::Result;
use serenity::{
    builder::{CreateEmbed, CreateMessage},
    model::{
        channel::Message,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use super::{commands::Command, MusicBot};
use crate::{
    audio::{
        loop_session::LoopSession,
        player::{LoopStart, VoiceLink},
        queue::parse_volume,
    },
    error::MusicError,
    sources::Requester,
    ui::embeds,
};

/// Ejecuta un comando de texto.
///
/// Los rechazos de dominio (`MusicError`) se contestan con un mensaje corto
/// y no se propagan; cualquier otro error vuelve al llamador.
pub async fn handle_command(
    ctx: &Context,
    msg: &Message,
    command: Command,
    bot: &MusicBot,
) -> Result<()> {
    let guild_id = msg
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando {}{} usado por {} en guild {}",
        bot.config.command_prefix,
        command.name(),
        msg.author.name,
        guild_id
    );

    let result = match command {
        Command::Play(query) => handle_play(ctx, msg, guild_id, &query, bot).await,
        Command::Skip => handle_skip(ctx, msg, guild_id, bot).await,
        Command::Stop => handle_stop(ctx, msg, guild_id, bot).await,
        Command::Queue => handle_queue(ctx, msg, guild_id, bot).await,
        Command::Volume(level) => handle_volume(ctx, msg, guild_id, level.as_deref(), bot).await,
        Command::Repeat => handle_repeat(ctx, msg, guild_id, bot).await,
        Command::NowPlaying => handle_nowplaying(ctx, msg, guild_id, bot).await,
        Command::Shuffle => handle_shuffle(ctx, msg, guild_id, bot).await,
        Command::AskLoop(name) => handle_askloop(ctx, msg, guild_id, name, bot).await,
        Command::Ai => handle_ai(ctx, msg, bot).await,
        Command::Help => send_embed(ctx, msg.channel_id, embeds::help_embed(&bot.config.command_prefix)).await,
    };

    match result {
        Err(e) => match e.downcast_ref::<MusicError>() {
            Some(rejection) => {
                info!("🚫 Comando rechazado en guild {}: {}", guild_id, rejection);
                reply(ctx, msg.channel_id, rejection.to_string()).await
            }
            None => Err(e),
        },
        ok => ok,
    }
}

async fn handle_play(
    ctx: &Context,
    msg: &Message,
    guild_id: GuildId,
    query: &str,
    bot: &MusicBot,
) -> Result<()> {
    if query.is_empty() {
        return reply(
            ctx,
            msg.channel_id,
            format!("🎵 Uso: `{}play <canción o URL>`", bot.config.command_prefix),
        )
        .await;
    }

    // Verificar que el usuario esté en un canal de voz
    let voice_channel = get_user_voice_channel(ctx, guild_id, msg.author.id)?;
    let link = VoiceLink::from_context(ctx).await?;

    if let Err(e) = msg.channel_id.broadcast_typing(&ctx.http).await {
        warn!("⚠️ No se pudo mostrar 'escribiendo': {:?}", e);
    }

    let track = bot.player.search(query, requester(msg)).await?;
    let position = bot
        .player
        .enqueue(&link, guild_id, msg.channel_id, voice_channel, track.clone())
        .await?;

    // La posición 1 la anuncia el controlador al empezar a sonar
    if position > 1 {
        send_embed(ctx, msg.channel_id, embeds::track_added_embed(&track, position)).await?;
    }

    Ok(())
}

async fn handle_skip(ctx: &Context, msg: &Message, guild_id: GuildId, bot: &MusicBot) -> Result<()> {
    let link = VoiceLink::from_context(ctx).await?;
    let text = match bot.player.skip(&link, guild_id).await? {
        Some(title) => format!("⏭️ Saltando **{}**", title),
        None => "📭 No hay nada sonando".to_string(),
    };
    reply(ctx, msg.channel_id, text).await
}

async fn handle_stop(ctx: &Context, msg: &Message, guild_id: GuildId, bot: &MusicBot) -> Result<()> {
    let link = VoiceLink::from_context(ctx).await?;
    bot.player.stop(&link, guild_id).await?;
    reply(ctx, msg.channel_id, "⏹️ Reproducción detenida y cola vaciada").await
}

async fn handle_queue(ctx: &Context, msg: &Message, guild_id: GuildId, bot: &MusicBot) -> Result<()> {
    let snapshot = bot.player.snapshot(guild_id).await?;
    send_embed(ctx, msg.channel_id, embeds::queue_embed(&snapshot)).await
}

async fn handle_volume(
    ctx: &Context,
    msg: &Message,
    guild_id: GuildId,
    level: Option<&str>,
    bot: &MusicBot,
) -> Result<()> {
    let volume = match level {
        // Sin argumento solo se consulta
        None => bot.player.volume(guild_id).await?,
        Some(raw) => {
            let requested = parse_volume(raw)?;
            bot.player.set_volume(guild_id, requested).await?
        }
    };
    send_embed(ctx, msg.channel_id, embeds::volume_embed(volume)).await
}

async fn handle_repeat(ctx: &Context, msg: &Message, guild_id: GuildId, bot: &MusicBot) -> Result<()> {
    let enabled = bot.player.toggle_repeat(guild_id).await?;
    send_embed(ctx, msg.channel_id, embeds::repeat_embed(enabled)).await
}

async fn handle_nowplaying(
    ctx: &Context,
    msg: &Message,
    guild_id: GuildId,
    bot: &MusicBot,
) -> Result<()> {
    let snapshot = bot.player.snapshot(guild_id).await?;
    match &snapshot.current {
        Some(track) => {
            let embed = embeds::now_playing_embed(track, snapshot.loop_progress.as_ref());
            send_embed(ctx, msg.channel_id, embed).await
        }
        None => reply(ctx, msg.channel_id, "📭 No hay nada sonando").await,
    }
}

async fn handle_shuffle(ctx: &Context, msg: &Message, guild_id: GuildId, bot: &MusicBot) -> Result<()> {
    let shuffled = bot.player.shuffle(guild_id).await?;
    let text = if shuffled < 2 {
        "🔀 No hay suficientes canciones para mezclar".to_string()
    } else {
        format!("🔀 {} canciones mezcladas", shuffled)
    };
    reply(ctx, msg.channel_id, text).await
}

async fn handle_askloop(
    ctx: &Context,
    msg: &Message,
    guild_id: GuildId,
    name: Option<String>,
    bot: &MusicBot,
) -> Result<()> {
    let name = name.unwrap_or_else(|| bot.config.loop_playlist.clone());
    let titles = bot
        .playlists
        .get(&name)
        .ok_or_else(|| MusicError::EmptyPlaylist(name.clone()))?
        .to_vec();

    let voice_channel = get_user_voice_channel(ctx, guild_id, msg.author.id)?;
    let link = VoiceLink::from_context(ctx).await?;

    let session = LoopSession::new(name, titles, requester(msg))?;
    let progress = session.progress();

    match bot
        .player
        .start_loop(&link, guild_id, msg.channel_id, voice_channel, session)
        .await?
    {
        LoopStart::Started => {
            send_embed(ctx, msg.channel_id, embeds::loop_started_embed(&progress)).await
        }
        LoopStart::AlreadyRunning => {
            reply(ctx, msg.channel_id, "🎰 Ya hay un loop activo; usa `stop` para terminarlo").await
        }
    }
}

async fn handle_ai(ctx: &Context, msg: &Message, bot: &MusicBot) -> Result<()> {
    let summary = bot.player.history().summary();
    let learner = bot.player.learner();
    let embed = embeds::ai_report_embed(summary.as_ref(), learner.len(), learner.trusted_count());
    send_embed(ctx, msg.channel_id, embed).await
}

fn requester(msg: &Message) -> Requester {
    Requester {
        id: msg.author.id,
        name: msg.author.name.clone(),
    }
}

/// Canal de voz en el que está el usuario según la caché
fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or(MusicError::NotInVoiceChannel)?;

    Ok(channel_id)
}

pub async fn reply(ctx: &Context, channel: ChannelId, text: impl Into<String>) -> Result<()> {
    channel.say(&ctx.http, text).await?;
    Ok(())
}

pub async fn send_embed(ctx: &Context, channel: ChannelId, embed: CreateEmbed) -> Result<()> {
    channel
        .send_message(&ctx.http, CreateMessage::new().embed(embed))
        .await?;
    Ok(())
}
