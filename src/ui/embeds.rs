use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::{
    audio::{controller::Notice, loop_session::LoopProgress, queue::QueueSnapshot},
    cache::{duration::format_duration, HistorySummary},
    sources::{Track, TrackOrigin},
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
    pub const ACCENT_CYAN: Colour = Colour::from_rgb(23, 162, 184);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 No-Retry Music";

/// Canciones próximas listadas en `!queue`
const QUEUE_PREVIEW: usize = 10;

/// Ancho de la barra de progreso del loop
const LOOP_BAR_WIDTH: usize = 15;

fn base(title: impl Into<String>) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Convierte un aviso del controlador en el embed que se publica en el canal
pub fn notice_embed(notice: &Notice, progress: Option<&LoopProgress>) -> CreateEmbed {
    match notice {
        Notice::NowPlaying(track) => now_playing_embed(track, progress),
        Notice::Unresolvable { title, reason } => base("⏭️ Canción saltada")
            .description(format!(
                "No se pudo obtener un stream para **{}**.\nSe pasa a la siguiente sin reintentar.",
                title
            ))
            .field("Motivo", truncate(reason, 1000), false)
            .color(colors::WARNING_ORANGE),
        Notice::PlayerError { title, reason } => base("❌ Error de reproducción")
            .description(format!("**{}** falló durante la reproducción.", title))
            .field("Motivo", truncate(reason, 1000), false)
            .color(colors::ERROR_RED),
        Notice::Aborted { failures, reason } => base("🛑 Reproducción detenida")
            .description(format!(
                "Se acumularon **{}** fallos seguidos; la cola se vació y el bot salió del canal.",
                failures
            ))
            .field("Último error", truncate(reason, 1000), false)
            .color(colors::ERROR_RED),
        Notice::Finished => base("✅ Cola terminada")
            .description("No quedan canciones. ¡Hasta la próxima! 👋")
            .color(colors::NEUTRAL_GRAY),
    }
}

/// Embed de "reproduciendo ahora"; con loop activo agrega su estado
pub fn now_playing_embed(track: &Track, progress: Option<&LoopProgress>) -> CreateEmbed {
    let mut embed = base("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", &track.duration, true)
        .field("👤 Solicitado por", format!("<@{}>", track.requested_by.id), true)
        .url(&track.url);

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    if let (TrackOrigin::Loop, Some(progress)) = (track.origin, progress) {
        embed = embed
            .field("🎰 Loop", loop_status(progress), false)
            .color(colors::MUSIC_PURPLE);
    }

    embed
}

fn loop_status(progress: &LoopProgress) -> String {
    format!(
        "**{}** • {}/{} ({}%)\n`{}`\n🎶 {} canciones • ⏱️ {} reproducidos • 🕐 {} min de sesión",
        progress.playlist,
        progress.played,
        progress.total,
        progress.percent,
        progress_bar(progress.played, progress.total, LOOP_BAR_WIDTH),
        progress.songs_played,
        format_duration(progress.total_play_secs),
        progress.session_minutes,
    )
}

pub fn track_added_embed(track: &Track, position: usize) -> CreateEmbed {
    let mut embed = base("➕ Agregado a la cola")
        .description(format!("**{}**", track.title))
        .color(colors::INFO_BLUE)
        .field("⏱️ Duración", &track.duration, true)
        .field("📋 Posición", position.to_string(), true)
        .url(&track.url);

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
}

/// Crea un embed para mostrar la cola de reproducción
pub fn queue_embed(snapshot: &QueueSnapshot) -> CreateEmbed {
    let mut embed = base("📋 Cola de Reproducción").color(colors::INFO_BLUE);

    match &snapshot.current {
        Some(current) => {
            let status = if snapshot.repeat { "🔂" } else { "▶️" };
            embed = embed.field(
                format!("{} Actual ({})", status, snapshot.state),
                format!("**{}** `[{}]`", current.title, current.duration),
                false,
            );
        }
        None => {
            return embed
                .description("😴 **La cola está vacía**")
                .color(colors::NEUTRAL_GRAY);
        }
    }

    if !snapshot.upcoming.is_empty() {
        let mut description = String::new();
        for (i, track) in snapshot.upcoming.iter().take(QUEUE_PREVIEW).enumerate() {
            description.push_str(&format!("**{}**. {} `[{}]`\n", i + 1, track.title, track.duration));
        }
        let hidden = snapshot.upcoming.len().saturating_sub(QUEUE_PREVIEW);
        if hidden > 0 {
            description.push_str(&format!("… y {} más", hidden));
        }
        embed = embed.field("Próximas canciones", description, false);
    }

    let mut info = format!(
        "**Total:** {} canciones • **Volumen:** {}/10",
        snapshot.upcoming.len() + 1,
        snapshot.volume
    );
    if snapshot.repeat {
        info.push_str(" • 🔂 **Repetir**");
    }
    embed = embed.field("Información", info, false);

    if let Some(progress) = &snapshot.loop_progress {
        embed = embed.field("🎰 Loop", loop_status(progress), false);
    }

    embed
}

/// Crea un embed de volumen con indicador visual
pub fn volume_embed(volume: u8) -> CreateEmbed {
    let status_emoji = match volume {
        0 => "🔇",
        1..=4 => "🔉",
        _ => "🔊",
    };

    base(format!("{} Control de Volumen", status_emoji))
        .description(format!("**Volumen actual: {}/10**", volume))
        .field(
            "📊 Nivel",
            format!("`[{}]`", progress_bar(volume as usize, 10, 20)),
            false,
        )
        .color(colors::INFO_BLUE)
}

pub fn repeat_embed(enabled: bool) -> CreateEmbed {
    if enabled {
        base("🔂 Repetir activado")
            .description("La canción actual se repetirá al terminar.")
            .color(colors::ACCENT_CYAN)
    } else {
        base("▶️ Repetir desactivado")
            .description("La cola sigue su orden normal.")
            .color(colors::NEUTRAL_GRAY)
    }
}

pub fn loop_started_embed(progress: &LoopProgress) -> CreateEmbed {
    base("🎰 Loop iniciado")
        .description(format!(
            "Reproduciendo **{}** en orden aleatorio ({} canciones).\nCada canción sale una vez por ciclo.",
            progress.playlist, progress.total
        ))
        .color(colors::MUSIC_PURPLE)
}

/// Informe de `!ai`: historial de reproducciones y aprendizaje de duraciones
pub fn ai_report_embed(
    summary: Option<&HistorySummary>,
    learned: usize,
    trusted: usize,
) -> CreateEmbed {
    let mut embed = base("🧠 Análisis de reproducción").color(colors::ACCENT_CYAN);

    let Some(summary) = summary else {
        return embed
            .description("Todavía no hay reproducciones registradas.")
            .field("📚 Duraciones aprendidas", format!("{} ({} confiables)", learned, trusted), false)
            .color(colors::NEUTRAL_GRAY);
    };

    embed = embed
        .field("🎶 Reproducciones", summary.total.to_string(), true)
        .field(
            "📈 Promedio (últimas 10)",
            format!("{}%", summary.recent_average),
            true,
        )
        .field(
            "📚 Duraciones aprendidas",
            format!("{} ({} confiables)", learned, trusted),
            true,
        );

    if let Some(last) = &summary.last {
        let expected = last.estimated_secs.unwrap_or(last.expected_secs);
        embed = embed.field(
            "🕐 Última",
            format!(
                "**{}**\n{} de {} • {}%\n`[{}]`",
                last.title,
                format_duration(last.played_secs),
                format_duration(expected),
                last.percent,
                progress_bar(last.percent.min(100) as usize, 100, 20),
            ),
            false,
        );
    }

    embed
}

pub fn help_embed(prefix: &str) -> CreateEmbed {
    let commands = [
        ("play, p", "<canción|url>", "Busca y agrega una canción"),
        ("skip, s", "", "Salta la canción actual"),
        ("stop", "", "Detiene todo y sale del canal"),
        ("queue, q", "", "Muestra la cola"),
        ("volume, vol", "[0-10]", "Consulta o cambia el volumen"),
        ("repeat, loop", "", "Repite la canción actual"),
        ("nowplaying, np", "", "Muestra la canción actual"),
        ("shuffle", "", "Mezcla las próximas canciones"),
        ("askloop, ask", "[playlist]", "Reproduce una playlist al azar sin fin"),
        ("ai", "", "Estadísticas de reproducción"),
        ("help, h", "", "Muestra esta ayuda"),
    ];

    let description = commands
        .iter()
        .map(|(names, args, what)| {
            let first = names.split(',').next().unwrap_or(names);
            format!("`{}{} {}` ({}) • {}", prefix, first, args, names, what)
        })
        .collect::<Vec<_>>()
        .join("\n");

    base("🎵 No-Retry Music - Comandos")
        .description(description)
        .field(
            "⚙️ Política",
            "Si una canción no se puede reproducir se salta sin reintentar.",
            false,
        )
        .color(colors::INFO_BLUE)
}

/// Crea un embed de error
pub fn error_embed(title: &str, description: &str) -> CreateEmbed {
    base(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
}

/// Barra de texto de `width` segmentos con `done` de `total` completados
pub fn progress_bar(done: usize, total: usize, width: usize) -> String {
    let filled = if total == 0 {
        0
    } else {
        (done.min(total) * width + total / 2) / total
    };
    "█".repeat(filled) + &"░".repeat(width - filled)
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0, 10, 10), "░░░░░░░░░░");
        assert_eq!(progress_bar(5, 10, 10), "█████░░░░░");
        assert_eq!(progress_bar(10, 10, 10), "██████████");
        assert_eq!(progress_bar(2, 4, 15).chars().count(), 15);
    }

    #[test]
    fn test_progress_bar_clamps() {
        assert_eq!(progress_bar(20, 10, 4), "████");
        assert_eq!(progress_bar(3, 0, 4), "░░░░");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("corto", 10), "corto");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }
}
