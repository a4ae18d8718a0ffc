use serenity::async_trait;
use songbird::{
    tracks::PlayMode, Call, Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler,
    TrackEvent,
};
use std::time::Instant;
use tracing::{debug, error};

use crate::audio::{
    controller::PlaybackEvent,
    player::{AudioPlayer, QueueRef, VoiceLink},
};

#[derive(Debug, Clone, Copy)]
enum TrackPhase {
    Started,
    Ended,
    Errored,
}

/// Reenvía los eventos de tracks de songbird al controlador del guild
pub struct TrackEventRelay {
    player: AudioPlayer,
    link: VoiceLink,
    target: QueueRef,
    phase: TrackPhase,
}

#[async_trait]
impl VoiceEventHandler for TrackEventRelay {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        let EventContext::Track(track_list) = ctx else {
            return None;
        };
        let &[(state, handle), ..] = *track_list else {
            return None;
        };

        let event = match self.phase {
            TrackPhase::Started => PlaybackEvent::TrackStarted { at: Instant::now() },
            TrackPhase::Ended => PlaybackEvent::TrackEnded { at: Instant::now() },
            TrackPhase::Errored => {
                error!(
                    "❌ Error en track para guild {}: {:?}",
                    self.target.guild_id, state.playing
                );
                let reason = match &state.playing {
                    PlayMode::Errored(e) => format!("{:?}", e),
                    other => format!("estado inesperado {:?}", other),
                };
                PlaybackEvent::TrackErrored { reason }
            }
        };
        let handle = handle.clone();

        self.player
            .on_track_event(&self.link, self.target, handle, event)
            .await;

        None
    }
}

/// Registra los listeners globales de un `Call` para una cola.
///
/// Se llama una sola vez por cola; los eventos de colas anteriores se
/// descartan por generación.
pub fn register_track_events(
    call: &mut Call,
    player: &AudioPlayer,
    link: &VoiceLink,
    target: QueueRef,
) {
    let relay = |phase| TrackEventRelay {
        player: player.clone(),
        link: link.clone(),
        target,
        phase,
    };

    call.add_global_event(VoiceEvent::Track(TrackEvent::Playable), relay(TrackPhase::Started));
    call.add_global_event(VoiceEvent::Track(TrackEvent::End), relay(TrackPhase::Ended));
    call.add_global_event(VoiceEvent::Track(TrackEvent::Error), relay(TrackPhase::Errored));

    debug!("🎧 Relay de eventos registrado para guild {}", target.guild_id);
}
