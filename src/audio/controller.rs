//! Playback state machine for one guild.
//!
//! [`GuildQueue::handle_event`] is the only place where playback state
//! changes. It performs no I/O: it returns the [`PlaybackAction`]s the driver
//! in [`crate::audio::player`] must execute, which keeps every transition
//! testable without a voice connection.
//!
//! ```text
//! Idle ─Enqueued→ Connecting ─Connected→ Resolving ─StreamReady→ Starting
//!                                  ↑                                 │
//!                                  └──── TrackEnded / Skip ◀─ Playing ◀┘
//! ```

use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{loop_session::LoopSession, queue::GuildQueue},
    cache::{
        duration::{parse_duration, DurationLearner},
        PlayHistory, PlayReport,
    },
    sources::{Requester, Track},
};

/// Duración supuesta cuando ni la plataforma ni la caché la conocen
pub const FALLBACK_EXPECTED_SECS: u64 = 180;

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackState {
    Idle,
    Connecting,
    Resolving { ticket: u64 },
    Starting { ticket: u64, provider: &'static str },
    Playing { started_at: Instant, provider: &'static str },
    Errored,
}

impl PlaybackState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "inactivo",
            Self::Connecting => "conectando",
            Self::Resolving { .. } => "buscando stream",
            Self::Starting { .. } => "iniciando",
            Self::Playing { .. } => "reproduciendo",
            Self::Errored => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// La conexión de voz terminó de establecerse (o se agotó la espera)
    Connected { ready: bool },
    /// Se agregó al menos un track
    Enqueued,
    StreamReady { ticket: u64, provider: &'static str },
    ResolveFailed { ticket: u64, reason: String },
    TrackStarted { at: Instant },
    TrackEnded { at: Instant },
    TrackErrored { reason: String },
    LoopRefillFailed { reason: String },
    Skip,
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolveRequest {
    pub ticket: u64,
    pub track: Track,
    /// Fuente a evitar (la que produjo un stream demasiado corto)
    pub exclude: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    NowPlaying(Track),
    Unresolvable { title: String, reason: String },
    PlayerError { title: String, reason: String },
    Aborted { failures: u32, reason: String },
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackAction {
    Resolve(ResolveRequest),
    /// Registrar los listeners de songbird; se emite una sola vez por cola
    AttachListeners,
    Play { ticket: u64 },
    StopCurrent,
    /// Buscar el siguiente track del loop
    Refill,
    Announce(Notice),
    /// Cerrar la conexión y eliminar la cola
    Teardown,
}

impl GuildQueue {
    pub fn handle_event(
        &mut self,
        event: PlaybackEvent,
        learner: &DurationLearner,
        history: &PlayHistory,
    ) -> Vec<PlaybackAction> {
        debug!("🎛️ Guild {} [{}] ← {:?}", self.guild_id, self.state.label(), event);

        match event {
            PlaybackEvent::Enqueued => self.on_enqueued(),
            PlaybackEvent::Connected { ready } => self.on_connected(ready),
            PlaybackEvent::StreamReady { ticket, provider } => self.on_stream_ready(ticket, provider),
            PlaybackEvent::ResolveFailed { ticket, reason } => match self.state {
                PlaybackState::Resolving { ticket: pending } if pending == ticket => {
                    let title = self.current_title();
                    let notice = Notice::Unresolvable {
                        title,
                        reason: reason.clone(),
                    };
                    self.fail_current(notice, reason)
                }
                _ => {
                    debug!("🗑️ Resultado de resolución obsoleto (ticket {}) descartado", ticket);
                    Vec::new()
                }
            },
            PlaybackEvent::TrackStarted { at } => self.on_track_started(at),
            PlaybackEvent::TrackEnded { at } => self.on_track_ended(at, learner, history),
            PlaybackEvent::TrackErrored { reason } => match self.state {
                PlaybackState::Playing { .. } | PlaybackState::Starting { .. } => {
                    let title = self.current_title();
                    let notice = Notice::PlayerError {
                        title,
                        reason: reason.clone(),
                    };
                    self.fail_current(notice, reason)
                }
                _ => Vec::new(),
            },
            PlaybackEvent::LoopRefillFailed { reason } => self.on_refill_failed(reason),
            PlaybackEvent::Skip => self.on_skip(),
            PlaybackEvent::Stop => self.on_stop(),
        }
    }

    /// Activa el modo loop; pide el primer track si no hay nada sonando
    pub fn start_loop(&mut self, session: LoopSession) -> Vec<PlaybackAction> {
        info!("🎰 Loop '{}' activado en guild {}", session.playlist(), self.guild_id);
        self.loop_session = Some(session);

        if self.connected && self.songs.is_empty() && self.state == PlaybackState::Idle {
            vec![PlaybackAction::Refill]
        } else {
            Vec::new()
        }
    }

    /// Saca el siguiente título del loop activo junto con su solicitante
    pub fn next_loop_pick(&mut self) -> Option<(String, Requester)> {
        let session = self.loop_session.as_mut()?;
        let title = session.next_pick(&mut rand::thread_rng());
        Some((title, session.requester().clone()))
    }

    fn on_enqueued(&mut self) -> Vec<PlaybackAction> {
        match self.state {
            PlaybackState::Idle if self.connected => self.start_next(),
            PlaybackState::Idle => {
                self.state = PlaybackState::Connecting;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn on_connected(&mut self, ready: bool) -> Vec<PlaybackAction> {
        self.connected = true;
        if !ready {
            warn!(
                "⚠️ La conexión de voz en guild {} no confirmó a tiempo, continuando igualmente",
                self.guild_id
            );
        }

        match self.state {
            PlaybackState::Connecting | PlaybackState::Idle => self.start_next(),
            _ => Vec::new(),
        }
    }

    fn on_stream_ready(&mut self, ticket: u64, provider: &'static str) -> Vec<PlaybackAction> {
        match self.state {
            PlaybackState::Resolving { ticket: pending } if pending == ticket => {
                self.state = PlaybackState::Starting { ticket, provider };

                let mut actions = Vec::with_capacity(2);
                if !self.listeners_attached {
                    self.listeners_attached = true;
                    actions.push(PlaybackAction::AttachListeners);
                }
                actions.push(PlaybackAction::Play { ticket });
                actions
            }
            _ => {
                debug!("🗑️ Stream obsoleto de {} (ticket {}) descartado", provider, ticket);
                Vec::new()
            }
        }
    }

    fn on_track_started(&mut self, at: Instant) -> Vec<PlaybackAction> {
        let PlaybackState::Starting { provider, .. } = self.state else {
            return Vec::new();
        };

        self.state = PlaybackState::Playing {
            started_at: at,
            provider,
        };

        match self.songs.front() {
            // El reintento por final prematuro no se anuncia otra vez
            Some(track) if !self.early_retry_used => {
                info!("▶️ Reproduciendo: {}", track.title);
                vec![PlaybackAction::Announce(Notice::NowPlaying(track.clone()))]
            }
            _ => Vec::new(),
        }
    }

    fn on_track_ended(
        &mut self,
        at: Instant,
        learner: &DurationLearner,
        history: &PlayHistory,
    ) -> Vec<PlaybackAction> {
        let (played, provider) = match self.state {
            PlaybackState::Playing {
                started_at,
                provider,
            } => (at.saturating_duration_since(started_at), provider),
            PlaybackState::Starting { provider, .. } => (Duration::ZERO, provider),
            _ => return Vec::new(),
        };

        if self.skip_pending {
            self.skip_pending = false;
            info!("⏭️ Track saltado tras {}s", played.as_secs());
            self.songs.pop_front();
            return self.start_next();
        }

        let Some(track) = self.songs.front().cloned() else {
            return self.start_next();
        };

        let expected = learner
            .estimate(&track)
            .unwrap_or(FALLBACK_EXPECTED_SECS);

        if played < self.defaults.early_end
            && expected > self.defaults.early_end.as_secs()
            && !self.early_retry_used
        {
            warn!(
                "⚡ '{}' terminó a los {}s (se esperaban {}s), reintentando sin {}",
                track.title,
                played.as_secs(),
                expected,
                provider
            );
            self.early_retry_used = true;
            return vec![self.request_resolution(track, Some(provider))];
        }

        self.learn(&track, played.as_secs(), learner, history);
        self.consecutive_failures = 0;

        if self.repeat {
            info!("🔂 Repitiendo: {}", track.title);
            self.start_current()
        } else {
            self.songs.pop_front();
            self.start_next()
        }
    }

    fn learn(&mut self, track: &Track, played_secs: u64, learner: &DurationLearner, history: &PlayHistory) {
        let platform = parse_duration(&track.duration).unwrap_or(FALLBACK_EXPECTED_SECS);
        let media_id = track.media_id();
        let learned = media_id
            .as_deref()
            .and_then(|id| learner.get(id))
            .filter(|record| record.is_trusted())
            .map(|record| record.observed_secs);

        let report = PlayReport::new(&track.title, played_secs, platform, learned);
        info!("🏁 '{}' terminó ({}s, {}%)", track.title, played_secs, report.percent);
        history.push(report);

        if let Some(id) = media_id {
            learner.record(&id, played_secs, platform);
        }
        if let Some(session) = self.loop_session.as_mut() {
            session.record_play(played_secs);
        }
    }

    fn on_skip(&mut self) -> Vec<PlaybackAction> {
        match self.state {
            PlaybackState::Playing { .. } | PlaybackState::Starting { .. } => {
                self.skip_pending = true;
                vec![PlaybackAction::StopCurrent]
            }
            PlaybackState::Resolving { .. } => {
                // La resolución en curso queda obsoleta por su ticket
                self.songs.pop_front();
                self.start_next()
            }
            _ => Vec::new(),
        }
    }

    fn on_stop(&mut self) -> Vec<PlaybackAction> {
        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
        self.songs.clear();
        self.loop_session = None;
        self.skip_pending = false;
        self.state = PlaybackState::Idle;
        vec![PlaybackAction::StopCurrent, PlaybackAction::Teardown]
    }

    fn on_refill_failed(&mut self, reason: String) -> Vec<PlaybackAction> {
        if self.loop_session.is_none() {
            return Vec::new();
        }

        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.defaults.max_consecutive_failures {
            return self.abort(reason);
        }

        warn!(
            "🎰 Falló la búsqueda del loop ({}/{}): {}",
            self.consecutive_failures, self.defaults.max_consecutive_failures, reason
        );
        if self.songs.is_empty() && self.state == PlaybackState::Idle {
            vec![PlaybackAction::Refill]
        } else {
            Vec::new()
        }
    }

    /// Descarta el track actual tras un fallo; nunca se repite
    fn fail_current(&mut self, notice: Notice, reason: String) -> Vec<PlaybackAction> {
        self.consecutive_failures += 1;
        self.skip_pending = false;

        if self.consecutive_failures >= self.defaults.max_consecutive_failures {
            return self.abort(reason);
        }

        warn!(
            "❌ Fallo {}/{} en guild {}: {}",
            self.consecutive_failures, self.defaults.max_consecutive_failures, self.guild_id, reason
        );
        self.songs.pop_front();

        let mut actions = vec![PlaybackAction::Announce(notice)];
        actions.extend(self.start_next());
        actions
    }

    fn abort(&mut self, reason: String) -> Vec<PlaybackAction> {
        error!(
            "🛑 Cola de guild {} abortada tras {} fallos seguidos: {}",
            self.guild_id, self.consecutive_failures, reason
        );
        self.songs.clear();
        self.loop_session = None;
        self.state = PlaybackState::Errored;

        vec![
            PlaybackAction::StopCurrent,
            PlaybackAction::Announce(Notice::Aborted {
                failures: self.consecutive_failures,
                reason,
            }),
            PlaybackAction::Teardown,
        ]
    }

    fn start_next(&mut self) -> Vec<PlaybackAction> {
        if self.songs.is_empty() {
            return self.finish();
        }
        self.start_current()
    }

    fn start_current(&mut self) -> Vec<PlaybackAction> {
        match self.songs.front().cloned() {
            Some(track) => {
                self.early_retry_used = false;
                vec![self.request_resolution(track, None)]
            }
            None => self.finish(),
        }
    }

    fn request_resolution(&mut self, track: Track, exclude: Option<&'static str>) -> PlaybackAction {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.state = PlaybackState::Resolving { ticket };
        PlaybackAction::Resolve(ResolveRequest {
            ticket,
            track,
            exclude,
        })
    }

    fn finish(&mut self) -> Vec<PlaybackAction> {
        self.state = PlaybackState::Idle;

        if self.loop_session.is_some() {
            info!("🎰 Cola vacía, pidiendo el siguiente track del loop");
            return vec![PlaybackAction::Refill];
        }

        info!("📭 Cola vacía en guild {}, desconectando", self.guild_id);
        vec![
            PlaybackAction::Announce(Notice::Finished),
            PlaybackAction::Teardown,
        ]
    }

    fn current_title(&self) -> String {
        self.songs
            .front()
            .map(|t| t.title.clone())
            .unwrap_or_default()
    }
}
