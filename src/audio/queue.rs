use dashmap::{mapref::entry::Entry, DashMap};
use rand::seq::SliceRandom;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{tracks::TrackHandle, Call};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    audio::{
        controller::PlaybackState,
        loop_session::{LoopProgress, LoopSession},
    },
    config::Config,
    error::MusicError,
    sources::Track,
};

/// Volumen máximo aceptado por `!volume`
pub const MAX_VOLUME: u8 = 10;

/// Parámetros con los que nace cada cola
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueDefaults {
    pub volume: u8,
    pub max_size: usize,
    pub early_end: Duration,
    pub max_consecutive_failures: u32,
}

impl QueueDefaults {
    pub fn from_config(config: &Config) -> Self {
        Self {
            volume: config.default_volume.min(MAX_VOLUME),
            max_size: config.max_queue_size,
            early_end: config.early_end(),
            max_consecutive_failures: config.max_consecutive_failures,
        }
    }
}

impl Default for QueueDefaults {
    fn default() -> Self {
        Self {
            volume: 5,
            max_size: 100,
            early_end: Duration::from_secs(5),
            max_consecutive_failures: 3,
        }
    }
}

/// Handles de voz que pertenecen en exclusiva a una cola
pub struct VoiceConnection {
    pub call: Arc<Mutex<Call>>,
    pub current: Option<TrackHandle>,
}

/// Estado mutable de un guild con música activa.
///
/// `songs[0]` es siempre el track actual mientras hay reproducción.
pub struct GuildQueue {
    pub guild_id: GuildId,
    /// Identifica esta instancia frente a colas anteriores del mismo guild
    pub generation: u64,
    pub text_channel: ChannelId,
    pub voice_channel: ChannelId,
    pub(crate) songs: VecDeque<Track>,
    pub(crate) volume: u8,
    pub(crate) repeat: bool,
    pub(crate) listeners_attached: bool,
    pub(crate) connected: bool,
    pub(crate) state: PlaybackState,
    pub(crate) defaults: QueueDefaults,
    pub(crate) next_ticket: u64,
    pub(crate) early_retry_used: bool,
    pub(crate) skip_pending: bool,
    pub(crate) consecutive_failures: u32,
    pub(crate) loop_session: Option<LoopSession>,
    pub connection: Option<VoiceConnection>,
}

impl GuildQueue {
    pub fn new(
        guild_id: GuildId,
        generation: u64,
        text_channel: ChannelId,
        voice_channel: ChannelId,
        defaults: QueueDefaults,
    ) -> Self {
        Self {
            guild_id,
            generation,
            text_channel,
            voice_channel,
            songs: VecDeque::new(),
            volume: defaults.volume,
            repeat: false,
            listeners_attached: false,
            connected: false,
            state: PlaybackState::Idle,
            defaults,
            next_ticket: 0,
            early_retry_used: false,
            skip_pending: false,
            consecutive_failures: 0,
            loop_session: None,
            connection: None,
        }
    }

    /// Agrega un track al final de la cola
    pub fn push(&mut self, track: Track) -> Result<usize, MusicError> {
        if self.songs.len() >= self.defaults.max_size {
            return Err(MusicError::QueueFull(self.defaults.max_size));
        }

        info!("➕ Agregado a la cola: {}", track.title);
        self.songs.push_back(track);
        Ok(self.songs.len())
    }

    pub fn current(&self) -> Option<&Track> {
        self.songs.front()
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Volumen en la escala de songbird (1.0 = original)
    pub fn gain(&self) -> f32 {
        f32::from(self.volume) / f32::from(MAX_VOLUME)
    }

    /// Cambia el volumen; fuera de rango no modifica nada
    pub fn set_volume(&mut self, volume: u8) -> Result<u8, MusicError> {
        if volume > MAX_VOLUME {
            return Err(MusicError::VolumeOutOfRange {
                given: i64::from(volume),
                max: MAX_VOLUME,
            });
        }
        self.volume = volume;
        info!("🔊 Volumen ajustado a {}/{}", volume, MAX_VOLUME);
        Ok(volume)
    }

    pub fn repeat(&self) -> bool {
        self.repeat
    }

    /// Activa/desactiva la repetición del track actual
    pub fn toggle_repeat(&mut self) -> bool {
        self.repeat = !self.repeat;
        if self.repeat {
            info!("🔂 Repetir canción activado");
        } else {
            info!("➡️ Repetición desactivada");
        }
        self.repeat
    }

    /// Mezcla los tracks pendientes sin mover el actual
    pub fn shuffle_upcoming(&mut self) -> usize {
        if self.songs.len() < 3 {
            return self.songs.len().saturating_sub(1);
        }

        let mut upcoming: Vec<_> = self.songs.drain(1..).collect();
        upcoming.shuffle(&mut rand::thread_rng());
        let count = upcoming.len();
        self.songs.extend(upcoming);
        info!("🔀 Cola mezclada ({} canciones)", count);
        count
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn loop_progress(&self) -> Option<LoopProgress> {
        self.loop_session.as_ref().map(LoopSession::progress)
    }

    /// Copia de solo lectura para los embeds
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            current: self.songs.front().cloned(),
            upcoming: self.songs.iter().skip(1).cloned().collect(),
            volume: self.volume,
            repeat: self.repeat,
            state: self.state.label(),
            loop_progress: self.loop_progress(),
        }
    }
}

/// Vista inmutable de una cola
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub current: Option<Track>,
    pub upcoming: Vec<Track>,
    pub volume: u8,
    pub repeat: bool,
    pub state: &'static str,
    pub loop_progress: Option<LoopProgress>,
}

/// Interpreta el argumento de `!volume`
pub fn parse_volume(input: &str) -> Result<u8, MusicError> {
    let value: i64 = input
        .trim()
        .parse()
        .map_err(|_| MusicError::InvalidVolume(input.trim().to_string()))?;

    if !(0..=i64::from(MAX_VOLUME)).contains(&value) {
        return Err(MusicError::VolumeOutOfRange {
            given: value,
            max: MAX_VOLUME,
        });
    }

    Ok(value as u8)
}

pub type SharedQueue = Arc<Mutex<GuildQueue>>;

struct QueueSlot {
    generation: u64,
    queue: SharedQueue,
}

/// Mapa guild → cola; a lo sumo una cola por guild
#[derive(Default)]
pub struct QueueStore {
    queues: DashMap<GuildId, QueueSlot>,
    generations: AtomicU64,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Devuelve la cola del guild, creándola si no existe.
    ///
    /// El booleano indica si la cola se creó en esta llamada.
    pub fn get_or_create(
        &self,
        guild_id: GuildId,
        text_channel: ChannelId,
        voice_channel: ChannelId,
        defaults: QueueDefaults,
    ) -> (SharedQueue, bool) {
        match self.queues.entry(guild_id) {
            Entry::Occupied(slot) => (slot.get().queue.clone(), false),
            Entry::Vacant(slot) => {
                let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
                let queue = Arc::new(Mutex::new(GuildQueue::new(
                    guild_id,
                    generation,
                    text_channel,
                    voice_channel,
                    defaults,
                )));
                slot.insert(QueueSlot {
                    generation,
                    queue: queue.clone(),
                });
                debug!("🆕 Cola creada para guild {} (generación {})", guild_id, generation);
                (queue, true)
            }
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SharedQueue> {
        self.queues.get(&guild_id).map(|slot| slot.queue.clone())
    }

    /// Cola del guild solo si sigue siendo la misma instancia
    pub fn get_if_generation(&self, guild_id: GuildId, generation: u64) -> Option<SharedQueue> {
        self.queues
            .get(&guild_id)
            .filter(|slot| slot.generation == generation)
            .map(|slot| slot.queue.clone())
    }

    pub fn generation(&self, guild_id: GuildId) -> Option<u64> {
        self.queues.get(&guild_id).map(|slot| slot.generation)
    }

    pub fn remove(&self, guild_id: GuildId) -> Option<SharedQueue> {
        self.queues.remove(&guild_id).map(|(_, slot)| slot.queue)
    }

    /// Elimina la cola solo si no fue reemplazada por una más nueva
    pub fn remove_if_generation(&self, guild_id: GuildId, generation: u64) -> Option<SharedQueue> {
        self.queues
            .remove_if(&guild_id, |_, slot| slot.generation == generation)
            .map(|(_, slot)| slot.queue)
    }

    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.queues.contains_key(&guild_id)
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }
}
