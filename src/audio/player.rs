use serenity::{
    builder::{CreateEmbed, CreateMessage},
    http::Http,
    model::id::{ChannelId, GuildId},
    prelude::Context,
};
use songbird::{input::Input, tracks::TrackHandle, Songbird};
use std::{future::Future, pin::Pin, sync::Arc, time::Duration};
use tokio::{sync::OwnedMutexGuard, time::timeout};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        controller::{PlaybackAction, PlaybackEvent, PlaybackState, ResolveRequest},
        loop_session::{LoopSession, LOOP_GAP},
        queue::{GuildQueue, QueueDefaults, QueueSnapshot, QueueStore, VoiceConnection},
    },
    bot::events::register_track_events,
    cache::{DurationLearner, PlayHistory},
    config::Config,
    error::MusicError,
    sources::{Requester, StreamResolver, Track, TrackOrigin, YouTubeClient},
    ui::embeds,
};

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Acceso a Discord necesario para ejecutar acciones de reproducción
#[derive(Clone)]
pub struct VoiceLink {
    pub http: Arc<Http>,
    pub songbird: Arc<Songbird>,
}

impl VoiceLink {
    pub async fn from_context(ctx: &Context) -> Result<Self, MusicError> {
        let songbird = songbird::get(ctx)
            .await
            .ok_or(MusicError::VoiceManagerMissing)?;
        Ok(Self {
            http: ctx.http.clone(),
            songbird,
        })
    }
}

/// Identifica una instancia concreta de la cola de un guild
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueRef {
    pub guild_id: GuildId,
    pub generation: u64,
}

/// Resultado de `!askloop`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStart {
    Started,
    AlreadyRunning,
}

/// Efectos que se ejecutan después de soltar el lock de la cola
enum Followup {
    Send {
        channel: ChannelId,
        embed: CreateEmbed,
    },
    Teardown { connection: Option<VoiceConnection> },
}

/// Ejecuta las acciones del controlador contra songbird y Discord.
#[derive(Clone)]
pub struct AudioPlayer {
    store: Arc<QueueStore>,
    resolver: Arc<StreamResolver<Input>>,
    search: Arc<YouTubeClient>,
    learner: Arc<DurationLearner>,
    history: Arc<PlayHistory>,
    defaults: QueueDefaults,
    connect_timeout: Duration,
}

impl AudioPlayer {
    pub fn new(config: &Config, resolver: StreamResolver<Input>, search: YouTubeClient) -> Self {
        Self {
            store: Arc::new(QueueStore::new()),
            resolver: Arc::new(resolver),
            search: Arc::new(search),
            learner: Arc::new(DurationLearner::new(
                config.duration_cache_capacity,
                config.duration_cache_trim,
            )),
            history: Arc::new(PlayHistory::new()),
            defaults: QueueDefaults::from_config(config),
            connect_timeout: config.connect_timeout(),
        }
    }

    pub fn history(&self) -> &PlayHistory {
        &self.history
    }

    pub fn learner(&self) -> &DurationLearner {
        &self.learner
    }

    pub fn active_queues(&self) -> usize {
        self.store.len()
    }

    pub fn has_queue(&self, guild_id: GuildId) -> bool {
        self.store.contains(guild_id)
    }

    pub async fn search(&self, query: &str, requester: Requester) -> Result<Track, MusicError> {
        self.search.search(query, requester).await
    }

    /// Versión de yt-dlp, o error si el binario no responde
    pub async fn verify_sources(&self) -> anyhow::Result<String> {
        self.search.verify().await
    }

    /// Agrega un track; la primera vez también conecta al canal de voz.
    ///
    /// Devuelve la posición en la cola (1 = sonando ahora).
    pub async fn enqueue(
        &self,
        link: &VoiceLink,
        guild_id: GuildId,
        text_channel: ChannelId,
        voice_channel: ChannelId,
        track: Track,
    ) -> Result<usize, MusicError> {
        let (target, position, followups, created) = {
            let (mut q, created) = self.lock_live(guild_id, text_channel, voice_channel).await;
            let target = QueueRef {
                guild_id,
                generation: q.generation,
            };

            let position = match q.push(track) {
                Ok(position) => position,
                Err(e) => {
                    if created {
                        self.store.remove_if_generation(guild_id, target.generation);
                    }
                    return Err(e);
                }
            };

            let actions = q.handle_event(PlaybackEvent::Enqueued, &self.learner, &self.history);
            let followups = self.run_actions(link, &mut q, actions, None).await;
            (target, position, followups, created)
        };
        self.run_followups(link, guild_id, followups).await;

        if created {
            self.connect(link, target, voice_channel).await?;
        }

        Ok(position)
    }

    /// Activa el modo loop en el guild, creando la cola si hace falta
    pub async fn start_loop(
        &self,
        link: &VoiceLink,
        guild_id: GuildId,
        text_channel: ChannelId,
        voice_channel: ChannelId,
        session: LoopSession,
    ) -> Result<LoopStart, MusicError> {
        let (target, followups, created) = {
            let (mut q, created) = self.lock_live(guild_id, text_channel, voice_channel).await;
            if q.loop_session.is_some() {
                return Ok(LoopStart::AlreadyRunning);
            }

            let mut actions = q.start_loop(session);
            if created {
                actions.extend(q.handle_event(
                    PlaybackEvent::Enqueued,
                    &self.learner,
                    &self.history,
                ));
            }
            let followups = self.run_actions(link, &mut q, actions, None).await;
            (
                QueueRef {
                    guild_id,
                    generation: q.generation,
                },
                followups,
                created,
            )
        };
        self.run_followups(link, guild_id, followups).await;

        if created {
            self.connect(link, target, voice_channel).await?;
        }

        Ok(LoopStart::Started)
    }

    /// Bloquea la cola viva del guild, creándola si hace falta.
    ///
    /// Una cola retirada mientras se esperaba el lock no se devuelve: se
    /// vuelve a consultar el store y, si no hay cola, se crea una nueva.
    async fn lock_live(
        &self,
        guild_id: GuildId,
        text_channel: ChannelId,
        voice_channel: ChannelId,
    ) -> (OwnedMutexGuard<GuildQueue>, bool) {
        loop {
            let (queue, created) = self
                .store
                .get_or_create(guild_id, text_channel, voice_channel, self.defaults);
            let q = queue.lock_owned().await;
            if self.store.generation(guild_id) == Some(q.generation) {
                return (q, created);
            }
            debug!(
                "🗑️ Cola {} de guild {} retirada mientras esperábamos, reintentando",
                q.generation, guild_id
            );
        }
    }

    /// Une el bot al canal de voz con tiempo límite.
    ///
    /// Si la espera se agota se sigue con la llamada pendiente; si la unión
    /// falla la cola recién creada se elimina.
    async fn connect(
        &self,
        link: &VoiceLink,
        target: QueueRef,
        voice_channel: ChannelId,
    ) -> Result<(), MusicError> {
        info!("🔌 Conectando al canal de voz {} en guild {}", voice_channel, target.guild_id);

        let (call, ready) = match timeout(
            self.connect_timeout,
            link.songbird.join(target.guild_id, voice_channel),
        )
        .await
        {
            Ok(Ok(call)) => (call, true),
            Ok(Err(e)) => {
                error!("❌ No se pudo unir al canal de voz: {:?}", e);
                self.abandon(link, target).await;
                return Err(MusicError::Join(e));
            }
            Err(_) => match link.songbird.get(target.guild_id) {
                Some(call) => {
                    warn!(
                        "⏰ La conexión de voz tardó más de {}s, continuando de forma optimista",
                        self.connect_timeout.as_secs()
                    );
                    (call, false)
                }
                None => {
                    self.abandon(link, target).await;
                    return Err(MusicError::ConnectionUnavailable);
                }
            },
        };

        let connection = VoiceConnection {
            call,
            current: None,
        };
        let installed = self
            .drive(link, target, None, move |q, learner, history| {
                q.connection = Some(connection);
                q.handle_event(PlaybackEvent::Connected { ready }, learner, history)
            })
            .await;

        if !installed && !self.store.contains(target.guild_id) {
            // La cola se detuvo mientras conectábamos
            debug!("🔌 Cola eliminada durante la conexión, saliendo del canal");
            let _ = link.songbird.remove(target.guild_id).await;
        }

        Ok(())
    }

    async fn abandon(&self, link: &VoiceLink, target: QueueRef) {
        self.store
            .remove_if_generation(target.guild_id, target.generation);
        if !self.store.contains(target.guild_id) {
            let _ = link.songbird.remove(target.guild_id).await;
        }
    }

    /// Detiene todo antes de devolver: cola eliminada, track detenido y
    /// canal de voz abandonado.
    pub async fn stop(&self, link: &VoiceLink, guild_id: GuildId) -> Result<(), MusicError> {
        let queue = self.store.remove(guild_id).ok_or(MusicError::NoActiveQueue)?;

        let followups = {
            let mut q = queue.lock().await;
            let actions = q.handle_event(PlaybackEvent::Stop, &self.learner, &self.history);
            self.run_actions(link, &mut q, actions, None).await
        };
        self.run_followups(link, guild_id, followups).await;

        // Por si la conexión nunca llegó a instalarse en la cola
        if !self.store.contains(guild_id) && link.songbird.get(guild_id).is_some() {
            if let Err(e) = link.songbird.remove(guild_id).await {
                warn!("⚠️ Error al salir del canal de voz: {:?}", e);
            }
        }

        Ok(())
    }

    /// El bot fue desconectado del canal de voz desde fuera.
    ///
    /// `left_channel` es el canal que abandonó, si la caché lo conoce.
    pub async fn handle_disconnect(
        &self,
        link: &VoiceLink,
        guild_id: GuildId,
        left_channel: Option<ChannelId>,
    ) {
        let Some(queue) = self.store.get(guild_id) else {
            return;
        };

        {
            let q = queue.lock().await;
            // Una cola que todavía se está conectando no es la que se desconectó
            if q.state() == &PlaybackState::Connecting
                || left_channel.is_some_and(|channel| channel != q.voice_channel)
            {
                return;
            }
        }

        info!("🔌 Bot desconectado del canal de voz en guild {}, limpiando cola", guild_id);
        let _ = self.stop(link, guild_id).await;
    }

    /// Salta el track actual; devuelve el título saltado
    pub async fn skip(&self, link: &VoiceLink, guild_id: GuildId) -> Result<Option<String>, MusicError> {
        let queue = self.store.get(guild_id).ok_or(MusicError::NoActiveQueue)?;

        let (skipped, followups) = {
            let mut q = queue.lock().await;
            let current = q.current().map(|t| t.title.clone());
            let actions = q.handle_event(PlaybackEvent::Skip, &self.learner, &self.history);
            // Sin acciones no hubo nada que saltar (conectando o inactivo)
            let skipped = if actions.is_empty() { None } else { current };
            (skipped, self.run_actions(link, &mut q, actions, None).await)
        };
        self.run_followups(link, guild_id, followups).await;

        Ok(skipped)
    }

    pub async fn set_volume(&self, guild_id: GuildId, volume: u8) -> Result<u8, MusicError> {
        let queue = self.store.get(guild_id).ok_or(MusicError::NoActiveQueue)?;
        let mut q = queue.lock().await;
        let volume = q.set_volume(volume)?;

        let gain = q.gain();
        if let Some(handle) = q.connection.as_ref().and_then(|c| c.current.as_ref()) {
            let _ = handle.set_volume(gain);
        }
        Ok(volume)
    }

    pub async fn volume(&self, guild_id: GuildId) -> Result<u8, MusicError> {
        let queue = self.store.get(guild_id).ok_or(MusicError::NoActiveQueue)?;
        let volume = queue.lock().await.volume();
        Ok(volume)
    }

    pub async fn toggle_repeat(&self, guild_id: GuildId) -> Result<bool, MusicError> {
        let queue = self.store.get(guild_id).ok_or(MusicError::NoActiveQueue)?;
        let repeat = queue.lock().await.toggle_repeat();
        Ok(repeat)
    }

    pub async fn shuffle(&self, guild_id: GuildId) -> Result<usize, MusicError> {
        let queue = self.store.get(guild_id).ok_or(MusicError::NoActiveQueue)?;
        let shuffled = queue.lock().await.shuffle_upcoming();
        Ok(shuffled)
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> Result<QueueSnapshot, MusicError> {
        let queue = self.store.get(guild_id).ok_or(MusicError::NoActiveQueue)?;
        let snapshot = queue.lock().await.snapshot();
        Ok(snapshot)
    }

    /// Evento de songbird para el track `handle`; se ignora si ya no es el actual
    pub async fn on_track_event(
        &self,
        link: &VoiceLink,
        target: QueueRef,
        handle: TrackHandle,
        event: PlaybackEvent,
    ) {
        self.drive(link, target, None, move |q, learner, history| {
            let current = q
                .connection
                .as_ref()
                .and_then(|c| c.current.as_ref())
                .map(|h| h.uuid());
            if current != Some(handle.uuid()) {
                debug!("🗑️ Evento de un track anterior ignorado: {:?}", event);
                return Vec::new();
            }
            q.handle_event(event, learner, history)
        })
        .await;
    }

    /// Aplica `step` a la cola si sigue siendo la misma instancia.
    ///
    /// Devuelve `false` si la cola ya no existe (resultado obsoleto).
    async fn drive<F>(&self, link: &VoiceLink, target: QueueRef, stream: Option<Input>, step: F) -> bool
    where
        F: FnOnce(&mut GuildQueue, &DurationLearner, &PlayHistory) -> Vec<PlaybackAction> + Send,
    {
        let Some(queue) = self.store.get_if_generation(target.guild_id, target.generation) else {
            debug!(
                "🗑️ Cola {} de guild {} ya no existe, resultado descartado",
                target.generation, target.guild_id
            );
            return false;
        };

        let followups = {
            let mut q = queue.lock().await;
            if self.store.generation(target.guild_id) != Some(target.generation) {
                debug!("🗑️ Cola de guild {} eliminada mientras esperábamos", target.guild_id);
                return false;
            }
            let actions = step(&mut q, &self.learner, &self.history);
            self.run_actions(link, &mut q, actions, stream).await
        };
        self.run_followups(link, target.guild_id, followups).await;
        true
    }

    /// Ejecuta las acciones que necesitan la cola bloqueada
    async fn run_actions(
        &self,
        link: &VoiceLink,
        q: &mut GuildQueue,
        actions: Vec<PlaybackAction>,
        mut stream: Option<Input>,
    ) -> Vec<Followup> {
        let target = QueueRef {
            guild_id: q.guild_id,
            generation: q.generation,
        };
        let mut followups = Vec::new();

        for action in actions {
            match action {
                PlaybackAction::Resolve(request) => {
                    tokio::spawn(self.resolve_task(link.clone(), target, request));
                }
                PlaybackAction::AttachListeners => match q.connection.as_ref() {
                    Some(connection) => {
                        let mut call = connection.call.lock().await;
                        register_track_events(&mut call, self, link, target);
                        debug!("🎧 Listeners registrados para guild {}", target.guild_id);
                    }
                    None => warn!("⚠️ Sin conexión de voz para registrar listeners"),
                },
                PlaybackAction::Play { ticket } => {
                    let gain = q.gain();
                    match (stream.take(), q.connection.as_mut()) {
                        (Some(input), Some(connection)) => {
                            let handle = connection.call.lock().await.play_input(input);
                            let _ = handle.set_volume(gain);
                            connection.current = Some(handle);
                            debug!("▶️ Stream {} enviado al reproductor", ticket);
                        }
                        (None, _) => warn!("⚠️ Play {} sin stream disponible", ticket),
                        (_, None) => warn!("⚠️ Play {} sin conexión de voz", ticket),
                    }
                }
                PlaybackAction::StopCurrent => {
                    if let Some(handle) = q.connection.as_ref().and_then(|c| c.current.as_ref()) {
                        let _ = handle.stop();
                    }
                }
                PlaybackAction::Refill => {
                    tokio::spawn(self.refill_task(link.clone(), target));
                }
                PlaybackAction::Announce(notice) => {
                    let progress = q.loop_progress();
                    followups.push(Followup::Send {
                        channel: q.text_channel,
                        embed: embeds::notice_embed(&notice, progress.as_ref()),
                    });
                }
                PlaybackAction::Teardown => {
                    // Fuera del store antes de soltar el lock: un `play` concurrente
                    // crea una cola nueva en vez de reutilizar esta
                    self.store.remove_if_generation(q.guild_id, q.generation);
                    followups.push(Followup::Teardown {
                        connection: q.connection.take(),
                    });
                }
            }
        }

        followups
    }

    async fn run_followups(&self, link: &VoiceLink, guild_id: GuildId, mut followups: Vec<Followup>) {
        // Salir del canal antes de esperar a Discord con los avisos
        followups.sort_by_key(|f| match f {
            Followup::Teardown { .. } => 0,
            Followup::Send { .. } => 1,
        });

        for followup in followups {
            match followup {
                Followup::Send { channel, embed } => {
                    if let Err(e) = channel
                        .send_message(&link.http, CreateMessage::new().embed(embed))
                        .await
                    {
                        error!("Error al enviar aviso al canal {}: {:?}", channel, e);
                    }
                }
                Followup::Teardown { connection } => {
                    if let Some(handle) = connection.and_then(|c| c.current) {
                        let _ = handle.stop();
                    }

                    // Una cola nueva del mismo guild conserva su conexión
                    if !self.store.contains(guild_id) {
                        if let Err(e) = link.songbird.remove(guild_id).await {
                            debug!("Salida del canal de voz en guild {}: {:?}", guild_id, e);
                        }
                        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
                    }
                }
            }
        }
    }

    fn resolve_task(&self, link: VoiceLink, target: QueueRef, request: ResolveRequest) -> BoxedTask {
        let player = self.clone();
        Box::pin(async move {
            let ResolveRequest {
                ticket,
                track,
                exclude,
            } = request;

            let (event, stream) = match player.resolver.resolve(&track, exclude).await {
                Ok(resolved) => (
                    PlaybackEvent::StreamReady {
                        ticket,
                        provider: resolved.provider,
                    },
                    Some(resolved.stream),
                ),
                Err(e) => {
                    warn!("🚫 {}", e);
                    (
                        PlaybackEvent::ResolveFailed {
                            ticket,
                            reason: e.to_string(),
                        },
                        None,
                    )
                }
            };

            player
                .drive(&link, target, stream, move |q, learner, history| {
                    q.handle_event(event, learner, history)
                })
                .await;
        })
    }

    fn refill_task(&self, link: VoiceLink, target: QueueRef) -> BoxedTask {
        let player = self.clone();
        Box::pin(async move {
            tokio::time::sleep(LOOP_GAP).await;

            let Some(queue) = player
                .store
                .get_if_generation(target.guild_id, target.generation)
            else {
                return;
            };
            let Some((title, requester)) = queue.lock().await.next_loop_pick() else {
                return;
            };

            info!("🎰 Loop: buscando '{}'", title);
            let found = player
                .search
                .search(&LoopSession::search_query(&title), requester)
                .await;

            player
                .drive(&link, target, None, move |q, learner, history| {
                    if q.loop_session.is_none() {
                        return Vec::new();
                    }
                    let pushed = found.and_then(|track| {
                        q.push(
                            track
                                .with_origin(TrackOrigin::Loop)
                                .with_search_query(title.as_str()),
                        )
                    });
                    match pushed {
                        Ok(_) => q.handle_event(PlaybackEvent::Enqueued, learner, history),
                        Err(e) => q.handle_event(
                            PlaybackEvent::LoopRefillFailed {
                                reason: e.to_string(),
                            },
                            learner,
                            history,
                        ),
                    }
                })
                .await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audio::controller::Notice, sources::test_track};
    use std::sync::atomic::{AtomicBool, Ordering};

    const GUILD: GuildId = GuildId::new(1);
    const TEXT: ChannelId = ChannelId::new(10);
    const VOICE: ChannelId = ChannelId::new(20);

    fn player() -> AudioPlayer {
        AudioPlayer::new(
            &Config::default(),
            StreamResolver::<Input>::new(Duration::from_secs(1)),
            YouTubeClient::new("yt-dlp".to_string(), Duration::from_secs(1)),
        )
    }

    fn link() -> VoiceLink {
        VoiceLink {
            http: Arc::new(Http::new("")),
            songbird: Songbird::serenity(),
        }
    }

    /// Cola conectada y vacía: el siguiente `Connected` la da por terminada
    fn exhausted_actions(q: &mut GuildQueue, player: &AudioPlayer) -> Vec<PlaybackAction> {
        q.connected = true;
        q.handle_event(
            PlaybackEvent::Connected { ready: true },
            &player.learner,
            &player.history,
        )
    }

    #[tokio::test]
    async fn test_exhausted_queue_leaves_store_before_lock_is_released() {
        let player = player();
        let link = link();
        let (mut q, created) = player.lock_live(GUILD, TEXT, VOICE).await;
        assert!(created);
        let old_generation = q.generation;

        let actions = exhausted_actions(&mut q, &player);
        assert_eq!(
            actions,
            vec![
                PlaybackAction::Announce(Notice::Finished),
                PlaybackAction::Teardown
            ]
        );

        let followups = player.run_actions(&link, &mut q, actions, None).await;
        // Todavía con el lock tomado la cola ya no es visible
        assert!(!player.has_queue(GUILD));
        assert_eq!(followups.len(), 2);
        drop(q);

        assert!(matches!(
            player.snapshot(GUILD).await,
            Err(MusicError::NoActiveQueue)
        ));

        // Un `play` posterior crea una cola nueva
        let (q, created) = player.lock_live(GUILD, TEXT, VOICE).await;
        assert!(created);
        assert_ne!(q.generation, old_generation);
        assert!(q.connection.is_none());
    }

    #[tokio::test]
    async fn test_play_waiting_on_dying_queue_gets_a_fresh_one() {
        let player = player();
        let link = link();
        let (mut q, _) = player.lock_live(GUILD, TEXT, VOICE).await;
        let old_generation = q.generation;

        let waiting = {
            let player = player.clone();
            tokio::spawn(async move {
                let (q, created) = player.lock_live(GUILD, TEXT, VOICE).await;
                (q.generation, created)
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let actions = exhausted_actions(&mut q, &player);
        player.run_actions(&link, &mut q, actions, None).await;
        drop(q);

        let (generation, created) = waiting.await.unwrap();
        assert!(created);
        assert_ne!(generation, old_generation);
        assert!(player.has_queue(GUILD));
    }

    #[tokio::test]
    async fn test_stop_removes_queue_and_ignores_stale_results() {
        let player = player();
        let link = link();
        let (q, _) = player.lock_live(GUILD, TEXT, VOICE).await;
        let stale = QueueRef {
            guild_id: GUILD,
            generation: q.generation,
        };
        drop(q);

        player.stop(&link, GUILD).await.unwrap();
        assert!(!player.has_queue(GUILD));
        assert!(matches!(
            player.snapshot(GUILD).await,
            Err(MusicError::NoActiveQueue)
        ));
        assert!(matches!(
            player.stop(&link, GUILD).await,
            Err(MusicError::NoActiveQueue)
        ));

        let (q, created) = player.lock_live(GUILD, TEXT, VOICE).await;
        assert!(created);
        let fresh = QueueRef {
            guild_id: GUILD,
            generation: q.generation,
        };
        drop(q);

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let applied = player
            .drive(&link, stale, None, move |_, _, _| {
                flag.store(true, Ordering::SeqCst);
                Vec::new()
            })
            .await;
        assert!(!applied);
        assert!(!ran.load(Ordering::SeqCst));

        let applied = player.drive(&link, fresh, None, |_, _, _| Vec::new()).await;
        assert!(applied);
    }

    #[tokio::test]
    async fn test_skip_while_connecting_skips_nothing() {
        let player = player();
        let link = link();
        {
            let (mut q, _) = player.lock_live(GUILD, TEXT, VOICE).await;
            q.push(test_track("esperando", "https://youtu.be/aaaaaaaaaaa", "3:00"))
                .unwrap();
            let actions = q.handle_event(PlaybackEvent::Enqueued, &player.learner, &player.history);
            assert!(actions.is_empty());
            assert_eq!(q.state(), &PlaybackState::Connecting);
        }

        assert_eq!(player.skip(&link, GUILD).await.unwrap(), None);
        assert_eq!(player.snapshot(GUILD).await.unwrap().upcoming.len(), 0);
        assert!(player.snapshot(GUILD).await.unwrap().current.is_some());
    }

    #[tokio::test]
    async fn test_skip_while_playing_reports_title() {
        let player = player();
        let link = link();
        {
            let (mut q, _) = player.lock_live(GUILD, TEXT, VOICE).await;
            q.connected = true;
            q.push(test_track("sonando", "https://youtu.be/bbbbbbbbbbb", "3:00"))
                .unwrap();
            let actions = q.handle_event(PlaybackEvent::Enqueued, &player.learner, &player.history);
            let ticket = match actions.as_slice() {
                [PlaybackAction::Resolve(request)] => request.ticket,
                other => panic!("unexpected actions: {:?}", other),
            };
            q.handle_event(
                PlaybackEvent::StreamReady {
                    ticket,
                    provider: "test",
                },
                &player.learner,
                &player.history,
            );
            q.handle_event(
                PlaybackEvent::TrackStarted { at: std::time::Instant::now() },
                &player.learner,
                &player.history,
            );
        }

        assert_eq!(
            player.skip(&link, GUILD).await.unwrap(),
            Some("sonando".to_string())
        );
    }
}
