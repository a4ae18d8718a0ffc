use rand::{seq::SliceRandom, Rng};
use std::{
    collections::HashSet,
    time::{Duration, Instant},
};
use tracing::info;

use crate::{error::MusicError, sources::Requester};

/// Pausa entre un track del loop y el siguiente
pub const LOOP_GAP: Duration = Duration::from_secs(2);

/// Reproducción continua y aleatoria de una playlist con nombre.
///
/// Cada título sale una vez por ciclo; al agotarse la lista el ciclo se
/// reinicia.
#[derive(Debug, Clone)]
pub struct LoopSession {
    playlist: String,
    titles: Vec<String>,
    /// Quien activó el loop; figura como solicitante de cada track
    requester: Requester,
    played: HashSet<String>,
    songs_played: u32,
    total_play_secs: u64,
    started_at: Instant,
}

/// Estado del loop para el embed de "now playing"
#[derive(Debug, Clone, PartialEq)]
pub struct LoopProgress {
    pub playlist: String,
    pub played: usize,
    pub remaining: usize,
    pub total: usize,
    pub percent: u32,
    pub songs_played: u32,
    pub total_play_secs: u64,
    pub session_minutes: u64,
}

impl LoopSession {
    pub fn new(
        playlist: impl Into<String>,
        titles: Vec<String>,
        requester: Requester,
    ) -> Result<Self, MusicError> {
        let playlist = playlist.into();
        let titles: Vec<String> = titles
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        if titles.is_empty() {
            return Err(MusicError::EmptyPlaylist(playlist));
        }

        Ok(Self {
            playlist,
            titles,
            requester,
            played: HashSet::new(),
            songs_played: 0,
            total_play_secs: 0,
            started_at: Instant::now(),
        })
    }

    pub fn playlist(&self) -> &str {
        &self.playlist
    }

    pub fn requester(&self) -> &Requester {
        &self.requester
    }

    /// Elige un título aún no reproducido en este ciclo
    pub fn next_pick<R: Rng + ?Sized>(&mut self, rng: &mut R) -> String {
        let mut available: Vec<&String> = self
            .titles
            .iter()
            .filter(|t| !self.played.contains(*t))
            .collect();

        if available.is_empty() {
            info!("🔄 Loop '{}': lista completada, reiniciando ciclo", self.playlist);
            self.played.clear();
            available = self.titles.iter().collect();
        }

        // `titles` nunca está vacío
        let pick = available
            .choose(rng)
            .map(|t| (*t).clone())
            .unwrap_or_else(|| self.titles[0].clone());

        self.played.insert(pick.clone());
        pick
    }

    /// Texto de búsqueda para un título de la playlist
    pub fn search_query(title: &str) -> String {
        format!("{} official", title)
    }

    pub fn record_play(&mut self, secs: u64) {
        self.songs_played += 1;
        self.total_play_secs += secs;
    }

    pub fn progress(&self) -> LoopProgress {
        let total = self.titles.len();
        let played = self.played.len().min(total);
        LoopProgress {
            playlist: self.playlist.clone(),
            played,
            remaining: total - played,
            total,
            percent: ((played as f64 / total as f64) * 100.0).round() as u32,
            songs_played: self.songs_played,
            total_play_secs: self.total_play_secs,
            session_minutes: self.started_at.elapsed().as_secs() / 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn requester() -> Requester {
        Requester {
            id: serenity::model::id::UserId::new(3),
            name: "dj".to_string(),
        }
    }

    fn session(titles: &[&str]) -> LoopSession {
        LoopSession::new("loop", titles.iter().map(|t| t.to_string()).collect(), requester()).unwrap()
    }

    #[test]
    fn test_empty_playlist_is_rejected() {
        assert!(matches!(
            LoopSession::new("vacía", vec!["  ".to_string()], requester()),
            Err(MusicError::EmptyPlaylist(name)) if name == "vacía"
        ));
    }

    #[test]
    fn test_every_title_once_per_cycle() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut loop_session = session(&["a", "b", "c", "d"]);

        let mut cycle: Vec<String> = (0..4).map(|_| loop_session.next_pick(&mut rng)).collect();
        cycle.sort();
        assert_eq!(cycle, vec!["a", "b", "c", "d"]);
        assert_eq!(loop_session.progress().remaining, 0);

        // El quinto pick inicia un ciclo nuevo
        loop_session.next_pick(&mut rng);
        assert_eq!(loop_session.progress().played, 1);
    }

    #[test]
    fn test_progress_tracks_plays() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut loop_session = session(&["a", "b", "c", "d"]);
        loop_session.next_pick(&mut rng);
        loop_session.record_play(200);
        loop_session.next_pick(&mut rng);
        loop_session.record_play(100);

        let progress = loop_session.progress();
        assert_eq!(progress.played, 2);
        assert_eq!(progress.remaining, 2);
        assert_eq!(progress.percent, 50);
        assert_eq!(progress.songs_played, 2);
        assert_eq!(progress.total_play_secs, 300);
    }

    #[test]
    fn test_search_query() {
        assert_eq!(LoopSession::search_query("Song"), "Song official");
    }
}
