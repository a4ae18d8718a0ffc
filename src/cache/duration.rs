use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::sources::Track;

/// Diferencia máxima (segundos) para considerar que dos observaciones coinciden
pub const TOLERANCE_SECS: u64 = 3;
/// Confianza de una observación nueva
pub const BASELINE_CONFIDENCE: u8 = 60;
/// Incremento por cada observación que corrobora la anterior
pub const CONFIDENCE_STEP: u8 = 15;
/// A partir de aquí la observación se prefiere sobre la duración de la plataforma
pub const TRUSTED_CONFIDENCE: u8 = 85;
pub const MAX_CONFIDENCE: u8 = 100;

/// Observación de la duración real de un track
#[derive(Debug, Clone, PartialEq)]
pub struct DurationRecord {
    pub observed_secs: u64,
    pub expected_secs: u64,
    pub confidence: u8,
    pub plays: u32,
    pub updated_at: DateTime<Utc>,
    touched: u64,
}

impl DurationRecord {
    fn new(observed_secs: u64, expected_secs: u64, touched: u64) -> Self {
        Self {
            observed_secs,
            expected_secs,
            confidence: BASELINE_CONFIDENCE,
            plays: 1,
            updated_at: Utc::now(),
            touched,
        }
    }

    pub fn is_trusted(&self) -> bool {
        self.confidence >= TRUSTED_CONFIDENCE
    }

    /// Porcentaje reproducido respecto a lo esperado por la plataforma
    pub fn completion_percent(&self) -> u32 {
        completion_percent(self.observed_secs, self.expected_secs)
    }
}

#[derive(Debug, Default)]
struct LearnerState {
    records: HashMap<String, DurationRecord>,
    clock: u64,
}

/// Caché de corrección de duraciones, indexada por ID de video.
///
/// Heurística de consenso: las observaciones que coinciden dentro de
/// [`TOLERANCE_SECS`] suben la confianza, una distinta reemplaza el registro.
#[derive(Debug)]
pub struct DurationLearner {
    state: Mutex<LearnerState>,
    capacity: usize,
    trim_to: usize,
}

impl DurationLearner {
    pub fn new(capacity: usize, trim_to: usize) -> Self {
        Self {
            state: Mutex::new(LearnerState::default()),
            capacity,
            trim_to: trim_to.min(capacity),
        }
    }

    /// Registra una reproducción observada
    pub fn record(&self, media_id: &str, observed_secs: u64, expected_secs: u64) {
        if media_id.is_empty() || observed_secs == 0 || expected_secs == 0 {
            return;
        }

        let mut state = self.state.lock();
        state.clock += 1;
        let now = state.clock;

        match state.records.get_mut(media_id) {
            Some(record) if record.observed_secs.abs_diff(observed_secs) < TOLERANCE_SECS => {
                record.confidence = record
                    .confidence
                    .saturating_add(CONFIDENCE_STEP)
                    .min(MAX_CONFIDENCE);
                record.plays += 1;
                record.updated_at = Utc::now();
                record.touched = now;
                info!(
                    "🧠 Duración confirmada: {} → {}s (confianza {}%)",
                    media_id, record.observed_secs, record.confidence
                );
            }
            _ => {
                let record = DurationRecord::new(observed_secs, expected_secs, now);
                info!(
                    "🧠 Nueva duración aprendida: {} → {}s ({}% de lo esperado)",
                    media_id,
                    observed_secs,
                    record.completion_percent()
                );
                state.records.insert(media_id.to_string(), record);
            }
        }

        if state.records.len() > self.capacity {
            Self::trim(&mut state, self.trim_to);
        }
    }

    /// Duración estimada de un track en segundos.
    ///
    /// Orden: observación confiable en caché, duración de la plataforma, `None`.
    pub fn estimate(&self, track: &Track) -> Option<u64> {
        if let Some(id) = track.media_id() {
            if let Some(record) = self.get(&id).filter(DurationRecord::is_trusted) {
                debug!("🧠 Duración desde caché: {}s", record.observed_secs);
                return Some(record.observed_secs);
            }
        }

        parse_duration(&track.duration)
    }

    pub fn get(&self, media_id: &str) -> Option<DurationRecord> {
        self.state.lock().records.get(media_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn trusted_count(&self) -> usize {
        self.state
            .lock()
            .records
            .values()
            .filter(|r| r.is_trusted())
            .count()
    }

    fn trim(state: &mut LearnerState, keep: usize) {
        let excess = state.records.len().saturating_sub(keep);
        let mut by_age: Vec<(u64, String)> = state
            .records
            .iter()
            .map(|(id, r)| (r.touched, id.clone()))
            .collect();
        by_age.sort_unstable();

        for (_, id) in by_age.into_iter().take(excess) {
            state.records.remove(&id);
        }
        debug!("🧹 Caché de duraciones recortada a {} entradas", state.records.len());
    }
}

/// Convierte `m:ss` o `h:mm:ss` a segundos
pub fn parse_duration(duration: &str) -> Option<u64> {
    let parts = duration
        .trim()
        .split(':')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;

    match parts.as_slice() {
        [m, s] => Some(m * 60 + s),
        [h, m, s] => Some(h * 3600 + m * 60 + s),
        _ => None,
    }
    .filter(|secs| *secs > 0)
}

/// Formatea segundos como `m:ss` (o `h:mm:ss` si pasa de una hora)
pub fn format_duration(secs: u64) -> String {
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

pub fn completion_percent(played_secs: u64, expected_secs: u64) -> u32 {
    if expected_secs == 0 {
        return 100;
    }
    ((played_secs as f64 / expected_secs as f64) * 100.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::test_track;

    const ID: &str = "dQw4w9WgXcQ";

    #[test]
    fn test_parse_duration_formats() {
        assert_eq!(parse_duration("3:25"), Some(205));
        assert_eq!(parse_duration("1:02:03"), Some(3723));
        assert_eq!(parse_duration(" 0:59 "), Some(59));
        assert_eq!(parse_duration("Desconocida"), None);
        assert_eq!(parse_duration("12"), None);
        assert_eq!(parse_duration("1:2:3:4"), None);
        assert_eq!(parse_duration("0:00"), None);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(213), "3:33");
        assert_eq!(format_duration(3723), "1:02:03");
    }

    #[test]
    fn test_corroborating_observations_raise_confidence_only() {
        let learner = DurationLearner::new(10, 8);
        learner.record(ID, 200, 213);
        let first = learner.get(ID).unwrap();
        assert_eq!(first.confidence, BASELINE_CONFIDENCE);

        learner.record(ID, 202, 213);
        let second = learner.get(ID).unwrap();
        assert!(second.confidence > first.confidence);
        assert_eq!(second.observed_secs, 200);
        assert_eq!(second.plays, 2);

        learner.record(ID, 199, 213);
        let third = learner.get(ID).unwrap();
        assert!(third.confidence > second.confidence);
        assert_eq!(third.observed_secs, 200);
    }

    #[test]
    fn test_divergent_observation_replaces_record() {
        let learner = DurationLearner::new(10, 8);
        learner.record(ID, 200, 213);
        learner.record(ID, 201, 213);
        learner.record(ID, 90, 213);

        let record = learner.get(ID).unwrap();
        assert_eq!(record.observed_secs, 90);
        assert_eq!(record.confidence, BASELINE_CONFIDENCE);
        assert_eq!(record.plays, 1);
    }

    #[test]
    fn test_confidence_is_capped() {
        let learner = DurationLearner::new(10, 8);
        for _ in 0..10 {
            learner.record(ID, 200, 213);
        }
        assert_eq!(learner.get(ID).unwrap().confidence, MAX_CONFIDENCE);
    }

    #[test]
    fn test_estimate_prefers_trusted_observation() {
        let learner = DurationLearner::new(10, 8);
        let track = test_track("Song", &format!("https://youtu.be/{ID}"), "3:33");

        assert_eq!(learner.estimate(&track), Some(213));

        learner.record(ID, 200, 213);
        // Una sola observación todavía no es confiable
        assert_eq!(learner.estimate(&track), Some(213));

        learner.record(ID, 200, 213);
        learner.record(ID, 200, 213);
        assert_eq!(learner.estimate(&track), Some(200));
    }

    #[test]
    fn test_estimate_unknown_without_data() {
        let learner = DurationLearner::new(10, 8);
        let track = test_track("Live", "https://example.com/stream", "Desconocida");
        assert_eq!(learner.estimate(&track), None);
    }

    #[test]
    fn test_oldest_records_evicted_past_capacity() {
        let learner = DurationLearner::new(1000, 800);
        for i in 0..=1000 {
            learner.record(&format!("id-{i}"), 100, 120);
        }

        assert_eq!(learner.len(), 800);
        assert!(learner.get("id-0").is_none());
        assert!(learner.get("id-200").is_none());
        assert!(learner.get("id-201").is_some());
        assert!(learner.get("id-1000").is_some());
    }

    #[test]
    fn test_ignores_empty_observations() {
        let learner = DurationLearner::new(10, 8);
        learner.record(ID, 0, 213);
        learner.record("", 100, 213);
        assert_eq!(learner.len(), 0);
    }
}
