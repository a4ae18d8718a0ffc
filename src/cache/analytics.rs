use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::info;

use super::duration::completion_percent;

/// Reportes conservados en memoria
const HISTORY_LIMIT: usize = 500;
/// Ventana usada para el promedio de `!ai`
const RECENT_WINDOW: usize = 10;

/// Resultado de una reproducción terminada
#[derive(Debug, Clone, PartialEq)]
pub struct PlayReport {
    pub title: String,
    /// Duración informada por la plataforma (o la de reserva)
    pub expected_secs: u64,
    /// Duración aprendida, si había una confiable
    pub estimated_secs: Option<u64>,
    pub played_secs: u64,
    pub percent: u32,
    pub recorded_at: DateTime<Utc>,
}

impl PlayReport {
    pub fn new(title: &str, played_secs: u64, expected_secs: u64, estimated_secs: Option<u64>) -> Self {
        let reference = estimated_secs.unwrap_or(expected_secs);
        Self {
            title: title.to_string(),
            expected_secs,
            estimated_secs,
            played_secs,
            percent: completion_percent(played_secs, reference),
            recorded_at: Utc::now(),
        }
    }
}

/// Resumen mostrado por `!ai`
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySummary {
    pub total: u64,
    pub recent_average: u32,
    pub last: Option<PlayReport>,
}

#[derive(Debug, Default)]
struct HistoryState {
    reports: VecDeque<PlayReport>,
    total: u64,
}

/// Historial acotado de reproducciones completadas
#[derive(Debug, Default)]
pub struct PlayHistory {
    state: Mutex<HistoryState>,
}

impl PlayHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, report: PlayReport) {
        info!(
            "📈 Reproducción registrada: '{}' {}s ({}%)",
            report.title, report.played_secs, report.percent
        );

        let mut state = self.state.lock();
        state.total += 1;
        state.reports.push_back(report);
        while state.reports.len() > HISTORY_LIMIT {
            state.reports.pop_front();
        }
    }

    pub fn total(&self) -> u64 {
        self.state.lock().total
    }

    /// `None` si todavía no hay reproducciones
    pub fn summary(&self) -> Option<HistorySummary> {
        let state = self.state.lock();
        if state.reports.is_empty() {
            return None;
        }

        let recent: Vec<_> = state.reports.iter().rev().take(RECENT_WINDOW).collect();
        let sum: u64 = recent.iter().map(|r| u64::from(r.percent)).sum();
        let recent_average = (sum as f64 / recent.len() as f64).round() as u32;

        Some(HistorySummary {
            total: state.total,
            recent_average,
            last: state.reports.back().cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_report_prefers_learned_duration() {
        let report = PlayReport::new("Song", 100, 200, Some(100));
        assert_eq!(report.percent, 100);

        let report = PlayReport::new("Song", 100, 200, None);
        assert_eq!(report.percent, 50);
    }

    #[test]
    fn test_empty_history_has_no_summary() {
        assert_eq!(PlayHistory::new().summary(), None);
    }

    #[test]
    fn test_summary_averages_last_ten() {
        let history = PlayHistory::new();
        // Cinco reproducciones viejas al 0% que quedan fuera de la ventana
        for _ in 0..5 {
            history.push(PlayReport::new("old", 0, 100, None));
        }
        for _ in 0..10 {
            history.push(PlayReport::new("new", 80, 100, None));
        }

        let summary = history.summary().unwrap();
        assert_eq!(summary.total, 15);
        assert_eq!(summary.recent_average, 80);
        assert_eq!(summary.last.map(|r| r.title), Some("new".to_string()));
    }

    #[test]
    fn test_history_is_bounded_but_total_keeps_counting() {
        let history = PlayHistory::new();
        for _ in 0..(HISTORY_LIMIT + 20) {
            history.push(PlayReport::new("x", 10, 10, None));
        }
        assert_eq!(history.total(), (HISTORY_LIMIT + 20) as u64);
        assert_eq!(history.state.lock().reports.len(), HISTORY_LIMIT);
    }
}
