//! Event Window
//!
//! Groups raw onset timestamps into one bounded evaluation window.
//! Ingestion validates that timestamps are finite, non-negative and strictly
//! increasing. A window that fails validation is not an error in the Rust
//! sense: the engine folds [`EventDataError`] into its window outcome and
//! skips all state mutation for that call.

use crate::{MAX_WINDOW_SPAN_MS, MIN_WINDOW_EVENTS, MIN_WINDOW_SPAN_MS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One note onset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Onset time in milliseconds (monotonic, non-negative)
    pub t_onset_ms: f64,
}

impl Event {
    pub fn at(t_onset_ms: f64) -> Self {
        Self { t_onset_ms }
    }
}

/// Build events from bare millisecond timestamps
pub fn events_from_ms(onsets: &[f64]) -> Vec<Event> {
    onsets.iter().copied().map(Event::at).collect()
}

/// Optional caller metadata attached to a window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowMeta {
    /// Caller's sequence number for the window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
    /// Free-form source tag (voice, player, take)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Why a window was rejected
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum EventDataError {
    /// Fewer than two onsets
    #[error("window has {count} onset(s), need {}", MIN_WINDOW_EVENTS)]
    TooFewEvents { count: usize },
    /// Onset entry without a numeric `t_onset_ms`
    #[error("onset {index} has no numeric t_onset_ms")]
    Malformed { index: usize },
    /// NaN or infinite timestamp
    #[error("onset {index} is not finite")]
    NonFinite { index: usize },
    /// Timestamp below zero
    #[error("onset {index} is negative ({t_onset_ms} ms)")]
    Negative { index: usize, t_onset_ms: f64 },
    /// Timestamp not strictly after its predecessor
    #[error("onset {index} ({t_onset_ms} ms) does not follow {previous_ms} ms")]
    OutOfOrder {
        index: usize,
        previous_ms: f64,
        t_onset_ms: f64,
    },
}

/// Validated, immutable window of onsets
#[derive(Debug, Clone, PartialEq)]
pub struct EventWindow {
    events: Vec<Event>,
    meta: WindowMeta,
}

impl EventWindow {
    /// Validate raw onsets and build a window
    pub fn ingest(events: &[Event]) -> Result<Self, EventDataError> {
        Self::ingest_with_meta(events, WindowMeta::default())
    }

    /// Validate raw onsets with caller metadata
    pub fn ingest_with_meta(events: &[Event], meta: WindowMeta) -> Result<Self, EventDataError> {
        if events.len() < MIN_WINDOW_EVENTS {
            return Err(EventDataError::TooFewEvents {
                count: events.len(),
            });
        }

        let mut previous: Option<f64> = None;
        for (index, event) in events.iter().enumerate() {
            let t = event.t_onset_ms;
            if !t.is_finite() {
                return Err(EventDataError::NonFinite { index });
            }
            if t < 0.0 {
                return Err(EventDataError::Negative {
                    index,
                    t_onset_ms: t,
                });
            }
            if let Some(prev) = previous
                && t <= prev
            {
                return Err(EventDataError::OutOfOrder {
                    index,
                    previous_ms: prev,
                    t_onset_ms: t,
                });
            }
            previous = Some(t);
        }

        let window = Self {
            events: events.to_vec(),
            meta,
        };

        let span = window.span_ms();
        if !(MIN_WINDOW_SPAN_MS..=MAX_WINDOW_SPAN_MS).contains(&span) {
            log::debug!(
                "window {:?} spans {:.0} ms, outside nominal {}..{} ms",
                window.meta.index,
                span,
                MIN_WINDOW_SPAN_MS,
                MAX_WINDOW_SPAN_MS
            );
        }

        Ok(window)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn meta(&self) -> &WindowMeta {
        &self.meta
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Always false for an ingested window
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Time between first and last onset (ms)
    pub fn span_ms(&self) -> f64 {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => last.t_onset_ms - first.t_onset_ms,
            _ => 0.0,
        }
    }

    /// Inter-onset intervals (ms), all strictly positive
    pub fn iois(&self) -> Vec<f64> {
        self.events
            .windows(2)
            .map(|pair| pair[1].t_onset_ms - pair[0].t_onset_ms)
            .collect()
    }

    /// Median inter-onset interval (ms)
    pub fn median_ioi_ms(&self) -> f64 {
        median(&self.iois())
    }

    /// RMS distance (ms) of each onset from the nearest line of a grid whose
    /// step is the median IOI, anchored at the first onset.
    pub fn grid_deviation_ms(&self) -> f64 {
        let step = self.median_ioi_ms();
        let Some(origin) = self.events.first().map(|e| e.t_onset_ms) else {
            return 0.0;
        };
        if step <= 0.0 {
            return 0.0;
        }

        let sum_sq: f64 = self
            .events
            .iter()
            .map(|e| {
                let d = e.t_onset_ms - origin;
                let err = d - (d / step).round() * step;
                err * err
            })
            .sum();

        (sum_sq / self.events.len() as f64).sqrt()
    }
}

/// Median of a slice (mean of the two middle values for even lengths)
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_valid_window() {
        let window = EventWindow::ingest(&events_from_ms(&[0.0, 610.0, 1220.0])).unwrap();
        assert_eq!(window.len(), 3);
        assert_eq!(window.iois(), vec![610.0, 610.0]);
        assert!((window.median_ioi_ms() - 610.0).abs() < 1e-9);
        assert!((window.span_ms() - 1220.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_too_few() {
        assert_eq!(
            EventWindow::ingest(&[]),
            Err(EventDataError::TooFewEvents { count: 0 })
        );
        assert_eq!(
            EventWindow::ingest(&events_from_ms(&[100.0])),
            Err(EventDataError::TooFewEvents { count: 1 })
        );
    }

    #[test]
    fn test_rejects_out_of_order_and_duplicates() {
        let err = EventWindow::ingest(&events_from_ms(&[0.0, 500.0, 400.0])).unwrap_err();
        assert!(matches!(err, EventDataError::OutOfOrder { index: 2, .. }));

        let err = EventWindow::ingest(&events_from_ms(&[0.0, 500.0, 500.0])).unwrap_err();
        assert!(matches!(err, EventDataError::OutOfOrder { index: 2, .. }));
    }

    #[test]
    fn test_rejects_negative_and_nan() {
        let err = EventWindow::ingest(&events_from_ms(&[-1.0, 500.0])).unwrap_err();
        assert!(matches!(err, EventDataError::Negative { index: 0, .. }));

        let err = EventWindow::ingest(&events_from_ms(&[0.0, f64::NAN])).unwrap_err();
        assert_eq!(err, EventDataError::NonFinite { index: 1 });
    }

    #[test]
    fn test_error_messages() {
        let err = EventWindow::ingest(&events_from_ms(&[100.0])).unwrap_err();
        assert_eq!(err.to_string(), "window has 1 onset(s), need 2");

        let err = EventWindow::ingest(&events_from_ms(&[0.0, 500.0, 400.0])).unwrap_err();
        assert_eq!(err.to_string(), "onset 2 (400 ms) does not follow 500 ms");

        let boxed: Box<dyn std::error::Error> = Box::new(EventDataError::Malformed { index: 3 });
        assert_eq!(boxed.to_string(), "onset 3 has no numeric t_onset_ms");
    }

    #[test]
    fn test_median_even_and_odd() {
        assert!((median(&[3.0, 1.0, 2.0]) - 2.0).abs() < 1e-12);
        assert!((median(&[4.0, 1.0, 2.0, 3.0]) - 2.5).abs() < 1e-12);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn test_grid_deviation_steady_and_subdivided() {
        let steady = EventWindow::ingest(&events_from_ms(&[0.0, 500.0, 1000.0, 1500.0])).unwrap();
        assert!(steady.grid_deviation_ms() < 1e-9);

        // Skipped beats still sit on the grid
        let sparse =
            EventWindow::ingest(&events_from_ms(&[0.0, 500.0, 1000.0, 2000.0, 2500.0])).unwrap();
        assert!(sparse.grid_deviation_ms() < 1e-9);
    }

    #[test]
    fn test_grid_deviation_sloppy() {
        // Median IOI 500; onsets wander up to 150 ms off the grid
        let sloppy =
            EventWindow::ingest(&events_from_ms(&[0.0, 500.0, 1150.0, 1500.0, 1850.0, 2500.0]))
                .unwrap();
        assert!(sloppy.grid_deviation_ms() > 45.0);
    }

    #[test]
    fn test_meta_is_kept() {
        let meta = WindowMeta {
            index: Some(7),
            source: Some("keys".to_string()),
        };
        let window =
            EventWindow::ingest_with_meta(&events_from_ms(&[0.0, 400.0]), meta.clone()).unwrap();
        assert_eq!(window.meta(), &meta);
    }
}
