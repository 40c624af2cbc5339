use serde::{Deserialize, Serialize};

use crate::line_norm::filters::{gaussian_filter1d, Border};

/// Per-trial error history of a recognizer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingLog {
    /// RMS alignment error per trained line, divided by the label count.
    errors: Vec<f64>,
    /// `(edit distance, label count)` per trained line.
    char_errors: Vec<(usize, usize)>,
}

impl TrainingLog {
    /// A history that predates character error tracking.
    pub fn from_errors(errors: Vec<f64>) -> Self {
        Self {
            errors,
            char_errors: Vec::new(),
        }
    }

    pub fn record(&mut self, error: f64, distance: usize, labels: usize) {
        self.errors.push(error);
        self.char_errors.push((distance, labels));
    }

    pub fn clear(&mut self) {
        self.errors.clear();
        self.char_errors.clear();
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[f64] {
        &self.errors
    }

    pub fn char_errors(&self) -> &[(usize, usize)] {
        &self.char_errors
    }

    /// The last `window` errors.
    pub fn recent_errors(&self, window: usize) -> &[f64] {
        &self.errors[self.errors.len().saturating_sub(window)..]
    }

    pub fn smoothed_errors(&self, window: usize, sigma: f64) -> Vec<f64> {
        gaussian_filter1d(self.recent_errors(window), sigma, Border::Mirror)
    }

    /// Character error rates of the last `window` lines, smoothed.
    pub fn smoothed_char_errors(&self, window: usize, sigma: f64) -> Vec<f64> {
        let recent = &self.char_errors[self.char_errors.len().saturating_sub(window)..];
        let rates: Vec<f64> = recent
            .iter()
            .map(|&(distance, labels)| distance as f64 / labels.max(1) as f64)
            .collect();

        gaussian_filter1d(&rates, sigma, Border::Mirror)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_record_and_clear() {
        let mut log = TrainingLog::default();
        log.record(0.5, 1, 4);
        log.record(0.25, 0, 4);
        assert_eq!(log.len(), 2);
        assert_eq!(log.char_errors(), &[(1, 4), (0, 4)]);

        log.clear();
        assert!(log.is_empty());
        assert!(log.char_errors().is_empty());
    }

    #[test]
    fn test_recent_window() {
        let log = TrainingLog::from_errors((0..10).map(f64::from).collect());
        assert_eq!(log.recent_errors(3), &[7.0, 8.0, 9.0]);
        assert_eq!(log.recent_errors(100).len(), 10);
        assert!(log.smoothed_char_errors(5, 1.0).is_empty());
    }

    #[test]
    fn test_smoothing_keeps_constant_series() {
        let mut log = TrainingLog::default();
        for _ in 0..20 {
            log.record(0.3, 1, 2);
        }
        for v in log.smoothed_errors(10, 3.0) {
            assert!((v - 0.3).abs() < 1e-9);
        }
        for v in log.smoothed_char_errors(10, 3.0) {
            assert!((v - 0.5).abs() < 1e-9);
        }
    }
}
