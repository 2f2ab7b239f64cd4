//! Running min/max statistics that only widen until explicitly reset.

/// Min / max of the samples seen since the last reset
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiffStats {
    min: Option<f64>,
    max: Option<f64>,
    count: u64,
}

impl DiffStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        self.count += 1;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// `(min, max)` with zeros before the first sample, for reporting
    pub fn bounds_or_zero(&self) -> (f64, f64) {
        (self.min.unwrap_or(0.0), self.max.unwrap_or(0.0))
    }
}
