//! Shared utility functions and traits

use std::time::Duration;

/// Extension trait for tracking running extremes in an `Option<T>`.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use stimulus_monitor::utils::MinMaxExt;
///
/// let mut worst: Option<Duration> = None;
/// worst.update_max(Duration::from_micros(40));
/// worst.update_max(Duration::from_micros(25));
/// assert_eq!(worst, Some(Duration::from_micros(40)));
/// ```
pub trait MinMaxExt<T: Ord + Copy> {
    /// Keep the smaller of the stored value and `value`
    fn update_min(&mut self, value: T);

    /// Keep the larger of the stored value and `value`
    fn update_max(&mut self, value: T);
}

impl<T: Ord + Copy> MinMaxExt<T> for Option<T> {
    fn update_min(&mut self, value: T) {
        *self = Some(self.map_or(value, |m| m.min(value)));
    }

    fn update_max(&mut self, value: T) {
        *self = Some(self.map_or(value, |m| m.max(value)));
    }
}

/// Duration in fractional milliseconds, for log lines and reports
pub fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_from_none() {
        let mut min: Option<u64> = None;
        let mut max: Option<u64> = None;
        min.update_min(100);
        max.update_max(100);
        assert_eq!(min, Some(100));
        assert_eq!(max, Some(100));
    }

    #[test]
    fn update_sequence_tracks_extremes() {
        let mut min: Option<Duration> = None;
        let mut max: Option<Duration> = None;

        for us in [50, 30, 70, 20, 80, 40] {
            min.update_min(Duration::from_micros(us));
            max.update_max(Duration::from_micros(us));
        }

        assert_eq!(min, Some(Duration::from_micros(20)));
        assert_eq!(max, Some(Duration::from_micros(80)));
    }

    #[test]
    fn millis_conversion() {
        assert_eq!(as_millis_f64(Duration::from_micros(1500)), 1.5);
    }
}
