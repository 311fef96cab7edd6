use serde::{Deserialize, Serialize};

/// Speed bounds of one axis in mm/s. Either bound may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeedLimit {
    pub max: Option<f64>,
    pub min: Option<f64>,
}

impl SpeedLimit {
    pub fn new(max: Option<f64>, min: Option<f64>) -> Self {
        Self { max, min }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Caps `speed` to `max` and raises a positive speed to `min`. A speed of
    /// zero or below stays 0 so the axis does not move.
    pub fn clamp(&self, speed: f64) -> f64 {
        if speed <= 0.0 {
            return 0.0;
        }
        match (self.max, self.min) {
            (Some(max), _) if speed > max => max,
            (_, Some(min)) if speed < min => min,
            _ => speed,
        }
    }

    /// Speed used when the stage returns to zero on its own.
    pub fn symmetric_speed(&self, fallback: f64) -> f64 {
        match (self.max, self.min) {
            (Some(max), Some(min)) if max > min => (max + min) / 2.0,
            (Some(max), _) if max > 0.0 => max / 2.0,
            (_, Some(min)) if min > 0.0 => min * 2.0,
            _ => fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_into_bounds() {
        let limit = SpeedLimit::new(Some(50.0), Some(5.0));
        assert_eq!(limit.clamp(80.0), 50.0);
        assert_eq!(limit.clamp(1.0), 5.0);
        assert_eq!(limit.clamp(20.0), 20.0);
    }

    #[test]
    fn test_unset_bounds_do_not_clamp() {
        assert_eq!(SpeedLimit::unbounded().clamp(1234.0), 1234.0);
        assert_eq!(SpeedLimit::new(Some(10.0), None).clamp(0.5), 0.5);
        assert_eq!(SpeedLimit::new(None, Some(3.0)).clamp(300.0), 300.0);
    }

    #[test]
    fn test_clamped_speed_is_never_negative() {
        assert_eq!(SpeedLimit::unbounded().clamp(-4.0), 0.0);
    }

    #[test]
    fn test_zero_speed_is_not_raised_to_min() {
        let limit = SpeedLimit::new(Some(50.0), Some(5.0));
        assert_eq!(limit.clamp(0.0), 0.0);
        assert_eq!(limit.clamp(-2.0), 0.0);
        assert_eq!(limit.clamp(0.1), 5.0);
    }

    #[test]
    fn test_symmetric_speed() {
        assert_eq!(SpeedLimit::new(Some(50.0), Some(10.0)).symmetric_speed(5.0), 30.0);
        assert_eq!(SpeedLimit::new(Some(50.0), None).symmetric_speed(5.0), 25.0);
        assert_eq!(SpeedLimit::new(None, Some(4.0)).symmetric_speed(5.0), 8.0);
        assert_eq!(SpeedLimit::unbounded().symmetric_speed(5.0), 5.0);
    }
}
