use crate::error::{FusionError, Result};

pub const DEFAULT_FIRE_RADIUS_KM: f64 = 50.0;
pub const DEFAULT_FIRE_WINDOW_HOURS: i64 = 24;

/// Scalar parameters of a fusion run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionParams {
    /// Maximum great-circle distance between a farm and a matched detection.
    pub fire_radius_km: f64,
    /// Length of the trailing window ending at each weather hour.
    pub fire_window_hours: i64,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            fire_radius_km: DEFAULT_FIRE_RADIUS_KM,
            fire_window_hours: DEFAULT_FIRE_WINDOW_HOURS,
        }
    }
}

impl FusionParams {
    pub fn new(fire_radius_km: f64, fire_window_hours: i64) -> Result<Self> {
        let params = Self {
            fire_radius_km,
            fire_window_hours,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.fire_radius_km.is_finite() || self.fire_radius_km <= 0.0 {
            return Err(FusionError::InvalidParameter {
                name: "fire_radius_km",
                reason: format!("must be a positive number, got {}", self.fire_radius_km),
            });
        }
        if self.fire_window_hours <= 0 {
            return Err(FusionError::InvalidParameter {
                name: "fire_window_hours",
                reason: format!("must be positive, got {}", self.fire_window_hours),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let params = FusionParams::default();
        assert_eq!(params.fire_radius_km, 50.0);
        assert_eq!(params.fire_window_hours, 24);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_radius() {
        assert!(FusionParams::new(0.0, 24).is_err());
        assert!(FusionParams::new(-5.0, 24).is_err());
        assert!(FusionParams::new(f64::NAN, 24).is_err());
    }

    #[test]
    fn rejects_non_positive_window() {
        let err = FusionParams::new(50.0, 0).unwrap_err();
        assert!(err.to_string().contains("fire_window_hours"));
    }
}
