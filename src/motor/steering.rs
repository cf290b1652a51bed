// Steering calibration for the ev3 car
// Maps the three steering targets to absolute tacho positions.

use super::{ActuatorError, SteeringTarget};

/// Steering positions measured once at startup, read-only afterwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SteeringCalibration {
    pub left_limit: i32,
    pub right_limit: i32,
    pub center: i32,
}

impl SteeringCalibration {
    /// Build from the two mechanical limits; center is their midpoint
    pub fn from_limits(left_limit: i32, right_limit: i32) -> Result<Self, ActuatorError> {
        if left_limit == right_limit {
            return Err(ActuatorError::Calibration(format!(
                "left and right limits are both {} (steering did not move)",
                left_limit
            )));
        }

        // i64 so extreme encoder values cannot overflow
        let center = ((left_limit as i64 + right_limit as i64) / 2) as i32;

        Ok(Self {
            left_limit,
            right_limit,
            center,
        })
    }

    /// Absolute tacho position for a steering target
    pub fn position_for(&self, target: SteeringTarget) -> i32 {
        match target {
            SteeringTarget::Left => self.left_limit,
            SteeringTarget::Right => self.right_limit,
            SteeringTarget::Center => self.center,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_is_midpoint() {
        let cal = SteeringCalibration::from_limits(120, -80).unwrap();
        assert_eq!(cal.center, 20);
        assert_eq!(cal.left_limit, 120);
        assert_eq!(cal.right_limit, -80);
    }

    #[test]
    fn test_position_for_targets() {
        let cal = SteeringCalibration::from_limits(-40, 60).unwrap();
        assert_eq!(cal.position_for(SteeringTarget::Left), -40);
        assert_eq!(cal.position_for(SteeringTarget::Right), 60);
        assert_eq!(cal.position_for(SteeringTarget::Center), 10);
    }

    #[test]
    fn test_extreme_limits_do_not_overflow() {
        let cal = SteeringCalibration::from_limits(i32::MAX, i32::MAX - 2).unwrap();
        assert_eq!(cal.center, i32::MAX - 1);
    }

    #[test]
    fn test_equal_limits_rejected() {
        // A steering motor that never moved gives identical limits
        assert!(matches!(
            SteeringCalibration::from_limits(5, 5),
            Err(ActuatorError::Calibration(_))
        ));
    }
}
