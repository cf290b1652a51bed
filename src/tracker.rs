// Bounded-motion tracking
//
// Holds at most one travel target. The safety loop polls the traction
// position against it and fires the follow-up action once it is reached.

use crate::interpreter::BoundedTravel;
use crate::motor::Traction;

/// Follow-up action once the travel target is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnReach {
    RecenterSteering,
    StopAll,
}

/// Direction the traction was driven when the target was set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TravelDirection {
    Forward,
    Reverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionTarget {
    pub target_position: i32,
    pub direction: TravelDirection,
    pub on_reach: OnReach,
}

impl MotionTarget {
    /// Target `travel.distance` counts away from `start`, compared in the
    /// direction the traction is being driven
    pub fn new(start: i32, travel: BoundedTravel, traction: Traction) -> Self {
        let direction = match traction {
            Traction::Duty(duty) if duty < 0 => TravelDirection::Reverse,
            _ => TravelDirection::Forward,
        };
        Self {
            target_position: start.saturating_add(i32::from(travel.distance)),
            direction,
            on_reach: travel.on_reach,
        }
    }

    pub fn is_reached(&self, position: i32) -> bool {
        match self.direction {
            TravelDirection::Forward => position >= self.target_position,
            TravelDirection::Reverse => position <= self.target_position,
        }
    }
}

/// Owner of the single live motion target
#[derive(Debug, Default)]
pub struct MotionTracker {
    target: Option<MotionTarget>,
}

impl MotionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new target, returning the one it replaces
    pub fn arm(&mut self, target: MotionTarget) -> Option<MotionTarget> {
        self.target.replace(target)
    }

    /// Drop the pending target without running its action
    pub fn clear(&mut self) -> Option<MotionTarget> {
        self.target.take()
    }

    pub fn target(&self) -> Option<&MotionTarget> {
        self.target.as_ref()
    }

    pub fn is_armed(&self) -> bool {
        self.target.is_some()
    }

    /// Compare `position` with the target; if reached, clear it and return
    /// the action to apply
    pub fn check(&mut self, position: i32) -> Option<OnReach> {
        let target = self.target.filter(|t| t.is_reached(position))?;
        self.target = None;
        Some(target.on_reach)
    }
}
