//! Coordinate frame declarations

use arsync_core::{ArError, ArResult};

/// Cartesian axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
}

impl Axis {
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Sign of an axis alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Direction::Positive => 1.0,
            Direction::Negative => -1.0,
        }
    }
}

/// Which signed axis carries a semantic direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AxisAlignment {
    pub axis: Axis,
    pub direction: Direction,
}

impl AxisAlignment {
    pub const fn new(axis: Axis, direction: Direction) -> Self {
        AxisAlignment { axis, direction }
    }

    pub const fn positive(axis: Axis) -> Self {
        AxisAlignment::new(axis, Direction::Positive)
    }

    pub const fn negative(axis: Axis) -> Self {
        AxisAlignment::new(axis, Direction::Negative)
    }
}

/// Unit ratio: one declared unit equals `num / denom` engine units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ratio {
    pub num: i64,
    pub denom: i64,
}

impl Ratio {
    pub const ONE: Ratio = Ratio { num: 1, denom: 1 };

    pub const fn new(num: i64, denom: i64) -> Self {
        Ratio { num, denom }
    }

    pub fn validate(&self) -> ArResult<()> {
        if self.denom == 0 {
            return Err(ArError::ZeroDenominator);
        }
        if self.num == 0 || (self.num < 0) != (self.denom < 0) {
            return Err(ArError::InvalidFrame(format!(
                "scale ratio {}/{} must be positive",
                self.num, self.denom
            )));
        }
        Ok(())
    }

    pub fn value(&self) -> f64 {
        self.num as f64 / self.denom as f64
    }
}

/// Server-declared coordinate convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameDeclaration {
    pub right: AxisAlignment,
    pub forward: AxisAlignment,
    pub up: AxisAlignment,
    pub scale: Ratio,
}

impl FrameDeclaration {
    /// Engine space: left-handed, X forward, Y right, Z up
    pub const ENGINE: FrameDeclaration = FrameDeclaration {
        right: AxisAlignment::positive(Axis::Y),
        forward: AxisAlignment::positive(Axis::X),
        up: AxisAlignment::positive(Axis::Z),
        scale: Ratio::ONE,
    };

    pub fn new(
        right: AxisAlignment,
        forward: AxisAlignment,
        up: AxisAlignment,
        scale: Ratio,
    ) -> Self {
        FrameDeclaration {
            right,
            forward,
            up,
            scale,
        }
    }

    /// Right, forward, up
    pub fn alignments(&self) -> [AxisAlignment; 3] {
        [self.right, self.forward, self.up]
    }

    /// Reject zero/negative ratios and axes that do not form a permutation
    pub fn validate(&self) -> ArResult<()> {
        self.scale.validate()?;

        let mut seen = [false; 3];
        for alignment in self.alignments() {
            let slot = &mut seen[alignment.axis.index()];
            if *slot {
                return Err(ArError::InvalidFrame(format!(
                    "axis {:?} declared more than once",
                    alignment.axis
                )));
            }
            *slot = true;
        }
        Ok(())
    }

    /// True when (right, forward, up) forms a right-handed basis
    pub fn is_right_handed(&self) -> bool {
        let basis = |a: AxisAlignment| {
            let mut v = [0.0; 3];
            v[a.axis.index()] = a.direction.sign();
            v
        };
        let r = basis(self.right);
        let f = basis(self.forward);
        let u = basis(self.up);
        let cross = [
            r[1] * f[2] - r[2] * f[1],
            r[2] * f[0] - r[0] * f[2],
            r[0] * f[1] - r[1] * f[0],
        ];
        cross[0] * u[0] + cross[1] * u[1] + cross[2] * u[2] > 0.0
    }
}

impl Default for FrameDeclaration {
    fn default() -> Self {
        FrameDeclaration::ENGINE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_frame_valid() {
        assert!(FrameDeclaration::ENGINE.validate().is_ok());
    }

    #[test]
    fn test_engine_frame_is_left_handed() {
        // Y x X = -Z, so (right, forward, up) = (Y, X, Z) is left-handed
        assert!(!FrameDeclaration::ENGINE.is_right_handed());
    }

    #[test]
    fn test_zero_denominator_rejected() {
        let mut frame = FrameDeclaration::ENGINE;
        frame.scale = Ratio::new(1, 0);
        assert_eq!(frame.validate(), Err(ArError::ZeroDenominator));
    }

    #[test]
    fn test_negative_ratio_rejected() {
        let mut frame = FrameDeclaration::ENGINE;
        frame.scale = Ratio::new(-1, 100);
        assert!(frame.validate().is_err());

        frame.scale = Ratio::new(-1, -100);
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn test_repeated_axis_rejected() {
        let frame = FrameDeclaration::new(
            AxisAlignment::positive(Axis::X),
            AxisAlignment::negative(Axis::X),
            AxisAlignment::positive(Axis::Z),
            Ratio::ONE,
        );
        assert!(matches!(frame.validate(), Err(ArError::InvalidFrame(_))));
    }
}
