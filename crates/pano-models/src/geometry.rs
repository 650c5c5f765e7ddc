//! Angular types shared by the projection, rotation and viewport code.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// A point on the unit sphere, in radians.
///
/// `lat` lies in [-π/2, π/2] (up is positive) and `lon` in [-π, π]
/// (the centre column of an equirectangular frame is `lon = 0`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SphericalCoordinate {
    pub lat: f64,
    pub lon: f64,
}

impl SphericalCoordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Euler rotation in degrees, applied as Rz(yaw) · Ry(pitch) · Rx(roll).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RotationSpec {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl RotationSpec {
    pub fn new(yaw: f64, pitch: f64, roll: f64) -> Self {
        Self { yaw, pitch, roll }
    }

    /// The rotation that leaves every direction in place.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Pure rotation about the vertical axis.
    pub fn yaw(degrees: f64) -> Self {
        Self::new(degrees, 0.0, 0.0)
    }

    pub fn is_identity(&self) -> bool {
        self.yaw == 0.0 && self.pitch == 0.0 && self.roll == 0.0
    }

    /// `(yaw, pitch, roll)` converted to radians.
    pub fn to_radians(&self) -> (f64, f64, f64) {
        (
            self.yaw.to_radians(),
            self.pitch.to_radians(),
            self.roll.to_radians(),
        )
    }
}

impl fmt::Display for RotationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "yaw={:.1} pitch={:.1} roll={:.1}",
            self.yaw, self.pitch, self.roll
        )
    }
}

/// A viewing direction or a difference between two directions, in degrees.
///
/// `theta` is the horizontal angle (longitude) and `phi` the vertical
/// angle (latitude), matching what the perspective projector consumes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AngularOffset {
    pub theta: f64,
    pub phi: f64,
}

impl AngularOffset {
    pub fn new(theta: f64, phi: f64) -> Self {
        Self { theta, phi }
    }
}

impl Add for AngularOffset {
    type Output = AngularOffset;

    fn add(self, rhs: AngularOffset) -> AngularOffset {
        AngularOffset::new(self.theta + rhs.theta, self.phi + rhs.phi)
    }
}

impl Sub for AngularOffset {
    type Output = AngularOffset;

    fn sub(self, rhs: AngularOffset) -> AngularOffset {
        AngularOffset::new(self.theta - rhs.theta, self.phi - rhs.phi)
    }
}

impl fmt::Display for AngularOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(θ={:.2}°, φ={:.2}°)", self.theta, self.phi)
    }
}
