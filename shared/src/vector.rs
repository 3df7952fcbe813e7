use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

const EPSILON: f64 = 1e-6;

/// A vector in the 2D arena plane.
///
/// Angles follow the arena convention: 0 is north (+y) and they grow clockwise,
/// so east (+x) is π/2. On the wire a vector is a `[x, y]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Vector2 {
    pub x: f64,
    pub y: f64,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    ///Returns the magnitude of the vector.
    pub fn mag(&self) -> f64 {
        self.mag_sq().sqrt()
    }

    pub fn mag_sq(&self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    ///Returns the normalized vector; the null vector stays null.
    pub fn normalize(&self) -> Vector2 {
        let mag = self.mag();
        if mag > 0.0 {
            self.scale(1.0 / mag)
        } else {
            *self
        }
    }

    pub fn scale(&self, scalar: f64) -> Vector2 {
        Vector2::new(self.x * scalar, self.y * scalar)
    }

    pub fn set_mag(&self, mag: f64) -> Vector2 {
        if mag.is_nan() {
            return *self;
        }
        self.normalize().scale(mag)
    }

    /// Caps the magnitude at `max`, keeping the heading.
    pub fn limit(&self, max: f64) -> Vector2 {
        if max.is_nan() {
            return *self;
        }
        if self.mag_sq() > max * max {
            return self.normalize().scale(max);
        }
        *self
    }

    /// Heading from north, clockwise, in `[0, 2π)`. The null vector has heading 0.
    pub fn angle(&self) -> f64 {
        if self.x == 0.0 && self.y == 0.0 {
            return 0.0;
        }

        let mut angle = PI / 2.0 - self.y.atan2(self.x);
        if angle < 0.0 {
            angle += 2.0 * PI;
        }
        angle
    }

    /// Rotates the vector so that its heading becomes `radians`, keeping its magnitude.
    pub fn set_angle(&self, radians: f64) -> Vector2 {
        if radians.is_nan() {
            return *self;
        }

        let mag = self.mag();
        let rotated = Vector2::new(radians.sin() * mag, radians.cos() * mag);
        if rotated.x.is_nan() || rotated.y.is_nan() {
            return Vector2::ZERO;
        }
        rotated
    }

    pub fn dot(&self, other: &Vector2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Z component of the 3D cross product.
    pub fn cross(&self, other: &Vector2) -> f64 {
        self.x * other.y - self.y * other.x
    }

    pub fn orthogonal_clockwise(&self) -> Vector2 {
        Vector2::new(self.y, -self.x)
    }

    pub fn orthogonal_counter_clockwise(&self) -> Vector2 {
        Vector2::new(-self.y, self.x)
    }

    pub fn is_null(&self) -> bool {
        self.is_null_with_precision(EPSILON)
    }

    pub fn is_null_with_precision(&self, precision: f64) -> bool {
        self.x.abs() < precision && self.y.abs() < precision
    }

    pub fn equals(&self, other: &Vector2) -> bool {
        (*other - *self).is_null()
    }

    pub fn equals_with_precision(&self, other: &Vector2, precision: f64) -> bool {
        (*other - *self).is_null_with_precision(precision)
    }

    pub fn to_array(&self) -> [f64; 2] {
        [self.x, self.y]
    }
}

impl Add for Vector2 {
    type Output = Vector2;

    fn add(self, other: Vector2) -> Vector2 {
        Vector2::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for Vector2 {
    type Output = Vector2;

    fn sub(self, other: Vector2) -> Vector2 {
        Vector2::new(self.x - other.x, self.y - other.y)
    }
}

impl Mul<f64> for Vector2 {
    type Output = Vector2;

    fn mul(self, scalar: f64) -> Vector2 {
        self.scale(scalar)
    }
}

impl Neg for Vector2 {
    type Output = Vector2;

    fn neg(self) -> Vector2 {
        Vector2::new(-self.x, -self.y)
    }
}

impl From<[f64; 2]> for Vector2 {
    fn from(value: [f64; 2]) -> Self {
        Vector2::new(value[0], value[1])
    }
}

impl From<Vector2> for [f64; 2] {
    fn from(value: Vector2) -> Self {
        [value.x, value.y]
    }
}

impl fmt::Display for Vector2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Vector2({:.5}, {:.5})>", self.x, self.y)
    }
}
