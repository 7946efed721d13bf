//! Quaternion to orientation angle conversion
//!
//! Pure geometry, no filtering. The sensor's wire quaternion is first remapped
//! into the engine convention with a [`ComponentMap`], then decomposed into
//! Euler angles using the engine's rotation order (Z first, then X, then Y),
//! and finally every angle is folded into [-180°, 180°).
//!
//! ```text
//! wire (w,x,y,z) ──ComponentMap──► engine quaternion ──ZXY──► (x, y, z)°
//!                                                              │
//!                                            select axis / pair, invert
//! ```

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use crate::sensor::{QuaternionComponent, QuaternionSample};

/// Which derived Euler angle drives the control signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisSelector {
    /// Rotation about X
    #[serde(alias = "x")]
    Pitch,
    /// Rotation about Y
    #[serde(alias = "y")]
    Yaw,
    /// Rotation about Z
    #[serde(alias = "z")]
    Roll,
}

impl Display for AxisSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisSelector::Pitch => write!(f, "Pitch"),
            AxisSelector::Yaw => write!(f, "Yaw"),
            AxisSelector::Roll => write!(f, "Roll"),
        }
    }
}

/// A wire component, optionally negated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct SignedComponent {
    pub source: QuaternionComponent,
    #[serde(default)]
    pub negate: bool,
}

impl SignedComponent {
    pub const fn plus(source: QuaternionComponent) -> Self {
        Self {
            source,
            negate: false,
        }
    }

    pub const fn minus(source: QuaternionComponent) -> Self {
        Self {
            source,
            negate: true,
        }
    }

    fn resolve(&self, sample: &QuaternionSample) -> f32 {
        let value = sample.component(self.source);
        if self.negate {
            -value
        } else {
            value
        }
    }
}

/// Sensor-to-engine quaternion component assignment
///
/// Each field names the wire component (and sign) that becomes the engine
/// quaternion's `x`, `y`, `z` and `w`. This depends on how the sensor is
/// mounted and on the firmware's output order, so it is configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ComponentMap {
    pub x: SignedComponent,
    pub y: SignedComponent,
    pub z: SignedComponent,
    pub w: SignedComponent,
}

/// Engine quaternion `(-qy, -qz, qx, qw)`, the mapping all three game scripts
/// shipped with. Not verified against a calibrated mount.
pub const MPU6050_MOUNT: ComponentMap = ComponentMap {
    x: SignedComponent::minus(QuaternionComponent::Y),
    y: SignedComponent::minus(QuaternionComponent::Z),
    z: SignedComponent::plus(QuaternionComponent::X),
    w: SignedComponent::plus(QuaternionComponent::W),
};

/// Engine quaternion `(qx, qy, qz, qw)`, wire components taken as-is
pub const WIRE_ORDER: ComponentMap = ComponentMap {
    x: SignedComponent::plus(QuaternionComponent::X),
    y: SignedComponent::plus(QuaternionComponent::Y),
    z: SignedComponent::plus(QuaternionComponent::Z),
    w: SignedComponent::plus(QuaternionComponent::W),
};

impl Default for ComponentMap {
    fn default() -> Self {
        MPU6050_MOUNT
    }
}

impl ComponentMap {
    /// Builds the (not normalized) engine quaternion for a sample
    pub fn apply(&self, sample: &QuaternionSample) -> Quaternion<f32> {
        Quaternion::new(
            self.w.resolve(sample),
            self.x.resolve(sample),
            self.y.resolve(sample),
            self.z.resolve(sample),
        )
    }
}

/// Euler angles in degrees, each in [-180, 180)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EulerAngles {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl EulerAngles {
    pub fn axis(&self, axis: AxisSelector) -> f32 {
        match axis {
            AxisSelector::Pitch => self.x,
            AxisSelector::Yaw => self.y,
            AxisSelector::Roll => self.z,
        }
    }
}

/// Converts sensor samples into orientation angles for one sensor mount
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrientationMapper {
    map: ComponentMap,
}

impl OrientationMapper {
    pub fn new(map: ComponentMap) -> Self {
        Self { map }
    }

    /// Engine-convention rotation of a sample
    ///
    /// A zero-length quaternion carries no orientation and maps to identity.
    pub fn rotation(&self, sample: &QuaternionSample) -> UnitQuaternion<f32> {
        UnitQuaternion::try_new(self.map.apply(sample), f32::EPSILON)
            .unwrap_or_else(UnitQuaternion::identity)
    }

    pub fn to_euler(&self, sample: &QuaternionSample) -> EulerAngles {
        euler_angles(&self.rotation(sample))
    }

    /// Signed angle in degrees for one axis
    pub fn to_angle(&self, sample: &QuaternionSample, axis: AxisSelector, invert: bool) -> f32 {
        apply_inversion(self.to_euler(sample).axis(axis), invert)
    }

    /// Pitch and roll in degrees; yaw is dropped so the target cannot spin
    pub fn to_constrained_euler(&self, sample: &QuaternionSample) -> (f32, f32) {
        let euler = self.to_euler(sample);
        (euler.x, euler.z)
    }

    /// Two configurable axes at once, for dual-axis outputs
    pub fn to_axis_pair(
        &self,
        sample: &QuaternionSample,
        first: AxisSelector,
        second: AxisSelector,
        invert: bool,
    ) -> (f32, f32) {
        let euler = self.to_euler(sample);
        (
            apply_inversion(euler.axis(first), invert),
            apply_inversion(euler.axis(second), invert),
        )
    }
}

/// A raw wire component used directly as the input value (no geometry)
pub fn raw_component(sample: &QuaternionSample, component: QuaternionComponent, invert: bool) -> f32 {
    apply_inversion(sample.component(component), invert)
}

/// Rebuilds a yaw-free rotation from constrained tilt angles in degrees
///
/// Same composition the engine uses for `Euler(x, 0, z)`: roll about Z
/// first, then pitch about X.
pub fn tilt_rotation(x_degrees: f32, z_degrees: f32) -> UnitQuaternion<f32> {
    let pitch = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), x_degrees.to_radians());
    let roll = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), z_degrees.to_radians());
    pitch * roll
}

/// Folds an angle in degrees into [-180, 180)
pub fn normalize_degrees(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped >= 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

fn apply_inversion(value: f32, invert: bool) -> f32 {
    if invert {
        -value
    } else {
        value
    }
}

// R = Ry * Rx * Rz, so m12 = -sin(x), m02/m22 give y and m10/m11 give z.
fn euler_angles(rotation: &UnitQuaternion<f32>) -> EulerAngles {
    let matrix = rotation.to_rotation_matrix();
    let m = matrix.matrix();

    let sin_x = (-m[(1, 2)]).clamp(-1.0, 1.0);
    let x = sin_x.asin();

    let (y, z) = if sin_x.abs() < 0.999_999 {
        (m[(0, 2)].atan2(m[(2, 2)]), m[(1, 0)].atan2(m[(1, 1)]))
    } else {
        // Gimbal lock, fold all remaining rotation into y
        ((-m[(2, 0)]).atan2(m[(0, 0)]), 0.0)
    };

    EulerAngles {
        x: normalize_degrees(x.to_degrees()),
        y: normalize_degrees(y.to_degrees()),
        z: normalize_degrees(z.to_degrees()),
    }
}
