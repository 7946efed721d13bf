//! Sensor sample types and the wire-format parser
//!
//! The sensor firmware prints one quaternion per line as comma separated
//! floats in the order `w,x,y,z`. Anything after the fourth field is ignored.

pub mod frame_parser;

pub use frame_parser::{parse, ParseError};

use serde::{Deserialize, Serialize};

/// Quaternion component, named by its wire position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuaternionComponent {
    W,
    X,
    Y,
    Z,
}

/// One orientation sample as reported by the sensor, in wire order
///
/// Not normalized. All components are finite when produced by [`parse`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuaternionSample {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl QuaternionSample {
    pub const IDENTITY: QuaternionSample = QuaternionSample {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    pub fn component(&self, component: QuaternionComponent) -> f32 {
        match component {
            QuaternionComponent::W => self.w,
            QuaternionComponent::X => self.x,
            QuaternionComponent::Y => self.y,
            QuaternionComponent::Z => self.z,
        }
    }
}
