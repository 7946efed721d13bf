//! Modul für die Umwandlung von Sensor-Samples in Steuersignale.
//!
//! Zwei reine Stufen: der [`OrientationMapper`] leitet aus der Quaternion
//! einen Winkel (oder ein Winkelpaar) ab, der [`SignalConditioner`] begrenzt,
//! skaliert und glättet ihn. Welche Stufe wie arbeitet, legt eine
//! [`MappingConfig`] fest.

pub mod conditioner;
pub mod error;
pub mod mapping_config;
pub mod orientation;

// Re-exports für einfacheren Zugriff
pub use conditioner::{
    ChannelState, ControlSignal, RawOrientation, SignalConditioner, SmoothingLaw, ValueRange,
};
pub use error::MappingError;
pub use mapping_config::{MappingConfig, SignalSource, PRESET_NAMES};
pub use orientation::{
    AxisSelector, ComponentMap, EulerAngles, OrientationMapper, SignedComponent, MPU6050_MOUNT,
    WIRE_ORDER,
};
