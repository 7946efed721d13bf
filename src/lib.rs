//! Orientation-to-control-signal pipeline for a serial quaternion sensor
//!
//! Reads `w,x,y,z` lines from an MPU6050-class sensor, derives an orientation
//! angle and turns it into a smoothed, bounded control value for a host loop.

pub mod config;
pub mod connection;
pub mod mapping;
pub mod pipeline;
pub mod sensor;
pub mod serial;
