//! Turns raw orientation values into smoothed, bounded control values

use serde::{Deserialize, Serialize};

use super::error::MappingError;
use super::mapping_config::MappingConfig;
use super::orientation::normalize_degrees;

/// Upper bound for the exponential smoothing factor; 1.0 would never move
pub const MAX_SMOOTHING_FACTOR: f32 = 0.99;

const MIN_SMOOTH_TIME: f32 = 0.0001;

/// Closed interval used for both input and output ranges
///
/// `min > max` is allowed and inverts the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Symmetric range `[-limit, limit]`
    pub const fn symmetric(limit: f32) -> Self {
        Self::new(-limit, limit)
    }

    pub fn is_degenerate(&self) -> bool {
        self.min == self.max
    }

    pub fn midpoint(&self) -> f32 {
        (self.min + self.max) / 2.0
    }

    pub fn clamp(&self, value: f32) -> f32 {
        let (low, high) = if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        };
        value.clamp(low, high)
    }

    /// Position of `value` within the range in [0, 1]; `None` if degenerate
    pub fn normalize(&self, value: f32) -> Option<f32> {
        if self.is_degenerate() {
            return None;
        }
        Some(((self.clamp(value) - self.min) / (self.max - self.min)).clamp(0.0, 1.0))
    }

    pub fn lerp(&self, t: f32) -> f32 {
        self.min + (self.max - self.min) * t
    }

    pub(crate) fn validate(&self, name: &'static str) -> Result<(), MappingError> {
        if self.min.is_finite() && self.max.is_finite() {
            Ok(())
        } else {
            Err(MappingError::InvalidRange {
                name,
                min: self.min,
                max: self.max,
            })
        }
    }
}

/// How the smoothed output follows its target
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(tag = "law", rename_all = "snake_case")]
pub enum SmoothingLaw {
    /// `lerp(current, target, 1 - factor)` every tick, frames or not
    Exponential { factor: f32 },

    /// Spring-damper that reaches the target without overshoot
    CriticallyDamped {
        /// Approximate time in seconds to reach the target
        smooth_time: f32,
        /// Optional speed limit in output units per second
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_speed: Option<f32>,
    },

    /// `lerp(current, target, dt * speed)`, frame-rate aware
    TimeScaled { speed: f32 },
}

impl Default for SmoothingLaw {
    fn default() -> Self {
        SmoothingLaw::Exponential { factor: 0.5 }
    }
}

impl SmoothingLaw {
    pub(crate) fn validate(&self) -> Result<(), MappingError> {
        match *self {
            SmoothingLaw::Exponential { factor } => {
                if !(0.0..=MAX_SMOOTHING_FACTOR).contains(&factor) {
                    return Err(MappingError::InvalidSmoothing(format!(
                        "factor {factor} outside [0, {MAX_SMOOTHING_FACTOR}]"
                    )));
                }
            }
            SmoothingLaw::CriticallyDamped {
                smooth_time,
                max_speed,
            } => {
                if !(smooth_time.is_finite() && smooth_time > 0.0) {
                    return Err(MappingError::InvalidSmoothing(format!(
                        "smooth_time {smooth_time} must be positive"
                    )));
                }
                if let Some(speed) = max_speed {
                    if speed.is_nan() || speed <= 0.0 {
                        return Err(MappingError::InvalidSmoothing(format!(
                            "max_speed {speed} must be positive"
                        )));
                    }
                }
            }
            SmoothingLaw::TimeScaled { speed } => {
                if !(speed.is_finite() && speed > 0.0) {
                    return Err(MappingError::InvalidSmoothing(format!(
                        "speed {speed} must be positive"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Whether the law keeps moving towards the last target on ticks without data
    ///
    /// Only the exponential law does; the damped and time-scaled laws step
    /// once per received frame.
    pub fn advances_while_idle(&self) -> bool {
        matches!(self, SmoothingLaw::Exponential { .. })
    }

    fn advance(&self, state: &ChannelState, target: f32, dt: f32) -> ChannelState {
        match *self {
            SmoothingLaw::Exponential { factor } => ChannelState {
                value: lerp(state.value, target, 1.0 - factor),
                velocity: 0.0,
                target,
            },
            SmoothingLaw::CriticallyDamped {
                smooth_time,
                max_speed,
            } => {
                let (value, velocity) = smooth_damp(
                    state.value,
                    target,
                    state.velocity,
                    smooth_time,
                    max_speed.map(f32::abs).unwrap_or(f32::INFINITY),
                    dt,
                );
                ChannelState {
                    value,
                    velocity,
                    target,
                }
            }
            SmoothingLaw::TimeScaled { speed } => ChannelState {
                value: lerp(state.value, target, (dt * speed).clamp(0.0, 1.0)),
                velocity: 0.0,
                target,
            },
        }
    }
}

/// Output value of one channel plus what the next step needs
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelState {
    pub value: f32,
    pub velocity: f32,
    pub target: f32,
}

impl ChannelState {
    /// At rest on `value`
    pub fn at(value: f32) -> Self {
        Self {
            value,
            velocity: 0.0,
            target: value,
        }
    }
}

/// What the host applies to its scene, one or two channels
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlSignal {
    Single(ChannelState),
    Dual {
        first: ChannelState,
        second: ChannelState,
    },
}

impl ControlSignal {
    pub fn values(&self) -> (f32, Option<f32>) {
        match self {
            ControlSignal::Single(channel) => (channel.value, None),
            ControlSignal::Dual { first, second } => (first.value, Some(second.value)),
        }
    }
}

/// Orientation value(s) fed into the conditioner, before clamping
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawOrientation {
    Single(f32),
    Dual(f32, f32),
}

/// Clamp, range map and smooth
///
/// Deterministic: the next state depends only on the arguments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalConditioner {
    input: ValueRange,
    output: ValueRange,
    smoothing: SmoothingLaw,
    // Output is an angle in degrees, blend along the shortest arc
    wrap_degrees: bool,
}

impl SignalConditioner {
    pub fn new(input: ValueRange, output: ValueRange, smoothing: SmoothingLaw) -> Self {
        Self {
            input,
            output,
            smoothing,
            wrap_degrees: false,
        }
    }

    /// Treat outputs as angles in degrees folded into [-180, 180)
    pub fn with_wrap_degrees(mut self, wrap: bool) -> Self {
        self.wrap_degrees = wrap;
        self
    }

    pub fn from_config(config: &MappingConfig) -> Self {
        Self::new(config.input_range, config.output_range, config.smoothing)
            .with_wrap_degrees(config.wrap_degrees)
    }

    /// Output value for `raw` before smoothing
    pub fn target(&self, raw: f32) -> f32 {
        match self.input.normalize(raw) {
            Some(t) => self.output.lerp(t),
            None => self.output.midpoint(),
        }
    }

    /// One smoothing step towards the target for `raw`
    ///
    /// `dt` is the elapsed time of the current tick in seconds;
    /// the exponential law ignores it.
    pub fn step(&self, raw: f32, state: &ChannelState, dt: f32) -> ChannelState {
        self.advance_channel(state, self.target(raw), dt)
    }

    /// Moves every channel towards its stored target on a tick without data
    ///
    /// `None` when the smoothing law holds still between frames.
    pub fn coast(&self, signal: &ControlSignal, dt: f32) -> Option<ControlSignal> {
        if !self.smoothing.advances_while_idle() {
            return None;
        }
        Some(match signal {
            ControlSignal::Single(channel) => {
                ControlSignal::Single(self.advance_channel(channel, channel.target, dt))
            }
            ControlSignal::Dual { first, second } => ControlSignal::Dual {
                first: self.advance_channel(first, first.target, dt),
                second: self.advance_channel(second, second.target, dt),
            },
        })
    }

    fn advance_channel(&self, state: &ChannelState, target: f32, dt: f32) -> ChannelState {
        if !self.wrap_degrees {
            return self.smoothing.advance(state, target, dt);
        }
        let nearest = state.value + normalize_degrees(target - state.value);
        let mut next = self.smoothing.advance(state, nearest, dt);
        next.value = normalize_degrees(next.value);
        next.target = target;
        next
    }

    /// Applies a raw orientation to the whole signal
    ///
    /// A shape mismatch restarts the channels at rest on their targets.
    pub fn apply(&self, signal: &ControlSignal, raw: RawOrientation, dt: f32) -> ControlSignal {
        match (signal, raw) {
            (ControlSignal::Single(channel), RawOrientation::Single(value)) => {
                ControlSignal::Single(self.step(value, channel, dt))
            }
            (ControlSignal::Dual { first, second }, RawOrientation::Dual(a, b)) => {
                ControlSignal::Dual {
                    first: self.step(a, first, dt),
                    second: self.step(b, second, dt),
                }
            }
            (_, RawOrientation::Single(value)) => {
                ControlSignal::Single(ChannelState::at(self.target(value)))
            }
            (_, RawOrientation::Dual(a, b)) => ControlSignal::Dual {
                first: ChannelState::at(self.target(a)),
                second: ChannelState::at(self.target(b)),
            },
        }
    }
}

fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}

/// Critically damped spring step, returns `(value, velocity)`
///
/// Uses the usual polynomial approximation of `exp(-omega * dt)`. Never
/// passes the target; on arrival the velocity is reset.
pub fn smooth_damp(
    current: f32,
    target: f32,
    velocity: f32,
    smooth_time: f32,
    max_speed: f32,
    dt: f32,
) -> (f32, f32) {
    if dt <= 0.0 {
        return (current, velocity);
    }

    let smooth_time = smooth_time.max(MIN_SMOOTH_TIME);
    let omega = 2.0 / smooth_time;
    let x = omega * dt;
    let decay = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);

    let max_change = max_speed * smooth_time;
    let change = (current - target).clamp(-max_change, max_change);
    let shifted_target = current - change;

    let temp = (velocity + omega * change) * dt;
    let mut new_velocity = (velocity - omega * temp) * decay;
    let mut output = shifted_target + (change + temp) * decay;

    if (target - current > 0.0) == (output > target) {
        output = target;
        new_velocity = (output - target) / dt;
    }

    (output, new_velocity)
}
