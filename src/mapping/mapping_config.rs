//! Mapping-Konfigurationen für die Pipeline
//!
//! Eine [`MappingConfig`] beschreibt vollständig, wie aus einem Sensor-Sample
//! ein Steuerwert wird: Signalquelle, Achsenzuordnung, Ein- und
//! Ausgabebereich sowie das Glättungsverfahren. Die drei mitgelieferten
//! Profile entsprechen den Spielen Paddle, Bird und Maze.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::sensor::{QuaternionComponent, QuaternionSample};

use super::conditioner::{ChannelState, ControlSignal, RawOrientation, SmoothingLaw, ValueRange};
use super::error::MappingError;
use super::orientation::{self, AxisSelector, ComponentMap, OrientationMapper};

/// Namen der eingebauten Profile
pub const PRESET_NAMES: [&str; 3] = ["paddle", "bird", "maze"];

/// Woher der Rohwert für den Conditioner stammt
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalSource {
    /// Ein Euler-Winkel in Grad
    EulerAxis { axis: AxisSelector },

    /// Zwei Euler-Winkel für Zwei-Achsen-Ausgaben (Gieren wird verworfen)
    ConstrainedEuler {
        first: AxisSelector,
        second: AxisSelector,
    },

    /// Eine rohe Quaternion-Komponente, ohne Geometrie
    RawComponent { component: QuaternionComponent },
}

impl SignalSource {
    /// Liest den Rohwert aus einem Sample
    pub fn read(
        &self,
        mapper: &OrientationMapper,
        sample: &QuaternionSample,
        invert: bool,
    ) -> RawOrientation {
        match *self {
            SignalSource::EulerAxis { axis } => {
                RawOrientation::Single(mapper.to_angle(sample, axis, invert))
            }
            SignalSource::ConstrainedEuler { first, second } => {
                let (a, b) = mapper.to_axis_pair(sample, first, second, invert);
                RawOrientation::Dual(a, b)
            }
            SignalSource::RawComponent { component } => {
                RawOrientation::Single(orientation::raw_component(sample, component, invert))
            }
        }
    }

    pub fn is_dual(&self) -> bool {
        matches!(self, SignalSource::ConstrainedEuler { .. })
    }
}

/// Unveränderliche Konfiguration eines Mappings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MappingConfig {
    pub name: String,

    /// Rohwert vor dem Clamping negieren
    #[serde(default)]
    pub invert: bool,

    /// Startwert der Ausgabe; ohne Angabe die Mitte des Ausgabebereichs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_output: Option<f32>,

    /// Ausgabe als Winkel in Grad behandeln und über den kürzeren Bogen glätten
    #[serde(default)]
    pub wrap_degrees: bool,

    pub source: SignalSource,

    #[serde(default)]
    pub component_map: ComponentMap,

    pub input_range: ValueRange,
    pub output_range: ValueRange,

    #[serde(default)]
    pub smoothing: SmoothingLaw,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self::paddle()
    }
}

impl MappingConfig {
    /// Paddle: Rollwinkel ±30° auf die Spielfeldbreite
    pub fn paddle() -> Self {
        Self {
            name: "paddle".to_string(),
            invert: false,
            initial_output: Some(0.0),
            wrap_degrees: false,
            source: SignalSource::EulerAxis {
                axis: AxisSelector::Roll,
            },
            component_map: orientation::MPU6050_MOUNT,
            input_range: ValueRange::symmetric(30.0),
            output_range: ValueRange::new(-8.0, 8.0),
            smoothing: SmoothingLaw::Exponential { factor: 0.5 },
        }
    }

    /// Bird: rohes qy linear auf die Flughöhe
    pub fn bird() -> Self {
        Self {
            name: "bird".to_string(),
            invert: false,
            initial_output: None,
            wrap_degrees: false,
            source: SignalSource::RawComponent {
                component: QuaternionComponent::Y,
            },
            component_map: orientation::WIRE_ORDER,
            input_range: ValueRange::new(-0.5, 0.5),
            output_range: ValueRange::new(-3.0, 5.0),
            smoothing: SmoothingLaw::CriticallyDamped {
                smooth_time: 0.1,
                max_speed: None,
            },
        }
    }

    /// Maze: Nicken und Rollen als Neigung der Plattform
    pub fn maze() -> Self {
        Self {
            name: "maze".to_string(),
            invert: false,
            initial_output: Some(0.0),
            wrap_degrees: true,
            source: SignalSource::ConstrainedEuler {
                first: AxisSelector::Pitch,
                second: AxisSelector::Roll,
            },
            component_map: orientation::MPU6050_MOUNT,
            input_range: ValueRange::symmetric(180.0),
            output_range: ValueRange::symmetric(180.0),
            smoothing: SmoothingLaw::TimeScaled { speed: 10.0 },
        }
    }

    /// Lädt ein eingebautes Profil anhand seines Namens
    pub fn from_preset(name: &str) -> Result<Self, MappingError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "paddle" => Ok(Self::paddle()),
            "bird" => Ok(Self::bird()),
            "maze" => Ok(Self::maze()),
            other => Err(MappingError::UnknownProfile(other.to_string())),
        }
    }

    /// Prüft die Konfiguration auf gültige Werte
    pub fn validate(&self) -> Result<(), MappingError> {
        self.input_range.validate("input_range")?;
        self.output_range.validate("output_range")?;
        self.smoothing.validate()?;

        if let Some(initial) = self.initial_output {
            if !initial.is_finite() {
                return Err(MappingError::InvalidInitialOutput(initial));
            }
        }

        if let SignalSource::ConstrainedEuler { first, second } = self.source {
            if first == second {
                return Err(MappingError::DuplicateAxis(first.to_string()));
            }
        }

        debug!("Mapping-Konfiguration '{}' ist gültig", self.name);
        Ok(())
    }

    /// Mapper für die konfigurierte Achsenzuordnung
    pub fn mapper(&self) -> OrientationMapper {
        OrientationMapper::new(self.component_map)
    }

    /// Ausgangszustand des Steuersignals vor dem ersten Frame
    pub fn initial_signal(&self) -> ControlSignal {
        let start = ChannelState::at(
            self.initial_output
                .unwrap_or_else(|| self.output_range.midpoint()),
        );
        if self.source.is_dual() {
            ControlSignal::Dual {
                first: start,
                second: start,
            }
        } else {
            ControlSignal::Single(start)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        for name in PRESET_NAMES {
            let config = MappingConfig::from_preset(name).unwrap();
            assert_eq!(config.name, name);
            config.validate().unwrap();
        }
    }

    #[test]
    fn unknown_preset_is_rejected() {
        assert_eq!(
            MappingConfig::from_preset("pong"),
            Err(MappingError::UnknownProfile("pong".to_string()))
        );
    }

    #[test]
    fn initial_signal_shape_follows_source() {
        assert!(matches!(
            MappingConfig::paddle().initial_signal(),
            ControlSignal::Single(ChannelState { value, .. }) if value == 0.0
        ));
        assert!(matches!(
            MappingConfig::bird().initial_signal(),
            ControlSignal::Single(ChannelState { value, .. }) if value == 1.0
        ));
        assert!(matches!(
            MappingConfig::maze().initial_signal(),
            ControlSignal::Dual { .. }
        ));
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut config = MappingConfig::paddle();
        config.output_range = ValueRange::new(f32::NAN, 1.0);
        assert!(matches!(
            config.validate(),
            Err(MappingError::InvalidRange { name: "output_range", .. })
        ));

        let mut config = MappingConfig::paddle();
        config.initial_output = Some(f32::INFINITY);
        assert!(matches!(
            config.validate(),
            Err(MappingError::InvalidInitialOutput(_))
        ));

        let mut config = MappingConfig::maze();
        config.source = SignalSource::ConstrainedEuler {
            first: AxisSelector::Roll,
            second: AxisSelector::Roll,
        };
        assert!(matches!(config.validate(), Err(MappingError::DuplicateAxis(_))));
    }

    #[test]
    fn degenerate_input_range_is_valid() {
        let mut config = MappingConfig::bird();
        config.input_range = ValueRange::new(0.2, 0.2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn raw_component_source_reads_wire_value() {
        let config = MappingConfig::bird();
        let sample = QuaternionSample::new(0.9, 0.1, 0.25, 0.0);
        assert_eq!(
            config.source.read(&config.mapper(), &sample, config.invert),
            RawOrientation::Single(0.25)
        );
    }

    #[test]
    fn round_trips_through_toml() {
        for config in [MappingConfig::paddle(), MappingConfig::bird(), MappingConfig::maze()] {
            let text = toml::to_string(&config).unwrap();
            let parsed: MappingConfig = toml::from_str(&text).unwrap();
            assert_eq!(parsed, config);
        }
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let text = r#"
            name = "custom"

            [source]
            kind = "euler_axis"
            axis = "z"

            [input_range]
            min = -45.0
            max = 45.0

            [output_range]
            min = 0.0
            max = 1.0
        "#;
        let config: MappingConfig = toml::from_str(text).unwrap();
        assert_eq!(
            config.source,
            SignalSource::EulerAxis {
                axis: AxisSelector::Roll
            }
        );
        assert_eq!(config.component_map, orientation::MPU6050_MOUNT);
        assert_eq!(config.smoothing, SmoothingLaw::default());
        assert!(!config.invert);
        assert!(!config.wrap_degrees);
    }
}
