//! Fehlerdefinitionen für das Mapping-Modul

use thiserror::Error;

/// Fehlertypen für die Mapping-Konfiguration
///
/// Laufzeitfehler gibt es in diesem Modul nicht: Mapping und Glättung sind
/// reine Funktionen. Fehler entstehen nur beim Prüfen der Konfiguration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    /// Ein Bereich enthält nicht-endliche Grenzen
    #[error("Ungültiger Bereich '{name}': [{min}, {max}]")]
    InvalidRange { name: &'static str, min: f32, max: f32 },

    /// Parameter des Glättungsverfahrens außerhalb des erlaubten Bereichs
    #[error("Ungültige Glättung: {0}")]
    InvalidSmoothing(String),

    /// Startwert ist nicht endlich
    #[error("Ungültiger Startwert: {0}")]
    InvalidInitialOutput(f32),

    /// Die Achsen für das Zwei-Achsen-Mapping sind identisch
    #[error("Doppelte Achse im Zwei-Achsen-Mapping: {0}")]
    DuplicateAxis(String),

    /// Das angeforderte Profil existiert nicht
    #[error("Unbekanntes Mapping-Profil: {0}")]
    UnknownProfile(String),
}
