//! Fehlertypen fuer die Audio-Engine

use thiserror::Error;

/// Alle moeglichen Fehler der Audio-Engine
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Kein Standard-Eingabegeraet verfuegbar")]
    KeinStandardEingabegeraet,

    #[error("Kein Standard-Ausgabegeraet verfuegbar")]
    KeinStandardAusgabegeraet,

    #[error("Stream-Fehler: {0}")]
    StreamFehler(String),

    #[error("Codec-Fehler: {0}")]
    CodecFehler(String),

    #[error("Frame-Laenge ungueltig: erwartet {erwartet}, erhalten {erhalten}")]
    FalscheFrameLaenge { erwartet: usize, erhalten: usize },

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unerwarteter Fehler: {0}")]
    Anyhow(#[from] anyhow::Error),
}

pub type AudioResult<T> = Result<T, AudioError>;
