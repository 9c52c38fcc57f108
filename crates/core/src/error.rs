//! Fehlertypen fuer Crosstalk
//!
//! Zentraler Fehler-Enum der alle moeglichen Fehlerzustaende abdeckt.
//! Untermodule koennen eigene Fehler definieren und via `#[from]` konvertieren.

use thiserror::Error;

/// Globaler Result-Alias fuer Crosstalk
pub type Result<T> = std::result::Result<T, CrosstalkError>;

/// Alle moeglichen Fehler im Crosstalk-System
#[derive(Debug, Error)]
pub enum CrosstalkError {
    // --- Verbindung & Netzwerk ---
    #[error("Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),

    // --- Protokoll ---
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    #[error("Paket zu gross: {laenge} Bytes (Maximum {maximum})")]
    PaketZuGross { laenge: usize, maximum: usize },

    // --- Sessions ---
    #[error("Teilnehmer nicht gefunden: {0}")]
    TeilnehmerNichtGefunden(String),

    #[error("Teilnehmer nicht im Voice-Chat: {0}")]
    NichtImVoice(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Audio ---
    #[error("Audiofehler: {0}")]
    Audio(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl CrosstalkError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler wiederholbar sein koennte
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(self, Self::Zeitlimit(_) | Self::Verbindung(_))
    }
}
