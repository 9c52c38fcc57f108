//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use crosstalk_voice::{liveness::HEARTBEAT_INTERVALL, mixing::MIX_INTERVALL, registry::CLIENT_TIMEOUT};
use serde::{Deserialize, Serialize};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Voice-Einstellungen
    pub voice: VoiceEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse beider UDP-Sockets
    pub bind_adresse: String,
    /// Port des Kontroll-Kanals
    pub kontroll_port: u16,
    /// Port des Voice-Kanals
    pub voice_port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            kontroll_port: 6000,
            voice_port: 6001,
        }
    }
}

/// Voice-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceEinstellungen {
    /// Abstand zwischen zwei Mix-Durchlaeufen in Millisekunden
    pub mix_intervall_ms: u64,
    /// Timeout fuer inaktive Teilnehmer in Sekunden
    pub client_timeout_s: u64,
    /// Abstand zwischen Server-Heartbeats in Sekunden
    pub heartbeat_intervall_s: u64,
    /// Abstand zwischen Statistik-Ausgaben in Sekunden
    pub statistik_intervall_s: u64,
}

impl Default for VoiceEinstellungen {
    fn default() -> Self {
        Self {
            mix_intervall_ms: MIX_INTERVALL.as_millis() as u64,
            client_timeout_s: CLIENT_TIMEOUT.as_secs(),
            heartbeat_intervall_s: HEARTBEAT_INTERVALL.as_secs(),
            statistik_intervall_s: 5,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level (trace, debug, info, warn, error)
    pub level: String,
    /// Ausgabeformat ("text" oder "json")
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration; fehlende Datei liefert Standardwerte
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Bind-Adresse des Kontroll-Sockets
    pub fn kontroll_bind_adresse(&self) -> String {
        format!(
            "{}:{}",
            self.netzwerk.bind_adresse, self.netzwerk.kontroll_port
        )
    }

    /// Bind-Adresse des Voice-Sockets
    pub fn voice_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.voice_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardwerte() {
        let config = ServerConfig::default();
        assert_eq!(config.netzwerk.kontroll_port, 6000);
        assert_eq!(config.netzwerk.voice_port, 6001);
        assert_eq!(config.voice.mix_intervall_ms, 20);
        assert_eq!(config.voice.client_timeout_s, 30);
        assert_eq!(config.kontroll_bind_adresse(), "0.0.0.0:6000");
        assert_eq!(config.voice_bind_adresse(), "0.0.0.0:6001");
    }

    #[test]
    fn teilweise_toml_fuellt_mit_standardwerten() {
        let config: ServerConfig = toml::from_str(
            r#"
            [netzwerk]
            kontroll_port = 7000

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.netzwerk.kontroll_port, 7000);
        assert_eq!(config.netzwerk.voice_port, 6001);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.voice.heartbeat_intervall_s, 5);
    }

    #[test]
    fn ungueltige_toml_ist_fehler() {
        assert!(toml::from_str::<ServerConfig>("netzwerk = 42").is_err());
    }
}
