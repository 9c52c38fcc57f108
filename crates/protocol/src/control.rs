//! Control-Protokoll (zeilenorientiert, UTF-8, UDP Port 6000)
//!
//! Nachrichten vom Client an den Server:
//! - `"<benutzer> joined the chat"` – Registrierung
//! - `"VOICE_CONNECT"` / `"VOICE_DISCONNECT"` – Voice-Session umschalten
//! - `"[<benutzer>]: <text>"` – Chat-Nachricht, woertlich weitergeleitet
//! - `"[<benutzer>]: IMAGE_DATA:<base64>"` – Bild, woertlich weitergeleitet
//!
//! Die Chat- und Bild-Zeilen werden serverseitig nie geparst oder
//! veraendert, nur klassifiziert (fuer Logging) und an alle Teilnehmer
//! verteilt. Serverseitige Notizen (Voice-Beitritt/-Austritt) sind eigene
//! Broadcast-Zeilen.

use crosstalk_core::Benutzername;

/// Suffix der Registrierungszeile
const BEITRITT_SUFFIX: &str = " joined the chat";
/// Praefix einer Bild-Nutzlast innerhalb einer Chat-Zeile
const BILD_MARKER: &str = "]: IMAGE_DATA:";

// ---------------------------------------------------------------------------
// Nachrichtentypen
// ---------------------------------------------------------------------------

/// Eine vom Client empfangene Control-Nachricht
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlNachricht {
    /// Registrierung eines neuen Teilnehmers
    Beitritt { benutzer: Benutzername },
    /// Teilnehmer betritt den Voice-Chat
    VoiceConnect,
    /// Teilnehmer verlaesst den Voice-Chat
    VoiceDisconnect,
    /// Bild-Zeile – woertlich weiterleiten, nur fuers Logging unterschieden
    Bild { zeile: String },
    /// Beliebige andere Zeile (Chat) – woertlich weiterleiten
    Chat { zeile: String },
}

impl ControlNachricht {
    /// Klassifiziert eine empfangene Zeile
    ///
    /// Parsing ist infallibel: alles was kein bekanntes Signal ist, wird
    /// als Chat-Zeile behandelt und woertlich weitergeleitet.
    pub fn parsen(zeile: &str) -> Self {
        if let Some(benutzer) = zeile.strip_suffix(BEITRITT_SUFFIX) {
            if !benutzer.is_empty() && !benutzer.contains(BEITRITT_SUFFIX) {
                return Self::Beitritt {
                    benutzer: Benutzername::neu(benutzer),
                };
            }
        }
        match zeile {
            "VOICE_CONNECT" => Self::VoiceConnect,
            "VOICE_DISCONNECT" => Self::VoiceDisconnect,
            _ if zeile.contains(BILD_MARKER) => Self::Bild {
                zeile: zeile.to_string(),
            },
            _ => Self::Chat {
                zeile: zeile.to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Zeilen-Formatierung
// ---------------------------------------------------------------------------

/// Formatiert die Registrierungszeile eines Teilnehmers
pub fn beitritt_zeile(benutzer: &Benutzername) -> String {
    format!("{}{}", benutzer, BEITRITT_SUFFIX)
}

/// Broadcast-Notiz: Teilnehmer hat den Voice-Chat betreten
pub fn voice_beitritt_notiz(benutzer: &Benutzername) -> String {
    format!("{} joined voice chat", benutzer)
}

/// Broadcast-Notiz: Teilnehmer hat den Voice-Chat verlassen
pub fn voice_austritt_notiz(benutzer: &Benutzername) -> String {
    format!("{} left voice chat", benutzer)
}

/// Formatiert eine Chat-Zeile
pub fn chat_zeile(benutzer: &Benutzername, text: &str) -> String {
    format!("[{}]: {}", benutzer, text)
}

/// Formatiert eine Bild-Zeile (Base64-Nutzlast bleibt unangetastet)
pub fn bild_zeile(benutzer: &Benutzername, base64: &str) -> String {
    format!("[{}]: IMAGE_DATA:{}", benutzer, base64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beitritt_parsen() {
        let msg = ControlNachricht::parsen("alice joined the chat");
        assert_eq!(
            msg,
            ControlNachricht::Beitritt {
                benutzer: Benutzername::neu("alice")
            }
        );
    }

    #[test]
    fn voice_signale_parsen() {
        assert_eq!(
            ControlNachricht::parsen("VOICE_CONNECT"),
            ControlNachricht::VoiceConnect
        );
        assert_eq!(
            ControlNachricht::parsen("VOICE_DISCONNECT"),
            ControlNachricht::VoiceDisconnect
        );
    }

    #[test]
    fn chat_zeile_parsen() {
        let msg = ControlNachricht::parsen("[alice]: hallo zusammen");
        assert_eq!(
            msg,
            ControlNachricht::Chat {
                zeile: "[alice]: hallo zusammen".into()
            }
        );
    }

    #[test]
    fn bild_zeile_parsen() {
        let msg = ControlNachricht::parsen("[alice]: IMAGE_DATA:aGFsbG8=");
        assert!(matches!(msg, ControlNachricht::Bild { .. }));
    }

    #[test]
    fn leere_registrierung_ist_chat() {
        // " joined the chat" ohne Benutzername ist keine Registrierung
        let msg = ControlNachricht::parsen(" joined the chat");
        assert!(matches!(msg, ControlNachricht::Chat { .. }));
    }

    #[test]
    fn zeilen_roundtrip() {
        let alice = Benutzername::neu("alice");
        assert_eq!(beitritt_zeile(&alice), "alice joined the chat");
        assert_eq!(chat_zeile(&alice, "hi"), "[alice]: hi");
        assert_eq!(bild_zeile(&alice, "QUJD"), "[alice]: IMAGE_DATA:QUJD");
        assert!(matches!(
            ControlNachricht::parsen(&beitritt_zeile(&alice)),
            ControlNachricht::Beitritt { .. }
        ));
    }
}
