//! Voice-Kanal-Nutzlasten
//!
//! Auf dem Voice-Port gibt es genau zwei Nutzlastarten:
//! - ein einzelnes reserviertes Byte `0x00` als Heartbeat/Keepalive-Marker
//! - ein Opus-Paket (maximal 1275 Bytes) fuer genau einen 20ms-Frame
//!
//! Dazu kommen die Frame-Konstanten und die Festkomma-Konvertierung
//! zwischen f32-PCM ([-1.0, 1.0]) und dem i16-Eingabeformat des Codecs.

/// Abtastrate in Hz
pub const ABTASTRATE: u32 = 48_000;
/// Kanalanzahl (Mono)
pub const KANAELE: u16 = 1;
/// Frame-Groesse in Samples: 20ms bei 48kHz Mono
pub const FRAME_GROESSE: usize = 960;
/// Frame-Dauer in Millisekunden
pub const FRAME_DAUER_MS: u64 = 20;
/// Maximale Opus-Paketgroesse in Bytes
pub const MAX_PAKET_GROESSE: usize = 1275;
/// Reserviertes Heartbeat-Paket (1 Byte, Wert 0, traegt kein Audio)
pub const HEARTBEAT: [u8; 1] = [0];
/// Maximale Control-Nachricht in Bytes (Obergrenze eines UDP-Datagramms,
/// relevant fuer Bild-Zeilen)
pub const MAX_KONTROLL_NACHRICHT: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Nutzlast-Klassifikation
// ---------------------------------------------------------------------------

/// Art einer auf dem Voice-Port empfangenen Nutzlast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NutzlastArt {
    /// Heartbeat-Marker – wird stillschweigend verworfen
    Heartbeat,
    /// Opus-Audiopaket
    Audio,
    /// Ueberschreitet `MAX_PAKET_GROESSE` – verwerfen
    Uebergroesse,
}

/// Klassifiziert eine empfangene Voice-Nutzlast
pub fn nutzlast_klassifizieren(daten: &[u8]) -> NutzlastArt {
    if daten.len() == 1 && daten[0] == 0 {
        NutzlastArt::Heartbeat
    } else if daten.len() > MAX_PAKET_GROESSE {
        NutzlastArt::Uebergroesse
    } else {
        NutzlastArt::Audio
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// Prueft ob ein Frame exakt `FRAME_GROESSE` Samples hat
///
/// Frames mit abweichender Laenge sind Protokoll-/Codec-Verletzungen und
/// muessen verworfen werden – niemals auffuellen oder abschneiden.
pub fn ist_gueltiger_frame(frame: &[f32]) -> bool {
    frame.len() == FRAME_GROESSE
}

/// Erstellt einen stillen Frame (alle Samples 0.0)
pub fn stille_frame() -> Vec<f32> {
    vec![0.0; FRAME_GROESSE]
}

// ---------------------------------------------------------------------------
// Festkomma-Konvertierung
// ---------------------------------------------------------------------------

/// Konvertiert f32-PCM zu i16 fuer den Codec-Eingang
///
/// Samples werden vor der Konvertierung auf [-1.0, 1.0] begrenzt.
pub fn f32_zu_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
        .collect()
}

/// Konvertiert i16-Codec-Ausgabe zurueck zu f32-PCM
pub fn i16_zu_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32767.0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_erkennung() {
        assert_eq!(nutzlast_klassifizieren(&[0]), NutzlastArt::Heartbeat);
        // Ein einzelnes Nicht-Null-Byte ist kein Heartbeat
        assert_eq!(nutzlast_klassifizieren(&[1]), NutzlastArt::Audio);
    }

    #[test]
    fn uebergroesse_erkennung() {
        let zu_gross = vec![0xAB; MAX_PAKET_GROESSE + 1];
        assert_eq!(
            nutzlast_klassifizieren(&zu_gross),
            NutzlastArt::Uebergroesse
        );
        let maximal = vec![0xAB; MAX_PAKET_GROESSE];
        assert_eq!(nutzlast_klassifizieren(&maximal), NutzlastArt::Audio);
    }

    #[test]
    fn frame_validierung() {
        assert!(ist_gueltiger_frame(&stille_frame()));
        assert!(!ist_gueltiger_frame(&[0.0; 959]));
        assert!(!ist_gueltiger_frame(&[]));
    }

    #[test]
    fn stille_frame_ist_null() {
        let frame = stille_frame();
        assert_eq!(frame.len(), FRAME_GROESSE);
        assert!(frame.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn konvertierung_begrenzt_ueberlauf() {
        let samples = [1.5f32, -1.5, 0.0];
        let pcm = f32_zu_i16(&samples);
        assert_eq!(pcm[0], 32767);
        assert_eq!(pcm[1], -32767);
        assert_eq!(pcm[2], 0);
    }

    #[test]
    fn konvertierung_roundtrip_innerhalb_quantisierungsschritt() {
        // Fuer Samples strikt innerhalb [-0.999, 0.999] muss der Roundtrip
        // innerhalb eines Quantisierungsschritts (1/32767) liegen.
        let schritt = 1.0f32 / 32767.0;
        let samples: Vec<f32> = (0..=1998)
            .map(|i| -0.999 + i as f32 * (2.0 * 0.999 / 1998.0))
            .collect();
        let zurueck = i16_zu_f32(&f32_zu_i16(&samples));
        for (orig, rt) in samples.iter().zip(zurueck.iter()) {
            assert!(
                (orig - rt).abs() <= schritt,
                "Roundtrip-Abweichung zu gross: {} -> {}",
                orig,
                rt
            );
        }
    }
}
