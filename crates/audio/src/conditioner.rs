//! Signalaufbereitung fuer den Capture-Pfad
//!
//! Pro Frame, in dieser Reihenfolge:
//! 1. Mittlere quadratische Energie berechnen
//! 2. VAD-Entscheidung: Energie ueber der Schwelle setzt den
//!    Hangover-Zaehler zurueck, sonst wird er erhoeht
//! 3. Laeuft der Hangover ab, wird der Frame nur soft-gegated
//!    (abgeschwaecht, nicht genullt – vermeidet hoerbare Mute-Klicks)
//!    und die restlichen Stufen uebersprungen
//! 4. Einpoliger Hochpass (~100 Hz) gegen DC-Offset und Trittschall
//! 5. Dynamikkompression: Spitzen ueber der Schwelle skalieren den
//!    ganzen Frame herunter
//! 6. Normalisierung: Spitze ueber 1.0 wird auf 1.0 begrenzt (verhindert
//!    Clipping bei der Festkomma-Konvertierung)
//!
//! Der Aufbereiter ist bis auf den Hangover-Zaehler zustandslos; die
//! Filterhistorie startet pro Frame bei Null.

use crosstalk_protocol::voice::FRAME_DAUER_MS;

/// Konfiguration der Signalaufbereitung
#[derive(Debug, Clone)]
pub struct ConditionerConfig {
    /// Energie-Schwellenwert fuer die VAD-Entscheidung
    pub vad_schwelle: f32,
    /// Abschwaechungsfaktor des Soft-Gates (nicht 0.0 – kein hartes Muten)
    pub soft_gate_faktor: f32,
    /// Spitzenwert-Schwelle der Dynamikkompression
    pub kompressions_schwelle: f32,
    /// VAD-Haltezeit in Millisekunden (wird in Frames umgerechnet)
    pub hangover_ms: u32,
    /// Abtastrate in Hz
    pub abtastrate: u32,
    /// Grenzfrequenz des Hochpasses in Hz
    pub hochpass_hz: f32,
}

impl Default for ConditionerConfig {
    fn default() -> Self {
        Self {
            vad_schwelle: 0.005,
            soft_gate_faktor: 0.1,
            kompressions_schwelle: 0.8,
            hangover_ms: 150,
            abtastrate: 48_000,
            hochpass_hz: 100.0,
        }
    }
}

/// Signalaufbereiter – ein Exemplar pro Capture-Session
pub struct SignalConditioner {
    config: ConditionerConfig,
    /// Frames seit der letzten erkannten Sprachaktivitaet
    frames_seit_stimme: u32,
    /// Haltezeit in Frames (hangover_ms / Frame-Dauer)
    hangover_frames: u32,
    /// Hochpass-Koeffizient alpha = rc / (rc + dt)
    hochpass_alpha: f32,
}

impl SignalConditioner {
    /// Erstellt einen neuen Aufbereiter
    pub fn neu(config: ConditionerConfig) -> Self {
        let hangover_frames = config.hangover_ms / FRAME_DAUER_MS as u32;
        let rc = 1.0 / (2.0 * std::f32::consts::PI * config.hochpass_hz);
        let dt = 1.0 / config.abtastrate as f32;
        let hochpass_alpha = rc / (rc + dt);
        Self {
            config,
            frames_seit_stimme: 0,
            hangover_frames,
            hochpass_alpha,
        }
    }

    /// Erstellt einen Aufbereiter mit Standardkonfiguration
    pub fn standard() -> Self {
        Self::neu(ConditionerConfig::default())
    }

    /// Verarbeitet einen Frame; die Ausgabe hat immer die Eingabelaenge
    pub fn verarbeiten(&mut self, frame: &[f32]) -> Vec<f32> {
        let mut verarbeitet = frame.to_vec();
        if verarbeitet.is_empty() {
            return verarbeitet;
        }

        // 1. Mittlere quadratische Energie
        let energie: f32 =
            verarbeitet.iter().map(|s| s * s).sum::<f32>() / verarbeitet.len() as f32;

        // 2. VAD-Entscheidung
        if energie > self.config.vad_schwelle {
            self.frames_seit_stimme = 0;
        } else {
            self.frames_seit_stimme += 1;
        }

        // 3. Soft-Gate nach abgelaufenem Hangover
        if self.frames_seit_stimme > self.hangover_frames {
            for s in verarbeitet.iter_mut() {
                *s *= self.config.soft_gate_faktor;
            }
            return verarbeitet;
        }

        // 4. Hochpass
        self.hochpass(&mut verarbeitet);

        // 5. Dynamikkompression
        self.komprimieren(&mut verarbeitet);

        // 6. Normalisierung
        normalisieren(&mut verarbeitet);

        verarbeitet
    }

    /// Setzt den Hangover-Zaehler zurueck (neue Capture-Session)
    pub fn zuruecksetzen(&mut self) {
        self.frames_seit_stimme = 0;
    }

    /// Gibt zurueck ob das Gate aktuell offen ist
    pub fn gate_offen(&self) -> bool {
        self.frames_seit_stimme <= self.hangover_frames
    }

    /// Einpoliger Hochpass: y[n] = alpha * (y[n-1] + x[n] - x[n-1])
    fn hochpass(&self, samples: &mut [f32]) {
        let alpha = self.hochpass_alpha;
        let mut x_vorher = 0.0f32;
        let mut y_vorher = 0.0f32;
        for s in samples.iter_mut() {
            let x = *s;
            let y = alpha * (y_vorher + x - x_vorher);
            *s = y;
            x_vorher = x;
            y_vorher = y;
        }
    }

    /// Skaliert den ganzen Frame herunter wenn die Spitze die
    /// Kompressions-Schwelle ueberschreitet
    fn komprimieren(&self, samples: &mut [f32]) {
        let spitze = spitzenwert(samples);
        if spitze > self.config.kompressions_schwelle {
            let faktor = self.config.kompressions_schwelle / spitze;
            for s in samples.iter_mut() {
                *s *= faktor;
            }
        }
    }
}

/// Groesster Absolutwert eines Frames
fn spitzenwert(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |max, &s| max.max(s.abs()))
}

/// Begrenzt die Spitze auf 1.0 (nur wenn sie darueber liegt)
fn normalisieren(samples: &mut [f32]) {
    let spitze = spitzenwert(samples);
    if spitze > 1.0 {
        let faktor = 1.0 / spitze;
        for s in samples.iter_mut() {
            *s *= faktor;
        }
    }
}
