//! Jitter-Puffer fuer die Wiedergabeseite
//!
//! Gleicht Netzwerk-Jitter aus indem dekodierte Frames erst gesammelt
//! und dann in gleichmaessigem Takt an die Wiedergabe gegeben werden.

use std::collections::VecDeque;

use tracing::debug;

use crosstalk_protocol::voice::{stille_frame, FRAME_GROESSE};

/// Maximale Anzahl gepufferter Frames (20 Frames = 400ms)
pub const STANDARD_KAPAZITAET: usize = 20;

/// Wiedergabe beginnt erst ab dieser Fuellung (7 Frames = 140ms Vorlauf)
pub const MIN_PUFFER_SCHWELLE: usize = 7;

/// FIFO-Puffer mit fester Kapazitaet; Ueberlauf verwirft das aelteste Frame
pub struct JitterBuffer {
    frames: VecDeque<Vec<f32>>,
    kapazitaet: usize,
    verworfen: u64,
}

impl JitterBuffer {
    /// Erstellt einen Puffer mit Standardkapazitaet
    pub fn neu() -> Self {
        Self::mit_kapazitaet(STANDARD_KAPAZITAET)
    }

    /// Erstellt einen Puffer mit eigener Kapazitaet
    pub fn mit_kapazitaet(kapazitaet: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(kapazitaet),
            kapazitaet,
            verworfen: 0,
        }
    }

    /// Fuegt ein Frame ein; Frames mit falscher Laenge werden verworfen.
    /// Ist der Puffer voll, weicht das aelteste Frame (Latenz vor Verlust).
    pub fn einfuegen(&mut self, frame: Vec<f32>) {
        if frame.len() != FRAME_GROESSE {
            debug!(
                laenge = frame.len(),
                erwartet = FRAME_GROESSE,
                "Frame mit falscher Laenge verworfen"
            );
            self.verworfen += 1;
            return;
        }
        if self.frames.len() >= self.kapazitaet {
            self.frames.pop_front();
            self.verworfen += 1;
        }
        self.frames.push_back(frame);
    }

    /// Entnimmt das aelteste Frame; ein leerer Puffer liefert ein
    /// stilles Frame (blockiert nie, schlaegt nie fehl)
    pub fn holen(&mut self) -> Vec<f32> {
        self.frames.pop_front().unwrap_or_else(stille_frame)
    }

    /// Anzahl aktuell gepufferter Frames
    pub fn verfuegbar(&self) -> usize {
        self.frames.len()
    }

    /// Anzahl insgesamt verworfener Frames (Ueberlauf + falsche Laenge)
    pub fn verworfen(&self) -> u64 {
        self.verworfen
    }

    /// Leert den Puffer
    pub fn leeren(&mut self) {
        self.frames.clear();
    }
}

impl Default for JitterBuffer {
    fn default() -> Self {
        Self::neu()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(wert: f32) -> Vec<f32> {
        vec![wert; FRAME_GROESSE]
    }

    #[test]
    fn fifo_reihenfolge() {
        let mut puffer = JitterBuffer::neu();
        puffer.einfuegen(frame(0.1));
        puffer.einfuegen(frame(0.2));
        assert_eq!(puffer.verfuegbar(), 2);
        assert_eq!(puffer.holen()[0], 0.1);
        assert_eq!(puffer.holen()[0], 0.2);
        assert_eq!(puffer.verfuegbar(), 0);
    }

    #[test]
    fn underrun_liefert_stille() {
        let mut puffer = JitterBuffer::neu();
        let still = puffer.holen();
        assert_eq!(still.len(), FRAME_GROESSE);
        assert!(still.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn ueberlauf_verwirft_aeltestes() {
        let mut puffer = JitterBuffer::mit_kapazitaet(3);
        for i in 0..5 {
            puffer.einfuegen(frame(i as f32));
        }
        assert_eq!(puffer.verfuegbar(), 3);
        assert_eq!(puffer.verworfen(), 2);
        // Die beiden aeltesten (0.0 und 1.0) sind weg
        assert_eq!(puffer.holen()[0], 2.0);
    }

    #[test]
    fn falsche_laenge_wird_verworfen() {
        let mut puffer = JitterBuffer::neu();
        puffer.einfuegen(vec![0.5; 100]);
        assert_eq!(puffer.verfuegbar(), 0);
        assert_eq!(puffer.verworfen(), 1);
    }

    #[test]
    fn leeren_setzt_zurueck() {
        let mut puffer = JitterBuffer::neu();
        puffer.einfuegen(frame(0.1));
        puffer.leeren();
        assert_eq!(puffer.verfuegbar(), 0);
    }
}
