//! Frame-Store – jeweils das neueste dekodierte Frame pro Sprecher
//!
//! Der Store haelt keine Historie: ein neues Frame ueberschreibt das
//! alte. Der Mixer liest alle 20ms den aktuellen Stand; Frames die
//! schneller ankommen als der Takt werden ueberschrieben, langsamere
//! Sprecher liefern dasselbe Frame mehrfach.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crosstalk_core::Benutzername;
use crosstalk_protocol::voice::FRAME_GROESSE;

use crate::mixer;

/// Neuestes PCM-Frame pro Sprecher
pub struct FrameStore {
    frames: RwLock<HashMap<Benutzername, Vec<f32>>>,
}

impl FrameStore {
    /// Erstellt einen leeren Store
    pub fn neu() -> Self {
        Self {
            frames: RwLock::new(HashMap::new()),
        }
    }

    /// Hinterlegt das neueste Frame eines Sprechers; Frames mit
    /// falscher Laenge werden verworfen.
    pub fn speichern(&self, sprecher: Benutzername, frame: Vec<f32>) {
        if frame.len() != FRAME_GROESSE {
            debug!(
                sprecher = %sprecher,
                laenge = frame.len(),
                "Frame mit falscher Laenge verworfen"
            );
            return;
        }
        self.frames.write().insert(sprecher, frame);
    }

    /// Entfernt das Frame eines Sprechers (Voice-Austritt, Timeout)
    pub fn entfernen(&self, sprecher: &Benutzername) {
        self.frames.write().remove(sprecher);
    }

    /// Leert den gesamten Store
    pub fn leeren(&self) {
        self.frames.write().clear();
    }

    /// Anzahl aktuell hinterlegter Sprecher
    pub fn anzahl(&self) -> usize {
        self.frames.read().len()
    }

    /// Mischt alle hinterlegten Frames ausser dem des Hoerers selbst.
    ///
    /// `None` wenn nach der Selbst-Ausblendung keine Quelle uebrig ist.
    pub fn mix_fuer(&self, hoerer: &Benutzername) -> Option<Vec<f32>> {
        let map = self.frames.read();
        let quellen: Vec<&[f32]> = map
            .iter()
            .filter(|(sprecher, _)| *sprecher != hoerer)
            .map(|(_, frame)| frame.as_slice())
            .collect();
        mixer::mischen(&quellen)
    }
}

impl Default for FrameStore {
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
    fn neuestes_frame_ueberschreibt() {
        let store = FrameStore::neu();
        let alice = Benutzername::neu("alice");
        store.speichern(alice.clone(), frame(0.1));
        store.speichern(alice.clone(), frame(0.2));
        assert_eq!(store.anzahl(), 1);

        let bob = Benutzername::neu("bob");
        let mix = store.mix_fuer(&bob).unwrap();
        assert!((mix[0] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn hoerer_hoert_sich_selbst_nicht() {
        let store = FrameStore::neu();
        let alice = Benutzername::neu("alice");
        let bob = Benutzername::neu("bob");
        store.speichern(alice.clone(), frame(0.4));
        store.speichern(bob.clone(), frame(0.2));

        // Alice hoert nur Bob
        let mix = store.mix_fuer(&alice).unwrap();
        assert!((mix[0] - 0.2).abs() < 1e-6);

        // Bob hoert nur Alice
        let mix = store.mix_fuer(&bob).unwrap();
        assert!((mix[0] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn einziger_sprecher_bekommt_keinen_mix() {
        let store = FrameStore::neu();
        let alice = Benutzername::neu("alice");
        store.speichern(alice.clone(), frame(0.4));
        assert!(store.mix_fuer(&alice).is_none());
    }

    #[test]
    fn falsche_laenge_wird_verworfen() {
        let store = FrameStore::neu();
        store.speichern(Benutzername::neu("alice"), vec![0.1; 30]);
        assert_eq!(store.anzahl(), 0);
    }

    #[test]
    fn entfernen_und_leeren() {
        let store = FrameStore::neu();
        let alice = Benutzername::neu("alice");
        let bob = Benutzername::neu("bob");
        store.speichern(alice.clone(), frame(0.1));
        store.speichern(bob.clone(), frame(0.1));
        store.entfernen(&alice);
        assert_eq!(store.anzahl(), 1);
        store.leeren();
        assert_eq!(store.anzahl(), 0);
    }
}
