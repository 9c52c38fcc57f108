//! Mischen mehrerer PCM-Quellen zu einem Frame
//!
//! Gleichgewichtete Summe mit 1/N-Skalierung; ragt die Spitze danach
//! ueber 1.0, begrenzt ein tanh-Soft-Clip das Signal ohne harte
//! Verzerrung. Das Ergebnis ist von der Reihenfolge der Quellen
//! unabhaengig.

use tracing::trace;

/// Mischt die gegebenen Quellen zu einem Frame.
///
/// `None` bei leerer Quellenliste oder ungleichen Frame-Laengen.
pub fn mischen(quellen: &[&[f32]]) -> Option<Vec<f32>> {
    let erste = quellen.first()?;
    let laenge = erste.len();
    if quellen.iter().any(|q| q.len() != laenge) {
        trace!("Quellen mit ungleicher Laenge, Mix uebersprungen");
        return None;
    }

    let gewicht = 1.0 / quellen.len() as f32;
    let mut mix = vec![0.0f32; laenge];
    for quelle in quellen {
        for (ziel, &sample) in mix.iter_mut().zip(quelle.iter()) {
            *ziel += sample * gewicht;
        }
    }

    let spitze = mix.iter().fold(0.0f32, |max, &s| max.max(s.abs()));
    if spitze > 1.0 {
        for s in mix.iter_mut() {
            *s = s.tanh();
        }
    }

    Some(mix)
}
