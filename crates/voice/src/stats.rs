//! Laufzeit-Statistiken des Voice-Pfads

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::info;

use crate::registry::SessionRegistry;

/// Zaehler des Voice-Pfads; alle Zugriffe sind lock-frei
#[derive(Default)]
pub struct VoiceStatistik {
    /// Empfangene Voice-Pakete (inkl. Heartbeats)
    pub empfangen: AtomicU64,
    /// Erfolgreich dekodierte und gespeicherte Frames
    pub verarbeitet: AtomicU64,
    /// Gesendete Mix-Pakete
    pub gesendet: AtomicU64,
}

/// Zaehlerstaende eines abgeschlossenen Intervalls
#[derive(Debug, PartialEq, Eq)]
pub struct IntervallZaehler {
    pub empfangen: u64,
    pub verarbeitet: u64,
    pub gesendet: u64,
}

impl VoiceStatistik {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn paket_empfangen(&self) {
        self.empfangen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_verarbeitet(&self) {
        self.verarbeitet.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mix_gesendet(&self) {
        self.gesendet.fetch_add(1, Ordering::Relaxed);
    }

    /// Schliesst das laufende Intervall ab: liest die Zaehler aus und
    /// setzt sie auf Null zurueck
    pub fn intervall_abschliessen(&self) -> IntervallZaehler {
        IntervallZaehler {
            empfangen: self.empfangen.swap(0, Ordering::Relaxed),
            verarbeitet: self.verarbeitet.swap(0, Ordering::Relaxed),
            gesendet: self.gesendet.swap(0, Ordering::Relaxed),
        }
    }
}

/// Loggt die Paketraten des letzten Intervalls, solange jemand im
/// Voice-Chat ist; die Zaehler werden pro Intervall zurueckgesetzt
pub async fn statistik_schleife(
    register: Arc<SessionRegistry>,
    statistik: Arc<VoiceStatistik>,
    intervall: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let sekunden = intervall.as_secs_f64().max(f64::MIN_POSITIVE);
    let mut ticker = tokio::time::interval(intervall);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let zaehler = statistik.intervall_abschliessen();
                let teilnehmer = register.voice_teilnehmer().len();
                if teilnehmer == 0 {
                    continue;
                }
                info!(
                    teilnehmer,
                    empfangen_pro_s = format_args!("{:.1}", zaehler.empfangen as f64 / sekunden),
                    verarbeitet_pro_s = format_args!("{:.1}", zaehler.verarbeitet as f64 / sekunden),
                    gesendet_pro_s = format_args!("{:.1}", zaehler.gesendet as f64 / sekunden),
                    "Voice-Statistik"
                );
            }
            _ = shutdown.recv() => {
                info!("Statistik-Schleife beendet");
                return;
            }
        }
    }
}
