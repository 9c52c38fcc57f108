//! Voice-Empfangspfad – UDP-Pakete zu dekodierten Frames
//!
//! Eine einzelne Schleife liest den Voice-Socket, ordnet jedes Paket
//! seinem Absender zu, dekodiert es mit dessen Uplink-Decoder und legt
//! das Frame im Store ab. Heartbeats stempeln nur die Aktivitaet.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crosstalk_protocol::voice::{
    i16_zu_f32, nutzlast_klassifizieren, NutzlastArt, MAX_PAKET_GROESSE,
};

use crate::frames::FrameStore;
use crate::registry::SessionRegistry;
use crate::stats::VoiceStatistik;

/// Pause nach einem Socket-Lesefehler, verhindert Busy-Spinning
const FEHLER_BACKOFF: Duration = Duration::from_millis(10);

/// Empfangspuffer: ein Opus-Paket plus Reserve
const PUFFER_GROESSE: usize = MAX_PAKET_GROESSE + 125;

/// Empfangsschleife des Voice-Ports; laeuft bis zum Shutdown-Signal
pub async fn empfangs_schleife(
    socket: Arc<UdpSocket>,
    register: Arc<SessionRegistry>,
    speicher: Arc<FrameStore>,
    statistik: Arc<VoiceStatistik>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut puffer = [0u8; PUFFER_GROESSE];
    loop {
        tokio::select! {
            ergebnis = socket.recv_from(&mut puffer) => {
                match ergebnis {
                    Ok((laenge, absender)) => {
                        paket_verarbeiten(
                            &puffer[..laenge],
                            absender,
                            &register,
                            &speicher,
                            &statistik,
                        );
                    }
                    Err(e) => {
                        warn!(fehler = %e, "Voice-Socket Lesefehler");
                        tokio::time::sleep(FEHLER_BACKOFF).await;
                    }
                }
            }
            _ = shutdown.recv() => {
                info!("Voice-Empfangsschleife beendet");
                return;
            }
        }
    }
}

/// Verarbeitet ein einzelnes empfangenes Paket
fn paket_verarbeiten(
    daten: &[u8],
    absender: std::net::SocketAddr,
    register: &SessionRegistry,
    speicher: &FrameStore,
    statistik: &VoiceStatistik,
) {
    statistik.paket_empfangen();

    let Some(benutzer) = register.voice_absender_aufloesen(absender) else {
        debug!(absender = %absender, "Voice-Paket von unbekanntem Absender verworfen");
        return;
    };
    register.aktivitaet(&benutzer);

    match nutzlast_klassifizieren(daten) {
        NutzlastArt::Heartbeat => {
            trace!(benutzer = %benutzer, "Heartbeat");
        }
        NutzlastArt::Uebergroesse => {
            warn!(
                benutzer = %benutzer,
                laenge = daten.len(),
                "Uebergrosses Voice-Paket verworfen"
            );
        }
        NutzlastArt::Audio => {
            // Nur Voice-Mitglieder speisen den Mixer
            if !register
                .voice_teilnehmer()
                .iter()
                .any(|name| name == &benutzer)
            {
                debug!(benutzer = %benutzer, "Audio ohne Voice-Mitgliedschaft verworfen");
                return;
            }
            let dekodiert = register.mit_decoder(&benutzer, |decoder| decoder.dekodieren(daten));
            match dekodiert {
                Some(Ok(pcm)) => {
                    speicher.speichern(benutzer, i16_zu_f32(&pcm));
                    statistik.frame_verarbeitet();
                }
                Some(Err(e)) => {
                    debug!(benutzer = %benutzer, fehler = %e, "Dekodierung fehlgeschlagen");
                }
                None => {
                    // Session wurde zwischen Aufloesung und Dekodierung entfernt
                    debug!(benutzer = %benutzer, "Session waehrend Dekodierung verschwunden");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosstalk_audio::{OpusDecoder, OpusEncoder};
    use crosstalk_core::Benutzername;
    use crosstalk_protocol::codec::OpusProfil;
    use crosstalk_protocol::voice::{FRAME_GROESSE, HEARTBEAT};
    use std::net::SocketAddr;
    use std::sync::atomic::Ordering;

    fn adresse(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn aufbau() -> (SessionRegistry, FrameStore, VoiceStatistik, Benutzername) {
        let register = SessionRegistry::neu();
        let benutzer = Benutzername::neu("alice");
        register.beitreten(
            benutzer.clone(),
            adresse(5000),
            adresse(5001),
            OpusDecoder::neu().unwrap(),
            OpusEncoder::neu(OpusProfil::server_downlink()).unwrap(),
        );
        (register, FrameStore::neu(), VoiceStatistik::neu(), benutzer)
    }

    fn opus_paket() -> Vec<u8> {
        let mut encoder = OpusEncoder::neu(OpusProfil::client_uplink()).unwrap();
        let pcm: Vec<i16> = (0..FRAME_GROESSE)
            .map(|i| ((i as f32 * 0.05).sin() * 8000.0) as i16)
            .collect();
        encoder.kodieren(&pcm).unwrap()
    }

    #[test]
    fn audio_von_voice_mitglied_landet_im_store() {
        let (register, speicher, statistik, benutzer) = aufbau();
        register.voice_setzen(&benutzer, true).unwrap();

        paket_verarbeiten(&opus_paket(), adresse(5001), &register, &speicher, &statistik);

        assert_eq!(speicher.anzahl(), 1);
        assert_eq!(statistik.verarbeitet.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn audio_ohne_mitgliedschaft_wird_verworfen() {
        let (register, speicher, statistik, _benutzer) = aufbau();

        paket_verarbeiten(&opus_paket(), adresse(5001), &register, &speicher, &statistik);

        assert_eq!(speicher.anzahl(), 0);
        assert_eq!(statistik.empfangen.load(Ordering::Relaxed), 1);
        assert_eq!(statistik.verarbeitet.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn heartbeat_stempelt_nur_aktivitaet() {
        let (register, speicher, statistik, benutzer) = aufbau();
        register.voice_setzen(&benutzer, true).unwrap();

        paket_verarbeiten(&HEARTBEAT, adresse(5001), &register, &speicher, &statistik);

        assert_eq!(speicher.anzahl(), 0);
        assert_eq!(statistik.empfangen.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn unbekannter_absender_wird_verworfen() {
        let (register, speicher, statistik, _benutzer) = aufbau();
        let fremd: SocketAddr = "10.0.0.9:1234".parse().unwrap();

        paket_verarbeiten(&opus_paket(), fremd, &register, &speicher, &statistik);

        assert_eq!(speicher.anzahl(), 0);
        assert_eq!(statistik.verarbeitet.load(Ordering::Relaxed), 0);
    }
}
