//! Mix-Schleife – personalisierter Downlink fuer jeden Hoerer
//!
//! Alle 20ms wird fuer jeden Voice-Teilnehmer ein eigener Mix aus den
//! Frames aller anderen Sprecher erstellt, mit dessen Downlink-Encoder
//! kodiert und an seine Voice-Adresse gesendet. Hoert gerade niemand
//! zu, wird der Frame-Store geleert; liegen keine Frames vor, sendet
//! der Takt nichts (Stille-Unterdrueckung auf dem Downlink).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crosstalk_protocol::voice::{f32_zu_i16, stille_frame};

use crate::frames::FrameStore;
use crate::registry::SessionRegistry;
use crate::stats::VoiceStatistik;

/// Abstand zwischen zwei Mix-Durchlaeufen (eine Frame-Dauer)
pub const MIX_INTERVALL: Duration = Duration::from_millis(20);

/// Erstellt die Pakete eines Mix-Durchlaufs: (Ziel-Adresse, Opus-Paket)
/// pro Hoerer. Leer wenn niemand zuhoert oder keine Frames vorliegen.
fn mix_tick(register: &SessionRegistry, speicher: &FrameStore) -> Vec<(SocketAddr, Vec<u8>)> {
    let hoerer = register.voice_teilnehmer();
    if hoerer.is_empty() {
        speicher.leeren();
        return Vec::new();
    }
    if speicher.anzahl() == 0 {
        return Vec::new();
    }

    let mut pakete = Vec::with_capacity(hoerer.len());
    for benutzer in hoerer {
        // Hoerer ohne fremde Quellen bekommen Stille statt gar nichts,
        // damit ihr Jitter-Puffer weiterlaeuft
        let mix = speicher
            .mix_fuer(&benutzer)
            .unwrap_or_else(stille_frame);
        let pcm = f32_zu_i16(&mix);

        let kodiert = register.mit_encoder(&benutzer, |encoder| encoder.kodieren(&pcm));
        let paket = match kodiert {
            Some(Ok(paket)) => paket,
            Some(Err(e)) => {
                debug!(benutzer = %benutzer, fehler = %e, "Downlink-Kodierung fehlgeschlagen");
                continue;
            }
            None => continue,
        };

        match register.voice_adresse(&benutzer) {
            Ok(adresse) => pakete.push((adresse, paket)),
            Err(e) => debug!(fehler = %e, "Hoerer waehrend des Mixens verschwunden"),
        }
    }
    pakete
}

/// Mix-Schleife; laeuft bis zum Shutdown-Signal
pub async fn misch_schleife(
    socket: Arc<UdpSocket>,
    register: Arc<SessionRegistry>,
    speicher: Arc<FrameStore>,
    statistik: Arc<VoiceStatistik>,
    intervall: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(intervall);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for (adresse, paket) in mix_tick(&register, &speicher) {
                    match socket.send_to(&paket, adresse).await {
                        Ok(_) => statistik.mix_gesendet(),
                        Err(e) => {
                            debug!(adresse = %adresse, fehler = %e, "Mix-Paket nicht zustellbar");
                        }
                    }
                }
            }
            _ = shutdown.recv() => {
                info!("Mix-Schleife beendet");
                return;
            }
        }
    }
}

/// Ueberwachte Mix-Schleife: stuerzt der Mixer-Task ab, wird er neu
/// gestartet statt den Voice-Chat stumm zu lassen.
pub async fn misch_schleife_ueberwacht(
    socket: Arc<UdpSocket>,
    register: Arc<SessionRegistry>,
    speicher: Arc<FrameStore>,
    statistik: Arc<VoiceStatistik>,
    intervall: Duration,
    shutdown: broadcast::Sender<()>,
) {
    loop {
        let handle = tokio::spawn(misch_schleife(
            socket.clone(),
            register.clone(),
            speicher.clone(),
            statistik.clone(),
            intervall,
            shutdown.subscribe(),
        ));
        match handle.await {
            Ok(()) => return,
            Err(e) if e.is_panic() => {
                error!("Mix-Schleife abgestuerzt, Neustart");
            }
            Err(e) => {
                warn!(fehler = %e, "Mix-Schleife abgebrochen");
                return;
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
    use crosstalk_protocol::voice::FRAME_GROESSE;

    fn adresse(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn teilnehmer(register: &SessionRegistry, name: &str, port: u16) -> Benutzername {
        let benutzer = Benutzername::neu(name);
        register.beitreten(
            benutzer.clone(),
            adresse(port),
            adresse(port + 1),
            OpusDecoder::neu().unwrap(),
            OpusEncoder::neu(OpusProfil::server_downlink()).unwrap(),
        );
        register.voice_setzen(&benutzer, true).unwrap();
        benutzer
    }

    #[test]
    fn ohne_hoerer_wird_store_geleert() {
        let register = SessionRegistry::neu();
        let speicher = FrameStore::neu();
        speicher.speichern(Benutzername::neu("geist"), vec![0.1; FRAME_GROESSE]);

        assert!(mix_tick(&register, &speicher).is_empty());
        assert_eq!(speicher.anzahl(), 0);
    }

    #[test]
    fn ohne_frames_wird_nichts_gesendet() {
        let register = SessionRegistry::neu();
        teilnehmer(&register, "alice", 5000);
        let speicher = FrameStore::neu();

        assert!(mix_tick(&register, &speicher).is_empty());
    }

    #[test]
    fn jeder_hoerer_bekommt_ein_paket() {
        let register = SessionRegistry::neu();
        let alice = teilnehmer(&register, "alice", 5000);
        teilnehmer(&register, "bob", 6000);
        let speicher = FrameStore::neu();
        speicher.speichern(alice.clone(), vec![0.2; FRAME_GROESSE]);

        let pakete = mix_tick(&register, &speicher);
        assert_eq!(pakete.len(), 2);
        let ziele: Vec<SocketAddr> = pakete.iter().map(|(a, _)| *a).collect();
        assert!(ziele.contains(&adresse(5001)));
        assert!(ziele.contains(&adresse(6001)));
        assert!(pakete.iter().all(|(_, p)| !p.is_empty()));
    }

    #[test]
    fn nicht_voice_mitglieder_bekommen_nichts() {
        let register = SessionRegistry::neu();
        let alice = teilnehmer(&register, "alice", 5000);
        let bob = teilnehmer(&register, "bob", 6000);
        register.voice_setzen(&bob, false).unwrap();

        let speicher = FrameStore::neu();
        speicher.speichern(alice.clone(), vec![0.2; FRAME_GROESSE]);

        let pakete = mix_tick(&register, &speicher);
        assert_eq!(pakete.len(), 1);
        assert_eq!(pakete[0].0, adresse(5001));
    }
}
