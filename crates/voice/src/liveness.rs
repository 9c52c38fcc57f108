//! Liveness – Timeout-Ueberwachung und Server-Heartbeats
//!
//! Zwei periodische Aufgaben:
//! - Ablauf-Pruefung (alle timeout/2): warnt inaktive Teilnehmer und
//!   meldet sie nach vollem Timeout aus dem Voice-Chat ab, inklusive
//!   Aufraeumen ihrer Frames
//! - Heartbeat (alle 5s): haelt NAT-Bindings der Clients offen, auch
//!   wenn gerade kein Mix gesendet wird

use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crosstalk_protocol::voice::HEARTBEAT;

use crate::frames::FrameStore;
use crate::registry::{SessionRegistry, SweepErgebnis};

/// Abstand zwischen zwei Server-Heartbeats
pub const HEARTBEAT_INTERVALL: Duration = Duration::from_secs(5);

/// Ein Liveness-Durchlauf: Registry pruefen und Frames der
/// abgemeldeten Teilnehmer entfernen
pub fn ablauf_pruefung(
    register: &SessionRegistry,
    speicher: &FrameStore,
    timeout: Duration,
) -> SweepErgebnis {
    let ergebnis = register.inaktive_pruefen(timeout);
    for benutzer in &ergebnis.abgemeldet {
        speicher.entfernen(benutzer);
    }
    ergebnis
}

/// Periodische Timeout-Ueberwachung; prueft im halben Timeout-Takt
pub async fn ablauf_schleife(
    register: Arc<SessionRegistry>,
    speicher: Arc<FrameStore>,
    timeout: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(timeout / 2);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                ablauf_pruefung(&register, &speicher, timeout);
            }
            _ = shutdown.recv() => {
                info!("Ablauf-Ueberwachung beendet");
                return;
            }
        }
    }
}

/// Sendet periodisch Heartbeats an alle Voice-Teilnehmer
pub async fn heartbeat_schleife(
    socket: Arc<UdpSocket>,
    register: Arc<SessionRegistry>,
    intervall: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(intervall);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for benutzer in register.voice_teilnehmer() {
                    let Ok(adresse) = register.voice_adresse(&benutzer) else {
                        continue;
                    };
                    if let Err(e) = socket.send_to(&HEARTBEAT, adresse).await {
                        debug!(adresse = %adresse, fehler = %e, "Heartbeat nicht zustellbar");
                    }
                }
            }
            _ = shutdown.recv() => {
                info!("Heartbeat-Schleife beendet");
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
    use std::net::SocketAddr;

    fn adresse(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn abmeldung_raeumt_frames_auf() {
        let register = SessionRegistry::neu();
        let speicher = FrameStore::neu();
        let alice = Benutzername::neu("alice");
        register.beitreten(
            alice.clone(),
            adresse(5000),
            adresse(5001),
            OpusDecoder::neu().unwrap(),
            OpusEncoder::neu(OpusProfil::server_downlink()).unwrap(),
        );
        register.voice_setzen(&alice, true).unwrap();
        speicher.speichern(alice.clone(), vec![0.1; FRAME_GROESSE]);

        std::thread::sleep(Duration::from_millis(30));
        let ergebnis = ablauf_pruefung(&register, &speicher, Duration::from_millis(20));

        assert_eq!(ergebnis.abgemeldet, vec![alice]);
        assert_eq!(speicher.anzahl(), 0);
        assert!(register.voice_teilnehmer().is_empty());
    }
}
