//! Kontroll-Kanal – zeilenorientierte UDP-Nachrichten auf Port 6000
//!
//! Der Dispatcher registriert Teilnehmer, schaltet deren Voice-Status
//! um und verteilt Chat- und Bild-Zeilen woertlich an alle Sessions.
//! Jede Kontroll-Nachricht stempelt die Aktivitaet ihres Absenders.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crosstalk_audio::{OpusDecoder, OpusEncoder};
use crosstalk_protocol::codec::OpusProfil;
use crosstalk_protocol::control::{
    beitritt_zeile, voice_austritt_notiz, voice_beitritt_notiz, ControlNachricht,
};
use crosstalk_protocol::voice::MAX_KONTROLL_NACHRICHT;
use crosstalk_voice::{FrameStore, SessionRegistry};

/// Eine an einen Kontroll-Endpunkt ausgehende Zeile
type Ausgang = (SocketAddr, String);

/// Kontroll-Schleife; laeuft bis zum Shutdown-Signal
pub async fn kontroll_schleife(
    socket: Arc<UdpSocket>,
    register: Arc<SessionRegistry>,
    speicher: Arc<FrameStore>,
    voice_port: u16,
    mut shutdown: broadcast::Receiver<()>,
) {
    // Bild-Zeilen koennen bis an die Datagramm-Grenze gehen
    let mut puffer = vec![0u8; MAX_KONTROLL_NACHRICHT];
    loop {
        tokio::select! {
            ergebnis = socket.recv_from(&mut puffer) => {
                match ergebnis {
                    Ok((laenge, absender)) => {
                        let zeile = String::from_utf8_lossy(&puffer[..laenge]);
                        let ausgaenge = nachricht_verarbeiten(
                            zeile.trim_end(),
                            absender,
                            &register,
                            &speicher,
                            voice_port,
                        );
                        for (ziel, text) in ausgaenge {
                            if let Err(e) = socket.send_to(text.as_bytes(), ziel).await {
                                debug!(ziel = %ziel, fehler = %e, "Kontroll-Zeile nicht zustellbar");
                            }
                        }
                    }
                    Err(e) => {
                        warn!(fehler = %e, "Kontroll-Socket Lesefehler");
                    }
                }
            }
            _ = shutdown.recv() => {
                info!("Kontroll-Schleife beendet");
                return;
            }
        }
    }
}

/// Verarbeitet eine Kontroll-Zeile und gibt die auszuliefernden
/// Zeilen zurueck
fn nachricht_verarbeiten(
    zeile: &str,
    absender: SocketAddr,
    register: &SessionRegistry,
    speicher: &FrameStore,
    voice_port: u16,
) -> Vec<Ausgang> {
    match ControlNachricht::parsen(zeile) {
        ControlNachricht::Beitritt { benutzer } => {
            // Downlink-Encoder und Uplink-Decoder gehoeren zur Session
            let decoder = match OpusDecoder::neu() {
                Ok(d) => d,
                Err(e) => {
                    error!(benutzer = %benutzer, fehler = %e, "Decoder-Erstellung fehlgeschlagen");
                    return Vec::new();
                }
            };
            let encoder = match OpusEncoder::neu(OpusProfil::server_downlink()) {
                Ok(e) => e,
                Err(e) => {
                    error!(benutzer = %benutzer, fehler = %e, "Encoder-Erstellung fehlgeschlagen");
                    return Vec::new();
                }
            };

            // Dem Neuankoemmling den bestehenden Raum vorstellen
            let mut ausgaenge: Vec<Ausgang> = Vec::new();
            for (name, in_voice) in register.uebersicht() {
                ausgaenge.push((absender, beitritt_zeile(&name)));
                if in_voice {
                    ausgaenge.push((absender, voice_beitritt_notiz(&name)));
                }
            }

            // Voice-Pakete kommen von derselben IP auf dem Voice-Port
            let voice_adresse = SocketAddr::new(absender.ip(), voice_port);
            register.beitreten(benutzer.clone(), absender, voice_adresse, decoder, encoder);

            // Den Beitritt allen anderen melden
            for ziel in register.kontroll_adressen(Some(absender)) {
                ausgaenge.push((ziel, beitritt_zeile(&benutzer)));
            }
            ausgaenge
        }
        ControlNachricht::VoiceConnect => {
            let Some(benutzer) = register.von_kontroll_endpunkt(absender) else {
                warn!(absender = %absender, "VOICE_CONNECT von unbekanntem Absender");
                return Vec::new();
            };
            if let Err(e) = register.voice_setzen(&benutzer, true) {
                warn!(fehler = %e, "Voice-Beitritt fehlgeschlagen");
                return Vec::new();
            }
            info!(benutzer = %benutzer, "Voice-Chat betreten");
            register
                .kontroll_adressen(Some(absender))
                .into_iter()
                .map(|ziel| (ziel, voice_beitritt_notiz(&benutzer)))
                .collect()
        }
        ControlNachricht::VoiceDisconnect => {
            let Some(benutzer) = register.von_kontroll_endpunkt(absender) else {
                warn!(absender = %absender, "VOICE_DISCONNECT von unbekanntem Absender");
                return Vec::new();
            };
            if let Err(e) = register.voice_setzen(&benutzer, false) {
                warn!(fehler = %e, "Voice-Austritt fehlgeschlagen");
                return Vec::new();
            }
            speicher.entfernen(&benutzer);
            info!(benutzer = %benutzer, "Voice-Chat verlassen");
            register
                .kontroll_adressen(Some(absender))
                .into_iter()
                .map(|ziel| (ziel, voice_austritt_notiz(&benutzer)))
                .collect()
        }
        ControlNachricht::Bild { zeile } => {
            debug!(absender = %absender, laenge = zeile.len(), "Bild-Zeile wird verteilt");
            relay(zeile, absender, register)
        }
        ControlNachricht::Chat { zeile } => relay(zeile, absender, register),
    }
}

/// Verteilt eine Zeile woertlich an alle Sessions (inklusive Absender,
/// zur Bestaetigung) und stempelt dessen Aktivitaet.
fn relay(zeile: String, absender: SocketAddr, register: &SessionRegistry) -> Vec<Ausgang> {
    if let Some(benutzer) = register.von_kontroll_endpunkt(absender) {
        register.aktivitaet(&benutzer);
    } else {
        debug!(absender = %absender, "Zeile von nicht registriertem Absender wird verteilt");
    }
    register
        .kontroll_adressen(None)
        .into_iter()
        .map(|ziel| (ziel, zeile.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosstalk_core::Benutzername;

    fn adresse(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn beitritt(register: &SessionRegistry, speicher: &FrameStore, name: &str, port: u16) {
        nachricht_verarbeiten(
            &format!("{name} joined the chat"),
            adresse(port),
            register,
            speicher,
            6001,
        );
    }

    #[test]
    fn beitritt_registriert_und_meldet() {
        let register = SessionRegistry::neu();
        let speicher = FrameStore::neu();
        beitritt(&register, &speicher, "alice", 5000);
        assert_eq!(register.anzahl(), 1);

        // Bobs Beitritt: Alice bekommt die Meldung, Bob die Uebersicht
        let ausgaenge = nachricht_verarbeiten(
            "bob joined the chat",
            adresse(6000),
            &register,
            &speicher,
            6001,
        );
        assert!(ausgaenge.contains(&(adresse(6000), "alice joined the chat".into())));
        assert!(ausgaenge.contains(&(adresse(5000), "bob joined the chat".into())));
        assert_eq!(register.anzahl(), 2);

        // Voice-Adresse: Kontroll-IP mit Voice-Port
        let bob = Benutzername::neu("bob");
        assert_eq!(register.voice_adresse(&bob).unwrap(), adresse(6001));
    }

    #[test]
    fn voice_umschalten_mit_notizen() {
        let register = SessionRegistry::neu();
        let speicher = FrameStore::neu();
        beitritt(&register, &speicher, "alice", 5000);
        beitritt(&register, &speicher, "bob", 6000);

        let ausgaenge =
            nachricht_verarbeiten("VOICE_CONNECT", adresse(5000), &register, &speicher, 6001);
        assert_eq!(
            ausgaenge,
            vec![(adresse(6000), "alice joined voice chat".to_string())]
        );
        assert_eq!(register.voice_teilnehmer(), vec![Benutzername::neu("alice")]);

        let ausgaenge =
            nachricht_verarbeiten("VOICE_DISCONNECT", adresse(5000), &register, &speicher, 6001);
        assert_eq!(
            ausgaenge,
            vec![(adresse(6000), "alice left voice chat".to_string())]
        );
        assert!(register.voice_teilnehmer().is_empty());
    }

    #[test]
    fn voice_austritt_raeumt_frames_auf() {
        let register = SessionRegistry::neu();
        let speicher = FrameStore::neu();
        beitritt(&register, &speicher, "alice", 5000);
        nachricht_verarbeiten("VOICE_CONNECT", adresse(5000), &register, &speicher, 6001);
        speicher.speichern(Benutzername::neu("alice"), vec![0.1; 960]);

        nachricht_verarbeiten("VOICE_DISCONNECT", adresse(5000), &register, &speicher, 6001);
        assert_eq!(speicher.anzahl(), 0);
    }

    #[test]
    fn voice_signal_von_unbekanntem_absender() {
        let register = SessionRegistry::neu();
        let speicher = FrameStore::neu();
        let ausgaenge =
            nachricht_verarbeiten("VOICE_CONNECT", adresse(9000), &register, &speicher, 6001);
        assert!(ausgaenge.is_empty());
    }

    #[test]
    fn chat_geht_an_alle() {
        let register = SessionRegistry::neu();
        let speicher = FrameStore::neu();
        beitritt(&register, &speicher, "alice", 5000);
        beitritt(&register, &speicher, "bob", 6000);

        let ausgaenge = nachricht_verarbeiten(
            "[alice]: hallo",
            adresse(5000),
            &register,
            &speicher,
            6001,
        );
        assert_eq!(ausgaenge.len(), 2);
        assert!(ausgaenge.iter().all(|(_, z)| z == "[alice]: hallo"));
    }

    #[test]
    fn neuankoemmling_sieht_voice_status() {
        let register = SessionRegistry::neu();
        let speicher = FrameStore::neu();
        beitritt(&register, &speicher, "alice", 5000);
        nachricht_verarbeiten("VOICE_CONNECT", adresse(5000), &register, &speicher, 6001);

        let ausgaenge = nachricht_verarbeiten(
            "bob joined the chat",
            adresse(6000),
            &register,
            &speicher,
            6001,
        );
        assert!(ausgaenge.contains(&(adresse(6000), "alice joined the chat".into())));
        assert!(ausgaenge.contains(&(adresse(6000), "alice joined voice chat".into())));
    }
}
