//! Session-Registry – In-Memory Zustand aller verbundenen Teilnehmer
//!
//! Verwaltet pro Teilnehmer:
//! - Kontroll- und Voice-Endpunkt
//! - Voice-Mitgliedschaft
//! - Aktivitaets-Zeitstempel fuer die Liveness-Pruefung
//! - Codec-Handles (Decoder fuer den Uplink, Encoder fuer den Downlink)
//!
//! Ein einzelner RwLock ueber der gesamten Map haelt alle Felder eines
//! Teilnehmers zueinander konsistent; die Codec-Handles haben eigene
//! Mutexe damit die teuren Opus-Aufrufe den Registry-Lock nicht halten.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crosstalk_audio::{OpusDecoder, OpusEncoder};
use crosstalk_core::{Benutzername, CrosstalkError, Result};

/// Timeout fuer inaktive Teilnehmer (keine Aktivitaet seit 30 Sekunden)
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Teilnehmer
// ---------------------------------------------------------------------------

/// Zustand eines einzelnen verbundenen Teilnehmers
pub struct Teilnehmer {
    /// Endpunkt von dem die Kontroll-Nachrichten kommen
    pub kontroll_adresse: SocketAddr,
    /// Endpunkt an den Voice-Pakete gesendet werden
    pub voice_adresse: SocketAddr,
    /// Nimmt der Teilnehmer gerade am Voice-Chat teil?
    pub in_voice: bool,
    /// Zeitpunkt der letzten Aktivitaet (Kontroll- oder Voice-Paket)
    pub letzte_aktivitaet: Instant,
    /// Hat die Liveness-Pruefung schon gewarnt?
    gewarnt: bool,
    /// Decoder fuer eingehende Voice-Pakete dieses Teilnehmers
    decoder: Arc<Mutex<OpusDecoder>>,
    /// Encoder fuer den personalisierten Downlink-Mix
    encoder: Arc<Mutex<OpusEncoder>>,
}

impl Teilnehmer {
    fn neu(
        kontroll_adresse: SocketAddr,
        voice_adresse: SocketAddr,
        decoder: OpusDecoder,
        encoder: OpusEncoder,
    ) -> Self {
        Self {
            kontroll_adresse,
            voice_adresse,
            in_voice: false,
            letzte_aktivitaet: Instant::now(),
            gewarnt: false,
            decoder: Arc::new(Mutex::new(decoder)),
            encoder: Arc::new(Mutex::new(encoder)),
        }
    }

    /// Prueft ob der Teilnehmer als inaktiv gilt
    pub fn ist_inaktiv(&self, timeout: Duration) -> bool {
        self.letzte_aktivitaet.elapsed() > timeout
    }
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

/// Ergebnis eines Liveness-Durchlaufs
#[derive(Debug, Default)]
pub struct SweepErgebnis {
    /// Teilnehmer die seit timeout/2 nichts gesendet haben (erste Warnung)
    pub gewarnt: Vec<Benutzername>,
    /// Teilnehmer die den vollen Timeout ueberschritten haben und aus dem
    /// Voice-Chat abgemeldet wurden
    pub abgemeldet: Vec<Benutzername>,
}

/// Zentrale Registry aller Sessions, indexiert nach Benutzername
pub struct SessionRegistry {
    teilnehmer: RwLock<HashMap<Benutzername, Teilnehmer>>,
}

impl SessionRegistry {
    /// Erstellt eine leere Registry
    pub fn neu() -> Self {
        Self {
            teilnehmer: RwLock::new(HashMap::new()),
        }
    }

    /// Registriert einen Teilnehmer oder ersetzt seine bestehende Session
    /// (Reconnect desselben Namens uebernimmt den Eintrag).
    pub fn beitreten(
        &self,
        benutzer: Benutzername,
        kontroll_adresse: SocketAddr,
        voice_adresse: SocketAddr,
        decoder: OpusDecoder,
        encoder: OpusEncoder,
    ) {
        let mut map = self.teilnehmer.write();
        let ersetzt = map
            .insert(
                benutzer.clone(),
                Teilnehmer::neu(kontroll_adresse, voice_adresse, decoder, encoder),
            )
            .is_some();
        if ersetzt {
            info!(benutzer = %benutzer, "Bestehende Session ersetzt");
        } else {
            info!(benutzer = %benutzer, adresse = %kontroll_adresse, "Teilnehmer registriert");
        }
    }

    /// Entfernt eine Session vollstaendig
    pub fn entfernen(&self, benutzer: &Benutzername) -> bool {
        let entfernt = self.teilnehmer.write().remove(benutzer).is_some();
        if entfernt {
            info!(benutzer = %benutzer, "Session entfernt");
        }
        entfernt
    }

    /// Setzt die Voice-Mitgliedschaft eines Teilnehmers
    pub fn voice_setzen(&self, benutzer: &Benutzername, in_voice: bool) -> Result<()> {
        let mut map = self.teilnehmer.write();
        let eintrag = map
            .get_mut(benutzer)
            .ok_or_else(|| CrosstalkError::TeilnehmerNichtGefunden(benutzer.to_string()))?;
        eintrag.in_voice = in_voice;
        eintrag.letzte_aktivitaet = Instant::now();
        eintrag.gewarnt = false;
        debug!(benutzer = %benutzer, in_voice, "Voice-Status geaendert");
        Ok(())
    }

    /// Aktualisiert den Aktivitaets-Zeitstempel
    pub fn aktivitaet(&self, benutzer: &Benutzername) {
        if let Some(eintrag) = self.teilnehmer.write().get_mut(benutzer) {
            eintrag.letzte_aktivitaet = Instant::now();
            eintrag.gewarnt = false;
        }
    }

    /// Anzahl aller registrierten Sessions
    pub fn anzahl(&self) -> usize {
        self.teilnehmer.read().len()
    }

    /// Alle Benutzernamen mit aktiver Voice-Mitgliedschaft
    pub fn voice_teilnehmer(&self) -> Vec<Benutzername> {
        self.teilnehmer
            .read()
            .iter()
            .filter(|(_, t)| t.in_voice)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Voice-Endpunkt eines Teilnehmers
    pub fn voice_adresse(&self, benutzer: &Benutzername) -> Result<SocketAddr> {
        self.teilnehmer
            .read()
            .get(benutzer)
            .map(|t| t.voice_adresse)
            .ok_or_else(|| CrosstalkError::TeilnehmerNichtGefunden(benutzer.to_string()))
    }

    /// Kontroll-Endpunkte aller Teilnehmer, optional ohne einen Absender
    pub fn kontroll_adressen(&self, ausser: Option<SocketAddr>) -> Vec<SocketAddr> {
        self.teilnehmer
            .read()
            .values()
            .map(|t| t.kontroll_adresse)
            .filter(|adresse| Some(*adresse) != ausser)
            .collect()
    }

    /// Alle Sessions als (Name, in_voice) Paare, fuer die Begruessung
    /// neuer Teilnehmer
    pub fn uebersicht(&self) -> Vec<(Benutzername, bool)> {
        self.teilnehmer
            .read()
            .iter()
            .map(|(name, t)| (name.clone(), t.in_voice))
            .collect()
    }

    /// Findet den Benutzer zu einem Kontroll-Endpunkt
    pub fn von_kontroll_endpunkt(&self, adresse: SocketAddr) -> Option<Benutzername> {
        self.teilnehmer
            .read()
            .iter()
            .find(|(_, t)| t.kontroll_adresse == adresse)
            .map(|(name, _)| name.clone())
    }

    /// Ordnet ein eingehendes Voice-Paket seinem Absender zu.
    ///
    /// Zuerst exakter Abgleich der Voice-Adresse. Schlaegt der fehl
    /// (NAT hat den Quellport geaendert), wird ueber die IP der
    /// Kontroll-Adresse zugeordnet und die Voice-Adresse auf den
    /// tatsaechlichen Absender umgebunden. Der Fallback beschraenkt
    /// sich auf Voice-Mitglieder: hinter einer gemeinsamen IP darf
    /// ein rotierter Quellport nie an eine Nur-Chat-Session binden.
    pub fn voice_absender_aufloesen(&self, absender: SocketAddr) -> Option<Benutzername> {
        {
            let map = self.teilnehmer.read();
            if let Some((name, _)) = map.iter().find(|(_, t)| t.voice_adresse == absender) {
                return Some(name.clone());
            }
        }
        let mut map = self.teilnehmer.write();
        if let Some((name, eintrag)) = map
            .iter_mut()
            .find(|(_, t)| t.in_voice && t.kontroll_adresse.ip() == absender.ip())
        {
            debug!(
                benutzer = %name,
                alt = %eintrag.voice_adresse,
                neu = %absender,
                "Voice-Adresse umgebunden"
            );
            eintrag.voice_adresse = absender;
            return Some(name.clone());
        }
        None
    }

    /// Fuehrt eine Operation auf dem Uplink-Decoder eines Teilnehmers aus
    pub fn mit_decoder<R>(
        &self,
        benutzer: &Benutzername,
        f: impl FnOnce(&mut OpusDecoder) -> R,
    ) -> Option<R> {
        let decoder = self.teilnehmer.read().get(benutzer)?.decoder.clone();
        let mut guard = decoder.lock();
        Some(f(&mut guard))
    }

    /// Fuehrt eine Operation auf dem Downlink-Encoder eines Teilnehmers aus
    pub fn mit_encoder<R>(
        &self,
        benutzer: &Benutzername,
        f: impl FnOnce(&mut OpusEncoder) -> R,
    ) -> Option<R> {
        let encoder = self.teilnehmer.read().get(benutzer)?.encoder.clone();
        let mut guard = encoder.lock();
        Some(f(&mut guard))
    }

    /// Liveness-Durchlauf: warnt bei halbem Timeout, meldet bei vollem
    /// Timeout aus dem Voice-Chat ab. Die Session selbst bleibt bestehen,
    /// der Kontroll-Kanal darf weiter genutzt werden.
    pub fn inaktive_pruefen(&self, timeout: Duration) -> SweepErgebnis {
        let mut ergebnis = SweepErgebnis::default();
        let mut map = self.teilnehmer.write();
        for (name, eintrag) in map.iter_mut() {
            let still = eintrag.letzte_aktivitaet.elapsed();
            if still > timeout && eintrag.in_voice {
                eintrag.in_voice = false;
                warn!(
                    benutzer = %name,
                    still_seit_s = still.as_secs(),
                    "Teilnehmer wegen Inaktivitaet aus dem Voice-Chat abgemeldet"
                );
                ergebnis.abgemeldet.push(name.clone());
            } else if still > timeout / 2 && !eintrag.gewarnt {
                eintrag.gewarnt = true;
                warn!(
                    benutzer = %name,
                    still_seit_s = still.as_secs(),
                    "Teilnehmer seit laengerem inaktiv"
                );
                ergebnis.gewarnt.push(name.clone());
            }
        }
        ergebnis
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::neu()
    }
}
