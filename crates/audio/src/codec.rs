//! Opus-Kodierung und -Dekodierung (48 kHz mono, 20ms Frames)

use audiopus::coder::{Decoder, Encoder};
use audiopus::{Application, Bitrate, Channels, SampleRate};

use crosstalk_protocol::codec::OpusProfil;
use crosstalk_protocol::voice::{FRAME_GROESSE, MAX_PAKET_GROESSE};

use crate::error::{AudioError, AudioResult};

/// CTL-Request fuer die erwartete Paketverlustrate
const OPUS_SET_PACKET_LOSS_PERC: i32 = 4014;

/// Opus-Encoder mit anwendungsspezifischem Profil
pub struct OpusEncoder {
    encoder: Encoder,
}

impl OpusEncoder {
    /// Erstellt einen Encoder fuer das gegebene Profil
    pub fn neu(profil: OpusProfil) -> AudioResult<Self> {
        profil
            .validieren()
            .map_err(AudioError::Konfiguration)?;

        let mut encoder = Encoder::new(SampleRate::Hz48000, Channels::Mono, Application::Voip)
            .map_err(|e| AudioError::CodecFehler(format!("Encoder-Erstellung: {e}")))?;

        encoder
            .set_bitrate(Bitrate::BitsPerSecond(profil.bitrate_kbps as i32 * 1000))
            .map_err(|e| AudioError::CodecFehler(format!("Bitrate setzen: {e}")))?;
        encoder
            .set_complexity(profil.komplexitaet)
            .map_err(|e| AudioError::CodecFehler(format!("Komplexitaet setzen: {e}")))?;
        encoder
            .set_inband_fec(profil.fec)
            .map_err(|e| AudioError::CodecFehler(format!("FEC setzen: {e}")))?;
        encoder
            .set_encoder_ctl_request(
                OPUS_SET_PACKET_LOSS_PERC,
                profil.erwarteter_verlust_prozent as i32,
            )
            .map_err(|e| AudioError::CodecFehler(format!("Verlustrate setzen: {e}")))?;

        Ok(Self { encoder })
    }

    /// Kodiert genau ein Frame (960 Samples) zu einem Opus-Paket
    pub fn kodieren(&mut self, pcm: &[i16]) -> AudioResult<Vec<u8>> {
        if pcm.len() != FRAME_GROESSE {
            return Err(AudioError::FalscheFrameLaenge {
                erwartet: FRAME_GROESSE,
                erhalten: pcm.len(),
            });
        }
        let mut paket = vec![0u8; MAX_PAKET_GROESSE];
        let laenge = self
            .encoder
            .encode(pcm, &mut paket)
            .map_err(|e| AudioError::CodecFehler(format!("Kodierung: {e}")))?;
        paket.truncate(laenge);
        Ok(paket)
    }
}

/// Opus-Decoder (48 kHz mono)
pub struct OpusDecoder {
    decoder: Decoder,
}

impl OpusDecoder {
    /// Erstellt einen Decoder
    pub fn neu() -> AudioResult<Self> {
        let decoder = Decoder::new(SampleRate::Hz48000, Channels::Mono)
            .map_err(|e| AudioError::CodecFehler(format!("Decoder-Erstellung: {e}")))?;
        Ok(Self { decoder })
    }

    /// Dekodiert ein Opus-Paket zu genau einem Frame (960 Samples)
    pub fn dekodieren(&mut self, paket: &[u8]) -> AudioResult<Vec<i16>> {
        let mut pcm = vec![0i16; FRAME_GROESSE];
        let dekodiert = self
            .decoder
            .decode(Some(paket), &mut pcm, false)
            .map_err(|e| AudioError::CodecFehler(format!("Dekodierung: {e}")))?;
        if dekodiert != FRAME_GROESSE {
            return Err(AudioError::FalscheFrameLaenge {
                erwartet: FRAME_GROESSE,
                erhalten: dekodiert,
            });
        }
        Ok(pcm)
    }
}
