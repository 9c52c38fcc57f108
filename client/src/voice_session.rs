//! Voice-Session – End-to-End Audio-Pipeline des Clients
//!
//! ## Sende-Pipeline (Capture -> Server)
//! ```text
//! cpal Capture Callback
//!     -> Ring-Buffer (lock-free, ringbuf)
//!     -> Audio-Thread: 20ms-Frames sammeln (960 Samples bei 48kHz)
//!     -> Signalaufbereitung: VAD-Gate -> Hochpass -> Kompression
//!     -> Opus Encode (32 kbps Uplink-Profil)
//!     -> UDP send (verbundener Socket, Voice-Port des Servers)
//! ```
//!
//! ## Empfangs-Pipeline (Server -> Playback)
//! ```text
//! UDP recv (500ms Frist)
//!     -> Heartbeat verwerfen
//!     -> Opus Decode
//!     -> Jitter-Puffer (Wiedergabe ab 7 Frames Vorlauf)
//!     -> Playback Ring-Buffer
//!     -> cpal Playback Callback
//! ```
//!
//! cpal-Streams sind nicht Send; Capture, Aufbereitung und Encoding
//! laufen deshalb in einem dedizierten std::thread der die Streams
//! haelt. Der Empfang laeuft als Tokio-Task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ringbuf::traits::{Consumer, Producer};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use crosstalk_audio::{
    open_capture_stream, open_playback_stream, CaptureConfig, CaptureConsumer, JitterBuffer,
    OpusDecoder, OpusEncoder, PlaybackConfig, PlaybackProducer, SignalConditioner,
    MIN_PUFFER_SCHWELLE,
};
use crosstalk_protocol::codec::OpusProfil;
use crosstalk_protocol::voice::{
    f32_zu_i16, i16_zu_f32, nutzlast_klassifizieren, NutzlastArt, FRAME_GROESSE, HEARTBEAT,
    MAX_PAKET_GROESSE,
};

/// Abstand zwischen zwei Client-Heartbeats
const HEARTBEAT_INTERVALL: Duration = Duration::from_secs(1);

/// Empfangsfrist; danach gilt der Downlink als unterbrochen und der
/// Jitter-Puffer wird neu aufgebaut
const EMPFANGS_FRIST: Duration = Duration::from_millis(500);

/// Laufende Voice-Session; `beenden` stoppt alle Teile sauber
pub struct VoiceSession {
    laeuft: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    audio_thread: Option<std::thread::JoinHandle<()>>,
    empfangs_task: Option<tokio::task::JoinHandle<()>>,
    heartbeat_task: Option<tokio::task::JoinHandle<()>>,
}

impl VoiceSession {
    /// Startet die Voice-Pipeline gegen den Voice-Port des Servers
    pub async fn starten(server_voice_adresse: std::net::SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("Voice-Socket nicht bindbar")?;
        socket
            .connect(server_voice_adresse)
            .await
            .with_context(|| format!("Voice-Server {server_voice_adresse} nicht erreichbar"))?;
        let socket = Arc::new(socket);
        info!(
            lokal = %socket.local_addr().context("Lokale Adresse unbekannt")?,
            server = %server_voice_adresse,
            "Voice-Socket verbunden"
        );

        let laeuft = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, _) = broadcast::channel(1);

        // Audio-Thread: haelt die cpal-Streams und fuehrt den Sende-Loop
        // aus; der PlaybackProducer wird an den Empfangs-Task uebergeben
        let (producer_tx, producer_rx) = std::sync::mpsc::sync_channel::<PlaybackProducer>(1);
        let sende_socket = socket.clone();
        let sende_laeuft = laeuft.clone();
        let audio_thread = std::thread::Builder::new()
            .name("voice-audio".to_string())
            .spawn(move || {
                let streams = audio_streams_oeffnen();
                let (_capture_stream, capture_consumer, _playback_stream, playback_producer) =
                    match streams {
                        Ok(teile) => teile,
                        Err(e) => {
                            error!(fehler = %e, "Audio-Streams nicht oeffenbar");
                            drop(producer_tx);
                            return;
                        }
                    };

                if producer_tx.send(playback_producer).is_err() {
                    error!("Empfangs-Task hat den PlaybackProducer nicht abgeholt");
                    return;
                }

                sende_loop(capture_consumer, sende_socket, sende_laeuft);
                debug!("Audio-Thread beendet, cpal-Streams werden gedroppt");
            })
            .context("Audio-Thread nicht startbar")?;

        let playback_producer = producer_rx
            .recv()
            .context("Audio-Streams nicht initialisierbar")?;

        let empfangs_task = tokio::spawn(empfangs_loop(
            socket.clone(),
            playback_producer,
            shutdown_tx.subscribe(),
        ));
        let heartbeat_task = tokio::spawn(heartbeat_loop(socket, shutdown_tx.subscribe()));

        info!("Voice-Session gestartet");
        Ok(Self {
            laeuft,
            shutdown_tx,
            audio_thread: Some(audio_thread),
            empfangs_task: Some(empfangs_task),
            heartbeat_task: Some(heartbeat_task),
        })
    }

    /// Stoppt Sende-Thread, Empfangs-Task und Heartbeat
    pub async fn beenden(mut self) {
        info!("Voice-Session wird beendet");
        self.laeuft.store(false, Ordering::Relaxed);
        let _ = self.shutdown_tx.send(());

        if let Some(handle) = self.empfangs_task.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.heartbeat_task.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.audio_thread.take() {
            let _ = handle.join();
        }
        info!("Voice-Session beendet");
    }
}

type AudioTeile = (
    crosstalk_audio::CaptureStream,
    CaptureConsumer,
    crosstalk_audio::PlaybackStream,
    PlaybackProducer,
);

/// Oeffnet Capture- und Playback-Streams auf den Standardgeraeten
fn audio_streams_oeffnen() -> Result<AudioTeile> {
    let eingabe = crosstalk_audio::device::standard_eingabegeraet()?;
    let (capture_stream, capture_consumer) =
        open_capture_stream(&eingabe, CaptureConfig::default())?;

    let ausgabe = crosstalk_audio::device::standard_ausgabegeraet()?;
    let (playback_stream, playback_producer) =
        open_playback_stream(&ausgabe, PlaybackConfig::default())?;

    debug!("Audio-Streams geoeffnet (Capture + Playback)");
    Ok((
        capture_stream,
        capture_consumer,
        playback_stream,
        playback_producer,
    ))
}

/// Sende-Loop im Audio-Thread: Samples sammeln, aufbereiten, kodieren,
/// senden. Blockiert bis `laeuft` false wird.
fn sende_loop(mut capture: CaptureConsumer, socket: Arc<UdpSocket>, laeuft: Arc<AtomicBool>) {
    let mut encoder = match OpusEncoder::neu(OpusProfil::client_uplink()) {
        Ok(enc) => enc,
        Err(e) => {
            error!(fehler = %e, "Uplink-Encoder nicht erstellbar");
            return;
        }
    };
    let mut aufbereiter = SignalConditioner::standard();

    let mut frame_puffer: Vec<f32> = Vec::with_capacity(FRAME_GROESSE * 2);
    let mut lese_puffer = vec![0.0f32; FRAME_GROESSE];

    debug!("Sende-Loop gestartet");
    while laeuft.load(Ordering::Relaxed) {
        let gelesen = capture.pop_slice(&mut lese_puffer);
        if gelesen == 0 {
            // Kein Sample verfuegbar: ein Viertel Frame schlafen
            std::thread::sleep(Duration::from_millis(5));
            continue;
        }
        frame_puffer.extend_from_slice(&lese_puffer[..gelesen]);

        while frame_puffer.len() >= FRAME_GROESSE {
            let frame: Vec<f32> = frame_puffer.drain(..FRAME_GROESSE).collect();
            let aufbereitet = aufbereiter.verarbeiten(&frame);
            let pcm = f32_zu_i16(&aufbereitet);

            let paket = match encoder.kodieren(&pcm) {
                Ok(paket) => paket,
                Err(e) => {
                    warn!(fehler = %e, "Uplink-Kodierung fehlgeschlagen");
                    continue;
                }
            };
            // try_send: der Audio-Thread darf nicht auf das Netz warten
            if let Err(e) = socket.try_send(&paket) {
                trace!(fehler = %e, "Voice-Paket nicht sendbar");
            }
        }
    }
    debug!("Sende-Loop beendet");
}

/// Empfangs-Loop als Tokio-Task: Pakete dekodieren, ueber den
/// Jitter-Puffer glaetten und an die Wiedergabe geben
async fn empfangs_loop(
    socket: Arc<UdpSocket>,
    mut playback: PlaybackProducer,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut decoder = match OpusDecoder::neu() {
        Ok(dec) => dec,
        Err(e) => {
            error!(fehler = %e, "Downlink-Decoder nicht erstellbar");
            return;
        }
    };
    let mut jitter = JitterBuffer::neu();
    // Wiedergabe beginnt erst ab der Mindest-Fuellung
    let mut spielt = false;
    let mut puffer = [0u8; MAX_PAKET_GROESSE + 125];

    debug!("Empfangs-Loop gestartet");
    loop {
        let empfang = tokio::select! {
            empfang = tokio::time::timeout(EMPFANGS_FRIST, socket.recv(&mut puffer)) => empfang,
            _ = shutdown.recv() => {
                debug!("Empfangs-Loop beendet");
                return;
            }
        };

        let laenge = match empfang {
            Ok(Ok(laenge)) => laenge,
            Ok(Err(e)) => {
                warn!(fehler = %e, "Voice-Socket Lesefehler");
                continue;
            }
            Err(_) => {
                // Frist abgelaufen: Downlink unterbrochen, Vorlauf neu aufbauen
                if jitter.verfuegbar() > 0 || spielt {
                    debug!("Downlink still, Jitter-Puffer wird neu aufgebaut");
                }
                jitter.leeren();
                spielt = false;
                continue;
            }
        };

        match nutzlast_klassifizieren(&puffer[..laenge]) {
            NutzlastArt::Heartbeat => continue,
            NutzlastArt::Uebergroesse => {
                warn!(laenge, "Uebergrosses Paket verworfen");
                continue;
            }
            NutzlastArt::Audio => {}
        }

        match decoder.dekodieren(&puffer[..laenge]) {
            Ok(pcm) => jitter.einfuegen(i16_zu_f32(&pcm)),
            Err(e) => {
                debug!(fehler = %e, "Downlink-Dekodierung fehlgeschlagen");
                continue;
            }
        }

        if !spielt && jitter.verfuegbar() >= MIN_PUFFER_SCHWELLE {
            spielt = true;
        }
        if spielt {
            while jitter.verfuegbar() > 0 {
                let frame = jitter.holen();
                let geschrieben = playback.push_slice(&frame);
                if geschrieben < frame.len() {
                    trace!(
                        fehlend = frame.len() - geschrieben,
                        "Playback Ring-Buffer voll"
                    );
                }
            }
        }
    }
}

/// Haelt den Heartbeat-Takt Richtung Server am Laufen
async fn heartbeat_loop(socket: Arc<UdpSocket>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVALL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = socket.send(&HEARTBEAT).await {
                    debug!(fehler = %e, "Heartbeat nicht sendbar");
                }
            }
            _ = shutdown.recv() => {
                debug!("Heartbeat-Loop beendet");
                return;
            }
        }
    }
}
