//! Geraetezugriff via cpal: Mikrofon-Capture und Lautsprecher-Playback
//!
//! Beide Richtungen koppeln den cpal-Callback ueber einen lock-free
//! Ring-Buffer an die restliche Pipeline. cpal-Streams sind nicht Send;
//! der Aufrufer haelt sie in einem dedizierten Thread.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{debug, error, warn};

use crate::error::{AudioError, AudioResult};

/// Konfiguration fuer den Mikrofon-Capture
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Abtastrate in Hz
    pub abtastrate: u32,
    /// Kanalanzahl (1 = Mono)
    pub kanaele: u16,
    /// Ring-Buffer Kapazitaet in Samples
    pub puffer_samples: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            abtastrate: 48_000,
            kanaele: 1,
            puffer_samples: 48_000 * 2, // 2 Sekunden
        }
    }
}

/// Konfiguration fuer das Playback
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    pub abtastrate: u32,
    pub kanaele: u16,
    pub puffer_samples: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            abtastrate: 48_000,
            kanaele: 1,
            puffer_samples: 48_000 * 2,
        }
    }
}

/// Konsumiert aufgenommene Samples fuer die Sende-Pipeline
pub type CaptureConsumer = HeapCons<f32>;
/// Produziert Samples fuer den Playback-Callback
pub type PlaybackProducer = HeapProd<f32>;

/// Haelt den cpal-Eingabestream am Leben; Drop stoppt die Aufnahme
pub struct CaptureStream {
    _stream: Stream,
}

/// Haelt den cpal-Ausgabestream am Leben
pub struct PlaybackStream {
    _stream: Stream,
}

/// Standard-Eingabegeraet des Systems
pub fn standard_eingabegeraet() -> AudioResult<Device> {
    cpal::default_host()
        .default_input_device()
        .ok_or(AudioError::KeinStandardEingabegeraet)
}

/// Standard-Ausgabegeraet des Systems
pub fn standard_ausgabegeraet() -> AudioResult<Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or(AudioError::KeinStandardAusgabegeraet)
}

fn stream_config(abtastrate: u32, kanaele: u16) -> StreamConfig {
    StreamConfig {
        channels: kanaele,
        sample_rate: cpal::SampleRate(abtastrate),
        buffer_size: cpal::BufferSize::Default,
    }
}

/// Waehlt das Sample-Format aus den unterstuetzten Konfigurationen;
/// ohne Treffer wird F32 versucht.
fn format_waehlen<I>(configs: I, abtastrate: u32, kanaele: u16) -> SampleFormat
where
    I: Iterator<Item = cpal::SupportedStreamConfigRange>,
{
    configs
        .into_iter()
        .find(|c| {
            c.min_sample_rate().0 <= abtastrate
                && c.max_sample_rate().0 >= abtastrate
                && c.channels() >= kanaele
        })
        .map(|c| c.sample_format())
        .unwrap_or(SampleFormat::F32)
}

/// Oeffnet einen Capture-Stream auf dem gegebenen Geraet.
///
/// Der zurueckgegebene Consumer liefert die Samples an die
/// Verarbeitung; der Producer laeuft im cpal-Callback-Thread.
pub fn open_capture_stream(
    device: &Device,
    config: CaptureConfig,
) -> AudioResult<(CaptureStream, CaptureConsumer)> {
    let stream_config = stream_config(config.abtastrate, config.kanaele);

    let rb = HeapRb::<f32>::new(config.puffer_samples);
    let (mut producer, consumer) = rb.split();

    let err_fn = |err| error!("Capture-Fehler: {}", err);

    let supported = device
        .supported_input_configs()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;
    let sample_format = format_waehlen(supported, config.abtastrate, config.kanaele);

    let stream = match sample_format {
        SampleFormat::F32 => device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _| {
                    let geschrieben = producer.push_slice(data);
                    if geschrieben < data.len() {
                        warn!(
                            "Capture Ring-Buffer voll, {} Samples verworfen",
                            data.len() - geschrieben
                        );
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?,
        SampleFormat::I16 => device
            .build_input_stream(
                &stream_config,
                move |data: &[i16], _| {
                    let floats: Vec<f32> =
                        data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                    if producer.push_slice(&floats) < floats.len() {
                        warn!("Capture Ring-Buffer voll");
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?,
        SampleFormat::U8 => device
            .build_input_stream(
                &stream_config,
                move |data: &[u8], _| {
                    let floats: Vec<f32> =
                        data.iter().map(|&s| (s as f32 - 128.0) / 128.0).collect();
                    if producer.push_slice(&floats) < floats.len() {
                        warn!("Capture Ring-Buffer voll");
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?,
        andere => {
            return Err(AudioError::StreamFehler(format!(
                "Nicht unterstuetztes Eingabe-Sample-Format: {:?}",
                andere
            )))
        }
    };

    stream
        .play()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    debug!(
        "Capture-Stream geoeffnet: {}Hz {}ch",
        config.abtastrate, config.kanaele
    );

    Ok((CaptureStream { _stream: stream }, consumer))
}

/// Oeffnet einen Playback-Stream auf dem gegebenen Geraet.
///
/// Der zurueckgegebene Producer nimmt dekodierte Samples entgegen;
/// fehlen dem Callback Samples, fuellt er mit Stille auf.
pub fn open_playback_stream(
    device: &Device,
    config: PlaybackConfig,
) -> AudioResult<(PlaybackStream, PlaybackProducer)> {
    let stream_config = stream_config(config.abtastrate, config.kanaele);

    let rb = HeapRb::<f32>::new(config.puffer_samples);
    let (producer, mut consumer) = rb.split();

    let err_fn = |err| error!("Playback-Fehler: {}", err);

    let supported = device
        .supported_output_configs()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;
    let sample_format = format_waehlen(supported, config.abtastrate, config.kanaele);

    let stream = match sample_format {
        SampleFormat::F32 => device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _| {
                    let gelesen = consumer.pop_slice(data);
                    if gelesen < data.len() {
                        // Stille fuer fehlende Samples
                        data[gelesen..].fill(0.0);
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?,
        SampleFormat::I16 => device
            .build_output_stream(
                &stream_config,
                move |data: &mut [i16], _| {
                    let mut floats = vec![0.0f32; data.len()];
                    consumer.pop_slice(&mut floats);
                    for (out, s) in data.iter_mut().zip(floats.iter()) {
                        *out = (*s * i16::MAX as f32)
                            .clamp(i16::MIN as f32, i16::MAX as f32)
                            as i16;
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?,
        andere => {
            return Err(AudioError::StreamFehler(format!(
                "Nicht unterstuetztes Ausgabe-Sample-Format: {:?}",
                andere
            )))
        }
    };

    stream
        .play()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    debug!(
        "Playback-Stream geoeffnet: {}Hz {}ch",
        config.abtastrate, config.kanaele
    );

    Ok((PlaybackStream { _stream: stream }, producer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_config_standardwerte() {
        let config = CaptureConfig::default();
        assert_eq!(config.abtastrate, 48_000);
        assert_eq!(config.kanaele, 1);
        assert!(config.puffer_samples > 0);
    }

    #[test]
    fn playback_config_standardwerte() {
        let config = PlaybackConfig::default();
        assert_eq!(config.abtastrate, 48_000);
        assert_eq!(config.kanaele, 1);
    }

    #[test]
    #[ignore = "Benoetigt Audio-Hardware"]
    fn capture_stream_oeffnen() {
        let device = standard_eingabegeraet().expect("Kein Eingabegeraet");
        let result = open_capture_stream(&device, CaptureConfig::default());
        assert!(result.is_ok(), "Capture-Stream sollte oeffenbar sein");
    }

    #[test]
    #[ignore = "Benoetigt Audio-Hardware"]
    fn playback_stream_oeffnen() {
        let device = standard_ausgabegeraet().expect("Kein Ausgabegeraet");
        let result = open_playback_stream(&device, PlaybackConfig::default());
        assert!(result.is_ok(), "Playback-Stream sollte oeffenbar sein");
    }
}
