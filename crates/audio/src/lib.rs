//! crosstalk-audio – Client Audio Engine
//!
//! Audio-Pipeline fuer Crosstalk:
//! - Mikrofon-Capture und Lautsprecher-Playback via cpal
//! - Opus Encoding/Decoding (festes 20ms/960-Sample-Frameformat)
//! - Signalaufbereitung: VAD-Gating, Hochpass, Kompression, Normalisierung
//! - Jitter Buffer zum Glaetten der Wiedergabe

pub mod codec;
pub mod conditioner;
pub mod device;
pub mod error;
pub mod jitter;

// Bequeme Re-Exporte der wichtigsten Typen
pub use codec::{OpusDecoder, OpusEncoder};
pub use conditioner::{ConditionerConfig, SignalConditioner};
pub use device::{
    open_capture_stream, open_playback_stream, CaptureConfig, CaptureConsumer, CaptureStream,
    PlaybackConfig, PlaybackProducer, PlaybackStream,
};
pub use error::{AudioError, AudioResult};
pub use jitter::{JitterBuffer, MIN_PUFFER_SCHWELLE, STANDARD_KAPAZITAET};
