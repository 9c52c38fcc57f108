//! crosstalk-voice – Server-seitige Voice-Mixing-Engine
//!
//! Bausteine des Voice-Pfads:
//! - [`registry`]: Session-Registry mit Endpunkten, Voice-Status und
//!   Codec-Handles pro Teilnehmer
//! - [`frames`]: neuestes dekodiertes Frame pro Sprecher
//! - [`mixer`]: gleichgewichtetes Mischen mit tanh-Soft-Clip
//! - [`udp`]: Empfangsschleife des Voice-Ports
//! - [`mixing`]: 20ms-Takt mit personalisiertem Downlink pro Hoerer
//! - [`liveness`]: Timeout-Ueberwachung und Server-Heartbeats
//! - [`stats`]: Laufzeit-Zaehler des Voice-Pfads

pub mod frames;
pub mod liveness;
pub mod mixer;
pub mod mixing;
pub mod registry;
pub mod stats;
pub mod udp;

pub use frames::FrameStore;
pub use registry::{SessionRegistry, SweepErgebnis, Teilnehmer, CLIENT_TIMEOUT};
pub use stats::VoiceStatistik;
