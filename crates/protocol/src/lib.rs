//! crosstalk-protocol – Wire-Protokoll
//!
//! Definiert die beiden Datagramm-Kanaele des Systems:
//! - [`control`] – zeilenorientiertes Text-Protokoll (Port 6000)
//! - [`voice`] – Opus-Pakete und Heartbeat-Marker (Port 6001)
//! - [`codec`] – Codec-Profile als Systemvertrag fuer Interoperabilitaet

pub mod codec;
pub mod control;
pub mod voice;

pub use codec::OpusProfil;
pub use control::ControlNachricht;
pub use voice::{NutzlastArt, FRAME_GROESSE, HEARTBEAT, MAX_PAKET_GROESSE};
