//! crosstalk-server – Bibliotheks-Root
//!
//! Bindet Kontroll- und Voice-Pfad zu einem lauffaehigen Server
//! zusammen und stellt den Einstiegspunkt fuer Integrationstests bereit.

pub mod config;
pub mod control;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::info;

use crosstalk_voice::{liveness, mixing, stats, udp, FrameStore, SessionRegistry, VoiceStatistik};

use config::ServerConfig;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Kontroll- und Voice-Socket binden (Fehlschlag ist fatal)
    /// 2. Empfangs-, Mix-, Liveness-, Heartbeat- und Statistik-Tasks starten
    /// 3. Auf Ctrl-C warten, dann alle Tasks herunterfahren
    pub async fn starten(self) -> Result<()> {
        let kontroll_socket = Arc::new(
            UdpSocket::bind(self.config.kontroll_bind_adresse())
                .await
                .with_context(|| {
                    format!(
                        "Kontroll-Socket {} nicht bindbar",
                        self.config.kontroll_bind_adresse()
                    )
                })?,
        );
        let voice_socket = Arc::new(
            UdpSocket::bind(self.config.voice_bind_adresse())
                .await
                .with_context(|| {
                    format!(
                        "Voice-Socket {} nicht bindbar",
                        self.config.voice_bind_adresse()
                    )
                })?,
        );
        info!(
            kontrolle = %self.config.kontroll_bind_adresse(),
            voice = %self.config.voice_bind_adresse(),
            "Sockets gebunden"
        );

        let register = Arc::new(SessionRegistry::neu());
        let speicher = Arc::new(FrameStore::neu());
        let statistik = Arc::new(VoiceStatistik::neu());

        let mix_intervall = Duration::from_millis(self.config.voice.mix_intervall_ms);
        let client_timeout = Duration::from_secs(self.config.voice.client_timeout_s);
        let heartbeat_intervall = Duration::from_secs(self.config.voice.heartbeat_intervall_s);
        let statistik_intervall = Duration::from_secs(self.config.voice.statistik_intervall_s);

        let (shutdown_tx, _) = broadcast::channel(1);

        let kontrolle = tokio::spawn(control::kontroll_schleife(
            kontroll_socket,
            register.clone(),
            speicher.clone(),
            self.config.netzwerk.voice_port,
            shutdown_tx.subscribe(),
        ));
        let empfang = tokio::spawn(udp::empfangs_schleife(
            voice_socket.clone(),
            register.clone(),
            speicher.clone(),
            statistik.clone(),
            shutdown_tx.subscribe(),
        ));
        let mixer = tokio::spawn(mixing::misch_schleife_ueberwacht(
            voice_socket.clone(),
            register.clone(),
            speicher.clone(),
            statistik.clone(),
            mix_intervall,
            shutdown_tx.clone(),
        ));
        let ablauf = tokio::spawn(liveness::ablauf_schleife(
            register.clone(),
            speicher.clone(),
            client_timeout,
            shutdown_tx.subscribe(),
        ));
        let heartbeat = tokio::spawn(liveness::heartbeat_schleife(
            voice_socket,
            register.clone(),
            heartbeat_intervall,
            shutdown_tx.subscribe(),
        ));
        let statistik_task = tokio::spawn(stats::statistik_schleife(
            register,
            statistik,
            statistik_intervall,
            shutdown_tx.subscribe(),
        ));

        info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c()
            .await
            .context("Shutdown-Signal nicht abonnierbar")?;
        info!("Shutdown-Signal empfangen, Server wird beendet");

        let _ = shutdown_tx.send(());
        for handle in [kontrolle, empfang, mixer, ablauf, heartbeat, statistik_task] {
            let _ = handle.await;
        }

        Ok(())
    }
}
