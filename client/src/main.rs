//! Crosstalk Terminal-Client
//!
//! Verbindet sich ueber den UDP-Kontroll-Kanal mit dem Server,
//! druckt eingehende Zeilen und nimmt Eingaben von stdin entgegen:
//! - `/voice`  Voice-Chat betreten
//! - `/leave`  Voice-Chat verlassen
//! - `/exit`   Client beenden
//! - `IMAGE_DATA:<base64>` als Bild senden, alles andere als Chat

mod voice_session;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crosstalk_core::Benutzername;
use crosstalk_protocol::control::{beitritt_zeile, bild_zeile, chat_zeile};
use crosstalk_protocol::voice::MAX_KONTROLL_NACHRICHT;
use voice_session::VoiceSession;

/// Kontroll-Port des Servers
const KONTROLL_PORT: u16 = 6000;
/// Voice-Port des Servers
const VOICE_PORT: u16 = 6001;
/// Praefix einer Bild-Eingabe auf stdin
const BILD_PRAEFIX: &str = "IMAGE_DATA:";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let (server_ip, benutzer) = match umgebung_lesen() {
        Some(werte) => werte,
        None => {
            eprintln!("SERVER_IP und USERNAME muessen gesetzt sein");
            eprintln!("Beispiel: SERVER_IP=203.0.113.7 USERNAME=alice crosstalk-client");
            std::process::exit(1);
        }
    };

    let kontroll_adresse: SocketAddr = format!("{server_ip}:{KONTROLL_PORT}")
        .parse()
        .with_context(|| format!("Ungueltige Server-IP '{server_ip}'"))?;
    let voice_adresse: SocketAddr = format!("{server_ip}:{VOICE_PORT}")
        .parse()
        .with_context(|| format!("Ungueltige Server-IP '{server_ip}'"))?;

    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .context("Kontroll-Socket nicht bindbar")?;
    socket
        .connect(kontroll_adresse)
        .await
        .with_context(|| format!("Server {kontroll_adresse} nicht erreichbar"))?;
    let socket = Arc::new(socket);

    // Registrierung
    socket
        .send(beitritt_zeile(&benutzer).as_bytes())
        .await
        .context("Registrierung nicht sendbar")?;
    println!("Verbunden mit {kontroll_adresse} als {benutzer}");

    // Eingehende Zeilen laufend ausgeben
    let drucker_socket = socket.clone();
    let drucker = tokio::spawn(async move {
        let mut puffer = vec![0u8; MAX_KONTROLL_NACHRICHT];
        loop {
            match drucker_socket.recv(&mut puffer).await {
                Ok(laenge) => {
                    let zeile = String::from_utf8_lossy(&puffer[..laenge]);
                    println!("{}", zeile.trim_end());
                }
                Err(e) => {
                    warn!(fehler = %e, "Kontroll-Socket Lesefehler");
                    return;
                }
            }
        }
    });

    eingabe_schleife(&socket, &benutzer, voice_adresse).await?;

    drucker.abort();
    Ok(())
}

/// Liest SERVER_IP und USERNAME aus der Umgebung
fn umgebung_lesen() -> Option<(String, Benutzername)> {
    let server_ip = std::env::var("SERVER_IP").ok()?;
    let benutzer = std::env::var("USERNAME").ok()?;
    if server_ip.is_empty() || benutzer.is_empty() {
        return None;
    }
    Some((server_ip, Benutzername::neu(benutzer)))
}

/// Liest stdin Zeile fuer Zeile bis `/exit` oder EOF
async fn eingabe_schleife(
    socket: &Arc<UdpSocket>,
    benutzer: &Benutzername,
    voice_adresse: SocketAddr,
) -> Result<()> {
    let mut zeilen = BufReader::new(tokio::io::stdin()).lines();
    let mut voice: Option<VoiceSession> = None;

    while let Some(zeile) = zeilen.next_line().await.context("stdin nicht lesbar")? {
        let eingabe = zeile.trim();
        if eingabe.is_empty() {
            continue;
        }
        match eingabe {
            "/voice" => {
                if voice.is_some() {
                    println!("Voice-Chat laeuft bereits");
                    continue;
                }
                match VoiceSession::starten(voice_adresse).await {
                    Ok(session) => {
                        voice = Some(session);
                        socket.send(b"VOICE_CONNECT").await?;
                        println!("Voice-Chat betreten");
                    }
                    Err(e) => eprintln!("Voice-Chat nicht startbar: {e:#}"),
                }
            }
            "/leave" => {
                let Some(session) = voice.take() else {
                    println!("Kein Voice-Chat aktiv");
                    continue;
                };
                socket.send(b"VOICE_DISCONNECT").await?;
                session.beenden().await;
                println!("Voice-Chat verlassen");
            }
            "/exit" => break,
            _ => {
                let ausgang = match eingabe.strip_prefix(BILD_PRAEFIX) {
                    Some(base64) => bild_zeile(benutzer, base64),
                    None => chat_zeile(benutzer, eingabe),
                };
                if let Err(e) = socket.send(ausgang.as_bytes()).await {
                    warn!(fehler = %e, "Nachricht nicht sendbar");
                }
            }
        }
    }

    // Laufende Voice-Session sauber beenden
    if let Some(session) = voice.take() {
        debug!("Voice-Session wird beim Beenden geschlossen");
        let _ = socket.send(b"VOICE_DISCONNECT").await;
        session.beenden().await;
    }
    Ok(())
}
