//! Codec-Profile – Systemvertrag fuer Interoperabilitaet
//!
//! Beide Seiten muessen dieselben Opus-Parameter verwenden, damit die
//! Gegenstelle die Pakete dekodieren kann. Der Client kodiert sparsam
//! (Uplink ueber unzuverlaessige Strecken), der Server kodiert die
//! personalisierte Mischung mit hoeherer Qualitaet.

/// Opus-Encoder-Profil
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpusProfil {
    /// Ziel-Bitrate in kbit/s
    pub bitrate_kbps: u16,
    /// Encoder-Komplexitaet (0–10)
    pub komplexitaet: u8,
    /// In-Band Forward Error Correction
    pub fec: bool,
    /// Erwartete Paketverlustrate in Prozent (steuert FEC-Redundanz)
    pub erwarteter_verlust_prozent: u8,
}

impl OpusProfil {
    /// Client-Uplink: 32 kbit/s, Komplexitaet 8, FEC fuer 30% Verlust
    pub fn client_uplink() -> Self {
        Self {
            bitrate_kbps: 32,
            komplexitaet: 8,
            fec: true,
            erwarteter_verlust_prozent: 30,
        }
    }

    /// Server-Downlink (personalisierte Mischung): 96 kbit/s,
    /// maximale Komplexitaet, FEC fuer 10% Verlust
    pub fn server_downlink() -> Self {
        Self {
            bitrate_kbps: 96,
            komplexitaet: 10,
            fec: true,
            erwarteter_verlust_prozent: 10,
        }
    }

    /// Prueft ob das Profil innerhalb der Opus-Grenzen liegt
    pub fn validieren(&self) -> Result<(), String> {
        if !(6..=510).contains(&self.bitrate_kbps) {
            return Err(format!(
                "Bitrate {} kbps ausserhalb 6..=510",
                self.bitrate_kbps
            ));
        }
        if self.komplexitaet > 10 {
            return Err(format!(
                "Komplexitaet {} ausserhalb 0..=10",
                self.komplexitaet
            ));
        }
        if self.erwarteter_verlust_prozent > 100 {
            return Err(format!(
                "Verlustrate {}% ausserhalb 0..=100",
                self.erwarteter_verlust_prozent
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_profile_sind_valide() {
        assert!(OpusProfil::client_uplink().validieren().is_ok());
        assert!(OpusProfil::server_downlink().validieren().is_ok());
    }

    #[test]
    fn profil_vertrag() {
        let uplink = OpusProfil::client_uplink();
        assert_eq!(uplink.bitrate_kbps, 32);
        assert_eq!(uplink.komplexitaet, 8);
        assert_eq!(uplink.erwarteter_verlust_prozent, 30);
        assert!(uplink.fec);

        let downlink = OpusProfil::server_downlink();
        assert_eq!(downlink.bitrate_kbps, 96);
        assert_eq!(downlink.komplexitaet, 10);
        assert_eq!(downlink.erwarteter_verlust_prozent, 10);
        assert!(downlink.fec);
    }

    #[test]
    fn ungueltige_profile_abgelehnt() {
        let mut p = OpusProfil::client_uplink();
        p.bitrate_kbps = 5;
        assert!(p.validieren().is_err());

        let mut p = OpusProfil::client_uplink();
        p.komplexitaet = 11;
        assert!(p.validieren().is_err());
    }
}
