//! Gemeinsame Identifikationstypen fuer Crosstalk
//!
//! Teilnehmer werden ueber ihren Benutzernamen identifiziert, nicht ueber
//! die Absenderadresse: UDP-Endpunkte koennen waehrend einer Session
//! rotieren (NAT-Rebinding), der Name bleibt stabil. Das Newtype-Pattern
//! verhindert Verwechslungen mit gewoehnlichen Strings zur Compilezeit.

use serde::{Deserialize, Serialize};

/// Stabile Identitaet eines Teilnehmers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Benutzername(String);

impl Benutzername {
    /// Erstellt einen neuen Benutzernamen
    pub fn neu(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Gibt den Namen als &str zurueck
    pub fn als_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Benutzername {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Ohne Praefix – der Name erscheint woertlich in Protokollzeilen
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Benutzername {
    fn from(name: &str) -> Self {
        Self::neu(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benutzername_display_ist_wortgetreu() {
        let name = Benutzername::neu("alice");
        assert_eq!(name.to_string(), "alice");
        assert_eq!(name.als_str(), "alice");
    }

    #[test]
    fn benutzername_vergleich() {
        let a = Benutzername::neu("alice");
        let b = Benutzername::from("alice");
        let c = Benutzername::neu("bob");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn benutzername_als_hashmap_schluessel() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(Benutzername::neu("alice"), 1u32);
        assert_eq!(map.get(&Benutzername::neu("alice")), Some(&1));
    }
}
