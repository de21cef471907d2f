//! TCP-Session-Management

/// Zustand einer Admin-Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionZustand {
    /// Verbunden, aber noch nicht eingeloggt
    Unauthentifiziert,
    /// Eingeloggt (oder kein Passwort konfiguriert)
    Authentifiziert,
    /// Verbindung wird beendet
    Beendend,
}

/// Eine aktive Admin-Session
#[derive(Debug)]
pub struct TcpSession {
    pub zustand: SessionZustand,
    pub client_addr: std::net::SocketAddr,
}

impl TcpSession {
    /// Neue Session; ohne Passwort ist sie sofort authentifiziert
    pub fn neu(client_addr: std::net::SocketAddr, passwort_erforderlich: bool) -> Self {
        Self {
            zustand: if passwort_erforderlich {
                SessionZustand::Unauthentifiziert
            } else {
                SessionZustand::Authentifiziert
            },
            client_addr,
        }
    }

    pub fn ist_authentifiziert(&self) -> bool {
        self.zustand == SessionZustand::Authentifiziert
    }

    pub fn anmelden(&mut self) {
        self.zustand = SessionZustand::Authentifiziert;
    }

    pub fn beenden(&mut self) {
        self.zustand = SessionZustand::Beendend;
    }

    pub fn ist_beendend(&self) -> bool {
        self.zustand == SessionZustand::Beendend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> std::net::SocketAddr {
        "127.0.0.1:12345".parse().unwrap()
    }

    #[test]
    fn mit_passwort_zuerst_unauthentifiziert() {
        let mut session = TcpSession::neu(test_addr(), true);
        assert!(!session.ist_authentifiziert());
        session.anmelden();
        assert!(session.ist_authentifiziert());
        session.beenden();
        assert!(session.ist_beendend());
    }

    #[test]
    fn ohne_passwort_sofort_authentifiziert() {
        let session = TcpSession::neu(test_addr(), false);
        assert!(session.ist_authentifiziert());
    }
}
