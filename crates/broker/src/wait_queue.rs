//! Warteschlange fuer Clients, die bei vollem Pool warten
//!
//! Strikt FIFO: wer zuerst eingereiht wurde, wird zuerst bedient.
//! Jeder Client steht hoechstens einmal in der Schlange (der Broker prueft
//! das vor dem Einreihen). Neben der
//! Einreihungszeit wird der letzte Warte-Poll vermerkt, damit stumme
//! Clients verdraengt werden koennen.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use portier_core::ClientId;

/// Ein Eintrag der Warteschlange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarteEintrag {
    pub client: ClientId,
    pub eingereiht: Instant,
    pub letzter_poll: Instant,
}

/// FIFO-Warteschlange wartender Clients
#[derive(Debug, Default)]
pub struct WaitQueue {
    eintraege: VecDeque<WarteEintrag>,
}

impl WaitQueue {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Reiht `client` am Ende ein und gibt die 1-basierte Position zurueck
    ///
    /// Der Aufrufer stellt sicher, dass der Client noch nicht wartet.
    pub fn einreihen(&mut self, client: ClientId) -> usize {
        debug_assert!(self.position(client).is_none(), "{client} wartet bereits");
        let jetzt = Instant::now();
        self.eintraege.push_back(WarteEintrag {
            client,
            eingereiht: jetzt,
            letzter_poll: jetzt,
        });
        self.eintraege.len()
    }

    /// Entnimmt den am laengsten wartenden Client
    pub fn naechster(&mut self) -> Option<WarteEintrag> {
        self.eintraege.pop_front()
    }

    /// Entfernt `client`; ohne Wirkung wenn er nicht wartet
    pub fn entfernen(&mut self, client: ClientId) -> Option<WarteEintrag> {
        let i = self.eintraege.iter().position(|e| e.client == client)?;
        self.eintraege.remove(i)
    }

    /// 1-basierte Position von `client`
    pub fn position(&self, client: ClientId) -> Option<usize> {
        self.eintraege
            .iter()
            .position(|e| e.client == client)
            .map(|i| i + 1)
    }

    /// Vermerkt einen Warte-Poll; `false` wenn der Client nicht wartet
    pub fn poll_vermerken(&mut self, client: ClientId) -> bool {
        match self.eintraege.iter_mut().find(|e| e.client == client) {
            Some(e) => {
                e.letzter_poll = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Clients, deren letzter Poll laenger als `timeout` zurueckliegt
    pub fn abgelaufene(&self, timeout: Duration, jetzt: Instant) -> Vec<ClientId> {
        self.eintraege
            .iter()
            .filter(|e| jetzt.saturating_duration_since(e.letzter_poll) > timeout)
            .map(|e| e.client)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.eintraege.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eintraege.is_empty()
    }

    /// Alle Eintraege in Bedienreihenfolge
    pub fn eintraege(&self) -> impl Iterator<Item = &WarteEintrag> {
        self.eintraege.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_reihenfolge() {
        let mut q = WaitQueue::neu();
        assert_eq!(q.einreihen(ClientId(1)), 1);
        assert_eq!(q.einreihen(ClientId(2)), 2);
        assert_eq!(q.einreihen(ClientId(3)), 3);
        assert_eq!(q.naechster().map(|e| e.client), Some(ClientId(1)));
        assert_eq!(q.naechster().map(|e| e.client), Some(ClientId(2)));
        assert_eq!(q.naechster().map(|e| e.client), Some(ClientId(3)));
        assert!(q.naechster().is_none());
    }

    #[test]
    fn position_nach_entnahme() {
        let mut q = WaitQueue::neu();
        q.einreihen(ClientId(1));
        q.einreihen(ClientId(2));
        q.naechster();
        assert_eq!(q.einreihen(ClientId(1)), 2);
        assert_eq!(q.position(ClientId(2)), Some(1));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "wartet bereits")]
    fn doppeltes_einreihen_ist_ein_fehler() {
        let mut q = WaitQueue::neu();
        q.einreihen(ClientId(1));
        q.einreihen(ClientId(1));
    }

    #[test]
    fn entfernen_aus_der_mitte() {
        let mut q = WaitQueue::neu();
        for i in 1..=3 {
            q.einreihen(ClientId(i));
        }
        assert!(q.entfernen(ClientId(2)).is_some());
        assert!(q.entfernen(ClientId(2)).is_none());
        assert_eq!(q.position(ClientId(3)), Some(2));
        let reihenfolge: Vec<_> = q.eintraege().map(|e| e.client).collect();
        assert_eq!(reihenfolge, vec![ClientId(1), ClientId(3)]);
    }

    #[test]
    fn poll_und_ablauf() {
        let mut q = WaitQueue::neu();
        q.einreihen(ClientId(1));
        q.einreihen(ClientId(2));
        let spaeter = Instant::now() + Duration::from_secs(60);
        let abgelaufen = q.abgelaufene(Duration::from_secs(30), spaeter);
        assert_eq!(abgelaufen, vec![ClientId(1), ClientId(2)]);

        assert!(q.abgelaufene(Duration::from_secs(30), Instant::now()).is_empty());
        assert!(q.poll_vermerken(ClientId(2)));
        assert!(!q.poll_vermerken(ClientId(9)));
    }
}
