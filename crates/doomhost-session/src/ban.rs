//! Temporary address bans for the control listener.
//!
//! A client that presents the wrong secret is locked out for a short
//! window. Expired entries are not swept; they are dropped the next time
//! the address is looked up.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// Default lock-out after a wrong secret.
pub const DEFAULT_BAN_DURATION: Duration = Duration::from_secs(3);

/// Active bans, at most one per address.
#[derive(Debug)]
pub struct BanList {
    /// Address to the instant its ban lifts.
    bans: HashMap<IpAddr, Instant>,
    duration: Duration,
}

impl BanList {
    pub fn new(duration: Duration) -> Self {
        Self {
            bans: HashMap::new(),
            duration,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Bans `addr` until `now + duration`. A second ban on the same
    /// address restarts the window.
    pub fn ban_at(&mut self, addr: IpAddr, now: Instant) {
        let until = now + self.duration;
        self.bans.insert(addr, until);
        tracing::info!(%addr, secs = self.duration.as_secs_f32(), "address banned");
    }

    /// Returns `true` if `addr` is banned at `now`. A ban whose deadline
    /// has been reached is removed and reported as lifted.
    pub fn is_banned_at(&mut self, addr: IpAddr, now: Instant) -> bool {
        match self.bans.get(&addr) {
            Some(&until) if now < until => true,
            Some(_) => {
                self.bans.remove(&addr);
                tracing::info!(%addr, "ban expired");
                false
            }
            None => false,
        }
    }

    pub fn ban(&mut self, addr: IpAddr) {
        self.ban_at(addr, Instant::now());
    }

    pub fn is_banned(&mut self, addr: IpAddr) -> bool {
        self.is_banned_at(addr, Instant::now())
    }

    /// Number of entries, including expired ones not yet looked up.
    pub fn len(&self) -> usize {
        self.bans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bans.is_empty()
    }
}

impl Default for BanList {
    fn default() -> Self {
        Self::new(DEFAULT_BAN_DURATION)
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    const ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
    const OTHER: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 6));

    #[test]
    fn test_ban_blocks_for_exactly_three_seconds() {
        let mut bans = BanList::default();
        let t0 = Instant::now();
        bans.ban_at(ADDR, t0);

        assert!(bans.is_banned_at(ADDR, t0));
        assert!(bans.is_banned_at(ADDR, t0 + Duration::from_millis(2999)));
        assert!(!bans.is_banned_at(ADDR, t0 + Duration::from_secs(3)));
    }

    #[test]
    fn test_expired_ban_is_evicted_on_lookup() {
        let mut bans = BanList::default();
        let t0 = Instant::now();
        bans.ban_at(ADDR, t0);
        assert_eq!(bans.len(), 1);

        assert!(!bans.is_banned_at(ADDR, t0 + Duration::from_secs(4)));
        assert!(bans.is_empty());
    }

    #[test]
    fn test_reban_refreshes_window() {
        let mut bans = BanList::default();
        let t0 = Instant::now();
        bans.ban_at(ADDR, t0);
        bans.ban_at(ADDR, t0 + Duration::from_secs(2));

        assert_eq!(bans.len(), 1);
        assert!(bans.is_banned_at(ADDR, t0 + Duration::from_secs(4)));
        assert!(!bans.is_banned_at(ADDR, t0 + Duration::from_secs(5)));
    }

    #[test]
    fn test_ban_is_per_address() {
        let mut bans = BanList::default();
        let t0 = Instant::now();
        bans.ban_at(ADDR, t0);
        assert!(!bans.is_banned_at(OTHER, t0));
    }

    #[test]
    fn test_custom_duration() {
        let mut bans = BanList::new(Duration::from_secs(10));
        let t0 = Instant::now();
        bans.ban_at(ADDR, t0);
        assert!(bans.is_banned_at(ADDR, t0 + Duration::from_secs(9)));
        assert_eq!(bans.duration(), Duration::from_secs(10));
    }
}
