//! Connectivity monitor.
//!
//! Wraps the platform's reachability query and turns raw status reports
//! into de-duplicated online/offline transitions.

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::config::SiteOrigin;

/// Best-effort platform reachability query.
pub trait ReachabilityProbe {
    fn is_reachable(&self) -> io::Result<bool>;
}

type Listener = Box<dyn FnMut(bool)>;

pub struct ConnectivityMonitor {
    online: bool,
    listeners: Vec<Listener>,
}

impl ConnectivityMonitor {
    /// Query the probe once. A failing probe counts as online.
    pub fn new(probe: &dyn ReachabilityProbe) -> Self {
        let online = probe.is_reachable().unwrap_or_else(|e| {
            log::warn!("reachability query failed ({e}), assuming online");
            true
        });
        Self::with_state(online)
    }

    pub fn with_state(online: bool) -> Self {
        Self {
            online,
            listeners: Vec::new(),
        }
    }

    pub fn currently_online(&self) -> bool {
        self.online
    }

    pub fn on_change(&mut self, listener: impl FnMut(bool) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Feed a raw status report. Listeners fire only on a real transition;
    /// returns whether one happened.
    pub fn update(&mut self, online: bool) -> bool {
        if online == self.online {
            return false;
        }
        self.online = online;
        log::info!("connectivity: {}", if online { "online" } else { "offline" });
        for listener in &mut self.listeners {
            listener(online);
        }
        true
    }

    /// Re-query the probe and feed the result through [`update`](Self::update).
    /// Probe failures leave the state unchanged.
    pub fn refresh(&mut self, probe: &dyn ReachabilityProbe) -> bool {
        match probe.is_reachable() {
            Ok(online) => self.update(online),
            Err(e) => {
                log::debug!("reachability refresh failed: {e}");
                false
            }
        }
    }
}

/// Reachability by opening a TCP connection to the site host.
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn for_origin(origin: &SiteOrigin, timeout: Duration) -> Self {
        let port = origin
            .port()
            .or_else(|| origin.base().port_or_known_default())
            .unwrap_or(443);
        Self {
            host: origin.host().to_string(),
            port,
            timeout,
        }
    }
}

impl ReachabilityProbe for TcpProbe {
    fn is_reachable(&self) -> io::Result<bool> {
        let addrs = (self.host.as_str(), self.port).to_socket_addrs()?;
        for addr in addrs {
            if TcpStream::connect_timeout(&addr, self.timeout).is_ok() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Fixed(io::Result<bool>);

    impl ReachabilityProbe for Fixed {
        fn is_reachable(&self) -> io::Result<bool> {
            match &self.0 {
                Ok(v) => Ok(*v),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            }
        }
    }

    #[test]
    fn probe_failure_defaults_online() {
        let probe = Fixed(Err(io::Error::new(io::ErrorKind::Other, "no radio")));
        assert!(ConnectivityMonitor::new(&probe).currently_online());
        assert!(!ConnectivityMonitor::new(&Fixed(Ok(false))).currently_online());
    }

    #[test]
    fn fires_once_per_transition() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut monitor = ConnectivityMonitor::with_state(true);
        let sink = Rc::clone(&seen);
        monitor.on_change(move |online| sink.borrow_mut().push(online));

        assert!(!monitor.update(true));
        assert!(monitor.update(false));
        assert!(!monitor.update(false));
        assert!(monitor.update(true));
        assert_eq!(*seen.borrow(), vec![false, true]);
    }

    #[test]
    fn refresh_ignores_probe_errors() {
        let mut monitor = ConnectivityMonitor::with_state(false);
        let broken = Fixed(Err(io::Error::new(io::ErrorKind::Other, "x")));
        assert!(!monitor.refresh(&broken));
        assert!(!monitor.currently_online());
        assert!(monitor.refresh(&Fixed(Ok(true))));
    }

    #[test]
    fn tcp_probe_reaches_local_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let origin = SiteOrigin::parse(&format!("http://127.0.0.1:{port}/")).unwrap();
        let probe = TcpProbe::for_origin(&origin, Duration::from_secs(1));
        assert!(probe.is_reachable().unwrap());
    }
}
