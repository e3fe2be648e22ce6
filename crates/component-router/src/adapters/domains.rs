//! Directory node selection.

use crate::domain::DirectoryConfig;
use crate::ports::DomainSelector;
use parking_lot::RwLock;
use rand::Rng;

/// Candidate directory hosts; each lookup picks one at random.
#[derive(Debug)]
pub struct DirectoryDomains {
    port: u16,
    hosts: RwLock<Vec<String>>,
}

impl DirectoryDomains {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            hosts: RwLock::new(Vec::new()),
        }
    }

    pub fn from_config(config: &DirectoryConfig) -> Self {
        let domains = Self::new(config.port);
        domains.add_domains(config.domains.iter().cloned());
        domains
    }

    /// Add a host. Blank and already known hosts are ignored.
    pub fn add_domain(&self, host: impl Into<String>) {
        let host = host.into();
        let host = host.trim();
        if host.is_empty() {
            return;
        }
        let mut hosts = self.hosts.write();
        if !hosts.iter().any(|known| known == host) {
            hosts.push(host.to_owned());
        }
    }

    pub fn add_domains<I, S>(&self, hosts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for host in hosts {
            self.add_domain(host);
        }
    }

    pub fn len(&self) -> usize {
        self.hosts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.read().is_empty()
    }
}

impl DomainSelector for DirectoryDomains {
    fn select_domain(&self) -> Option<String> {
        let hosts = self.hosts.read();
        match hosts.len() {
            0 => None,
            1 => Some(hosts[0].clone()),
            n => Some(hosts[rand::thread_rng().gen_range(0..n)].clone()),
        }
    }

    fn port(&self) -> u16 {
        self.port
    }
}
