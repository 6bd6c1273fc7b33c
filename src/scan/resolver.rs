//! Name resolution collaborators.

use crate::error::ResolveError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

/// Resolves a hostname to its addresses.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn lookup(&self, hostname: &str) -> Result<Vec<IpAddr>, ResolveError>;
}

/// DNS resolution through `trust-dns-resolver`.
pub struct DnsResolver {
    resolver: TokioAsyncResolver,
}

impl DnsResolver {
    /// Resolver using the system configuration, falling back to the
    /// library defaults when it cannot be read.
    pub fn from_system() -> Self {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|e| {
            tracing::warn!("could not read system resolver config, using defaults: {}", e);
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
        });
        Self { resolver }
    }
}

#[async_trait]
impl NameResolver for DnsResolver {
    async fn lookup(&self, hostname: &str) -> Result<Vec<IpAddr>, ResolveError> {
        // Literal addresses need no lookup
        if let Ok(ip) = hostname.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        let response = self
            .resolver
            .lookup_ip(hostname)
            .await
            .map_err(|e| ResolveError::Lookup {
                host: hostname.to_string(),
                reason: e.to_string(),
            })?;

        let ips: Vec<IpAddr> = response.iter().collect();
        if ips.is_empty() {
            return Err(ResolveError::NoAddresses(hostname.to_string()));
        }
        Ok(ips)
    }
}

/// Fixed hostname table. Unknown names fail with
/// [`ResolveError::NoAddresses`] unless they are literal addresses.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    hosts: HashMap<String, Result<Vec<IpAddr>, ResolveError>>,
}

impl StaticResolver {
    /// Map `hostname` to `addresses`.
    pub fn with_host(mut self, hostname: impl Into<String>, addresses: Vec<IpAddr>) -> Self {
        self.hosts.insert(hostname.into(), Ok(addresses));
        self
    }

    /// Make `hostname` fail with `error`.
    pub fn with_failure(mut self, hostname: impl Into<String>, error: ResolveError) -> Self {
        self.hosts.insert(hostname.into(), Err(error));
        self
    }
}

#[async_trait]
impl NameResolver for StaticResolver {
    async fn lookup(&self, hostname: &str) -> Result<Vec<IpAddr>, ResolveError> {
        match self.hosts.get(hostname) {
            Some(entry) => entry.clone(),
            None => match hostname.parse::<IpAddr>() {
                Ok(ip) => Ok(vec![ip]),
                Err(_) => Err(ResolveError::NoAddresses(hostname.to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_resolver() {
        let resolver = StaticResolver::default()
            .with_host("a.example", vec!["1.1.1.1".parse().unwrap()])
            .with_failure(
                "b.example",
                ResolveError::Lookup {
                    host: "b.example".to_string(),
                    reason: "SERVFAIL".to_string(),
                },
            );

        assert_eq!(
            resolver.lookup("a.example").await.unwrap(),
            vec!["1.1.1.1".parse::<IpAddr>().unwrap()]
        );
        assert!(matches!(
            resolver.lookup("b.example").await,
            Err(ResolveError::Lookup { .. })
        ));
        assert!(matches!(
            resolver.lookup("c.example").await,
            Err(ResolveError::NoAddresses(_))
        ));
        assert_eq!(resolver.lookup("10.0.0.1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dns_resolver_passes_literals_through() {
        let resolver = DnsResolver::from_system();
        let ips = resolver.lookup("192.0.2.7").await.unwrap();
        assert_eq!(ips, vec!["192.0.2.7".parse::<IpAddr>().unwrap()]);
    }
}
