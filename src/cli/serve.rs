//! Serve subcommand implementation.
//!
//! Handles `pingboard serve`: one probe engine for the process, one scan
//! session per accepted TCP connection.

use crate::config::AppSettings;
use crate::error::{CliError, CliResult};
use crate::output;
use crate::ping::{ErrorHandler, PingEngine};
use crate::scan::{DnsResolver, LineConnection, ResolutionPolicy, ScanService};
use crate::types::{HostSchema, SessionToken};
use clap::Parser;
use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Serve scan sessions to dashboard clients.
#[derive(Parser, Debug)]
pub struct ServeCommand {
    /// Address to listen on
    #[arg(short, long, value_name = "ADDR", env = "PINGBOARD_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Hosts file (JSON list of categories)
    #[arg(long, value_name = "PATH", env = "PINGBOARD_HOSTS")]
    pub hosts: Option<PathBuf>,

    /// Pinger workers per session and engine dispatchers (0 = 2x CPUs)
    #[arg(long, env = "PINGBOARD_PINGERS")]
    pub pingers: Option<usize>,

    /// Resolver workers per session (0 = 4x CPUs)
    #[arg(long, env = "PINGBOARD_RESOLVERS")]
    pub resolvers: Option<usize>,

    /// Request queue depth and in-flight probe limit
    #[arg(long, env = "PINGBOARD_QUEUE_SIZE")]
    pub queue_size: Option<usize>,

    /// Probe timeout in milliseconds
    #[arg(short = 't', long, env = "PINGBOARD_TIMEOUT_MS")]
    pub timeout: Option<u64>,

    /// What a failed hostname lookup does to a session
    #[arg(long, value_enum, env = "PINGBOARD_POLICY")]
    pub policy: Option<ResolutionPolicy>,
}

impl ServeCommand {
    /// Apply command-line overrides on top of file settings.
    pub fn apply(&self, mut settings: AppSettings) -> AppSettings {
        if let Some(listen) = self.listen {
            settings.listen_addr = listen;
        }
        if let Some(hosts) = &self.hosts {
            settings.hosts_path = Some(hosts.clone());
        }
        if let Some(pingers) = self.pingers {
            settings.pingers = pingers;
        }
        if let Some(resolvers) = self.resolvers {
            settings.resolvers = resolvers;
        }
        if let Some(queue_size) = self.queue_size {
            settings.queue_size = queue_size;
        }
        if let Some(timeout) = self.timeout {
            settings.timeout_ms = timeout;
        }
        if let Some(policy) = self.policy {
            settings.resolution_policy = policy;
        }
        settings
    }

    /// Execute the serve command until Ctrl-C.
    pub async fn execute(&self, settings: AppSettings, quiet: bool) -> CliResult<()> {
        let settings = self.apply(settings);
        settings.validate()?;

        let hosts_file = settings.hosts_file()?;
        let schema = HostSchema::load(&hosts_file)?;
        info!(
            path = %hosts_file.display(),
            categories = schema.categories().len(),
            hosts = schema.host_count(),
            "hosts loaded"
        );

        if !super::is_root() {
            output::print_warning("raw ICMP sockets usually require root/sudo privileges.");
        }

        let handler: ErrorHandler = Box::new(|e| warn!("probe engine: {}", e));
        let (engine, bound) = PingEngine::start(settings.engine_config(), Some(handler))?;
        for address in &bound {
            debug!("listening for echo replies on {}", address);
        }
        info!(
            timeout_ms = engine.timeout().as_millis() as u64,
            slots = engine.available_slots(),
            "probe engine started"
        );
        let engine = Arc::new(engine);

        let token = SessionToken::generate().map_err(|e| CliError::Other(e.to_string()))?;
        let service = Arc::new(ScanService::new(
            settings.session_settings(),
            Arc::new(DnsResolver::from_system()),
            Arc::clone(&engine) as Arc<dyn crate::ping::Prober>,
            token,
        ));

        let listener = TcpListener::bind(settings.listen_addr).await?;
        info!(
            "accepting sessions on {} (token {})",
            settings.listen_addr,
            service.token().as_str()
        );
        if !quiet {
            output::print_info(&format!(
                "Serving on {} with token {}",
                settings.listen_addr,
                service.token().as_str()
            ));
        }

        let interrupt = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("could not listen for Ctrl-C: {}", e);
            }
        };
        accept_sessions(listener, service, &hosts_file, Arc::new(schema), interrupt).await;
        info!(pending = engine.pending(), "interrupt received, shutting down");

        engine.shutdown().await;
        Ok(())
    }
}

/// Accept connections until `shutdown` resolves, running one session per
/// connection.
async fn accept_sessions<F>(
    listener: TcpListener,
    service: Arc<ScanService>,
    hosts_file: &Path,
    fallback: Arc<HostSchema>,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        let (stream, peer) = tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("accept failed: {}", e);
                    continue;
                }
            },
        };

        debug!("connection from {}", peer);
        let service = Arc::clone(&service);
        let schema = current_schema(hosts_file, &fallback);
        tokio::spawn(async move {
            let connection = LineConnection::new(stream);
            if let Err(e) = service.run_session(connection, &schema).await {
                debug!("session with {} failed: {}", peer, e);
            }
        });
    }
}

/// Reload the hosts file for a new session, keeping the last good schema
/// when it cannot be read.
fn current_schema(path: &Path, fallback: &Arc<HostSchema>) -> Arc<HostSchema> {
    match HostSchema::load(path) {
        Ok(schema) => Arc::new(schema),
        Err(e) => {
            error!("could not reload hosts file, using previous copy: {}", e);
            Arc::clone(fallback)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeResult;
    use crate::ping::{Echo, Prober};
    use crate::scan::{SessionSettings, StaticResolver};
    use crate::types::Category;
    use async_trait::async_trait;
    use std::net::IpAddr;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    const TOKEN: &str = "serve-test-token";

    struct InstantProber;

    #[async_trait]
    impl Prober for InstantProber {
        async fn probe(&self, target: IpAddr) -> ProbeResult<Echo> {
            Ok(Echo {
                target,
                sequence: 0,
                rtt: Duration::from_millis(1),
            })
        }
    }

    async fn client_session(addr: SocketAddr) -> Vec<serde_json::Value> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(format!("{{\"token\":\"{}\"}}\n", TOKEN).as_bytes())
            .await
            .unwrap();
        let mut output = String::new();
        stream.read_to_string(&mut output).await.unwrap();
        output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn command() -> ServeCommand {
        ServeCommand {
            listen: None,
            hosts: None,
            pingers: None,
            resolvers: None,
            queue_size: None,
            timeout: None,
            policy: None,
        }
    }

    #[test]
    fn test_flags_override_settings() {
        let cmd = ServeCommand {
            listen: Some("127.0.0.1:9100".parse().unwrap()),
            queue_size: Some(64),
            policy: Some(ResolutionPolicy::Continue),
            ..command()
        };

        let settings = cmd.apply(AppSettings {
            timeout_ms: 300,
            ..AppSettings::default()
        });

        assert_eq!(settings.listen_addr.port(), 9100);
        assert_eq!(settings.queue_size, 64);
        assert_eq!(settings.resolution_policy, ResolutionPolicy::Continue);
        assert_eq!(settings.timeout_ms, 300);
    }

    #[test]
    fn test_schema_reload_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hosts.json");
        let fallback = Arc::new(HostSchema::new(vec![Category::new("old", ["a.example"])]));

        assert_eq!(*current_schema(&path, &fallback), *fallback);

        std::fs::write(&path, r#"[{"category": "new", "hosts": ["b.example"]}]"#).unwrap();
        let schema = current_schema(&path, &fallback);
        assert_eq!(schema.categories()[0].category, "new");
    }

    #[tokio::test]
    async fn test_accept_loop_serves_until_shutdown() {
        let dir = TempDir::new().unwrap();
        let hosts_file = dir.path().join("hosts.json");
        std::fs::write(&hosts_file, r#"[{"category": "core", "hosts": ["a.example"]}]"#).unwrap();

        let resolver = StaticResolver::default().with_host("a.example", vec!["192.0.2.7".parse().unwrap()]);
        let service = Arc::new(ScanService::new(
            SessionSettings::default(),
            Arc::new(resolver),
            Arc::new(InstantProber),
            SessionToken::from_value(TOKEN),
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let fallback = Arc::new(HostSchema::default());
        let server = tokio::spawn(async move {
            let shutdown = async {
                let _ = stop_rx.await;
            };
            accept_sessions(listener, service, &hosts_file, fallback, shutdown).await;
        });

        // Two sessions on one loop: the shutdown future survives each accept
        for _ in 0..2 {
            let messages = client_session(addr).await;
            let tags: Vec<&str> = messages.iter().map(|m| m["t"].as_str().unwrap()).collect();
            assert_eq!(tags, vec!["s", "r", "p", "c"]);
            assert_eq!(messages[3]["e"], "");
        }

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("accept loop kept running after shutdown")
            .unwrap();
    }
}
