//! # Telnet Server
//!
//! [`BbsServer`] accepts TCP connections and gives each one its own tokio task
//! running a [`MenuSystem`]. The task owns the session outright, so input for
//! one caller is handled strictly in arrival order and nothing mutable is
//! shared between callers apart from the stores behind [`Services`].
//!
//! Per connection:
//!
//! 1. Send `IAC WILL ECHO`, `IAC WILL SUPPRESS-GO-AHEAD`
//! 2. `MenuSystem::on_enter` (pre-logon banner)
//! 3. Read loop: strip telnet commands, decode UTF-8, feed one character per
//!    `update`; on the session waker, `poll` for finished background work;
//!    write queued output after either
//! 4. On logoff, idle timeout or disconnect: `MenuSystem::on_exit`
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use termbbs::bbs::BbsServer;
//! use termbbs::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(Config::load("config.toml").await?);
//!     let server = BbsServer::new(config, None).await?;
//!     server.run().await
//! }
//! ```

use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use uuid::Uuid;

use super::menu_store::JsonMenuStore;
use super::menu_system::{MenuSystem, Services};
use super::session::Session;
use super::telnet::{negotiation, TelnetFilter, Utf8Decoder};
use crate::config::Config;
use crate::metrics;
use crate::storage::UserStore;

const READ_BUFFER: usize = 512;

/// Counts live connections; the slot is released when the guard drops.
struct ConnectionSlot(Arc<AtomicUsize>);

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct BbsServer {
    config: Arc<Config>,
    services: Services,
    listener: TcpListener,
    connections: Arc<AtomicUsize>,
    /// Set when the server opened the JSON menu store itself; flushed on shutdown.
    menu_files: Option<Arc<JsonMenuStore>>,
}

impl BbsServer {
    /// Open the stores under `storage.data_dir` and bind the listener.
    /// `bind` overrides `server.bind`.
    pub async fn new(config: Arc<Config>, bind: Option<&str>) -> Result<Self> {
        config.validate()?;
        let menus = Arc::new(JsonMenuStore::open(&config.storage.data_dir).await?);
        let users = Arc::new(UserStore::open(&config.storage.data_dir, config.security.argon2.as_ref()).await?);
        let services = Services::standard(config.clone(), menus.clone(), users);
        let mut server = Self::with_services(config, services, bind).await?;
        server.menu_files = Some(menus);
        Ok(server)
    }

    /// Bind with caller-supplied collaborators.
    pub async fn with_services(config: Arc<Config>, services: Services, bind: Option<&str>) -> Result<Self> {
        config.validate()?;
        let addr = bind.unwrap_or(&config.server.bind);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow!("Failed to bind {}: {}", addr, e))?;
        Ok(BbsServer {
            config,
            services,
            listener,
            connections: Arc::new(AtomicUsize::new(0)),
            menu_files: None,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Number of callers currently connected.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Accept connections until ctrl-c.
    pub async fn run(self) -> Result<()> {
        info!(
            "BBS '{}' listening on {} (sysop {})",
            self.config.bbs.name,
            self.local_addr()?,
            self.config.bbs.sysop
        );
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.accept(stream, peer),
                        Err(e) => warn!("accept failed: {}", e),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }
        let m = metrics::snapshot();
        info!(
            "Shutting down: sessions started={} active={} dispatch handled={} unhandled={}",
            m.sessions_started,
            m.sessions_active(),
            m.dispatch_handled,
            m.dispatch_unhandled
        );
        if let Some(menus) = &self.menu_files {
            if let Err(e) = menus.flush().await {
                error!("Pending menu changes were not saved: {}", e);
            }
        }
        Ok(())
    }

    fn accept(&self, mut stream: TcpStream, peer: SocketAddr) {
        let max_users = self.config.bbs.max_users as usize;
        if self.connections.load(Ordering::SeqCst) >= max_users {
            warn!("Refusing {}: {} users already connected", peer, max_users);
            tokio::spawn(async move {
                let _ = stream
                    .write_all(b"\r\nThe system is full. Please call back later.\r\n")
                    .await;
                let _ = stream.shutdown().await;
            });
            return;
        }
        self.connections.fetch_add(1, Ordering::SeqCst);
        let slot = ConnectionSlot(self.connections.clone());
        let config = self.config.clone();
        let services = self.services.clone();
        tokio::spawn(async move {
            let _slot = slot;
            if let Err(e) = handle_connection(stream, peer, config, services).await {
                debug!("connection {} ended with error: {}", peer, e);
            }
        });
    }
}

async fn flush_output(system: &mut MenuSystem, writer: &mut OwnedWriteHalf) -> Result<()> {
    let output = system.session_mut().take_output();
    if output.is_empty() {
        return Ok(());
    }
    for chunk in output {
        writer.write_all(chunk.as_bytes()).await?;
    }
    writer.flush().await?;
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<Config>,
    services: Services,
) -> Result<()> {
    let _ = stream.set_nodelay(true);
    let (mut reader, mut writer) = stream.into_split();
    writer.write_all(&negotiation()).await?;

    let session = Session::new(Uuid::new_v4().to_string(), peer.to_string());
    let mut system = match MenuSystem::new(config.clone(), services, session) {
        Ok(system) => system,
        Err(e) => {
            error!("Cannot start session for {}: {}", peer, e);
            let _ = writer.write_all(b"\r\nSystem configuration error.\r\n").await;
            return Err(e.into());
        }
    };
    system.on_enter();

    let result = serve(&mut system, &mut reader, &mut writer, &config).await;

    system.on_exit();
    let _ = flush_output(&mut system, &mut writer).await;
    let _ = writer.shutdown().await;
    result
}

async fn serve(
    system: &mut MenuSystem,
    reader: &mut tokio::net::tcp::OwnedReadHalf,
    writer: &mut OwnedWriteHalf,
    config: &Config,
) -> Result<()> {
    let idle_minutes = i64::from(config.bbs.session_timeout);
    let idle = (idle_minutes > 0).then(|| Duration::from_secs(u64::from(config.bbs.session_timeout) * 60));
    let wake = system.session().waker();
    let mut filter = TelnetFilter::new();
    let mut decoder = Utf8Decoder::new();
    let mut buf = [0u8; READ_BUFFER];
    let mut data = Vec::with_capacity(READ_BUFFER);

    flush_output(system, writer).await?;
    while system.is_active() {
        tokio::select! {
            read = reader.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    debug!("peer {} closed the connection", system.session().peer);
                    system.session_mut().logoff();
                    break;
                }
                data.clear();
                filter.filter(&buf[..n], &mut data);
                for (ch, multibyte) in decoder.decode(&data) {
                    let mut encoded = [0u8; 4];
                    system.update(ch.encode_utf8(&mut encoded), multibyte);
                    if !system.is_active() {
                        break;
                    }
                }
            }
            _ = wake.notified() => system.poll(),
            _ = tokio::time::sleep(idle.unwrap_or_default()), if idle.is_some() => {
                if system.session().is_inactive(idle_minutes) {
                    info!("Idle timeout for session {}", system.session().id);
                    system
                        .session_mut()
                        .deliver("\r\nIdle time limit exceeded. Goodbye.\r\n");
                    system.session_mut().logoff();
                }
            }
        }
        flush_output(system, writer).await?;
    }
    Ok(())
}
