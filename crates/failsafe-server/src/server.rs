//! The cooperative net loop.
//!
//! One current-thread task pumps everything: it accepts TCP connections,
//! serves them strictly one at a time (there is never more than one
//! handler invocation in flight), and answers DHCP in between. The loop
//! runs until a handler requests termination (reboot or initramfs boot)
//! through [`crate::state::SystemControl`].

use std::{net::SocketAddr, sync::Arc};

use failsafe_http::{Progress, ReadLimits, RequestReader};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

use crate::{
    dhcp::{DhcpConfig, DhcpServer},
    engine::{ResponseDriver, error_response},
    error::ServerError,
    handlers::build_router,
    router::Router,
    state::{ServerState, SessionOutcome},
};

/// DHCP responder settings; ports are parameters so tests can avoid the
/// privileged 67/68 pair.
#[derive(Debug, Clone, Copy)]
pub struct DhcpSetup {
    /// Addresses and lease timing.
    pub config: DhcpConfig,
    /// Port the responder listens on (67 in production).
    pub listen_port: u16,
    /// Port replies are sent to (68 in production).
    pub reply_port: u16,
}

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP bind address, e.g. `0.0.0.0:80`.
    pub bind: String,
    /// Request read limits.
    pub limits: ReadLimits,
    /// DHCP responder, when enabled.
    pub dhcp: Option<DhcpSetup>,
}

/// A bound recovery server, ready to run its session.
pub struct Server {
    listener: TcpListener,
    dhcp: Option<DhcpServer>,
    router: Router,
    state: Arc<ServerState>,
    limits: ReadLimits,
}

impl Server {
    /// Bind the listener (and the DHCP socket, when configured) and
    /// build the endpoint registry.
    ///
    /// # Errors
    ///
    /// [`ServerError::Config`] for an unparseable bind address,
    /// [`ServerError::Transport`] for socket failures.
    pub async fn bind(config: ServerConfig, state: Arc<ServerState>) -> Result<Self, ServerError> {
        let addr: SocketAddr = config
            .bind
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{}': {e}", config.bind)))?;
        let listener = TcpListener::bind(addr).await?;

        let dhcp = match config.dhcp {
            Some(setup) => {
                Some(DhcpServer::bind(setup.config, setup.listen_port, setup.reply_port).await?)
            },
            None => None,
        };

        let router = build_router(&state);
        tracing::info!(%addr, endpoints = router.len(), "recovery server bound");

        Ok(Self { listener, dhcp, router, state, limits: config.limits })
    }

    /// Actual listening address (useful with port 0).
    ///
    /// # Errors
    ///
    /// Socket introspection failure.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the session loop until a handler terminates it.
    ///
    /// # Errors
    ///
    /// Fatal listener failures only; per-connection errors are logged
    /// and the loop continues.
    pub async fn run(self) -> Result<SessionOutcome, ServerError> {
        loop {
            if let Some(outcome) = self.state.control.take() {
                let what = match &outcome {
                    SessionOutcome::Reboot => "reboot",
                    SessionOutcome::BootInitramfs(_) => "boot initramfs",
                };
                tracing::info!(outcome = what, "session ending");
                return Ok(outcome);
            }

            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    tracing::debug!(%peer, "connection accepted");
                    if let Err(err) = serve_connection(stream, &self.router, self.limits).await {
                        tracing::debug!(%peer, %err, "connection ended with error");
                    }
                },
                result = pump_dhcp(self.dhcp.as_ref()) => {
                    if let Err(err) = result {
                        tracing::warn!(%err, "dhcp receive failed");
                    }
                },
            }
        }
    }
}

async fn pump_dhcp(dhcp: Option<&DhcpServer>) -> Result<(), ServerError> {
    match dhcp {
        Some(dhcp) => dhcp.pump().await,
        None => std::future::pending().await,
    }
}

/// Serve exactly one request on `stream`.
///
/// `Connection: close` semantics: read one request, drive its handler to
/// completion, shut the socket down. CLOSED reaches the handler on every
/// path out of this function, the driver guarantees it.
async fn serve_connection(
    mut stream: TcpStream,
    router: &Router,
    limits: ReadLimits,
) -> std::io::Result<()> {
    let mut reader = RequestReader::new(limits);
    let mut chunk = [0u8; 16 * 1024];

    let request = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            // Peer closed before a complete request; nothing to answer.
            return Ok(());
        }
        match reader.feed(&chunk[..n]) {
            Ok(Progress::Complete) => break reader.into_request(),
            Ok(Progress::NeedMore) => {},
            Err(err) => {
                tracing::debug!(%err, "request rejected");
                stream.write_all(&error_response(err.status_code())).await?;
                stream.shutdown().await?;
                return Ok(());
            },
        }
    };

    let request = match request {
        Ok(request) => request,
        Err(err) => {
            stream.write_all(&error_response(err.status_code())).await?;
            stream.shutdown().await?;
            return Ok(());
        },
    };

    let Some(handler) = router.lookup(request.path()) else {
        stream.write_all(&error_response(404)).await?;
        stream.shutdown().await?;
        return Ok(());
    };

    let mut driver = ResponseDriver::new(handler);
    let first = driver.begin(&request);

    let wrote: std::io::Result<()> = async {
        stream.write_all(&first).await?;
        while let Some(chunk) = driver.next_chunk() {
            stream.write_all(&chunk).await?;
        }
        stream.shutdown().await
    }
    .await;

    driver.close();
    tracing::debug!(path = %request.path(), status = driver.status(), "request served");
    wrote
}
