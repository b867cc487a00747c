//! Embedded gateway running on a background thread with its own runtime.

use crate::{resolve_bind_address, serve_router, AppState, ServerError};
use std::{
    net::SocketAddr,
    sync::mpsc,
    thread::{self, JoinHandle},
};
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Handle to an embedded gateway; dropping it shuts the server down.
pub struct EmbeddedServer {
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    addr: SocketAddr,
    used_fallback: bool,
}

impl EmbeddedServer {
    /// Start the gateway on a background thread.
    ///
    /// Binds the address from [`resolve_bind_address`]; if it is in use the
    /// server falls back to an auto-assigned port on the same IP.
    ///
    /// # Errors
    /// Returns an error if the runtime, thread or socket cannot be created.
    pub fn start(state: AppState, allow_public: bool) -> Result<Self, ServerError> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread = thread::Builder::new()
            .name("confdeck-embedded-gateway".into())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(2)
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(err) => {
                        let _ = ready_tx.send(Err(format!("failed to start runtime: {}", err)));
                        return;
                    }
                };

                let bind_addr = resolve_bind_address(&state.config, allow_public);
                let mut used_fallback = false;
                let listener = match rt.block_on(tokio::net::TcpListener::bind(bind_addr)) {
                    Ok(listener) => listener,
                    Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                        warn!(
                            "gateway bind address {} is in use; falling back to an auto port",
                            bind_addr
                        );
                        used_fallback = true;
                        let fallback_addr = SocketAddr::new(bind_addr.ip(), 0);
                        match rt.block_on(tokio::net::TcpListener::bind(fallback_addr)) {
                            Ok(listener) => listener,
                            Err(fallback_err) => {
                                let _ = ready_tx.send(Err(format!(
                                    "failed to bind server socket: {}",
                                    fallback_err
                                )));
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        let _ =
                            ready_tx.send(Err(format!("failed to bind server socket: {}", err)));
                        return;
                    }
                };

                let actual_addr = listener.local_addr().unwrap_or(bind_addr);
                info!("gateway listening on http://{}", actual_addr);
                let _ = ready_tx.send(Ok((actual_addr, used_fallback)));

                let shutdown = async {
                    let _ = shutdown_rx.await;
                };
                if let Err(err) = rt.block_on(serve_router(listener, state, allow_public, shutdown))
                {
                    warn!("gateway error: {}", err);
                }
            })
            .map_err(|err| ServerError::Startup(format!("failed to spawn server: {}", err)))?;

        let mut thread_handle = Some(thread);
        let ready = ready_rx.recv();
        match ready {
            Ok(Ok((addr, used_fallback))) => Ok(Self {
                shutdown: Some(shutdown_tx),
                thread: thread_handle.take(),
                addr,
                used_fallback,
            }),
            Ok(Err(message)) => {
                let _ = shutdown_tx.send(());
                if let Some(handle) = thread_handle.take() {
                    let _ = handle.join();
                }
                Err(ServerError::Startup(message))
            }
            Err(_) => {
                let _ = shutdown_tx.send(());
                if let Some(handle) = thread_handle.take() {
                    let _ = handle.join();
                }
                Err(ServerError::Startup(
                    "server thread exited before reporting readiness".to_string(),
                ))
            }
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL suitable for [`confdeck_core::GatewayClient`].
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Whether the requested port was taken and an auto port was used.
    pub fn used_fallback(&self) -> bool {
        self.used_fallback
    }
}

impl Drop for EmbeddedServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}
