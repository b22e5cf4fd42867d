use std::{
    future::Future,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use anyhow::{Context, Result};
use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
    select,
    sync::{OwnedSemaphorePermit, Semaphore},
};
use tracing::{debug, info, warn};

use crate::{
    config::ServerConfig,
    registry::{Registry, SessionId},
    session::run_session,
};

/// Accepts TCP connections and runs one session task per connection.
pub struct Server {
    listener: TcpListener,
    state: Arc<ServerState>,
}

struct ServerState {
    registry: Arc<Registry>,
    config: ServerConfig,
    slots: Arc<Semaphore>,
    next_id: AtomicU64,
}

impl ServerState {
    // Ids start at 1 and are never handed out twice.
    fn next_id(&self) -> SessionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Server {
    pub fn new(listener: TcpListener, config: ServerConfig) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_sessions));
        Self {
            listener,
            state: Arc::new(ServerState {
                registry: Arc::new(Registry::new()),
                config,
                slots,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Binds `config.listen` and builds a server around it.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.listen)
            .await
            .with_context(|| format!("failed to bind {}", config.listen))?;
        Ok(Self::new(listener, config))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.state.registry)
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener, state } = self;
        tokio::pin!(shutdown);

        loop {
            // Hold a slot before accepting so excess connections queue in the backlog.
            let permit = select! {
                _ = &mut shutdown => break,
                permit = Arc::clone(&state.slots).acquire_owned() => {
                    permit.context("session slots closed")?
                }
            };

            select! {
                _ = &mut shutdown => break,
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, permit, &state);
                }
            }
        }

        info!("server shutting down");
        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    permit: OwnedSemaphorePermit,
    state: &Arc<ServerState>,
) {
    match result {
        Ok((stream, peer)) => spawn_session_handler(stream, peer, permit, state),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_session_handler(
    stream: TcpStream,
    peer: SocketAddr,
    permit: OwnedSemaphorePermit,
    state: &Arc<ServerState>,
) {
    let state = Arc::clone(state);
    let id = state.next_id();
    info!(session = id, %peer, "connection accepted");

    tokio::spawn(async move {
        let _permit = permit;
        if let Err(err) = handle_connection(stream, id, &state).await {
            warn!(session = id, %peer, error = ?err, "session ended with error");
        }
    });
}

async fn handle_connection(stream: TcpStream, id: SessionId, state: &ServerState) -> Result<()> {
    if let Err(err) = stream.set_nodelay(true) {
        debug!(session = id, error = ?err, "failed to set TCP_NODELAY");
    }
    let (reader, writer) = stream.into_split();
    run_session(
        Arc::clone(&state.registry),
        id,
        BufReader::new(reader),
        writer,
        &state.config,
    )
    .await?;
    Ok(())
}
