//! Per-connection lifecycle: register, read and dispatch commands in order, tear down.
//!
//! Outbound lines never go straight to the socket. Each session owns a bounded queue whose
//! sender lives in the registry, and a writer task drains that queue into the stream. Dropping
//! the registry entry therefore closes the queue, the writer flushes what is left and shuts
//! the stream down once.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::{
    io::{AsyncBufRead, AsyncWrite, AsyncWriteExt},
    select,
    sync::mpsc,
    time::timeout,
};
use tracing::{debug, error, info, warn};

use crate::{
    command::Command,
    config::ServerConfig,
    protocol::{read_line, write_line},
    registry::{Registry, SessionId},
    router::Router,
};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Leave,
    EndOfStream,
    ReadFailed,
    WriteFailed,
}

/// Drives one session from registration to teardown.
///
/// Only a registration failure is returned as an error; I/O problems end the session the same
/// way `LEAVE` does.
pub async fn run_session<R, W>(
    registry: Arc<Registry>,
    id: SessionId,
    mut reader: R,
    writer: W,
    config: &ServerConfig,
) -> Result<Termination>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outbox, inbox) = mpsc::channel(config.outbound_capacity);
    let mut writer_task = tokio::spawn(drain_outbox(id, inbox, writer, config.write_timeout));

    if let Err(err) = registry.register(id, outbox).await {
        error!(session = id, error = %err, "session id collision");
        let _ = writer_task.await;
        return Err(err.into());
    }
    info!(session = id, "session active");

    let router = Router::new(Arc::clone(&registry));
    let termination = select! {
        termination = read_commands(&router, id, &mut reader) => termination,
        _ = &mut writer_task => Termination::WriteFailed,
    };

    registry.unregister(id).await;
    if termination != Termination::WriteFailed {
        if let Err(err) = writer_task.await {
            warn!(session = id, error = ?err, "writer task failed");
        }
    }

    info!(session = id, ?termination, "session terminated");
    Ok(termination)
}

async fn read_commands<R>(router: &Router, id: SessionId, reader: &mut R) -> Termination
where
    R: AsyncBufRead + Unpin,
{
    loop {
        match read_line(reader).await {
            Ok(Some(line)) => {
                let command = Command::parse(&line);
                if command == Command::Leave {
                    return Termination::Leave;
                }
                router.dispatch(id, command).await;
            }
            Ok(None) => return Termination::EndOfStream,
            Err(err) => {
                debug!(session = id, error = ?err, "read failed");
                return Termination::ReadFailed;
            }
        }
    }
}

async fn drain_outbox<W>(
    id: SessionId,
    mut inbox: mpsc::Receiver<String>,
    mut writer: W,
    write_timeout: Duration,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = inbox.recv().await {
        match timeout(write_timeout, write_line(&mut writer, &line)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                debug!(session = id, error = ?err, "failed to deliver line");
                return;
            }
            Err(_) => {
                warn!(session = id, "write timed out; dropping slow peer");
                return;
            }
        }
    }

    if let Err(err) = writer.shutdown().await {
        debug!(session = id, error = ?err, "failed to shut down writer");
    }
}
