use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::{codec::Framed, sync::CancellationToken};
use tracing::{debug, info, warn};

use super::{
    frame_store::FrameStore,
    registry::{SessionRegistry, SessionStats},
};
use crate::{
    common::SessionId,
    protocol::{Command, CommandCodec, FrameRequest, Reply},
};

/// Serves one accepted connection until the peer goes away.
pub struct SessionHandler {
    id: SessionId,
    stats: Arc<SessionStats>,
    store: Arc<FrameStore>,
    registry: Arc<SessionRegistry>,
    paused: bool,
}

impl SessionHandler {
    pub fn new(
        id: SessionId,
        stats: Arc<SessionStats>,
        store: Arc<FrameStore>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            id,
            stats,
            store,
            registry,
            paused: false,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Runs the command loop. The session is unregistered on return.
    pub async fn run<S>(mut self, stream: S, shutdown: CancellationToken)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut framed = Framed::new(stream, CommandCodec::default());

        loop {
            let command = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = framed.next() => match next {
                    Some(Ok(command)) => command,
                    Some(Err(e)) => {
                        warn!("[{}] read error from {}: {}", self.id, self.stats.peer, e);
                        break;
                    }
                    None => break,
                },
            };

            let Some(reply) = self.handle(command) else {
                continue;
            };
            if let Err(e) = framed.send(reply).await {
                warn!("[{}] write error to {}: {}", self.id, self.stats.peer, e);
                break;
            }
        }

        self.registry.unregister(&self.id);
        info!(
            "[{}] session with {} closed after {:?}, {} frames served",
            self.id,
            self.stats.peer,
            self.stats.connected_at.elapsed(),
            self.stats.frames_served()
        );
    }

    /// Applies one command and returns the reply to send, if any.
    pub fn handle(&mut self, command: Command) -> Option<Reply> {
        match command {
            Command::Load => Some(Reply::Load(self.registry.load().to_string())),
            Command::Pause => {
                debug!("[{}] paused", self.id);
                self.paused = true;
                None
            }
            Command::Play => {
                debug!("[{}] playing", self.id);
                self.paused = false;
                None
            }
            Command::Frame(request) => {
                if self.stats.mark_streaming() {
                    info!(
                        "[{}] {} started streaming {} at {}",
                        self.id, self.stats.peer, request.title, request.tier
                    );
                }
                if self.paused {
                    return None;
                }
                Some(self.lookup(&request))
            }
            Command::Malformed(raw) => {
                debug!("[{}] malformed command {:?}", self.id, raw);
                Some(Reply::NoFrame)
            }
        }
    }

    fn lookup(&self, request: &FrameRequest) -> Reply {
        match self.store.frame(&request.title, request.tier, request.index) {
            Some(blob) => {
                self.stats.record_frame(blob.len());
                Reply::Frame(blob)
            }
            None => {
                debug!("[{}] no frame for {}", self.id, request);
                Reply::NoFrame
            }
        }
    }
}
