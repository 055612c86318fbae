//! Tokio driver for a [`Server`].
//!
//! [`spawn`] moves a server into its own task. The task is the only place
//! the server is mutated: inbound datagrams and commands arrive over an
//! `mpsc` channel, timers are served by sleeping until the next deadline,
//! and every [`ServerEvent`] is forwarded to the returned receiver.

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::server::{Server, ServerError, ServerEvent};
use crate::core::constants::DRIVER_CHANNEL_CAPACITY;
use crate::runtime::{now, sleep_until};
use crate::transport::{Payload, WirePacket};

enum Command {
    Packet(WirePacket),
    Datagram(Vec<u8>),
    SendTo {
        cookie: String,
        payload: Payload,
        reply: oneshot::Sender<Result<(), ServerError>>,
    },
    Close {
        cookie: String,
        reply: oneshot::Sender<Result<(), ServerError>>,
    },
    Start,
    Stop {
        kill_all: bool,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
}

/// Handle to a server task. Cheap to clone.
///
/// The task ends once every handle is dropped, or when the event receiver
/// is dropped.
#[derive(Clone)]
pub struct ServerHandle {
    tx: mpsc::Sender<Command>,
}

impl ServerHandle {
    /// Hand a decoded packet to the server.
    pub async fn deliver(&self, packet: WirePacket) -> Result<(), ServerError> {
        self.command(Command::Packet(packet)).await
    }

    /// Hand a raw datagram to the server.
    pub async fn deliver_bytes(&self, bytes: Vec<u8>) -> Result<(), ServerError> {
        self.command(Command::Datagram(bytes)).await
    }

    /// Start accepting connections.
    pub async fn start(&self) -> Result<(), ServerError> {
        self.command(Command::Start).await
    }

    /// Stop accepting connections.
    pub async fn stop(&self, kill_all: bool) -> Result<(), ServerError> {
        self.command(Command::Stop { kill_all }).await
    }

    /// Send application data on a connection.
    pub async fn send_to(
        &self,
        cookie: impl Into<String>,
        payload: Payload,
    ) -> Result<(), ServerError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::SendTo {
            cookie: cookie.into(),
            payload,
            reply,
        })
        .await?;
        rx.await.map_err(|_| ServerError::Shutdown)?
    }

    /// Close one connection.
    pub async fn close_connection(&self, cookie: impl Into<String>) -> Result<(), ServerError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Close {
            cookie: cookie.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ServerError::Shutdown)?
    }

    /// Number of tracked connections.
    pub async fn connection_count(&self) -> Result<usize, ServerError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Count { reply }).await?;
        rx.await.map_err(|_| ServerError::Shutdown)
    }

    async fn command(&self, command: Command) -> Result<(), ServerError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| ServerError::Shutdown)
    }
}

/// Run `server` on its own task.
///
/// Must be called from within a tokio runtime.
pub fn spawn(server: Server) -> (ServerHandle, mpsc::Receiver<ServerEvent>) {
    let (tx, rx) = mpsc::channel(DRIVER_CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel(DRIVER_CHANNEL_CAPACITY);
    tokio::spawn(run(server, rx, event_tx));
    (ServerHandle { tx }, event_rx)
}

async fn run(
    mut server: Server,
    mut commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<ServerEvent>,
) {
    loop {
        while let Some(event) = server.poll_event() {
            if events.send(event).await.is_err() {
                debug!(port = %server.port(), "event receiver dropped, server task exiting");
                return;
            }
        }

        let deadline = server.poll_timeout();
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                apply(&mut server, command);
            }
            () = sleep_until(deadline) => {
                server.handle_timeout(now());
            }
        }
    }

    // Handles gone: close everything and flush what is left.
    server.stop(true);
    while let Some(event) = server.poll_event() {
        if events.send(event).await.is_err() {
            break;
        }
    }
    debug!(port = %server.port(), "server task finished");
}

fn apply(server: &mut Server, command: Command) {
    match command {
        Command::Packet(packet) => {
            server.write(packet, now());
        }
        Command::Datagram(bytes) => {
            server.write_bytes(&bytes, now());
        }
        Command::SendTo {
            cookie,
            payload,
            reply,
        } => {
            let _ = reply.send(server.send_to(&cookie, payload));
        }
        Command::Close { cookie, reply } => {
            let _ = reply.send(server.close_connection(&cookie));
        }
        Command::Start => server.start(),
        Command::Stop { kill_all } => server.stop(kill_all),
        Command::Count { reply } => {
            let _ = reply.send(server.connection_count());
        }
    }
}
