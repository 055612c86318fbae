//! Tokio driver for a [`Client`].
//!
//! Mirrors the server driver: the client lives on its own task, inbound
//! datagrams and commands arrive over a channel, and every
//! [`ConnectionEvent`] is forwarded to the returned receiver. The task
//! finishes once the connection reaches a terminal state.

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::client::{Client, ClientError};
use crate::core::constants::DRIVER_CHANNEL_CAPACITY;
use crate::runtime::{now, sleep_until};
use crate::transport::{ConnectionEvent, Payload, WirePacket};

enum Command {
    Packet(WirePacket),
    Datagram(Vec<u8>),
    Send {
        payload: Payload,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Close,
}

/// Handle to a client task. Cheap to clone.
#[derive(Clone)]
pub struct ClientHandle {
    cookie: String,
    tx: mpsc::Sender<Command>,
}

impl ClientHandle {
    /// Cookie of the driven connection.
    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    /// Send application data.
    pub async fn send(&self, payload: Payload) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send { payload, reply }).await?;
        rx.await.map_err(|_| ClientError::Disconnected)?
    }

    /// Hand a decoded packet to the client.
    pub async fn deliver(&self, packet: WirePacket) -> Result<(), ClientError> {
        self.command(Command::Packet(packet)).await
    }

    /// Hand a raw datagram to the client.
    pub async fn deliver_bytes(&self, bytes: Vec<u8>) -> Result<(), ClientError> {
        self.command(Command::Datagram(bytes)).await
    }

    /// Close the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.command(Command::Close).await
    }

    /// Check if the client task has finished.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn command(&self, command: Command) -> Result<(), ClientError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| ClientError::Disconnected)
    }
}

/// Run `client` on its own task.
///
/// Must be called from within a tokio runtime.
pub fn spawn(client: Client) -> (ClientHandle, mpsc::Receiver<ConnectionEvent>) {
    let (tx, rx) = mpsc::channel(DRIVER_CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel(DRIVER_CHANNEL_CAPACITY);
    let cookie = client.cookie().to_string();
    tokio::spawn(run(client, rx, event_tx));
    (ClientHandle { cookie, tx }, event_rx)
}

async fn run(
    mut client: Client,
    mut commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<ConnectionEvent>,
) {
    loop {
        if !flush(&mut client, &events).await {
            debug!(cookie = %client.cookie(), "event receiver dropped, client task exiting");
            return;
        }
        if client.connection().is_terminated() {
            break;
        }

        let deadline = client.poll_timeout();
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    client.close();
                    flush(&mut client, &events).await;
                    break;
                };
                apply(&mut client, command);
            }
            () = sleep_until(deadline) => {
                client.handle_timeout(now());
            }
        }
    }
    debug!(cookie = %client.cookie(), state = %client.state(), "client task finished");
}

async fn flush(client: &mut Client, events: &mpsc::Sender<ConnectionEvent>) -> bool {
    while let Some(event) = client.poll_event() {
        if events.send(event).await.is_err() {
            return false;
        }
    }
    true
}

fn apply(client: &mut Client, command: Command) {
    match command {
        Command::Packet(packet) => {
            client.write(packet, now());
        }
        Command::Datagram(bytes) => {
            client.write_bytes(&bytes, now());
        }
        Command::Send { payload, reply } => {
            let _ = reply.send(client.send(payload));
        }
        Command::Close => client.close(),
    }
}
