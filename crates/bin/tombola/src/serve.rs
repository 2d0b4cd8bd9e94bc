//! serve - network loop around the coordinator state machine
//!
//! one acceptor task, one reader and one writer task per connection,
//! and a single state-owning loop fed over an mpsc channel so every
//! coordinator mutation happens in arrival order.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use tombola::crypto::SessionKeys;
use tombola::protocol::{recv_msg, send_msg};
use tombola::{ConnId, Coordinator, GameConfig, Message, Outbound};

enum Event {
    Connected(ConnId, mpsc::UnboundedSender<Message>),
    Inbound(ConnId, Message),
    Closed(ConnId),
}

pub async fn run(config: GameConfig) -> Result<()> {
    config.validate()?;
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = config.port, "coordinator listening");

    let keys = SessionKeys::generate();
    info!(public_key = %keys.public_hex(), "coordinator session key");
    let mut coordinator = Coordinator::new(config, keys);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let acceptor_tx = event_tx.clone();
    tokio::spawn(async move {
        let mut next_conn: ConnId = 1;
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let conn = next_conn;
                    next_conn += 1;
                    info!(%addr, conn, "accepted connection");
                    spawn_connection(conn, stream, acceptor_tx.clone());
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                    break;
                }
            }
        }
    });

    let mut writers: HashMap<ConnId, mpsc::UnboundedSender<Message>> = HashMap::new();
    while let Some(event) = event_rx.recv().await {
        match event {
            Event::Connected(conn, writer) => {
                if let Err(e) = coordinator.accept(conn) {
                    // dropping the writer closes the socket
                    warn!(conn, error = %e, "refusing connection");
                    continue;
                }
                writers.insert(conn, writer);
            }
            Event::Inbound(conn, msg) => {
                // refused connections have no writer and are ignored
                if !writers.contains_key(&conn) {
                    continue;
                }
                let effects = match coordinator.handle(conn, msg) {
                    Ok(effects) => effects,
                    Err(e) => {
                        warn!(conn, error = %e, "dropping connection after protocol error");
                        writers.remove(&conn);
                        coordinator.disconnect(conn)
                    }
                };
                if execute(&mut writers, effects) {
                    break;
                }
            }
            Event::Closed(conn) => {
                writers.remove(&conn);
                if execute(&mut writers, coordinator.disconnect(conn)) {
                    break;
                }
            }
        }
    }

    // give the per-connection writer tasks a moment to flush the
    // final broadcasts before the runtime tears them down
    drop(writers);
    tokio::time::sleep(Duration::from_millis(200)).await;
    info!("session over, coordinator shutting down");
    Ok(())
}

/// apply coordinator effects; true once the session is over
fn execute(writers: &mut HashMap<ConnId, mpsc::UnboundedSender<Message>>, effects: Vec<Outbound>) -> bool {
    let mut shutdown = false;
    for effect in effects {
        match effect {
            Outbound::Send(conn, msg) => {
                if let Some(writer) = writers.get(&conn) {
                    let _ = writer.send(msg);
                }
            }
            Outbound::Shutdown => shutdown = true,
        }
    }
    shutdown
}

fn spawn_connection(conn: ConnId, stream: TcpStream, events: mpsc::UnboundedSender<Event>) {
    let (mut read_half, mut write_half) = stream.into_split();
    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Message>();
    let _ = events.send(Event::Connected(conn, writer_tx));

    tokio::spawn(async move {
        while let Some(msg) = writer_rx.recv().await {
            if let Err(e) = send_msg(&mut write_half, &msg).await {
                warn!(conn, error = %e, "write failed");
                break;
            }
        }
    });

    tokio::spawn(async move {
        loop {
            match recv_msg(&mut read_half).await {
                Ok(Some(msg)) => {
                    if events.send(Event::Inbound(conn, msg)).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    let _ = events.send(Event::Closed(conn));
                    break;
                }
                Err(e) => {
                    warn!(conn, error = %e, "read failed");
                    let _ = events.send(Event::Closed(conn));
                    break;
                }
            }
        }
    });
}
