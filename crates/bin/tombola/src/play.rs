//! play - dealer and player client loop
//!
//! wires a `Participant` to the coordinator socket and to stdin.
//! everything protocol-related lives in the state machine; this loop
//! only moves messages and reacts to phase changes.

use anyhow::{anyhow, Result};
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tracing::{error, info, warn};

use tombola::crypto::IdentityCard;
use tombola::protocol::{recv_msg, send_msg};
use tombola::{Message, Participant, Phase, Role};

#[derive(Args, Debug)]
pub struct JoinArgs {
    /// coordinator address
    #[arg(long, default_value = "127.0.0.1:1024")]
    pub addr: String,

    /// unique nickname within the session
    #[arg(long)]
    pub nickname: String,

    /// 32-byte hex seed for a deterministic identity key; a fresh
    /// identity is generated when absent
    #[arg(long)]
    pub identity_seed: Option<String>,

    /// authenticate and register without prompting
    #[arg(long)]
    pub auto: bool,
}

pub async fn run(role: Role, args: JoinArgs) -> Result<()> {
    let identity = match &args.identity_seed {
        Some(seed_hex) => {
            let seed: [u8; 32] = hex::decode(seed_hex)?
                .try_into()
                .map_err(|_| anyhow!("identity seed must be exactly 32 bytes"))?;
            IdentityCard::from_seed(seed)
        }
        None => IdentityCard::generate(),
    };
    info!(identity_key = %identity.public_key(), "identity card ready");

    let mut participant = Participant::new(role, args.nickname.clone(), identity);

    let stream = TcpStream::connect(&args.addr).await?;
    info!(addr = %args.addr, "connected to coordinator");
    let (mut reader, mut writer) = stream.into_split();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    if args.auto {
        send_msg(&mut writer, &participant.auth_request()).await?;
    } else {
        info!("commands: auth, register, users, log");
    }

    loop {
        tokio::select! {
            inbound = recv_msg(&mut reader) => {
                let Some(msg) = inbound? else {
                    info!("coordinator closed the connection");
                    break;
                };
                let is_game_over = matches!(msg, Message::GameOver { .. });
                let was_connected = participant.phase() == Phase::Connected;

                let replies = match participant.handle(msg) {
                    Ok(replies) => replies,
                    Err(e) => {
                        error!(error = %e, "protocol failure, leaving session");
                        break;
                    }
                };
                for reply in replies {
                    send_msg(&mut writer, &reply).await?;
                }

                if args.auto && was_connected && participant.phase() == Phase::Authenticated {
                    send_msg(&mut writer, &participant.register_request()).await?;
                }

                match participant.phase() {
                    Phase::Resolved => {
                        // players wait for the dealer's announcement so
                        // the coordinator sees an orderly shutdown
                        if is_game_over || role == Role::Dealer {
                            report(&participant);
                            break;
                        }
                    }
                    Phase::Aborted => {
                        error!("session aborted");
                        break;
                    }
                    _ => {}
                }
            }
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    stdin_open = false;
                    continue;
                };
                match line.trim() {
                    "auth" => send_msg(&mut writer, &participant.auth_request()).await?,
                    "register" => send_msg(&mut writer, &participant.register_request()).await?,
                    "users" => send_msg(&mut writer, &participant.users_request()).await?,
                    "log" => send_msg(&mut writer, &participant.log_request()).await?,
                    "" => {}
                    other => warn!(input = other, "unknown command"),
                }
            }
        }
    }
    Ok(())
}

fn report(participant: &Participant) {
    let Some(outcome) = participant.outcome() else {
        return;
    };
    info!(deck = ?outcome.deck, "final deck in draw order");
    for (sequence, card) in &outcome.cards {
        let nickname = participant
            .users()
            .get(sequence)
            .map(|u| u.nickname.as_str())
            .unwrap_or("?");
        info!(sequence, nickname, ?card, "card");
    }
    let winners: Vec<&str> = outcome
        .winners
        .iter()
        .filter_map(|w| participant.users().get(w).map(|u| u.nickname.as_str()))
        .collect();
    info!(?winners, "winners");
}
