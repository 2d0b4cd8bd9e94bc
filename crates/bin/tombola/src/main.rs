//! tombola - coordinator, dealer and player entry points

use anyhow::Result;
use clap::{Parser, Subcommand};
use tombola::config::DEFAULT_CHALLENGE_LEN;
use tombola::{GameConfig, Role};
use tracing::warn;

mod play;
mod serve;

#[derive(Parser, Debug)]
#[command(name = "tombola")]
#[command(about = "verifiably-fair multi-party deck dealing", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// run the relay/session coordinator
    Coordinator {
        /// listening port
        #[arg(long, default_value_t = 1024)]
        port: u16,

        /// players (dealer excluded) required for a game to start
        #[arg(long, default_value_t = 3)]
        party_size: u32,

        /// values per player card
        #[arg(long, default_value_t = 5)]
        card_size: u32,

        /// values in the deck
        #[arg(long, default_value_t = 25)]
        deck_size: u32,

        /// length of the authentication challenge string
        #[arg(long, default_value_t = DEFAULT_CHALLENGE_LEN)]
        challenge_len: usize,

        /// identity public key (hex) allowed to register as the
        /// dealer; repeatable
        #[arg(long = "dealer-key")]
        dealer_keys: Vec<String>,
    },

    /// join a session as the dealer
    Dealer {
        #[command(flatten)]
        join: play::JoinArgs,
    },

    /// join a session as a player
    Player {
        #[command(flatten)]
        join: play::JoinArgs,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tombola=info,tombola_cli=info".into()),
        )
        .init();

    match Args::parse().command {
        Command::Coordinator {
            port,
            party_size,
            card_size,
            deck_size,
            challenge_len,
            dealer_keys,
        } => {
            if dealer_keys.is_empty() {
                warn!("no --dealer-key given: nobody will be able to deal");
            }
            let config = GameConfig {
                port,
                party_size,
                card_size,
                deck_size,
                challenge_len,
                dealer_keys: dealer_keys.into_iter().collect(),
            };
            serve::run(config).await
        }
        Command::Dealer { join } => play::run(Role::Dealer, join).await,
        Command::Player { join } => play::run(Role::Player, join).await,
    }
}
