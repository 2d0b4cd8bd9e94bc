//! tombola: multi-party verifiably-fair deck dealing
//!
//! a dealer and N players jointly commit to a shuffled deck of unique
//! values through an untrusted-but-relaying coordinator, then reveal
//! their symmetric keys, decrypt, derive per-player cards and agree on
//! a winner - without any single party controlling the randomness.
//!
//! ## protocol overview
//!
//! 1. auth: each participant passes a challenge-response against its
//!    identity key, then registers a per-session keypair and nickname
//! 2. commitment: the deck passes through every participant in
//!    sequence order; each applies a permutation + encryption layer
//!    and signs the resulting deck state
//! 3. reveal: every participant discloses its symmetric key; layers
//!    are peeled in exact reverse order, verifying every signature
//! 4. outcome: cards are recomputed from public post-reveal data, so
//!    all parties derive identical cards and winners
//!
//! the coordinator relays and audit-logs messages but never sees deck
//! plaintext before the reveal.

pub mod audit;
pub mod config;
pub mod coordinator;
pub mod crypto;
pub mod error;
pub mod game;
pub mod participant;
pub mod protocol;
pub mod shuffle;

pub use config::GameConfig;
pub use coordinator::{ConnId, Coordinator, Outbound};
pub use error::{Error, Result};
pub use participant::{Outcome, Participant, Phase, Role};
pub use protocol::{GameStatus, LogEntry, Message, UserData};
