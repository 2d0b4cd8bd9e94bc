//! config - validated session parameters

use std::collections::HashSet;

use crate::error::{Error, Result};

/// default challenge string length
pub const DEFAULT_CHALLENGE_LEN: usize = 14;

/// parameters the coordinator runs a session with. consumed as
/// already-validated values by the protocol state machines
#[derive(Clone, Debug)]
pub struct GameConfig {
    /// coordinator listening port
    pub port: u16,
    /// number of players (dealer excluded) required to start
    pub party_size: u32,
    /// values per player card
    pub card_size: u32,
    /// values in the deck
    pub deck_size: u32,
    /// length of the random authentication challenge
    pub challenge_len: usize,
    /// identity public keys allowed to register as the dealer
    pub dealer_keys: HashSet<String>,
}

impl GameConfig {
    pub fn validate(&self) -> Result<()> {
        if self.party_size == 0 {
            return Err(Error::BadFormat("party size must be positive".into()));
        }
        if self.card_size == 0 || self.card_size >= self.deck_size {
            return Err(Error::BadFormat(format!(
                "card size {} must satisfy 0 < card_size < deck_size {}",
                self.card_size, self.deck_size
            )));
        }
        if self.challenge_len == 0 {
            return Err(Error::BadFormat("challenge length must be positive".into()));
        }
        Ok(())
    }
}
