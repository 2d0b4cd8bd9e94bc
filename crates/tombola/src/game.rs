//! game - deck pipeline mechanics and outcome resolution
//!
//! the deck travels as a vector of opaque encrypted slots. each
//! participant's layer is a deterministic key-seeded permutation of
//! the slots followed by per-slot AEAD encryption; the dealer's base
//! layer skips the permutation because its hiding comes from the
//! uniformly random initial order. every layer is signed over the
//! resulting deck state, and peeling verifies then undoes layers in
//! exact reverse order.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use sha2::{Digest, Sha256};

use crate::crypto::DeckKey;
use crate::error::{Error, Result};
use crate::protocol::UserData;
use crate::shuffle::{shuffle, unshuffle};

/// encrypted (or, before any layer, plaintext) deck slots
pub type Slots = Vec<Vec<u8>>;

/// the integers `[0, deck_size)` in a uniformly random order
pub fn build_deck(deck_size: u32) -> Vec<u32> {
    let mut deck: Vec<u32> = (0..deck_size).collect();
    deck.shuffle(&mut rand::thread_rng());
    deck
}

/// big-endian encoding of each deck value, one slot per value
pub fn initial_slots(deck: &[u32]) -> Slots {
    deck.iter().map(|v| v.to_be_bytes().to_vec()).collect()
}

/// apply one participant's layer: permute (players only), then
/// encrypt every slot under the participant's deck key
pub fn apply_layer(slots: &[Vec<u8>], key: &DeckKey, permute: bool) -> Slots {
    let ordered = if permute {
        shuffle(slots, &key.seed())
    } else {
        slots.to_vec()
    };
    ordered.iter().map(|slot| key.encrypt(slot)).collect()
}

/// undo one layer: decrypt every slot, then invert the permutation.
/// `layer` is only used to name the failing layer in errors
pub fn peel_layer(slots: &[Vec<u8>], key: &DeckKey, permute: bool, layer: u32) -> Result<Slots> {
    let decrypted: Slots = slots
        .iter()
        .map(|slot| key.decrypt(slot).ok_or(Error::DecryptionFailed(layer)))
        .collect::<Result<_>>()?;

    Ok(if permute {
        unshuffle(&decrypted, &key.seed())
    } else {
        decrypted
    })
}

/// digest of a deck state; every pipeline signature covers this.
/// slots are length-framed so adjacent slots cannot be confused
pub fn deck_digest(slots: &[Vec<u8>]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    for slot in slots {
        hasher.update((slot.len() as u32).to_be_bytes());
        hasher.update(slot);
    }
    hasher.finalize().to_vec()
}

/// decode fully peeled slots back into deck values
pub fn decode_values(slots: &[Vec<u8>]) -> Result<Vec<u32>> {
    slots
        .iter()
        .map(|slot| {
            let bytes: [u8; 4] = slot
                .as_slice()
                .try_into()
                .map_err(|_| Error::InvalidDeck(format!("slot of {} bytes", slot.len())))?;
            Ok(u32::from_be_bytes(bytes))
        })
        .collect()
}

/// the committed deck must be exactly the values `[0, deck_size)`,
/// each appearing once
pub fn validate_deck(values: &[u32], deck_size: u32) -> Result<()> {
    if values.len() != deck_size as usize {
        return Err(Error::InvalidDeck(format!(
            "expected {deck_size} values, got {}",
            values.len()
        )));
    }

    let mut seen = vec![false; deck_size as usize];
    for &v in values {
        if v >= deck_size {
            return Err(Error::InvalidDeck(format!("value {v} out of range")));
        }
        if seen[v as usize] {
            return Err(Error::InvalidDeck(format!("duplicate value {v}")));
        }
        seen[v as usize] = true;
    }
    Ok(())
}

/// a player's card: the first `card_size` elements of the
/// deterministic permutation of the final deck under that player's
/// revealed key. public data, so every participant derives the same
/// card for every player
pub fn derive_card(deck: &[u32], seed: &[u8; 32], card_size: u32) -> Vec<u32> {
    let mut card = shuffle(deck, seed);
    card.truncate(card_size as usize);
    card
}

/// walk the final deck as a draw order and find the players whose
/// card completes first. several cards completing on the same drawn
/// value are all winners
pub fn resolve_winners(draw_order: &[u32], cards: &BTreeMap<u32, Vec<u32>>) -> Vec<u32> {
    let position: BTreeMap<u32, usize> = draw_order
        .iter()
        .enumerate()
        .map(|(i, &v)| (v, i))
        .collect();

    let mut best: Option<usize> = None;
    let mut winners = Vec::new();
    for (&player, card) in cards {
        // the draw index at which this card is fully marked
        let done = card.iter().map(|v| position.get(v).copied()).try_fold(
            0usize,
            |acc, pos| pos.map(|p| acc.max(p)),
        );
        let Some(done) = done else { continue };

        match best {
            Some(b) if done > b => {}
            Some(b) if done == b => winners.push(player),
            _ => {
                best = Some(done);
                winners = vec![player];
            }
        }
    }
    winners
}

/// signing payload for a registration request
pub fn register_digest(nickname: &str, session_key: &str, identity_key: &str) -> Vec<u8> {
    format!("register|{nickname}|{session_key}|{identity_key}").into_bytes()
}

/// signing payload for the coordinator-signed roster broadcast
pub fn roster_digest(users: &[UserData]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    for user in users {
        hasher.update(user.sequence.to_be_bytes());
        hasher.update(user.nickname.as_bytes());
        hasher.update(user.public_key.as_bytes());
    }
    hasher.finalize().to_vec()
}

/// signing payload for a deck key reveal
pub fn key_reveal_digest(sequence: u32, key_hex: &str) -> Vec<u8> {
    format!("reveal|{sequence}|{key_hex}").into_bytes()
}

/// signing payload for an authenticated query (`GETUSERS`, `GETLOG`)
pub fn query_digest(kind: &str) -> Vec<u8> {
    format!("query|{kind}").into_bytes()
}

/// wire encoding of slots
pub fn slots_to_hex(slots: &[Vec<u8>]) -> Vec<String> {
    slots.iter().map(|s| hex::encode(s)).collect()
}

/// parse wire slots; fails on non-hex input
pub fn slots_from_hex(deck: &[String]) -> Result<Slots> {
    deck.iter()
        .map(|s| hex::decode(s).map_err(|_| Error::BadFormat(format!("bad deck slot: {s}"))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_round_trip_three_layers() {
        let deck = build_deck(5);
        let keys: Vec<DeckKey> = (0..3).map(|_| DeckKey::generate()).collect();

        // dealer base layer (no permutation), then two player layers
        let mut slots = initial_slots(&deck);
        for (i, key) in keys.iter().enumerate() {
            slots = apply_layer(&slots, key, i != 0);
        }

        // peel in exact reverse order
        for (i, key) in keys.iter().enumerate().rev() {
            slots = peel_layer(&slots, key, i != 0, i as u32).unwrap();
        }

        assert_eq!(decode_values(&slots).unwrap(), deck);
    }

    #[test]
    fn test_peel_out_of_order_fails() {
        let slots = initial_slots(&build_deck(4));
        let a = DeckKey::generate();
        let b = DeckKey::generate();
        let layered = apply_layer(&apply_layer(&slots, &a, false), &b, true);

        // peeling the inner layer first must fail to decrypt
        assert!(peel_layer(&layered, &a, false, 0).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_decks() {
        validate_deck(&[2, 0, 1, 4, 3], 5).unwrap();
        assert!(validate_deck(&[0, 1, 2, 3], 5).is_err()); // short
        assert!(validate_deck(&[0, 1, 2, 3, 3], 5).is_err()); // duplicate
        assert!(validate_deck(&[0, 1, 2, 3, 7], 5).is_err()); // out of range
    }

    #[test]
    fn test_decode_rejects_odd_slot() {
        assert!(decode_values(&[vec![0, 0, 1]]).is_err());
    }

    #[test]
    fn test_cards_are_distinct_values_from_deck() {
        let deck = build_deck(10);
        let card = derive_card(&deck, &[3u8; 32], 4);
        assert_eq!(card.len(), 4);
        let mut unique = card.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 4);
        assert!(card.iter().all(|v| deck.contains(v)));
    }

    #[test]
    fn test_draw_order_scenario() {
        // draw [2,4,1,3,0]: card [4,1] completes at index 2, card
        // [2,3] at index 3 - player 1 is the sole winner
        let mut cards = BTreeMap::new();
        cards.insert(1, vec![4, 1]);
        cards.insert(2, vec![2, 3]);
        assert_eq!(resolve_winners(&[2, 4, 1, 3, 0], &cards), vec![1]);
    }

    #[test]
    fn test_simultaneous_winners() {
        // both cards complete on the draw at index 2
        let mut cards = BTreeMap::new();
        cards.insert(1, vec![4, 2]);
        cards.insert(2, vec![1, 4]);
        assert_eq!(resolve_winners(&[2, 1, 4, 3, 0], &cards), vec![1, 2]);
    }

    #[test]
    fn test_deck_digest_is_order_sensitive() {
        let a = vec![vec![1u8], vec![2u8]];
        let b = vec![vec![2u8], vec![1u8]];
        assert_ne!(deck_digest(&a), deck_digest(&b));
        // length framing: [1,2] as one slot differs from two slots
        let c = vec![vec![1u8, 2u8]];
        assert_ne!(deck_digest(&a), deck_digest(&c));
    }
}
