//! shuffle - seeded deterministic permutation and its exact inverse
//!
//! fisher-yates driven by a ChaCha20 stream derived from the seed.
//! used both to hide deck order during commitment and to regenerate
//! reproducible per-participant cards after the reveal. the seed is a
//! symmetric key that is only used here after it has been publicly
//! revealed, so unpredictability is not required - only that every
//! participant computes the identical function.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// deterministically permute `items` under `seed`
pub fn shuffle<T: Clone>(items: &[T], seed: &[u8; 32]) -> Vec<T> {
    let mut out = items.to_vec();
    let mut rng = ChaCha20Rng::from_seed(*seed);
    for i in (1..out.len()).rev() {
        let j = rng.gen_range(0..=i);
        out.swap(i, j);
    }
    out
}

/// exact inverse: `unshuffle(shuffle(l, s), s) == l` for any list and
/// seed. recovers the permutation by shuffling the identity indices
/// with the same seed, then scattering elements back
pub fn unshuffle<T: Clone>(items: &[T], seed: &[u8; 32]) -> Vec<T> {
    let identity: Vec<usize> = (0..items.len()).collect();
    let order = shuffle(&identity, seed);

    let mut out: Vec<Option<T>> = vec![None; items.len()];
    for (pos, &original) in order.iter().enumerate() {
        out[original] = Some(items[pos].clone());
    }
    out.into_iter()
        .map(|slot| slot.expect("permutation covers every index"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_same_seed_same_order() {
        let seed = [7u8; 32];
        let deck: Vec<u32> = (0..60).collect();
        assert_eq!(shuffle(&deck, &seed), shuffle(&deck, &seed));
    }

    #[test]
    fn test_different_seeds_differ() {
        let deck: Vec<u32> = (0..60).collect();
        assert_ne!(shuffle(&deck, &[1u8; 32]), shuffle(&deck, &[2u8; 32]));
    }

    #[test]
    fn test_empty_and_singleton() {
        let seed = [0u8; 32];
        assert_eq!(shuffle(&Vec::<u32>::new(), &seed), Vec::<u32>::new());
        assert_eq!(unshuffle(&shuffle(&[9u32], &seed), &seed), vec![9u32]);
    }

    proptest! {
        #[test]
        fn test_unshuffle_inverts_shuffle(
            items in proptest::collection::vec(any::<u32>(), 0..128),
            seed in any::<[u8; 32]>(),
        ) {
            let round = unshuffle(&shuffle(&items, &seed), &seed);
            prop_assert_eq!(round, items);
        }
    }
}
