//! Rarity-weighted reward rolls.
//!
//! Shared by milestone generation (boss-battle preview) and boss-battle
//! completion (the actual award). Callers supply the RNG so tests can seed it.

use crate::catalog::{self, CatalogItem};
use crate::schemas::Rarity;
use rand::Rng;

/// Roll probabilities per tier, in draw order. Must sum to 1.
pub const RARITY_WEIGHTS: &[(Rarity, f64)] = &[
    (Rarity::Common, 0.60),
    (Rarity::Rare, 0.25),
    (Rarity::Epic, 0.10),
    (Rarity::Legendary, 0.05),
];

/// Draw a rarity tier: uniform roll against cumulative weights.
pub fn roll_rarity<R: Rng + ?Sized>(rng: &mut R) -> Rarity {
    let roll: f64 = rng.gen();
    let mut cumulative = 0.0;
    for (rarity, chance) in RARITY_WEIGHTS {
        cumulative += chance;
        if roll < cumulative {
            return *rarity;
        }
    }
    Rarity::Common
}

/// Roll a rarity, then pick uniformly among catalog items of that tier.
pub fn roll_item<R: Rng + ?Sized>(rng: &mut R) -> &'static CatalogItem {
    let rarity = roll_rarity(rng);
    let candidates: Vec<&'static CatalogItem> = catalog::items_of_rarity(rarity).collect();
    candidates[rng.gen_range(0..candidates.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    #[test]
    fn test_weights_sum_to_one() {
        let total: f64 = RARITY_WEIGHTS.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rolled_item_matches_rolled_rarity() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let item = roll_item(&mut rng);
            assert!(catalog::items_of_rarity(item.rarity).any(|i| i.name == item.name));
        }
    }

    #[test]
    fn test_distribution_approximates_weights() {
        const DRAWS: u32 = 100_000;
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts: HashMap<Rarity, u32> = HashMap::new();
        for _ in 0..DRAWS {
            *counts.entry(roll_rarity(&mut rng)).or_default() += 1;
        }

        for (rarity, expected) in RARITY_WEIGHTS {
            let observed = *counts.get(rarity).unwrap_or(&0) as f64 / DRAWS as f64;
            assert!(
                (observed - expected).abs() < 0.01,
                "{:?}: observed {:.4}, expected {:.2}",
                rarity,
                observed,
                expected
            );
        }
    }
}
