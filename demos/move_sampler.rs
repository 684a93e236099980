//! Example: Picking moves at different AI levels.
//!
//! Run with: cargo run --example move_sampler

use std::collections::BTreeMap;

use portfolio_guard::chess::{AiLevel, ScoredMove, select_move};

fn main() {
    let moves = vec![
        ScoredMove::new("e2e4", 0.62),
        ScoredMove::new("d2d4", 0.60),
        ScoredMove::new("g1f3", 0.55),
        ScoredMove::new("c2c4", 0.51),
        ScoredMove::new("b1c3", 0.40),
        ScoredMove::new("h2h4", -0.20),
        ScoredMove::new("g2g4", -0.55),
    ];

    let mut rng = rand::rng();
    for level in [1, 4, 7, 8, 10] {
        let level = AiLevel::new(level);
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for _ in 0..1_000 {
            if let Some(chosen) = select_move(&moves, level, &mut rng) {
                *counts.entry(chosen.mv).or_default() += 1;
            }
        }
        println!("Level {:>2}: {:?}", level.get(), counts);
    }
}
