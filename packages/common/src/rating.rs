//! Multi-player Elo.
//!
//! A resolved challenge is treated as a round robin: every entrant plays
//! every other entrant once, winning the pairing when it collected more
//! votes and drawing on equal votes. The K factor is spread over the
//! `n - 1` pairings so a single challenge moves a rating by at most `K`.

use serde::{Deserialize, Serialize};

/// One rated entrant going into the calculation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entrant {
    pub user_id: i32,
    pub rating: i32,
    /// Votes received. Higher is better.
    pub score: i64,
}

/// Outcome of the calculation for one entrant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingChange {
    pub user_id: i32,
    /// 1-based; tied scores share a placement.
    pub placement: u32,
    pub rating_before: i32,
    pub rating_after: i32,
    pub delta: i32,
}

/// Standard competition ranking ("1224") of `scores`, highest first.
///
/// The returned vector is aligned with the input.
pub fn placements(scores: &[i64]) -> Vec<u32> {
    scores
        .iter()
        .map(|s| 1 + scores.iter().filter(|other| *other > s).count() as u32)
        .collect()
}

/// Probability that a player rated `rating` beats one rated `opponent`.
pub fn expected_score(rating: i32, opponent: i32) -> f64 {
    1.0 / (1.0 + 10f64.powf(f64::from(opponent - rating) / 400.0))
}

fn actual_score(score: i64, opponent: i64) -> f64 {
    match score.cmp(&opponent) {
        std::cmp::Ordering::Greater => 1.0,
        std::cmp::Ordering::Equal => 0.5,
        std::cmp::Ordering::Less => 0.0,
    }
}

/// Compute new ratings for every entrant, in input order.
pub fn compute_changes(entrants: &[Entrant], k_factor: f64) -> Vec<RatingChange> {
    let scores: Vec<i64> = entrants.iter().map(|e| e.score).collect();
    let places = placements(&scores);
    let opponents = entrants.len().saturating_sub(1);

    entrants
        .iter()
        .zip(places)
        .enumerate()
        .map(|(i, (entrant, placement))| {
            let delta = if opponents == 0 {
                0
            } else {
                let surplus: f64 = entrants
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, other)| {
                        actual_score(entrant.score, other.score)
                            - expected_score(entrant.rating, other.rating)
                    })
                    .sum();
                (k_factor * surplus / opponents as f64).round() as i32
            };
            RatingChange {
                user_id: entrant.user_id,
                placement,
                rating_before: entrant.rating,
                rating_after: entrant.rating + delta,
                delta,
            }
        })
        .collect()
}
