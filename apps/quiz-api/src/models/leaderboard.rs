use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::user::User;

/// A ranked row of a quiz leaderboard. Derived, never stored as state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub name: String,
    pub score: u32,
    pub rank: usize,
}

/// Rank participants: score descending, then earlier `joined_at`, then user id.
///
/// Ranks are positions `1..=N`; tied scores do not share a rank.
pub fn rank<'a>(participants: impl IntoIterator<Item = &'a User>) -> Vec<LeaderboardEntry> {
    let mut users: Vec<&User> = participants.into_iter().collect();
    users.sort_by(|a, b| compare(a, b));

    users
        .into_iter()
        .enumerate()
        .map(|(i, user)| LeaderboardEntry {
            user_id: user.id.clone(),
            name: user.name.clone(),
            score: user.score,
            rank: i + 1,
        })
        .collect()
}

fn compare(a: &User, b: &User) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.joined_at.cmp(&b.joined_at))
        .then_with(|| a.id.cmp(&b.id))
}
