/// "Top N%" label for a 1-based rank among `total` members.
pub fn percentile_label(rank: i64, total: i64) -> String {
    if total <= 1 {
        return "Top 100%".to_string();
    }

    let scaled = rank.max(1) * 100;
    if scaled <= total {
        return "Top 1%".to_string();
    }

    // ceil(rank / total * 100) without floats
    let percent = (scaled + total - 1) / total;
    format!("Top {percent}%")
}

/// In-memory mirror of the leaderboard ORDER BY, for checking `list_top` and
/// `rank` against.
#[cfg(test)]
pub(crate) mod standing {
    use chrono::{DateTime, Utc};
    use std::cmp::Ordering;

    use crate::db::models::LeaderboardEntry;

    /// Higher score first, then the earlier check-in. Entries that never
    /// checked in sort after those that did.
    pub(crate) fn compare_standing(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
        b.score
            .cmp(&a.score)
            .then_with(|| compare_check_in(a.last_checked_in, b.last_checked_in))
            .then_with(|| a.id.cmp(&b.id))
    }

    fn compare_check_in(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
        match (a, b) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}
