use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Goal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub target_completions: Option<i64>,
    pub target_days: Option<i64>,
    /// Set exactly once, the first time the target is reached.
    pub target_reached_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One habit's weight inside a goal's breakdown. Weights sum to 100.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GoalLink {
    pub goal_id: Uuid,
    pub habit_id: Uuid,
    pub weight: i32,
}

/// Rescale the remaining weights to sum 100 after a habit detaches.
/// Largest-remainder rounding keeps the result integral and exact.
pub fn renormalize_weights(weights: &[i32]) -> Vec<i32> {
    let total: i64 = weights.iter().map(|w| *w as i64).sum();
    if weights.is_empty() || total <= 0 {
        // degenerate weights: split evenly
        let n = weights.len() as i32;
        if n == 0 {
            return Vec::new();
        }
        let base = 100 / n;
        let mut out = vec![base; n as usize];
        for slot in out.iter_mut().take((100 % n) as usize) {
            *slot += 1;
        }
        return out;
    }

    let mut scaled: Vec<(usize, i32, i64)> = weights
        .iter()
        .enumerate()
        .map(|(i, w)| {
            let exact = *w as i64 * 100;
            let floor = exact / total;
            (i, floor as i32, exact % total)
        })
        .collect();

    let mut remainder = 100 - scaled.iter().map(|(_, f, _)| *f as i64).sum::<i64>();
    scaled.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
    for entry in scaled.iter_mut() {
        if remainder == 0 {
            break;
        }
        entry.1 += 1;
        remainder -= 1;
    }
    scaled.sort_by_key(|(i, _, _)| *i);
    scaled.into_iter().map(|(_, w, _)| w).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renormalized_weights_sum_to_100() {
        for weights in [
            vec![50, 25],
            vec![33, 33],
            vec![1, 1, 1],
            vec![70],
            vec![10, 20, 30, 15],
        ] {
            let out = renormalize_weights(&weights);
            assert_eq!(out.len(), weights.len());
            assert_eq!(out.iter().sum::<i32>(), 100, "weights {:?} -> {:?}", weights, out);
        }
    }

    #[test]
    fn proportions_are_preserved() {
        let out = renormalize_weights(&[60, 20]);
        assert_eq!(out, vec![75, 25]);
    }

    #[test]
    fn zero_total_splits_evenly() {
        let out = renormalize_weights(&[0, 0, 0]);
        assert_eq!(out.iter().sum::<i32>(), 100);
    }

    #[test]
    fn empty_stays_empty() {
        assert!(renormalize_weights(&[]).is_empty());
    }
}
