use chrono::NaiveDate;

use crate::models::habit::{sunday_based_weekday, HabitFrequency};

/// Streak recomputation only looks this many done entries into the past when
/// deriving the current streak; older history still feeds the longest streak.
const RECENT_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakSummary {
    pub current: i32,
    pub longest: i32,
}

/// Replay the done-log history of a habit and derive its streaks.
///
/// `done_dates_desc` is the full set of dates with a done log, most recent
/// first. The cached values on the habit row are exactly what this replay
/// produces; callers re-run it after every mutation.
///
/// Rules, in order:
/// - no done logs at all resets both streaks to 0 (the stored longest is
///   discarded only here);
/// - for weekly habits, days outside the schedule are transparent: they
///   neither extend nor break a run;
/// - adjacent entries chain when the day gap is exactly 1 (daily) or at
///   most 7 landing on a scheduled day (weekly);
/// - the current streak is the unbroken run anchored at the most recent
///   entry, inspecting at most `RECENT_WINDOW` entries;
/// - a habit whose most recent done date is more than one day old has no
///   current streak;
/// - the longest streak never shrinks below its previously stored value.
pub fn compute_streaks(
    done_dates_desc: &[NaiveDate],
    frequency: HabitFrequency,
    days_of_week: &[i16],
    today: NaiveDate,
    stored_longest: i32,
) -> StreakSummary {
    if done_dates_desc.is_empty() {
        return StreakSummary { current: 0, longest: 0 };
    }

    let walked: Vec<NaiveDate> = match frequency {
        HabitFrequency::Daily => done_dates_desc.to_vec(),
        HabitFrequency::Weekly => done_dates_desc
            .iter()
            .copied()
            .filter(|d| days_of_week.contains(&sunday_based_weekday(*d)))
            .collect(),
    };

    let mut longest = 0i32;
    let mut current = 0i32;

    if !walked.is_empty() {
        let mut temp = 1i32;
        let mut current_open = true;
        current = 1;

        for i in 1..walked.len() {
            let gap = (walked[i - 1] - walked[i]).num_days();
            let continues = match frequency {
                HabitFrequency::Daily => gap == 1,
                HabitFrequency::Weekly => (1..=7).contains(&gap),
            };

            if continues {
                temp += 1;
                if current_open && i < RECENT_WINDOW {
                    current += 1;
                }
            } else {
                longest = longest.max(temp);
                temp = 1;
                current_open = false;
            }
        }
        longest = longest.max(temp);
    }

    // An unlogged habit has no active streak, however long its history.
    let days_since_last = (today - done_dates_desc[0]).num_days();
    if days_since_last > 1 {
        current = 0;
    }

    StreakSummary {
        current,
        longest: longest.max(stored_longest),
    }
}
