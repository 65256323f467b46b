// src/scheduler/slotting.rs

//! Turns an ordered selection into timestamped slots. The cursor only ever
//! moves forward by at least the minimum gap, so spacing holds by
//! construction rather than by a final validation pass.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

use crate::types::{PlannedSlot, ValueTier};

/// Earliest and latest hour a slot may start on any day.
const DAY_START_HOUR: u32 = 9;
const DAY_END_HOUR: u32 = 22;

/// Fixed filler times used on zone-cooldown days.
const COOLDOWN_TIMES: [(u32, u32); 3] = [(9, 0), (14, 30), (20, 0)];

/// One picked item, not yet placed in time.
#[derive(Debug, Clone)]
pub struct SelectedItem {
    pub item_id: i64,
    pub tier: ValueTier,
    pub category: String,
    pub urgent: bool,
}

impl SelectedItem {
    fn into_slot(self, slot_time: DateTime<Utc>) -> PlannedSlot {
        PlannedSlot {
            item_id: self.item_id,
            slot_time,
            tier: self.tier,
            category: self.category,
            urgent: self.urgent,
        }
    }
}

/// Reorder so fillers break up runs of high-value sends. Paid items keep
/// their relative order; a filler is spent wherever two High/Premium items
/// would otherwise be adjacent, leftovers go to the tail.
pub fn interleave(selected: Vec<SelectedItem>) -> Vec<SelectedItem> {
    let (mut fillers, paid): (Vec<_>, Vec<_>) =
        selected.into_iter().partition(|s| s.tier == ValueTier::Filler);

    let mut out = Vec::with_capacity(paid.len() + fillers.len());
    let mut iter = paid.into_iter().peekable();
    while let Some(item) = iter.next() {
        let high_pair = item.tier >= ValueTier::High
            && iter.peek().is_some_and(|next| next.tier >= ValueTier::High);
        out.push(item);
        if high_pair && !fillers.is_empty() {
            out.push(fillers.remove(0));
        }
    }
    out.extend(fillers);
    out
}

fn at(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(date.year(), date.month(), date.day(), hour, minute, 0)
        .unwrap()
}

fn first_hour(peak_hours: &[u32]) -> u32 {
    peak_hours
        .iter()
        .copied()
        .filter(|h| (DAY_START_HOUR..=DAY_END_HOUR).contains(h))
        .min()
        .unwrap_or(DAY_START_HOUR)
}

/// Next cursor position after `from` on `date`, snapped to a peak hour when
/// hints are supplied. `None` means no valid position remains that day.
fn snap(date: NaiveDate, from: DateTime<Utc>, peak_hours: &[u32]) -> Option<DateTime<Utc>> {
    if from.date_naive() != date || from > at(date, DAY_END_HOUR, 0) {
        return None;
    }
    if peak_hours.is_empty() {
        return Some(from);
    }
    let mut hours: Vec<u32> = peak_hours
        .iter()
        .copied()
        .filter(|h| (DAY_START_HOUR..=DAY_END_HOUR).contains(h))
        .collect();
    hours.sort_unstable();
    hours
        .into_iter()
        .map(|h| at(date, h, 0))
        .find(|t| *t >= from)
}

/// Place items on the calendar. Cooldown days come first and carry only
/// filler at fixed times; everything else follows the gap-respecting cursor.
pub fn assign_slots(
    selected: Vec<SelectedItem>,
    period_start: DateTime<Utc>,
    min_gap_minutes: i64,
    peak_hours: &[u32],
    cooldown_days: u32,
    max_per_day: usize,
) -> Vec<PlannedSlot> {
    let gap = Duration::minutes(min_gap_minutes);
    let mut slots = Vec::with_capacity(selected.len());
    let mut ordered = interleave(selected);

    // Zone cooldown: leading filler-only days. Fixed times already behind
    // the period start are skipped, not shifted.
    let start_date = period_start.date_naive();
    for d in 0..cooldown_days {
        let date = start_date + Duration::days(d as i64);
        for (hour, minute) in COOLDOWN_TIMES {
            let slot_time = at(date, hour, minute);
            if slot_time < period_start {
                continue;
            }
            let Some(pos) = ordered.iter().position(|s| s.tier == ValueTier::Filler) else {
                break;
            };
            slots.push(ordered.remove(pos).into_slot(slot_time));
        }
    }

    let mut date = start_date + Duration::days(cooldown_days as i64);
    let opening = at(date, first_hour(peak_hours), 0).max(period_start);
    let mut cursor = match snap(date, opening, peak_hours) {
        Some(t) => t,
        None => {
            date += Duration::days(1);
            at(date, first_hour(peak_hours), 0)
        }
    };
    let mut placed_today = 0usize;

    for item in ordered {
        slots.push(item.into_slot(cursor));
        placed_today += 1;

        let mut next = snap(date, cursor + gap, peak_hours);
        if placed_today >= max_per_day {
            next = None;
        }
        cursor = match next {
            Some(t) => t,
            None => {
                date += Duration::days(1);
                placed_today = 0;
                at(date, first_hour(peak_hours), 0)
            }
        };
    }

    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn sel(item_id: i64, tier: ValueTier) -> SelectedItem {
        SelectedItem {
            item_id,
            tier,
            category: "solo".into(),
            urgent: false,
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 24, 0, 0, 0).unwrap()
    }

    fn gaps_ok(slots: &[PlannedSlot], min_gap_minutes: i64) -> bool {
        let mut times: Vec<_> = slots.iter().map(|s| s.slot_time).collect();
        times.sort();
        times
            .windows(2)
            .all(|w| w[1] - w[0] >= Duration::minutes(min_gap_minutes))
    }

    #[test]
    fn fillers_break_up_high_runs() {
        let ordered = interleave(vec![
            sel(1, ValueTier::High),
            sel(2, ValueTier::Premium),
            sel(3, ValueTier::High),
            sel(4, ValueTier::Filler),
            sel(5, ValueTier::Filler),
        ]);
        let tiers: Vec<_> = ordered.iter().map(|s| s.tier).collect();
        assert_eq!(
            tiers,
            vec![
                ValueTier::High,
                ValueTier::Filler,
                ValueTier::Premium,
                ValueTier::Filler,
                ValueTier::High,
            ]
        );
    }

    #[test]
    fn leftover_fillers_go_to_the_tail() {
        let ordered = interleave(vec![
            sel(1, ValueTier::Mid),
            sel(2, ValueTier::Filler),
            sel(3, ValueTier::Mid),
        ]);
        assert_eq!(ordered.last().unwrap().tier, ValueTier::Filler);
    }

    #[test]
    fn gaps_hold_without_peaks() {
        let items: Vec<_> = (1..=10).map(|i| sel(i, ValueTier::Mid)).collect();
        let slots = assign_slots(items, start(), 150, &[], 0, 10);
        assert_eq!(slots.len(), 10);
        assert!(gaps_ok(&slots, 150));
    }

    #[test]
    fn gaps_hold_with_peak_hints() {
        let items: Vec<_> = (1..=6).map(|i| sel(i, ValueTier::Mid)).collect();
        let peaks = vec![10, 14, 20];
        let slots = assign_slots(items, start(), 150, &peaks, 0, 10);
        assert_eq!(slots.len(), 6);
        assert!(gaps_ok(&slots, 150));
        assert!(slots.iter().all(|s| peaks.contains(&s.slot_time.hour())));
    }

    #[test]
    fn max_per_day_forces_rollover() {
        let items: Vec<_> = (1..=5).map(|i| sel(i, ValueTier::Mid)).collect();
        let slots = assign_slots(items, start(), 60, &[], 0, 2);
        let mut days = std::collections::HashMap::new();
        for s in &slots {
            *days.entry(s.slot_time.date_naive()).or_insert(0) += 1;
        }
        assert!(days.values().all(|&n| n <= 2));
        assert_eq!(days.len(), 3);
    }

    #[test]
    fn cooldown_days_carry_only_filler_first() {
        let items = vec![
            sel(1, ValueTier::High),
            sel(2, ValueTier::Filler),
            sel(3, ValueTier::Filler),
            sel(4, ValueTier::Mid),
        ];
        let slots = assign_slots(items, start(), 120, &[], 2, 10);
        let mut sorted = slots.clone();
        sorted.sort_by_key(|s| s.slot_time);

        let first_paid = sorted.iter().position(|s| s.tier != ValueTier::Filler).unwrap();
        for s in &sorted[..first_paid] {
            assert_eq!(s.tier, ValueTier::Filler);
        }
        // Paid content starts after the cooldown days.
        let cooldown_end = start().date_naive() + Duration::days(2);
        assert!(sorted[first_paid].slot_time.date_naive() >= cooldown_end);
    }

    #[test]
    fn slots_never_precede_a_late_period_start() {
        let start = Utc.with_ymd_and_hms(2026, 8, 24, 18, 0, 0).unwrap();
        let items: Vec<_> = (1..=4).map(|i| sel(i, ValueTier::Mid)).collect();
        let slots = assign_slots(items, start, 150, &[], 0, 10);
        assert_eq!(slots.len(), 4);
        assert!(slots.iter().all(|s| s.slot_time >= start));
        assert!(gaps_ok(&slots, 150));
    }

    #[test]
    fn period_start_past_cutoff_rolls_to_next_day() {
        let start = Utc.with_ymd_and_hms(2026, 8, 24, 23, 0, 0).unwrap();
        let slots = assign_slots(vec![sel(1, ValueTier::Mid)], start, 150, &[], 0, 10);
        assert_eq!(
            slots[0].slot_time,
            Utc.with_ymd_and_hms(2026, 8, 25, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn cooldown_times_already_past_are_skipped() {
        let start = Utc.with_ymd_and_hms(2026, 8, 24, 18, 0, 0).unwrap();
        let items = vec![
            sel(1, ValueTier::Filler),
            sel(2, ValueTier::Filler),
            sel(3, ValueTier::Mid),
        ];
        let slots = assign_slots(items, start, 120, &[], 1, 10);
        assert!(slots.iter().all(|s| s.slot_time >= start));

        // Of the fixed cooldown times only 20:00 is still ahead of the start.
        let day0: Vec<_> = slots
            .iter()
            .filter(|s| s.slot_time.date_naive() == start.date_naive())
            .collect();
        assert_eq!(day0.len(), 1);
        assert_eq!(day0[0].tier, ValueTier::Filler);
        assert_eq!(
            (day0[0].slot_time.hour(), day0[0].slot_time.minute()),
            (20, 0)
        );
    }

    #[test]
    fn no_slot_between_cutoff_and_midnight() {
        let items: Vec<_> = (1..=3).map(|i| sel(i, ValueTier::Mid)).collect();
        // 09:00 + 2 * 405min lands at 22:30, past the 22:00 cutoff.
        let slots = assign_slots(items, start(), 405, &[], 0, 10);
        assert!(gaps_ok(&slots, 405));
        assert!(slots.iter().all(|s| {
            s.slot_time.hour() < 22 || (s.slot_time.hour() == 22 && s.slot_time.minute() == 0)
        }));
    }

    #[test]
    fn day_rollover_past_evening_cutoff() {
        let items: Vec<_> = (1..=4).map(|i| sel(i, ValueTier::Mid)).collect();
        // 6h gap from 09:00: 09, 15, 21, then 03:00 is past cutoff so day rolls.
        let slots = assign_slots(items, start(), 360, &[], 0, 10);
        assert!(gaps_ok(&slots, 360));
        assert!(slots.iter().all(|s| {
            let h = s.slot_time.hour();
            (9..=22).contains(&h)
        }));
    }
}
