//! Event-slot expander (§4.3, C3): turns an event's time constraint into
//! candidate (day_index, block_index) start positions, and turns a chosen
//! start plus a duration into the span of blocks the event occupies.

use chrono::{Datelike, NaiveDate};

use crate::model::{Block, Event, RangePeriod, TimeConstraint, BLOCK_ORDER};

/// A candidate start position: index into the snapshot's date list, and
/// index into [`BLOCK_ORDER`].
pub type Slot = (usize, usize);

/// Default weekday set for a `range` constraint with no explicit `weekdays`:
/// Monday (0) through Friday (4), per the canonical `0=Mon..6=Sun` mapping.
fn default_weekdays() -> Vec<u8> {
    (0..=4).collect()
}

fn period_blocks(period: Option<RangePeriod>) -> Vec<Block> {
    match period {
        Some(RangePeriod::Am) => vec![Block::Am],
        Some(RangePeriod::Pm) => vec![Block::Pm, Block::B15, Block::B16],
        None => vec![Block::Am, Block::Pm, Block::B15, Block::B16, Block::B17],
    }
}

fn month_matches(month_field: &str, date: NaiveDate) -> bool {
    if let Some((y, m)) = month_field.split_once('-') {
        if let (Ok(y), Ok(m)) = (y.parse::<i32>(), m.parse::<u32>()) {
            return date.year() == y && date.month() == m;
        }
    }
    if let Ok(m) = month_field.parse::<u32>() {
        return date.month() == m;
    }
    false
}

/// Expands a `fixed { date, start }` constraint to at most one slot.
fn expand_fixed(date: NaiveDate, start: i64, dates: &[NaiveDate]) -> Vec<Slot> {
    let Some(day_index) = dates.iter().position(|d| *d == date) else {
        return Vec::new();
    };
    let Some(block) = Block::from_start_hour(start) else {
        return Vec::new();
    };
    vec![(day_index, block.index())]
}

/// Computes `allowed_slots` for an event over the given month's date list
/// (§4.3).
pub fn allowed_slots(event: &Event, dates: &[NaiveDate]) -> Vec<Slot> {
    match &event.time_constraint {
        TimeConstraint::Fixed { date, start } => expand_fixed(*date, *start, dates),
        TimeConstraint::Range { weekdays, period, month } => {
            let weekdays: Vec<u8> = weekdays.clone().map(|s| s.into_iter().collect()).unwrap_or_else(default_weekdays);
            let blocks = period_blocks(*period);
            let mut out = Vec::new();
            for (day_index, date) in dates.iter().enumerate() {
                let wd = date.weekday().num_days_from_monday() as u8;
                if !weekdays.contains(&wd) {
                    continue;
                }
                if let Some(month_field) = month {
                    if !month_matches(month_field, *date) {
                        continue;
                    }
                }
                for block in &blocks {
                    out.push((day_index, block.index()));
                }
            }
            out
        }
        TimeConstraint::Candidates { slots } => {
            let mut out = Vec::new();
            for slot in slots {
                out.extend(expand_fixed(slot.date, slot.start, dates));
            }
            out
        }
    }
}

/// Walks the canonical block order from `start_block_index`, consuming block
/// durations until `duration_hours` is exhausted. Returns `None` if the
/// event would run past the last block (`18plus`) before its duration is
/// used up — such a start is not a valid placement (§4.3).
pub fn span(start_block_index: usize, duration_hours: u32) -> Option<Vec<usize>> {
    let mut remaining = duration_hours;
    let mut covered = Vec::new();
    let mut bi = start_block_index;
    while remaining > 0 {
        let block = BLOCK_ORDER.get(bi)?;
        covered.push(bi);
        remaining = remaining.saturating_sub(block.duration_hours());
        bi += 1;
    }
    Some(covered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventStatus, LocationType, Priority};
    use std::collections::{BTreeMap, BTreeSet};

    fn dates(year: i32, month: u32) -> Vec<NaiveDate> {
        crate::loader::dates_in_month(&format!("{year:04}-{month:02}")).unwrap()
    }

    fn base_event(tc: TimeConstraint) -> Event {
        Event {
            id: "e1".to_string(),
            type_code: None,
            location_type: LocationType::InClinic,
            duration_hours: 1,
            time_constraint: tc,
            required_skills: BTreeSet::new(),
            required_resources: BTreeSet::new(),
            priority: Priority::Medium,
            status: EventStatus::Unassigned,
            deadline: None,
            notes: None,
            attributes: BTreeMap::new(),
            schedule_id: None,
        }
    }

    #[test]
    fn fixed_maps_known_hour() {
        let d = dates(2025, 5);
        let ev = base_event(TimeConstraint::Fixed {
            date: NaiveDate::from_ymd_opt(2025, 5, 7).unwrap(),
            start: 9,
        });
        let slots = allowed_slots(&ev, &d);
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].1, Block::Am.index());
    }

    #[test]
    fn fixed_rejects_unknown_hour() {
        let d = dates(2025, 5);
        let ev = base_event(TimeConstraint::Fixed {
            date: NaiveDate::from_ymd_opt(2025, 5, 7).unwrap(),
            start: 10,
        });
        assert!(allowed_slots(&ev, &d).is_empty());
    }

    #[test]
    fn fixed_rejects_date_outside_month() {
        let d = dates(2025, 5);
        let ev = base_event(TimeConstraint::Fixed {
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            start: 9,
        });
        assert!(allowed_slots(&ev, &d).is_empty());
    }

    #[test]
    fn range_default_weekdays_is_weekdays_only() {
        let d = dates(2025, 5);
        let ev = base_event(TimeConstraint::Range {
            weekdays: None,
            period: Some(RangePeriod::Am),
            month: None,
        });
        let slots = allowed_slots(&ev, &d);
        // May 2025 has 22 weekdays; each contributes exactly one `am` slot.
        assert_eq!(slots.len(), 22);
        for (day_index, block_index) in &slots {
            assert_eq!(*block_index, Block::Am.index());
            let wd = d[*day_index].weekday().num_days_from_monday();
            assert!(wd <= 4);
        }
    }

    #[test]
    fn range_pm_period_produces_three_blocks_per_day() {
        let d = dates(2025, 5);
        let ev = base_event(TimeConstraint::Range {
            weekdays: Some([1u8].into_iter().collect()), // Tuesday only
            period: Some(RangePeriod::Pm),
            month: None,
        });
        let slots = allowed_slots(&ev, &d);
        // May 2025 has 4 Tuesdays (6, 13, 20, 27) * 3 pm-period blocks.
        assert_eq!(slots.len(), 4 * 3);
    }

    #[test]
    fn candidates_unions_fixed_slots() {
        let d = dates(2025, 5);
        let ev = base_event(TimeConstraint::Candidates {
            slots: vec![
                crate::model::FixedSlot { date: NaiveDate::from_ymd_opt(2025, 5, 7).unwrap(), start: 9 },
                crate::model::FixedSlot { date: NaiveDate::from_ymd_opt(2025, 5, 8).unwrap(), start: 13 },
                crate::model::FixedSlot { date: NaiveDate::from_ymd_opt(2025, 5, 8).unwrap(), start: 99 },
            ],
        });
        let slots = allowed_slots(&ev, &d);
        assert_eq!(slots.len(), 2);
    }

    #[test]
    fn span_walks_until_duration_exhausted() {
        // am(3h) alone covers a 2h event.
        let covered = span(Block::Am.index(), 2).unwrap();
        assert_eq!(covered, vec![Block::Am.index()]);

        // pm(2h) + 15(1h) covers a 3h event starting at pm.
        let covered = span(Block::Pm.index(), 3).unwrap();
        assert_eq!(covered, vec![Block::Pm.index(), Block::B15.index()]);
    }

    #[test]
    fn span_crosses_lunch() {
        // am(3h) + lunch(1h) covers a 4h event starting at am.
        let covered = span(Block::Am.index(), 4).unwrap();
        assert_eq!(covered, vec![Block::Am.index(), Block::Lunch.index()]);
    }

    #[test]
    fn span_returns_none_when_it_runs_past_the_day() {
        // 18plus(2h) can't satisfy a 3h duration — nothing follows it.
        assert!(span(Block::B18Plus.index(), 3).is_none());
    }
}
