use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::window::TimeWindow;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Composite {
    pub id: String,
    pub observation_date: NaiveDate,
}

impl Composite {
    pub fn new(id: impl Into<String>, observation_date: NaiveDate) -> Self {
        Self {
            id: id.into(),
            observation_date,
        }
    }
}

/// The anchor-derived global sequence of composites for one AOI.
///
/// Ordered by observation date. Ties keep the order the provider returned
/// them in; duplicates are not removed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompositeSeries {
    composites: Vec<Composite>,
}

impl CompositeSeries {
    pub fn new(mut composites: Vec<Composite>) -> Self {
        composites.sort_by_key(|composite| composite.observation_date);
        Self { composites }
    }

    pub fn as_slice(&self) -> &[Composite] {
        &self.composites
    }

    pub fn len(&self) -> usize {
        self.composites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.composites.is_empty()
    }

    /// `(series[-2], series[-1])`, when the series has at least two entries.
    pub fn last_two(&self) -> Option<(&Composite, &Composite)> {
        match self.composites.as_slice() {
            [.., previous, latest] => Some((previous, latest)),
            _ => None,
        }
    }

    pub fn subseries(&self, window: &TimeWindow) -> Vec<Composite> {
        subseries(&self.composites, window)
    }
}

pub fn subseries(composites: &[Composite], window: &TimeWindow) -> Vec<Composite> {
    composites
        .iter()
        .filter(|composite| window.contains(composite.observation_date))
        .cloned()
        .collect()
}

/// Start dates of the compositing intervals: every `interval_days` from
/// `series_start`, up to and including `anchor`.
pub fn composite_schedule(
    series_start: NaiveDate,
    anchor: NaiveDate,
    interval_days: u32,
) -> Vec<NaiveDate> {
    if interval_days == 0 || anchor < series_start {
        return Vec::new();
    }

    let mut schedule = Vec::new();
    let mut current = series_start;
    while current <= anchor {
        schedule.push(current);
        match current.checked_add_days(Days::new(u64::from(interval_days))) {
            Some(next) => current = next,
            None => break,
        }
    }
    schedule
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::WindowKind;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn window(start: NaiveDate, end: NaiveDate) -> TimeWindow {
        TimeWindow {
            kind: WindowKind::TwoWeeks,
            start,
            end,
        }
    }

    #[test]
    fn subseries_is_inclusive_and_preserves_order() {
        let series = CompositeSeries::new(vec![
            Composite::new("a", date(2024, 1, 1)),
            Composite::new("b", date(2024, 2, 1)),
            Composite::new("c", date(2024, 2, 10)),
            Composite::new("d", date(2024, 2, 28)),
            Composite::new("e", date(2024, 3, 21)),
        ]);

        let ids: Vec<_> = series
            .subseries(&window(date(2024, 2, 1), date(2024, 2, 28)))
            .into_iter()
            .map(|composite| composite.id)
            .collect();
        assert_eq!(ids, vec!["b", "c", "d"]);
    }

    #[test]
    fn sparse_window_yields_single_composite() {
        let series = CompositeSeries::new(vec![
            Composite::new("jan", date(2024, 1, 1)),
            Composite::new("feb", date(2024, 2, 10)),
            Composite::new("mar", date(2024, 3, 21)),
        ]);

        let sub = series.subseries(&window(date(2024, 2, 1), date(2024, 2, 28)));
        assert_eq!(sub, vec![Composite::new("feb", date(2024, 2, 10))]);
    }

    #[test]
    fn ordering_is_stable_for_equal_dates() {
        let series = CompositeSeries::new(vec![
            Composite::new("late", date(2024, 5, 1)),
            Composite::new("first-tie", date(2024, 4, 1)),
            Composite::new("second-tie", date(2024, 4, 1)),
        ]);

        let ids: Vec<_> = series.as_slice().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["first-tie", "second-tie", "late"]);

        let (previous, latest) = series.last_two().expect("two composites");
        assert_eq!(previous.id, "second-tie");
        assert_eq!(latest.id, "late");
    }

    #[test]
    fn last_two_needs_two_composites() {
        let series = CompositeSeries::new(vec![Composite::new("only", date(2024, 1, 1))]);
        assert!(series.last_two().is_none());
    }

    #[test]
    fn schedule_steps_by_interval_and_includes_anchor() {
        let schedule = composite_schedule(date(2024, 1, 1), date(2024, 3, 21), 40);
        assert_eq!(
            schedule,
            vec![date(2024, 1, 1), date(2024, 2, 10), date(2024, 3, 21)]
        );

        assert!(composite_schedule(date(2024, 1, 1), date(2023, 12, 31), 40).is_empty());
        assert!(composite_schedule(date(2024, 1, 1), date(2024, 6, 1), 0).is_empty());
    }
}
