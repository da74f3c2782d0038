use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TWO_WEEKS_DAYS: u64 = 14;
pub const ONE_YEAR_DAYS: u64 = 365;
pub const DEFAULT_LOOKBACK_YEARS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    TwoWeeks,
    OneYear,
    SinceEpoch,
    SeasonalA,
    SeasonalB,
}

impl WindowKind {
    /// Canonical order. Ledger entries and reports are always laid out in it.
    pub const ALL: [WindowKind; 5] = [
        Self::TwoWeeks,
        Self::OneYear,
        Self::SinceEpoch,
        Self::SeasonalA,
        Self::SeasonalB,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TwoWeeks => "two_weeks",
            Self::OneYear => "one_year",
            Self::SinceEpoch => "since_epoch",
            Self::SeasonalA => "seasonal_a",
            Self::SeasonalB => "seasonal_b",
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WindowKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "two_weeks" => Ok(Self::TwoWeeks),
            "one_year" => Ok(Self::OneYear),
            "since_epoch" => Ok(Self::SinceEpoch),
            "seasonal_a" => Ok(Self::SeasonalA),
            "seasonal_b" => Ok(Self::SeasonalB),
            other => Err(format!(
                "invalid window '{other}', expected one of: \
                 two_weeks, one_year, since_epoch, seasonal_a, seasonal_b"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("invalid calendar day '{0}', expected MM-DD (29 Feb is not allowed)")]
    InvalidMonthDay(String),
    #[error("date arithmetic out of range for {kind} around {anchor}")]
    OutOfRange { kind: WindowKind, anchor: NaiveDate },
}

/// A recurring calendar day such as `11-01`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthDay {
    month: u32,
    day: u32,
}

impl MonthDay {
    pub fn new(month: u32, day: u32) -> Result<Self, WindowError> {
        // 2001 is not a leap year, so anything valid here exists in every year.
        if NaiveDate::from_ymd_opt(2001, month, day).is_none() {
            return Err(WindowError::InvalidMonthDay(format!("{month:02}-{day:02}")));
        }
        Ok(Self { month, day })
    }

    pub fn month(self) -> u32 {
        self.month
    }

    pub fn day(self) -> u32 {
        self.day
    }

    pub fn in_year(self, year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.month, self.day)
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

impl FromStr for MonthDay {
    type Err = WindowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let invalid = || WindowError::InvalidMonthDay(trimmed.to_owned());
        let (month, day) = trimmed.split_once('-').ok_or_else(invalid)?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        let day = day.parse::<u32>().map_err(|_| invalid())?;
        Self::new(month, day)
    }
}

impl TryFrom<String> for MonthDay {
    type Error = WindowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthDay> for String {
    fn from(value: MonthDay) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowDefinitions {
    pub epoch: NaiveDate,
    pub seasonal_a: MonthDay,
    pub seasonal_b: MonthDay,
    pub lookback_years: u32,
    pub enabled: Vec<WindowKind>,
}

impl Default for WindowDefinitions {
    fn default() -> Self {
        Self {
            epoch: default_epoch(),
            seasonal_a: MonthDay { month: 11, day: 1 },
            seasonal_b: MonthDay { month: 7, day: 1 },
            lookback_years: DEFAULT_LOOKBACK_YEARS,
            enabled: WindowKind::ALL.to_vec(),
        }
    }
}

pub fn default_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 7, 1).expect("default epoch is a valid date")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub kind: WindowKind,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// The windows of one run, in canonical order, all derived from one anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSet {
    anchor: NaiveDate,
    windows: Vec<TimeWindow>,
}

impl WindowSet {
    pub fn anchor(&self) -> NaiveDate {
        self.anchor
    }

    pub fn get(&self, kind: WindowKind) -> Option<&TimeWindow> {
        self.windows.iter().find(|window| window.kind == kind)
    }

    pub fn kinds(&self) -> Vec<WindowKind> {
        self.windows.iter().map(|window| window.kind).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TimeWindow> {
        self.windows.iter()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

impl<'a> IntoIterator for &'a WindowSet {
    type Item = &'a TimeWindow;
    type IntoIter = std::slice::Iter<'a, TimeWindow>;

    fn into_iter(self) -> Self::IntoIter {
        self.windows.iter()
    }
}

pub fn windows(
    anchor: NaiveDate,
    definitions: &WindowDefinitions,
) -> Result<WindowSet, WindowError> {
    let mut kinds = definitions.enabled.clone();
    kinds.sort();
    kinds.dedup();

    let windows = kinds
        .into_iter()
        .map(|kind| window_for(kind, anchor, definitions))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(WindowSet { anchor, windows })
}

fn window_for(
    kind: WindowKind,
    anchor: NaiveDate,
    definitions: &WindowDefinitions,
) -> Result<TimeWindow, WindowError> {
    let out_of_range = || WindowError::OutOfRange { kind, anchor };
    let lookback = Months::new(definitions.lookback_years.saturating_mul(12));

    let (start, end) = match kind {
        WindowKind::TwoWeeks => (
            anchor
                .checked_sub_days(Days::new(TWO_WEEKS_DAYS))
                .ok_or_else(out_of_range)?,
            anchor,
        ),
        WindowKind::OneYear => (
            anchor
                .checked_sub_days(Days::new(ONE_YEAR_DAYS))
                .ok_or_else(out_of_range)?,
            anchor,
        ),
        WindowKind::SinceEpoch => {
            let start = definitions
                .epoch
                .checked_sub_months(lookback)
                .ok_or_else(out_of_range)?;
            (start.min(anchor), anchor)
        }
        WindowKind::SeasonalA => {
            seasonal_bounds(anchor, definitions.seasonal_a, definitions.lookback_years)
                .ok_or_else(out_of_range)?
        }
        WindowKind::SeasonalB => {
            seasonal_bounds(anchor, definitions.seasonal_b, definitions.lookback_years)
                .ok_or_else(out_of_range)?
        }
    };

    Ok(TimeWindow { kind, start, end })
}

/// Most recent occurrence of `calendar` on or before `anchor`, paired with the
/// same calendar day `lookback_years` earlier.
pub fn seasonal_bounds(
    anchor: NaiveDate,
    calendar: MonthDay,
    lookback_years: u32,
) -> Option<(NaiveDate, NaiveDate)> {
    let this_year = calendar.in_year(anchor.year())?;
    let end = if this_year <= anchor {
        this_year
    } else {
        calendar.in_year(anchor.year() - 1)?
    };
    let lookback = i32::try_from(lookback_years).ok()?;
    let start = calendar.in_year(end.year().checked_sub(lookback)?)?;
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn seasonal_anchor_after_processing_date_uses_previous_year() {
        let set = windows(date(2024, 10, 15), &WindowDefinitions::default()).expect("windows");
        let november = set.get(WindowKind::SeasonalA).expect("seasonal_a");

        assert_ne!(november.end, date(2024, 11, 1));
        assert_eq!(november.end, date(2023, 11, 1));
        assert_eq!(november.start, date(2018, 11, 1));

        let july = set.get(WindowKind::SeasonalB).expect("seasonal_b");
        assert_eq!(july.end, date(2024, 7, 1));
        assert_eq!(july.start, date(2019, 7, 1));
    }

    #[test]
    fn seasonal_boundary_day_belongs_to_current_occurrence() {
        let set = windows(date(2024, 11, 1), &WindowDefinitions::default()).expect("windows");
        let november = set.get(WindowKind::SeasonalA).expect("seasonal_a");

        assert_eq!(november.end, date(2024, 11, 1));
        assert_eq!(november.start, date(2019, 11, 1));
    }

    #[test]
    fn seasonal_window_crosses_year_boundary() {
        let (start, end) =
            seasonal_bounds(date(2025, 1, 3), MonthDay::new(11, 1).expect("md"), 5)
                .expect("bounds");
        assert_eq!(end, date(2024, 11, 1));
        assert_eq!(start, date(2019, 11, 1));
    }

    #[test]
    fn relative_windows_follow_anchor() {
        let anchor = date(2024, 3, 1);
        let set = windows(anchor, &WindowDefinitions::default()).expect("windows");

        let two_weeks = set.get(WindowKind::TwoWeeks).expect("two_weeks");
        assert_eq!(two_weeks.start, date(2024, 2, 16));
        assert_eq!(two_weeks.end, anchor);

        let one_year = set.get(WindowKind::OneYear).expect("one_year");
        assert_eq!(one_year.start, date(2023, 3, 2));

        let since_epoch = set.get(WindowKind::SinceEpoch).expect("since_epoch");
        assert_eq!(since_epoch.start, date(2016, 7, 1));
        assert_eq!(since_epoch.end, anchor);
    }

    #[test]
    fn every_window_is_ordered_and_ends_on_or_before_anchor() {
        let definitions = WindowDefinitions::default();
        let mut anchor = date(2015, 12, 25);
        let last = date(2028, 3, 1);
        while anchor <= last {
            let set = windows(anchor, &definitions).expect("windows");
            assert_eq!(set.len(), 5);
            for window in &set {
                assert!(window.start <= window.end, "{window:?} at {anchor}");
                assert!(window.end <= anchor, "{window:?} at {anchor}");
            }
            anchor = anchor + Days::new(3);
        }
    }

    #[test]
    fn windows_come_back_in_canonical_order_even_when_configured_out_of_order() {
        let definitions = WindowDefinitions {
            enabled: vec![
                WindowKind::SeasonalB,
                WindowKind::TwoWeeks,
                WindowKind::SeasonalB,
                WindowKind::OneYear,
            ],
            ..WindowDefinitions::default()
        };
        let set = windows(date(2024, 5, 5), &definitions).expect("windows");
        assert_eq!(
            set.kinds(),
            vec![WindowKind::TwoWeeks, WindowKind::OneYear, WindowKind::SeasonalB]
        );
    }

    #[test]
    fn month_day_rejects_leap_day_and_garbage() {
        assert!("02-29".parse::<MonthDay>().is_err());
        assert!("13-01".parse::<MonthDay>().is_err());
        assert!("nov".parse::<MonthDay>().is_err());
        assert_eq!(
            " 07-01 ".parse::<MonthDay>().expect("parse"),
            MonthDay::new(7, 1).expect("md")
        );
    }

    #[test]
    fn window_kind_round_trips_through_str() {
        for kind in WindowKind::ALL {
            assert_eq!(kind.as_str().parse::<WindowKind>(), Ok(kind));
        }
        assert!("since_2016".parse::<WindowKind>().is_err());
    }
}
