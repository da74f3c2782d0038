use std::collections::BTreeMap;
use std::fmt;

use canopy_core::{AoiId, WindowKind};
use chrono::NaiveDate;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{LedgerError, WindowRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub processing_date: String,
    /// Keyed by window kind, so iteration is always in canonical order.
    pub windows: BTreeMap<WindowKind, WindowRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reconciliation {
    pub filled: Vec<WindowKind>,
}

/// Append-only history of window records for one AOI, keyed by processing
/// date in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    aoi_id: AoiId,
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new(aoi_id: impl Into<AoiId>) -> Self {
        Self {
            aoi_id: aoi_id.into(),
            entries: Vec::new(),
        }
    }

    pub fn aoi_id(&self) -> &str {
        &self.aoi_id
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, processing_date: &str) -> Option<&LedgerEntry> {
        self.entries
            .iter()
            .find(|entry| entry.processing_date == processing_date)
    }

    pub fn latest(&self) -> Option<&LedgerEntry> {
        self.entries.last()
    }

    /// The most recent stored record for `window`, if any entry holds one.
    pub fn latest_record(&self, window: WindowKind) -> Option<&WindowRecord> {
        self.entries
            .iter()
            .rev()
            .find_map(|entry| entry.windows.get(&window))
    }

    /// Whether `last_date` differs from the last stored satellite date for
    /// `window`. A window with no history is always new.
    pub fn is_new(&self, window: WindowKind, last_date: NaiveDate) -> bool {
        self.latest_record(window)
            .is_none_or(|previous| previous.last_date != last_date)
    }

    /// Stores `record` under `processing_date` when its latest satellite date
    /// differs from the last stored one for the same window. Returns whether
    /// the record was new; an unchanged record leaves the ledger untouched.
    pub fn upsert(&mut self, processing_date: &str, record: WindowRecord) -> bool {
        let window = record.window;
        if !self.is_new(window, record.last_date) {
            tracing::debug!(
                aoi = %self.aoi_id,
                %window,
                last_date = %record.last_date,
                "no new satellite data"
            );
            return false;
        }

        tracing::info!(
            aoi = %self.aoi_id,
            %window,
            last_date = %record.last_date,
            previous = ?self.latest_record(window).map(|previous| previous.last_date),
            "new satellite data"
        );
        self.entry_mut_or_insert(processing_date)
            .windows
            .insert(window, record);
        true
    }

    /// Fills every window in `windows` missing from the `processing_date`
    /// entry with a verbatim copy of the most recent earlier record.
    pub fn reconcile(
        &mut self,
        processing_date: &str,
        windows: &[WindowKind],
    ) -> Result<Reconciliation, LedgerError> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.processing_date == processing_date)
            .ok_or_else(|| LedgerError::MissingEntry(processing_date.to_owned()))?;

        let (history, current) = self.entries.split_at_mut(index);
        let current = &mut current[0];

        let mut filled = Vec::new();
        let mut missing = Vec::new();
        for &window in windows {
            if current.windows.contains_key(&window) {
                continue;
            }

            let fallback = history
                .iter()
                .rev()
                .find_map(|entry| entry.windows.get(&window).map(|record| (entry, record)));
            match fallback {
                Some((source, record)) => {
                    tracing::debug!(
                        aoi = %self.aoi_id,
                        %window,
                        from = %source.processing_date,
                        "filled window from history"
                    );
                    current.windows.insert(window, record.clone());
                    filled.push(window);
                }
                None => missing.push(window),
            }
        }

        if !missing.is_empty() {
            return Err(LedgerError::NoHistory {
                processing_date: processing_date.to_owned(),
                windows: missing,
            });
        }

        Ok(Reconciliation { filled })
    }

    pub(crate) fn from_document(aoi_id: impl Into<AoiId>, document: LedgerDocument) -> Self {
        Self {
            aoi_id: aoi_id.into(),
            entries: document.0,
        }
    }

    pub(crate) fn document(&self) -> LedgerDocumentRef<'_> {
        LedgerDocumentRef(&self.entries)
    }

    fn entry_mut_or_insert(&mut self, processing_date: &str) -> &mut LedgerEntry {
        let index = match self
            .entries
            .iter()
            .position(|entry| entry.processing_date == processing_date)
        {
            Some(index) => index,
            None => {
                self.entries.push(LedgerEntry {
                    processing_date: processing_date.to_owned(),
                    windows: BTreeMap::new(),
                });
                self.entries.len() - 1
            }
        };
        &mut self.entries[index]
    }
}

/// On-disk shape: a JSON object whose keys are processing dates in
/// insertion order.
pub(crate) struct LedgerDocument(Vec<LedgerEntry>);

pub(crate) struct LedgerDocumentRef<'a>(&'a [LedgerEntry]);

impl Serialize for LedgerDocumentRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for entry in self.0 {
            map.serialize_entry(&entry.processing_date, &entry.windows)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for LedgerDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DocumentVisitor;

        impl<'de> Visitor<'de> for DocumentVisitor {
            type Value = LedgerDocument;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map from processing date to window records")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries: Vec<LedgerEntry> = Vec::new();
                while let Some((processing_date, windows)) =
                    access.next_entry::<String, BTreeMap<WindowKind, WindowRecord>>()?
                {
                    if entries
                        .iter()
                        .any(|entry| entry.processing_date == processing_date)
                    {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate processing date {processing_date}"
                        )));
                    }
                    entries.push(LedgerEntry {
                        processing_date,
                        windows,
                    });
                }
                Ok(LedgerDocument(entries))
            }
        }

        deserializer.deserialize_map(DocumentVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{date, record};

    #[test]
    fn first_record_for_a_window_is_new() {
        let mut ledger = Ledger::new("north_park");
        let is_new = ledger.upsert(
            "2024-03-01",
            record(WindowKind::TwoWeeks, date(2024, 2, 10), date(2024, 2, 20)),
        );

        assert!(is_new);
        let entry = ledger.entry("2024-03-01").expect("entry");
        assert!(entry.windows.contains_key(&WindowKind::TwoWeeks));
    }

    #[test]
    fn upsert_is_idempotent_for_same_last_date() {
        let mut ledger = Ledger::new("north_park");
        let rec = record(WindowKind::OneYear, date(2023, 3, 1), date(2024, 2, 20));

        assert!(ledger.upsert("2024-03-01", rec.clone()));
        let snapshot = ledger.clone();

        assert!(!ledger.upsert("2024-03-01", rec.clone()));
        assert_eq!(ledger, snapshot);

        assert!(!ledger.upsert("2024-03-02", rec));
        assert_eq!(ledger, snapshot);
        assert!(ledger.entry("2024-03-02").is_none());
    }

    #[test]
    fn new_last_date_appends_under_new_processing_date() {
        let mut ledger = Ledger::new("north_park");
        ledger.upsert(
            "2024-03-01",
            record(WindowKind::OneYear, date(2023, 3, 1), date(2024, 2, 20)),
        );

        let newer = record(WindowKind::OneYear, date(2023, 3, 1), date(2024, 3, 31));
        assert!(ledger.upsert("2024-04-02", newer.clone()));

        assert_eq!(ledger.entries().len(), 2);
        assert_eq!(
            ledger.latest_record(WindowKind::OneYear),
            Some(&newer)
        );
        assert_eq!(
            ledger
                .entry("2024-03-01")
                .and_then(|entry| entry.windows.get(&WindowKind::OneYear))
                .map(|record| record.last_date),
            Some(date(2024, 2, 20))
        );
    }

    #[test]
    fn reconcile_fills_missing_windows_from_most_recent_history() {
        let mut ledger = Ledger::new("north_park");
        let older = record(WindowKind::SeasonalA, date(2018, 11, 1), date(2023, 11, 1));
        let recent = record(WindowKind::SeasonalA, date(2018, 11, 1), date(2023, 11, 20));
        ledger.upsert("2024-01-01", older);
        ledger.upsert("2024-02-01", recent.clone());
        ledger.upsert(
            "2024-03-01",
            record(WindowKind::TwoWeeks, date(2024, 2, 16), date(2024, 2, 28)),
        );

        let outcome = ledger
            .reconcile("2024-03-01", &[WindowKind::TwoWeeks, WindowKind::SeasonalA])
            .expect("reconcile");

        assert_eq!(outcome.filled, vec![WindowKind::SeasonalA]);
        let entry = ledger.entry("2024-03-01").expect("entry");
        assert_eq!(entry.windows.get(&WindowKind::SeasonalA), Some(&recent));
    }

    #[test]
    fn reconcile_reports_windows_without_history() {
        let mut ledger = Ledger::new("north_park");
        ledger.upsert(
            "2024-03-01",
            record(WindowKind::TwoWeeks, date(2024, 2, 16), date(2024, 2, 28)),
        );

        let err = ledger
            .reconcile("2024-03-01", &WindowKind::ALL)
            .expect_err("first run has no history");
        match err {
            LedgerError::NoHistory {
                processing_date,
                windows,
            } => {
                assert_eq!(processing_date, "2024-03-01");
                assert_eq!(
                    windows,
                    vec![
                        WindowKind::OneYear,
                        WindowKind::SinceEpoch,
                        WindowKind::SeasonalA,
                        WindowKind::SeasonalB
                    ]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn reconcile_without_entry_is_an_error() {
        let mut ledger = Ledger::new("north_park");
        assert!(matches!(
            ledger.reconcile("2024-03-01", &WindowKind::ALL),
            Err(LedgerError::MissingEntry(_))
        ));
    }

    #[test]
    fn reconciled_entries_contain_every_window_in_canonical_order() {
        let mut ledger = Ledger::new("north_park");
        for (offset, window) in WindowKind::ALL.iter().rev().enumerate() {
            ledger.upsert(
                "2024-01-01",
                record(*window, date(2023, 1, 1), date(2023, 12, 1 + offset as u32)),
            );
        }
        ledger.upsert(
            "2024-02-01",
            record(WindowKind::SeasonalB, date(2023, 1, 1), date(2024, 1, 20)),
        );

        ledger
            .reconcile("2024-02-01", &WindowKind::ALL)
            .expect("reconcile");

        for entry in ledger.entries() {
            let kinds: Vec<_> = entry.windows.keys().copied().collect();
            assert_eq!(kinds, WindowKind::ALL.to_vec());
        }
    }

    #[test]
    fn document_round_trip_keeps_insertion_order() {
        let mut ledger = Ledger::new("north_park");
        ledger.upsert(
            "15.03.2024",
            record(WindowKind::TwoWeeks, date(2024, 3, 1), date(2024, 3, 10)),
        );
        ledger.upsert(
            "01.04.2024",
            record(WindowKind::TwoWeeks, date(2024, 3, 20), date(2024, 3, 30)),
        );

        let json = serde_json::to_string(&ledger.document()).expect("serialize");
        let march = json.find("15.03.2024").expect("march key");
        let april = json.find("01.04.2024").expect("april key");
        assert!(march < april);

        let document: LedgerDocument = serde_json::from_str(&json).expect("deserialize");
        let reloaded = Ledger::from_document("north_park", document);
        assert_eq!(reloaded, ledger);
    }

    #[test]
    fn duplicate_processing_dates_are_rejected() {
        let raw = r#"{"2024-03-01": {}, "2024-03-01": {}}"#;
        assert!(serde_json::from_str::<LedgerDocument>(raw).is_err());
    }
}
