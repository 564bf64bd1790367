use std::{cmp::Ordering, collections::HashSet};

use flex_client::domain::{ClearedBucketPtu, DispatchRecord, TenderZone};
use time::PrimitiveDateTime;

/// A persisted row: its column layout, sort time and natural key.
pub trait TableRow {
    const COLUMNS: &'static [&'static str];

    /// Start time the table is ordered by.
    fn sort_time(&self) -> Option<PrimitiveDateTime>;

    fn hash_natural_key(&self, hasher: &mut blake3::Hasher);

    fn natural_key(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        self.hash_natural_key(&mut hasher);
        hasher.finalize()
    }
}

impl TableRow for DispatchRecord {
    const COLUMNS: &'static [&'static str] = DispatchRecord::COLUMNS;

    fn sort_time(&self) -> Option<PrimitiveDateTime> {
        self.start_time_local
    }

    fn hash_natural_key(&self, hasher: &mut blake3::Hasher) {
        hash_opt_str(hasher, self.fu_id.as_deref());
        hash_opt_str(hasher, self.zone.as_deref());
        hash_opt_ts(hasher, self.start_time_local);
        hash_opt_ts(hasher, self.end_time_local);
    }
}

impl TableRow for ClearedBucketPtu {
    const COLUMNS: &'static [&'static str] = ClearedBucketPtu::COLUMNS;

    fn sort_time(&self) -> Option<PrimitiveDateTime> {
        self.ptu_start_time
    }

    fn hash_natural_key(&self, hasher: &mut blake3::Hasher) {
        hash_opt_str(hasher, self.clearing_event_id.as_deref());
        hash_opt_ts(hasher, self.ptu_start_time);
        hash_opt_ts(hasher, self.ptu_end_time);
    }
}

/// Tenders have no time column; they keep their fetch order.
impl TableRow for TenderZone {
    const COLUMNS: &'static [&'static str] = TenderZone::COLUMNS;

    fn sort_time(&self) -> Option<PrimitiveDateTime> {
        None
    }

    fn hash_natural_key(&self, hasher: &mut blake3::Hasher) {
        hash_opt_str(hasher, self.flexibility_zone.as_deref());
        hash_opt_str(hasher, self.competition_pot.as_deref());
        hash_opt_str(hasher, self.tender_round.as_deref());
    }
}

// Tag byte plus length prefix keeps `None` distinct from `Some("")` and
// stops adjacent fields from running together.
fn hash_opt_str(hasher: &mut blake3::Hasher, value: Option<&str>) {
    match value {
        Some(s) => {
            hasher.update(&[1]);
            hasher.update(&(s.len() as u64).to_le_bytes());
            hasher.update(s.as_bytes());
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

fn hash_opt_ts(hasher: &mut blake3::Hasher, value: Option<PrimitiveDateTime>) {
    match value {
        Some(ts) => {
            hasher.update(&[1]);
            hasher.update(&ts.assume_utc().unix_timestamp_nanos().to_le_bytes());
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

/// Newest first; rows without a start time go last.
fn descending_nulls_last(a: Option<PrimitiveDateTime>, b: Option<PrimitiveDateTime>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sort rows by start time descending and keep the first row per natural key.
///
/// The sort is stable, so among rows with equal start times the one fetched
/// first survives. Returns the kept rows and the number dropped.
pub fn dedupe_sorted<T: TableRow>(mut rows: Vec<T>) -> (Vec<T>, usize) {
    rows.sort_by(|a, b| descending_nulls_last(a.sort_time(), b.sort_time()));

    let before = rows.len();
    let mut seen = HashSet::with_capacity(before);
    rows.retain(|row| seen.insert(row.natural_key()));
    let dropped = before - rows.len();

    (rows, dropped)
}
