//! Announcement date to trading row alignment

use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::types::SignalRow;

/// Trading row indices for one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignedEvent {
    /// Row of the announcement date, or the last trading row before it
    pub exit_index: usize,
    pub entry_index: usize,
    /// False when the announcement fell on a non-trading day
    pub exact: bool,
}

/// Index of the row dated `date`, else the nearest strictly-earlier row.
/// `rows` must be sorted by date.
pub fn locate(rows: &[SignalRow], date: NaiveDate) -> Option<(usize, bool)> {
    let after = rows.partition_point(|r| r.date <= date);
    if after == 0 {
        return None;
    }
    let idx = after - 1;
    Some((idx, rows[idx].date == date))
}

/// Align an announcement to its exit row and an entry row `entry_offset`
/// trading rows earlier
pub fn align(
    stock_id: &str,
    rows: &[SignalRow],
    date: NaiveDate,
    entry_offset: usize,
) -> Result<AlignedEvent> {
    let (exit_index, exact) = locate(rows, date).ok_or_else(|| Error::AlignmentFailure {
        stock_id: stock_id.to_string(),
        date,
        reason: "no trading row on or before the announcement".to_string(),
    })?;

    if exit_index < entry_offset {
        return Err(Error::AlignmentFailure {
            stock_id: stock_id.to_string(),
            date,
            reason: format!(
                "{} trading rows before the exit row, need {}",
                exit_index, entry_offset
            ),
        });
    }

    Ok(AlignedEvent {
        exit_index,
        entry_index: exit_index - entry_offset,
        exact,
    })
}
