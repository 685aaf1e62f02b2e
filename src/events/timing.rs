//! Signal timing profile around announcements

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::events::aligner::locate;
use crate::types::{AnnouncementEvent, SignalRow, SignalSource};

/// Signal statistics at one offset from the aligned announcement row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingBucket {
    /// Trading rows relative to the announcement row (0 = T0)
    pub offset: i64,
    pub samples: usize,
    pub mean_signal: f64,
    pub positive_rate_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingProfile {
    pub events: usize,
    pub buckets: Vec<TimingBucket>,
}

impl TimingProfile {
    /// Offset with the largest mean signal
    pub fn peak(&self) -> Option<&TimingBucket> {
        self.buckets
            .iter()
            .max_by(|a, b| a.mean_signal.total_cmp(&b.mean_signal))
    }

    pub fn render(&self) -> String {
        let mut out = format!("Signal timing over {} events\n", self.events);
        let scale = self
            .buckets
            .iter()
            .map(|b| b.mean_signal.abs())
            .fold(0.0, f64::max);
        for b in &self.buckets {
            let bar_len = if scale > 0.0 {
                (b.mean_signal.abs() / scale * 30.0).round() as usize
            } else {
                0
            };
            out.push_str(&format!(
                "  T{:+3}  mean {:>12.0}  positive {:>5.1}%  {}\n",
                b.offset,
                b.mean_signal,
                b.positive_rate_pct,
                "#".repeat(bar_len)
            ));
        }
        out
    }
}

/// Collect the signal at T-lookback..=T0 for every event with enough rows
/// before its aligned index
pub fn profile(
    events: &[AnnouncementEvent],
    signals: &BTreeMap<String, Vec<SignalRow>>,
    lookback: usize,
    source: SignalSource,
) -> TimingProfile {
    let mut samples: Vec<Vec<f64>> = vec![Vec::new(); lookback + 1];
    let mut used = 0;

    for event in events {
        let Some(rows) = signals.get(&event.stock_id) else {
            continue;
        };
        let Some((exit_index, _)) = locate(rows, event.announcement_date) else {
            continue;
        };
        if exit_index < lookback {
            continue;
        }
        used += 1;
        for (slot, row) in rows[exit_index - lookback..=exit_index].iter().enumerate() {
            samples[slot].push(source.value(row));
        }
    }

    debug!(events = used, lookback, "Built timing profile");

    let buckets = samples
        .into_iter()
        .enumerate()
        .filter(|(_, values)| !values.is_empty())
        .map(|(slot, values)| {
            let n = values.len();
            let positive = values.iter().filter(|v| **v > 0.0).count();
            TimingBucket {
                offset: slot as i64 - lookback as i64,
                samples: n,
                mean_signal: values.iter().sum::<f64>() / n as f64,
                positive_rate_pct: positive as f64 / n as f64 * 100.0,
            }
        })
        .collect();

    TimingProfile {
        events: used,
        buckets,
    }
}
