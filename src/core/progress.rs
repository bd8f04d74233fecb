//! Progress extraction from the separator's diagnostic stream.
//!
//! The separator reports its own 0-100% progress; the job reports a single
//! 0-100 scale where each pipeline stage owns a fixed band.

use crate::core::model::ProgressEvent;
use std::ops::RangeInclusive;

pub const DOWNLOAD_BAND: RangeInclusive<u8> = 0..=10;
pub const SEPARATION_BAND: RangeInclusive<u8> = 30..=90;
pub const PUBLISH_BAND: RangeInclusive<u8> = 90..=100;

/// Raw tool percent from a single diagnostic line, clamped to 0..=100.
///
/// Takes the whitespace-delimited token right before the first `%`.
/// Anything that does not convert cleanly is "no progress".
pub fn raw_percent(line: &str) -> Option<u8> {
    let (head, _) = line.split_once('%')?;
    let token = head.split_whitespace().last()?;

    let value = match token.parse::<i64>() {
        Ok(v) => v as f64,
        Err(_) => token.parse::<f64>().ok().filter(|v| v.is_finite())?,
    };

    Some(value.clamp(0.0, 100.0) as u8)
}

/// Linear map of a tool percent into `band`.
pub fn remap(raw: u8, band: &RangeInclusive<u8>) -> u8 {
    let raw = raw.min(100) as u32;
    let (lo, hi) = (*band.start() as u32, *band.end() as u32);
    let mapped = lo + raw * hi.saturating_sub(lo) / 100;
    mapped.min(100) as u8
}

/// Job-level percent for a diagnostic line, or `None` when it carries no progress.
pub fn parse_progress(line: &str) -> Option<u8> {
    raw_percent(line).map(|p| remap(p, &SEPARATION_BAND))
}

/// Turns job-level percents for one stage into [`ProgressEvent`]s, dropping
/// values that would move the reported percent backwards or repeat it.
///
/// Multi-model presets run several passes and restart the tool's bar at 0%.
#[derive(Debug)]
pub struct ProgressTracker {
    stage: &'static str,
    last: Option<u8>,
}

impl ProgressTracker {
    pub fn new(stage: &'static str) -> Self {
        Self { stage, last: None }
    }

    /// Treats `percent` as already reported, without producing an event.
    pub fn prime(&mut self, percent: u8) {
        self.last = Some(percent.min(100));
    }

    pub fn advance(&mut self, percent: u8) -> Option<ProgressEvent> {
        let percent = percent.min(100);
        match self.last {
            Some(prev) if percent <= prev => None,
            _ => {
                self.last = Some(percent);
                Some(ProgressEvent::new(self.stage, percent))
            }
        }
    }

    pub fn last(&self) -> Option<u8> {
        self.last
    }
}
