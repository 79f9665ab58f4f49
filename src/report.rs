//! Session report and export functionality

use crate::session::{SelectStats, SessionSnapshot};
use crate::utils::as_millis_f64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Complete session report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// Report metadata
    pub metadata: ReportMetadata,
    /// Session state at export time
    pub summary: SessionSummary,
    /// Trial scoreboard, sorted by category
    pub trials: Vec<TrialEntry>,
    /// Timing of the last instrumented select, if any
    pub select: Option<SelectSummary>,
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Report generation timestamp
    pub generated_at: String,
    /// Application version
    pub version: String,
    /// Session duration in seconds
    pub duration_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub state: String,
    pub display_size: Option<(u32, u32)>,
    pub mirrored: bool,
    pub targets: usize,
    pub key_legend: Vec<String>,
}

/// Single scoreboard row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialEntry {
    pub category: String,
    pub successes: u32,
    pub attempts: u32,
    pub percent: f64,
}

/// Loop timing in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectSummary {
    pub iterations: u64,
    pub elapsed_ms: f64,
    pub frequency_hz: Option<f64>,
    pub worst_tick_ms: Option<f64>,
    pub worst_probe_ms: Vec<Option<f64>>,
    pub matched: Option<usize>,
}

impl From<&SelectStats> for SelectSummary {
    fn from(stats: &SelectStats) -> Self {
        Self {
            iterations: stats.iterations,
            elapsed_ms: as_millis_f64(stats.elapsed),
            frequency_hz: stats.frequency_hz(),
            worst_tick_ms: stats.tick.max.map(as_millis_f64),
            worst_probe_ms: stats.probes.iter().map(|p| p.max.map(as_millis_f64)).collect(),
            matched: stats.matched,
        }
    }
}

impl SessionReport {
    /// Create a report from a session snapshot
    pub fn new(snapshot: &SessionSnapshot) -> Self {
        let now: DateTime<Utc> = Utc::now();

        Self {
            metadata: ReportMetadata {
                generated_at: now.to_rfc3339(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                duration_secs: snapshot.uptime.as_secs_f64(),
            },
            summary: SessionSummary {
                state: snapshot.state.clone(),
                display_size: snapshot.display_size,
                mirrored: snapshot.mirrored,
                targets: snapshot.targets,
                key_legend: snapshot.legend.clone(),
            },
            trials: snapshot
                .trials
                .iter()
                .map(|(category, count)| TrialEntry {
                    category: category.clone(),
                    successes: count.successes,
                    attempts: count.attempts,
                    percent: count.percent(),
                })
                .collect(),
            select: snapshot.last_select.as_ref().map(SelectSummary::from),
        }
    }

    /// Export report to JSON file
    pub fn export_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Export report to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
