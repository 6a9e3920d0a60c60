//! JSON reports written next to each run.

use chrono::Utc;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Error;
use crate::plan::{Plan, PlanStats, PlanningOutcome};
use crate::scanner::ScanIssue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Plan,
    Conflicts,
    Formats,
    Execution,
}

impl ReportKind {
    const ALL: [ReportKind; 4] = [
        ReportKind::Plan,
        ReportKind::Conflicts,
        ReportKind::Formats,
        ReportKind::Execution,
    ];

    fn prefix(self) -> &'static str {
        match self {
            ReportKind::Plan => "plan",
            ReportKind::Conflicts => "conflicts",
            ReportKind::Formats => "formats",
            ReportKind::Execution => "execution",
        }
    }
}

#[derive(Serialize)]
struct PlanReport<'a> {
    root: String,
    stats: &'a PlanStats,
    scan_issues: &'a [ScanIssue],
    #[serde(flatten)]
    plan: &'a Plan,
}

/// Writes `<kind>-<stamp>.json` files. One writer shares one stamp, so the
/// reports of a run belong together.
pub struct ReportWriter {
    dir: PathBuf,
    stamp: String,
}

impl ReportWriter {
    pub fn new(dir: &Path) -> Result<Self, Error> {
        let base = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        Self::with_stamp(dir, &base)
    }

    /// Uses `base` as the stamp, adding `-1`, `-2`, ... if reports with it
    /// already exist.
    pub fn with_stamp(dir: &Path, base: &str) -> Result<Self, Error> {
        fs::create_dir_all(dir)?;
        let mut stamp = base.to_string();
        let mut n = 0;
        while ReportKind::ALL
            .iter()
            .any(|kind| dir.join(file_name(*kind, &stamp)).exists())
        {
            n += 1;
            stamp = format!("{}-{}", base, n);
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            stamp,
        })
    }

    pub fn stamp(&self) -> &str {
        &self.stamp
    }

    pub fn path_for(&self, kind: ReportKind) -> PathBuf {
        self.dir.join(file_name(kind, &self.stamp))
    }

    pub fn write<T: Serialize>(&self, kind: ReportKind, value: &T) -> Result<PathBuf, Error> {
        let path = self.path_for(kind);
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        info!("Wrote {}", path.display());
        Ok(path)
    }

    /// The plan, conflict and format reports of one analysis.
    pub fn write_planning(&self, outcome: &PlanningOutcome) -> Result<Vec<PathBuf>, Error> {
        let plan = PlanReport {
            root: outcome.root.display().to_string(),
            stats: &outcome.stats,
            scan_issues: &outcome.scan_issues,
            plan: &outcome.plan,
        };
        Ok(vec![
            self.write(ReportKind::Plan, &plan)?,
            self.write(ReportKind::Conflicts, &outcome.plan.conflict_groups)?,
            self.write(ReportKind::Formats, &outcome.formats)?,
        ])
    }
}

fn file_name(kind: ReportKind, stamp: &str) -> String {
    format!("{}-{}.json", kind.prefix(), stamp)
}
