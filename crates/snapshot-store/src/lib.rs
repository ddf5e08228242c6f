use chrono::{Duration, NaiveDate};
use options_core::{FlowError, Session, Snapshot};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Filename of the flattened volatility surface within a session directory.
pub const SURFACE_FILE: &str = "surface.json";
/// Filename of the joined gamma feed line.
pub const GAMMA_FILE: &str = "gamma_flip.txt";

/// Filesystem layout and persistence for per-session snapshots.
///
/// Sessions nest as `<base>/<YYYY-MM>/W<ww>/<YYYY-MM-DD>/<session>/` so a
/// month of runs stays browsable; the week folder uses the Monday-based week
/// number.
pub struct SnapshotStore {
    base: PathBuf,
}

impl SnapshotStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Directory for one (date, session) pair. Does not create it.
    pub fn session_dir(&self, date: NaiveDate, session: Session) -> PathBuf {
        self.base
            .join(date.format("%Y-%m").to_string())
            .join(format!("W{}", date.format("%W")))
            .join(date.format("%Y-%m-%d").to_string())
            .join(session.as_str())
    }

    fn ensure_session_dir(&self, date: NaiveDate, session: Session) -> Result<PathBuf, FlowError> {
        let dir = self.session_dir(date, session);
        fs::create_dir_all(&dir)
            .map_err(|e| FlowError::Storage(format!("create {}: {e}", dir.display())))?;
        Ok(dir)
    }

    /// Persist the flattened surface snapshot for its own (date, session).
    pub fn save_surface(&self, snapshot: &Snapshot) -> Result<PathBuf, FlowError> {
        let path = self
            .ensure_session_dir(snapshot.trading_date, snapshot.session)?
            .join(SURFACE_FILE);
        write_json(&path, snapshot)?;
        tracing::info!("Surface snapshot saved to {}", path.display());
        Ok(path)
    }

    /// Load a previously captured surface snapshot.
    ///
    /// A missing snapshot is `Ok(None)`: reference sessions legitimately do
    /// not exist on the first run or after a holiday.
    pub fn load_surface(
        &self,
        date: NaiveDate,
        session: Session,
    ) -> Result<Option<Snapshot>, FlowError> {
        let path = self.session_dir(date, session).join(SURFACE_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .map_err(|e| FlowError::Storage(format!("read {}: {e}", path.display())))?;
        let snapshot = serde_json::from_str(&raw)
            .map_err(|e| FlowError::Storage(format!("parse {}: {e}", path.display())))?;
        Ok(Some(snapshot))
    }

    /// The evening snapshot of the previous calendar day, reference for both
    /// the overnight and daily comparisons.
    pub fn previous_evening(&self, date: NaiveDate) -> Result<Option<Snapshot>, FlowError> {
        self.load_surface(date - Duration::days(1), Session::Evening)
    }

    /// Persist the joined gamma feed line.
    pub fn save_gamma_records(
        &self,
        date: NaiveDate,
        session: Session,
        joined: &str,
    ) -> Result<PathBuf, FlowError> {
        self.save_text(date, session, GAMMA_FILE, joined)
    }

    /// Persist any serializable artifact (skew records, sentiment summaries)
    /// under the session directory.
    pub fn save_json<T: Serialize>(
        &self,
        date: NaiveDate,
        session: Session,
        filename: &str,
        value: &T,
    ) -> Result<PathBuf, FlowError> {
        let path = self.ensure_session_dir(date, session)?.join(filename);
        write_json(&path, value)?;
        Ok(path)
    }

    /// Persist a plain-text artifact (dashboards, feed lines).
    pub fn save_text(
        &self,
        date: NaiveDate,
        session: Session,
        filename: &str,
        text: &str,
    ) -> Result<PathBuf, FlowError> {
        let path = self.ensure_session_dir(date, session)?.join(filename);
        fs::write(&path, text)
            .map_err(|e| FlowError::Storage(format!("write {}: {e}", path.display())))?;
        Ok(path)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), FlowError> {
    let body = serde_json::to_string(value)
        .map_err(|e| FlowError::Storage(format!("serialize {}: {e}", path.display())))?;
    fs::write(path, body)
        .map_err(|e| FlowError::Storage(format!("write {}: {e}", path.display())))
}
