//! Drives a team from "start the stopwatch" to a stored submission.
//!
//! The coordinator keeps no state of its own besides the store handles and a clock.
//! Every operation reads the files fresh, so any number of coordinators (one per
//! client process) can work against the same data directory.

use crate::store_util::{Collection, CsvCollection, SessionStore, StartOutcome, SubmissionStore};
use crate::{
    Clock, CoordinatorError, RankedRecord, SESSIONS_FILE, SUBMISSIONS_FILE, StoreError,
    SubmissionRecord, SystemClock, TeamSession, scoring,
};
use std::path::Path;

/// A coordinator backed by the CSV files in a data directory.
pub type FileCoordinator<K = SystemClock> =
    Coordinator<CsvCollection<TeamSession>, CsvCollection<SubmissionRecord>, K>;

pub struct Coordinator<S, R, K = SystemClock> {
    sessions: SessionStore<S>,
    submissions: SubmissionStore<R>,
    clock: K,
}

impl FileCoordinator {
    /// Use `sessions.csv` and `submissions.csv` inside `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Self {
        Self::open_with_clock(data_dir, SystemClock)
    }
}

impl<K: Clock> FileCoordinator<K> {
    pub fn open_with_clock(data_dir: impl AsRef<Path>, clock: K) -> Self {
        let data_dir = data_dir.as_ref();
        Coordinator::new(
            CsvCollection::new(data_dir.join(SESSIONS_FILE)),
            CsvCollection::new(data_dir.join(SUBMISSIONS_FILE)),
            clock,
        )
    }
}

/// Trim the team name and reject empty ones.
fn validate_team(team: &str) -> Result<&str, CoordinatorError> {
    let team = team.trim();
    if team.is_empty() {
        return Err(CoordinatorError::InvalidTeam);
    }
    Ok(team)
}

fn validate_numbers(estimate: f64, error_estimate: f64) -> Result<(), CoordinatorError> {
    if !estimate.is_finite() {
        return Err(CoordinatorError::InvalidInput(format!(
            "estimate must be a finite number, got {estimate}"
        )));
    }
    if !error_estimate.is_finite() || error_estimate < 0f64 {
        return Err(CoordinatorError::InvalidInput(format!(
            "error estimate must be zero or positive, got {error_estimate}"
        )));
    }
    Ok(())
}

impl<S, R, K> Coordinator<S, R, K>
where
    S: Collection<TeamSession>,
    R: Collection<SubmissionRecord>,
    K: Clock,
{
    pub fn new(sessions: S, submissions: R, clock: K) -> Self {
        Self {
            sessions: SessionStore::new(sessions),
            submissions: SubmissionStore::new(submissions),
            clock,
        }
    }

    /// Start the stopwatch for a team.
    ///
    /// # Errors
    /// `AlreadyActive` if the team's previous session is still running,
    /// `InvalidTeam` for an empty name, `PersistFailure` if the file could not be written.
    pub fn start_session(&self, team: &str) -> Result<TeamSession, CoordinatorError> {
        let team = validate_team(team)?;
        match self.sessions.start(team, self.clock.now())? {
            StartOutcome::Started(session) => {
                log::info!("Session started for team '{team}' at {}", session.start_time);
                Ok(session)
            }
            StartOutcome::AlreadyActive(existing) => {
                log::warn!(
                    "Team '{team}' tried to start a session but one is running since {}",
                    existing.start_time
                );
                Err(CoordinatorError::AlreadyActive {
                    team: team.to_string(),
                })
            }
        }
    }

    /// The team's running session, if any.
    ///
    /// # Errors
    /// `InvalidTeam` for an empty name, `PersistFailure` if the session file could not be read.
    pub fn get_active_session(&self, team: &str) -> Result<Option<TeamSession>, CoordinatorError> {
        let team = validate_team(team)?;
        Ok(self.sessions.active_session(team)?)
    }

    /// The team's running session together with the seconds on its stopwatch.
    ///
    /// # Errors
    /// `InvalidTeam` for an empty name, `PersistFailure` if the session file could not be read.
    pub fn session_status(
        &self,
        team: &str,
    ) -> Result<Option<(TeamSession, f64)>, CoordinatorError> {
        let now = self.clock.now();
        Ok(self.get_active_session(team)?.map(|session| {
            let elapsed = session.elapsed_secs(now);
            (session, elapsed)
        }))
    }

    /// Seconds on the team's running stopwatch, if it has one.
    ///
    /// # Errors
    /// `InvalidTeam` for an empty name, `PersistFailure` if the session file could not be read.
    pub fn elapsed_secs(&self, team: &str) -> Result<Option<f64>, CoordinatorError> {
        Ok(self.session_status(team)?.map(|(_, elapsed)| elapsed))
    }

    /// Record a team's answer and stop its stopwatch.
    ///
    /// The session is closed first, which claims it for exactly one submission,
    /// and the record appended second. If the append fails the session is
    /// reopened so the team can simply submit again.
    ///
    /// # Errors
    /// `NoActiveSession` if the team never started, `InvalidInput` for bad numbers,
    /// `PersistFailure` if a file could not be written.
    pub fn submit_solution(
        &self,
        team: &str,
        estimate: f64,
        error_estimate: f64,
    ) -> Result<SubmissionRecord, CoordinatorError> {
        let team = validate_team(team)?;
        validate_numbers(estimate, error_estimate)?;

        let now = self.clock.now();
        let Some(session) = self
            .sessions
            .close_active(team, now)
            .inspect_err(|e| log::error!("Failed to close session for team '{team}': {e}"))?
        else {
            log::warn!("Team '{team}' submitted without a running session");
            return Err(CoordinatorError::NoActiveSession {
                team: team.to_string(),
            });
        };

        let record = SubmissionRecord::new(
            team,
            session.elapsed_secs(now),
            estimate,
            error_estimate,
            now,
        );

        match self.submissions.append_with_merge(record.clone()) {
            Ok(count) => {
                log::info!(
                    "New team added: {team}, Time: {:.1}s, Estimate: {}, Error: {:.4} ({count} submissions total)",
                    record.time,
                    record.estimate,
                    record.error
                );
                Ok(record)
            }
            Err(e) => {
                log::error!("Failed to save submission for team '{team}': {e}");
                match self.sessions.reopen(team, session.start_time) {
                    Ok(true) => {}
                    Ok(false) => log::warn!(
                        "Session for team '{team}' started at {} was gone before it could be reopened",
                        session.start_time
                    ),
                    Err(reopen) => log::error!(
                        "Failed to reopen session for team '{team}', it has to be started again: {reopen}"
                    ),
                }
                Err(e.into())
            }
        }
    }

    /// The current submission snapshot.
    ///
    /// # Errors
    /// Returns an error if the submission file could not be read.
    pub fn submissions(&self) -> Result<Vec<SubmissionRecord>, StoreError> {
        self.submissions.load_all()
    }

    /// Every session ever started, completed ones included.
    ///
    /// # Errors
    /// Returns an error if the session file could not be read.
    pub fn sessions(&self) -> Result<Vec<TeamSession>, StoreError> {
        self.sessions.load_all()
    }

    /// Score the current submission snapshot.
    ///
    /// # Errors
    /// Returns an error if the submission file could not be read.
    pub fn ranking(&self) -> Result<Vec<RankedRecord>, StoreError> {
        Ok(scoring::score(&self.submissions()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_util::MemoryCollection;
    use crate::{ManualClock, TRUE_INTEGRAL};
    use chrono::{TimeDelta, Utc};
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    type MemoryCoordinator<'a> = Coordinator<
        MemoryCollection<TeamSession>,
        MemoryCollection<SubmissionRecord>,
        &'a ManualClock,
    >;

    fn create_test_coordinator(clock: &ManualClock) -> MemoryCoordinator<'_> {
        Coordinator::new(MemoryCollection::new(), MemoryCollection::new(), clock)
    }

    /// A submission store whose disk is always full.
    struct FailingCollection;

    impl Collection<SubmissionRecord> for FailingCollection {
        fn load_all(&self) -> Result<Vec<SubmissionRecord>, StoreError> {
            Ok(Vec::new())
        }

        fn save_all(&self, _records: &[SubmissionRecord]) -> Result<(), StoreError> {
            Err(StoreError::Io {
                path: "submissions.csv".into(),
                source: io::Error::other("disk full"),
            })
        }

        fn update<T, E>(
            &self,
            _f: impl FnOnce(&mut Vec<SubmissionRecord>) -> Result<T, E>,
        ) -> Result<T, E>
        where
            E: From<StoreError>,
        {
            Err(self.save_all(&[]).unwrap_err().into())
        }
    }

    /// A session store whose disk fills up for exactly one `update`, the `fail_on`-th.
    struct FlakyCollection {
        inner: MemoryCollection<TeamSession>,
        updates: AtomicUsize,
        fail_on: usize,
    }

    impl FlakyCollection {
        fn new(fail_on: usize) -> Self {
            Self {
                inner: MemoryCollection::new(),
                updates: AtomicUsize::new(0),
                fail_on,
            }
        }
    }

    impl Collection<TeamSession> for FlakyCollection {
        fn load_all(&self) -> Result<Vec<TeamSession>, StoreError> {
            self.inner.load_all()
        }

        fn save_all(&self, records: &[TeamSession]) -> Result<(), StoreError> {
            self.inner.save_all(records)
        }

        fn update<T, E>(
            &self,
            f: impl FnOnce(&mut Vec<TeamSession>) -> Result<T, E>,
        ) -> Result<T, E>
        where
            E: From<StoreError>,
        {
            let n = self.updates.fetch_add(1, Ordering::SeqCst) + 1;
            if n == self.fail_on {
                return Err(StoreError::Io {
                    path: "sessions.csv".into(),
                    source: io::Error::other("disk full"),
                }
                .into());
            }
            self.inner.update(f)
        }
    }

    #[test_log::test]
    fn test_start_session_twice() {
        let clock = ManualClock::new(Utc::now());
        let coordinator = create_test_coordinator(&clock);

        coordinator.start_session("Gouda").unwrap();
        let err = coordinator.start_session("Gouda").unwrap_err();
        assert!(matches!(err, CoordinatorError::AlreadyActive { .. }));
        assert_eq!(err.kind(), "already_active");

        // whitespace does not make a different team
        let err = coordinator.start_session("  Gouda ").unwrap_err();
        assert!(matches!(err, CoordinatorError::AlreadyActive { .. }));
    }

    #[test_log::test]
    fn test_empty_team_is_rejected() {
        let clock = ManualClock::new(Utc::now());
        let coordinator = create_test_coordinator(&clock);
        assert!(matches!(
            coordinator.start_session("   "),
            Err(CoordinatorError::InvalidTeam)
        ));
        assert!(matches!(
            coordinator.submit_solution("", 0.7, 0.0),
            Err(CoordinatorError::InvalidTeam)
        ));
        assert!(matches!(
            coordinator.get_active_session("  "),
            Err(CoordinatorError::InvalidTeam)
        ));
        assert!(matches!(
            coordinator.elapsed_secs(""),
            Err(CoordinatorError::InvalidTeam)
        ));
    }

    #[test_log::test]
    fn test_session_status_uses_clock() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        let coordinator = create_test_coordinator(&clock);
        assert!(coordinator.session_status("Gouda").unwrap().is_none());

        coordinator.start_session("Gouda").unwrap();
        clock.advance(TimeDelta::milliseconds(12_300));
        let (session, elapsed) = coordinator.session_status(" Gouda").unwrap().unwrap();
        assert_eq!(session.start_time, start);
        assert_eq!(elapsed, 12.3);
    }

    #[test_log::test]
    fn test_submit_without_session() {
        let clock = ManualClock::new(Utc::now());
        let coordinator = create_test_coordinator(&clock);
        let err = coordinator.submit_solution("Brie", 0.7, 0.0).unwrap_err();
        assert!(matches!(err, CoordinatorError::NoActiveSession { .. }));
        assert!(coordinator.submissions().unwrap().is_empty());
    }

    #[test_log::test]
    fn test_submit_rejects_bad_numbers() {
        let clock = ManualClock::new(Utc::now());
        let coordinator = create_test_coordinator(&clock);
        coordinator.start_session("Edam").unwrap();

        for (estimate, error_estimate) in [(f64::NAN, 0.0), (0.7, -0.1), (0.7, f64::INFINITY)] {
            let err = coordinator
                .submit_solution("Edam", estimate, error_estimate)
                .unwrap_err();
            assert!(matches!(err, CoordinatorError::InvalidInput(_)));
        }
        // nothing changed
        assert!(coordinator.get_active_session("Edam").unwrap().is_some());
    }

    #[test_log::test]
    fn test_full_session_flow() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        let coordinator = create_test_coordinator(&clock);

        let session = coordinator.start_session("Gouda").unwrap();
        assert_eq!(session.start_time, start);
        assert_eq!(coordinator.elapsed_secs("Gouda").unwrap(), Some(0.0));

        clock.advance(TimeDelta::milliseconds(95_500));
        assert_eq!(coordinator.elapsed_secs("Gouda").unwrap(), Some(95.5));

        let record = coordinator.submit_solution("Gouda", 0.8, 0.05).unwrap();
        assert_eq!(record.team, "Gouda");
        assert_eq!(record.time, 95.5);
        assert!((record.error - (0.8 - TRUE_INTEGRAL).abs()).abs() < 1e-12);
        assert_eq!(record.error_estimate, 0.05);
        assert_eq!(record.timestamp, start + TimeDelta::milliseconds(95_500));

        // the session is closed but kept
        assert!(coordinator.get_active_session("Gouda").unwrap().is_none());
        assert_eq!(coordinator.elapsed_secs("Gouda").unwrap(), None);
        let sessions = coordinator.sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].completed);
        assert_eq!(sessions[0].end_time, Some(record.timestamp));

        // a second submission needs a new session
        let err = coordinator.submit_solution("Gouda", 0.8, 0.0).unwrap_err();
        assert!(matches!(err, CoordinatorError::NoActiveSession { .. }));
        coordinator.start_session("Gouda").unwrap();
        assert_eq!(coordinator.sessions().unwrap().len(), 2);
        assert_eq!(coordinator.submissions().unwrap().len(), 1);
    }

    #[test_log::test]
    fn test_persist_failure_keeps_session_active() {
        let clock = ManualClock::new(Utc::now());
        let coordinator = Coordinator::new(
            MemoryCollection::<TeamSession>::new(),
            FailingCollection,
            &clock,
        );
        coordinator.start_session("Feta").unwrap();

        let err = coordinator.submit_solution("Feta", 0.78, 0.0).unwrap_err();
        assert!(matches!(err, CoordinatorError::PersistFailure(_)));
        assert!(err.is_retryable());

        let session = coordinator.get_active_session("Feta").unwrap().unwrap();
        assert!(!session.completed);
        assert_eq!(session.end_time, None);
    }

    #[test_log::test]
    fn test_close_failure_records_nothing() {
        let clock = ManualClock::new(Utc::now());
        // update 1 starts the session, update 2 is the close on submit
        let coordinator = Coordinator::new(
            FlakyCollection::new(2),
            MemoryCollection::<SubmissionRecord>::new(),
            &clock,
        );
        coordinator.start_session("Gouda").unwrap();

        let err = coordinator.submit_solution("Gouda", 0.78, 0.01).unwrap_err();
        assert_eq!(err.kind(), "persist_failure");
        assert!(coordinator.submissions().unwrap().is_empty());
        assert!(coordinator.get_active_session("Gouda").unwrap().is_some());

        // the retry goes through and the session produced exactly one record
        clock.advance(TimeDelta::seconds(3));
        coordinator.submit_solution("Gouda", 0.78, 0.01).unwrap();
        assert_eq!(coordinator.submissions().unwrap().len(), 1);
        assert!(coordinator.get_active_session("Gouda").unwrap().is_none());
        assert!(coordinator.sessions().unwrap().iter().all(|s| s.completed));
    }

    #[test_log::test]
    fn test_second_submit_on_same_session_is_rejected() {
        let dir = TempDir::new().unwrap();
        let first = FileCoordinator::open(dir.path());
        let second = FileCoordinator::open(dir.path());

        // both clients saw the session running
        first.start_session("Brie").unwrap();
        assert!(first.get_active_session("Brie").unwrap().is_some());
        assert!(second.get_active_session("Brie").unwrap().is_some());

        second.submit_solution("Brie", 0.7, 0.0).unwrap();
        let err = first.submit_solution("Brie", 0.9, 0.0).unwrap_err();
        assert!(matches!(err, CoordinatorError::NoActiveSession { .. }));

        let submissions = first.submissions().unwrap();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].estimate, 0.7);
    }

    #[test_log::test]
    fn test_ranking_uses_stored_submissions() {
        let clock = ManualClock::new(Utc::now());
        let coordinator = create_test_coordinator(&clock);
        assert!(coordinator.ranking().unwrap().is_empty());

        coordinator.start_session("Gouda").unwrap();
        coordinator.start_session("Brie").unwrap();
        clock.advance(TimeDelta::seconds(10));
        coordinator.submit_solution("Gouda", TRUE_INTEGRAL + 0.1, 0.1).unwrap();
        clock.advance(TimeDelta::seconds(10));
        coordinator.submit_solution("Brie", TRUE_INTEGRAL - 0.3, 0.0).unwrap();

        let ranking = coordinator.ranking().unwrap();
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].record.team, "Gouda");
        assert_eq!(ranking[0].rank, 1);
        assert_eq!(ranking[1].record.team, "Brie");
    }

    #[test_log::test]
    fn test_two_clients_share_data_dir() {
        let dir = TempDir::new().unwrap();
        let first = FileCoordinator::open(dir.path());
        let second = FileCoordinator::open(dir.path());

        first.start_session("Gouda").unwrap();
        second.start_session("Brie").unwrap();
        assert!(matches!(
            second.start_session("Gouda"),
            Err(CoordinatorError::AlreadyActive { .. })
        ));

        // each client finishes the other's team
        second.submit_solution("Gouda", 0.78, 0.01).unwrap();
        first.submit_solution("Brie", 0.75, 0.0).unwrap();

        let teams: Vec<String> = first
            .submissions()
            .unwrap()
            .into_iter()
            .map(|r| r.team)
            .collect();
        assert_eq!(teams, vec!["Gouda".to_string(), "Brie".to_string()]);
        assert!(first.sessions().unwrap().iter().all(|s| s.completed));
        assert_eq!(second.ranking().unwrap().len(), 2);
    }
}
