use super::*;

/// Result of trying to open a stopwatch for a team.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started(TeamSession),
    AlreadyActive(TeamSession),
}

/// The per-team stopwatch sessions.
#[derive(Debug)]
pub struct SessionStore<C> {
    collection: C,
}

/// Index of the most recent running session for a team.
fn find_active(sessions: &[TeamSession], team: &str) -> Option<usize> {
    sessions
        .iter()
        .rposition(|s| s.team == team && s.is_active())
}

impl<C: Collection<TeamSession>> SessionStore<C> {
    pub fn new(collection: C) -> Self {
        Self { collection }
    }

    pub fn load_all(&self) -> Result<Vec<TeamSession>, StoreError> {
        self.collection.load_all()
    }

    /// The most recent running session for a team, if any.
    pub fn active_session(&self, team: &str) -> Result<Option<TeamSession>, StoreError> {
        let sessions = self.collection.load_all()?;
        Ok(find_active(&sessions, team).map(|i| sessions[i].clone()))
    }

    /// Open a session unless the team already has one running.
    /// The check and the insert happen in the same locked update.
    pub fn start(&self, team: &str, now: DateTime<Utc>) -> Result<StartOutcome, StoreError> {
        self.collection.update(|sessions| {
            if let Some(i) = find_active(sessions, team) {
                return Ok(StartOutcome::AlreadyActive(sessions[i].clone()));
            }
            let session = TeamSession::start(team, now);
            sessions.push(session.clone());
            Ok(StartOutcome::Started(session))
        })
    }

    /// Close the team's running session, claiming it for one submission.
    /// Returns `None` if the team has nothing running, so two racing submits
    /// can never both claim the same session.
    pub fn close_active(
        &self,
        team: &str,
        end_time: DateTime<Utc>,
    ) -> Result<Option<TeamSession>, StoreError> {
        self.collection.update(|sessions| {
            let Some(i) = find_active(sessions, team) else {
                return Ok(None);
            };
            let session = &mut sessions[i];
            session.completed = true;
            session.end_time = Some(end_time);
            Ok(Some(session.clone()))
        })
    }

    /// Undo [`Self::close_active`] for the session that began at `start_time`.
    /// Returns `false` if no such closed session exists or the team has
    /// started a new one in the meantime.
    pub fn reopen(&self, team: &str, start_time: DateTime<Utc>) -> Result<bool, StoreError> {
        self.collection.update(|sessions| {
            if find_active(sessions, team).is_some() {
                return Ok(false);
            }
            let Some(session) = sessions
                .iter_mut()
                .rev()
                .find(|s| s.team == team && s.start_time == start_time && s.completed)
            else {
                return Ok(false);
            };
            session.completed = false;
            session.end_time = None;
            Ok(true)
        })
    }
}
