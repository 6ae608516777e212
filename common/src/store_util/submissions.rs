use super::*;

/// The append-only list of completed solutions.
#[derive(Debug)]
pub struct SubmissionStore<C> {
    collection: C,
}

impl<C: Collection<SubmissionRecord>> SubmissionStore<C> {
    pub fn new(collection: C) -> Self {
        Self { collection }
    }

    pub fn load_all(&self) -> Result<Vec<SubmissionRecord>, StoreError> {
        self.collection.load_all()
    }

    /// Re-read the latest snapshot, append the record and write everything back.
    /// Returns the number of stored submissions afterwards.
    ///
    /// The file is always re-read here rather than written from a cached copy,
    /// otherwise a client holding an old list would drop everyone else's submissions.
    pub fn append_with_merge(&self, record: SubmissionRecord) -> Result<usize, StoreError> {
        self.collection.update(|records| {
            records.push(record);
            Ok(records.len())
        })
    }
}
