use crate::transaction::TransactionMetaFields;

/// Per-transaction record of changes: events to persist on commit and, in
/// lockstep, the prior state needed to reverse each change on abort.
///
/// One journal is embedded in each fields aggregate and shared by all of its
/// containers. It is empty outside transactions; the policy asserts so at
/// every transaction start.
#[derive(Debug)]
pub struct MutationJournal<M, U> {
    meta_fields: TransactionMetaFields,
    commit_log: Vec<M>,
    rollback_log: Vec<U>,
}

impl<M, U> Default for MutationJournal<M, U> {
    fn default() -> Self {
        Self {
            meta_fields: TransactionMetaFields::new(),
            commit_log: Vec::new(),
            rollback_log: Vec::new(),
        }
    }
}

impl<M, U> MutationJournal<M, U> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one mutation together with its undo.
    pub fn log(&mut self, event: M, undo: U) {
        self.commit_log.push(event);
        self.rollback_log.push(undo);
    }

    pub fn len(&self) -> usize {
        self.commit_log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commit_log.is_empty()
    }

    /// Both logs must be empty; transactions start on a clean journal on
    /// every execution path.
    pub fn assert_empty(&self) {
        assert!(
            self.commit_log.is_empty() && self.rollback_log.is_empty(),
            "mutation journal is not empty at transaction start"
        );
    }

    pub fn clear(&mut self) {
        self.meta_fields.clear();
        self.commit_log.clear();
        self.rollback_log.clear();
    }

    /// Drain the commit log and meta-fields for persistence, clearing the
    /// journal entirely.
    pub fn take_for_commit(&mut self) -> (TransactionMetaFields, Vec<M>) {
        self.rollback_log.clear();
        (
            std::mem::take(&mut self.meta_fields),
            std::mem::take(&mut self.commit_log),
        )
    }

    /// Drain the rollback log (in logging order; callers reverse it),
    /// clearing the journal entirely.
    pub fn take_rollback(&mut self) -> Vec<U> {
        self.meta_fields.clear();
        self.commit_log.clear();
        std::mem::take(&mut self.rollback_log)
    }

    pub fn meta_fields(&self) -> &TransactionMetaFields {
        &self.meta_fields
    }

    pub fn set_meta_field(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.meta_fields.insert(key.into(), value.into());
    }

    pub fn erase_meta_field(&mut self, key: &str) {
        self.meta_fields.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Journal = MutationJournal<&'static str, u32>;

    #[test]
    fn logs_grow_in_lockstep() {
        let mut journal = Journal::new();
        journal.assert_empty();
        journal.log("a", 1);
        journal.log("b", 2);
        assert_eq!(journal.len(), 2);

        let (meta, events) = journal.take_for_commit();
        assert!(meta.is_empty());
        assert_eq!(events, vec!["a", "b"]);
        journal.assert_empty();
    }

    #[test]
    fn rollback_drains_everything() {
        let mut journal = Journal::new();
        journal.set_meta_field("who", "test");
        journal.log("a", 1);
        journal.log("b", 2);

        let undos = journal.take_rollback();
        assert_eq!(undos, vec![1, 2]);
        assert!(journal.meta_fields().is_empty());
        journal.assert_empty();
    }

    #[test]
    #[should_panic(expected = "not empty")]
    fn assert_empty_panics_on_pending_mutations() {
        let mut journal = Journal::new();
        journal.log("a", 1);
        journal.assert_empty();
    }

    #[test]
    fn meta_fields_set_and_erase() {
        let mut journal = Journal::new();
        journal.set_meta_field("k", "v");
        journal.set_meta_field("k2", "v2");
        journal.erase_meta_field("k");
        assert_eq!(journal.meta_fields().len(), 1);
        assert_eq!(journal.meta_fields().get("k2").map(String::as_str), Some("v2"));
    }
}
