use std::collections::VecDeque;

use tracing::debug;

use crate::protocol::{Progress, Transaction, TxId};

/// The transactions of one connection, oldest first.
///
/// Transactions are appended when a request starts. With auto-destroy enabled
/// they are dropped again once both sides completed and the completion hook ran;
/// otherwise they stay until the parser is dropped.
#[derive(Debug, Default)]
pub struct Transactions {
    txs: VecDeque<Transaction>,
    next_id: usize,
    done: Vec<TxId>,
}

impl Transactions {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn create(&mut self) -> TxId {
        let id = TxId(self.next_id);
        self.next_id += 1;
        self.txs.push_back(Transaction::new(id));
        id
    }

    fn position(&self, id: TxId) -> Option<usize> {
        // ids only grow, so the deque is sorted by id
        self.txs.binary_search_by_key(&id, Transaction::id).ok()
    }

    pub fn get(&self, id: TxId) -> Option<&Transaction> {
        self.position(id).map(|index| &self.txs[index])
    }

    pub(crate) fn get_mut(&mut self, id: TxId) -> Option<&mut Transaction> {
        self.position(id).map(|index| &mut self.txs[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.txs.iter()
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// Number of transactions created on the connection, retired ones included.
    pub fn created(&self) -> usize {
        self.next_id
    }

    /// The oldest transaction whose request started but whose response did not.
    pub(crate) fn awaiting_response(&self) -> Option<TxId> {
        self.txs
            .iter()
            .find(|tx| tx.request_progress > Progress::NotStarted && tx.response_progress == Progress::NotStarted)
            .map(Transaction::id)
    }

    pub(crate) fn mark_done(&mut self, id: TxId) {
        if !self.done.contains(&id) {
            self.done.push(id);
        }
    }

    /// Drops the transactions whose completion was reported. Returns how many went.
    pub(crate) fn retire_done(&mut self) -> usize {
        if self.done.is_empty() {
            return 0;
        }
        let before = self.txs.len();
        let done = std::mem::take(&mut self.done);
        self.txs.retain(|tx| !done.contains(&tx.id()));

        let retired = before - self.txs.len();
        debug!(retired, remaining = self.txs.len(), "retired transactions");
        retired
    }
}

impl<'a> IntoIterator for &'a Transactions {
    type Item = &'a Transaction;
    type IntoIter = std::collections::vec_deque::Iter<'a, Transaction>;

    fn into_iter(self) -> Self::IntoIter {
        self.txs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_id() {
        let mut txs = Transactions::new();
        let first = txs.create();
        let second = txs.create();

        assert_eq!(txs.len(), 2);
        assert_eq!(txs.get(second).map(Transaction::id), Some(second));
        assert!(txs.get(TxId(7)).is_none());
        assert_eq!(txs.iter().map(Transaction::id).collect::<Vec<_>>(), vec![first, second]);
    }

    #[test]
    fn response_pairs_with_oldest_open_request() {
        let mut txs = Transactions::new();
        let first = txs.create();
        let second = txs.create();
        assert_eq!(txs.awaiting_response(), None);

        txs.get_mut(second).unwrap().request_progress = Progress::Line;
        assert_eq!(txs.awaiting_response(), Some(second));

        txs.get_mut(first).unwrap().request_progress = Progress::Complete;
        assert_eq!(txs.awaiting_response(), Some(first));

        txs.get_mut(first).unwrap().response_progress = Progress::Line;
        assert_eq!(txs.awaiting_response(), Some(second));
    }

    #[test]
    fn retire_keeps_ids_stable() {
        let mut txs = Transactions::new();
        let first = txs.create();
        let second = txs.create();

        txs.mark_done(first);
        txs.mark_done(first);
        assert_eq!(txs.retire_done(), 1);
        assert_eq!(txs.retire_done(), 0);

        assert!(txs.get(first).is_none());
        assert!(txs.get(second).is_some());
        assert_eq!(txs.created(), 2);
        assert_eq!(txs.create(), TxId(2));
    }
}
