//! Outstanding fetch accounting.
//!
//! Without a limit every request is issued immediately, however wide the
//! announced range is. With a limit, the part of a range that does not fit
//! waits in FIFO order as a range with a cursor, and sequence numbers are
//! produced one per completion. The backlog holds one entry per deferred
//! range, never one per sequence number.

use std::collections::VecDeque;

use chronosim_core::{MissingDataInfo, Name, SeqNo};

/// One fetch the driver wants issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Remote session name.
    pub session: Name,
    /// Sequence number to fetch.
    pub seq: SeqNo,
}

/// Remainder of a range still waiting for slots.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DeferredRange {
    session: Name,
    next: SeqNo,
    high: SeqNo,
}

impl DeferredRange {
    /// Take the next sequence number. Returns `true` as the second element
    /// once the range is exhausted.
    fn take(&mut self) -> (FetchRequest, bool) {
        let request = FetchRequest { session: self.session.clone(), seq: self.next };
        if self.next >= self.high {
            (request, true)
        } else {
            self.next += 1;
            (request, false)
        }
    }
}

/// Tracks in-flight fetches against an optional limit.
#[derive(Debug, Clone, Default)]
pub struct FetchQueue {
    limit: Option<usize>,
    outstanding: usize,
    backlog: VecDeque<DeferredRange>,
}

impl FetchQueue {
    /// Create a queue. `None` means unbounded.
    pub fn new(limit: Option<usize>) -> Self {
        Self { limit, outstanding: 0, backlog: VecDeque::new() }
    }

    /// Number of fetches issued and not yet completed.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Number of deferred ranges waiting for free slots.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    fn has_free_slot(&self) -> bool {
        self.limit.is_none_or(|limit| self.outstanding < limit)
    }

    /// Offer a whole range. Returns the requests that may be issued now; the
    /// rest of the range is deferred.
    ///
    /// Ranges queue behind earlier deferred ranges, so fetches are issued in
    /// announcement order.
    pub fn submit_range(&mut self, info: MissingDataInfo) -> Vec<FetchRequest> {
        if info.low > info.high {
            return Vec::new();
        }

        let mut range = DeferredRange { session: info.session, next: info.low, high: info.high };
        let mut issued = Vec::new();
        if !self.backlog.is_empty() {
            self.backlog.push_back(range);
            return issued;
        }

        while self.has_free_slot() {
            let (request, done) = range.take();
            self.outstanding += 1;
            issued.push(request);
            if done {
                return issued;
            }
        }

        self.backlog.push_back(range);
        issued
    }

    /// Record a completion (success or failure). Returns the next deferred
    /// request if one was waiting for the freed slot.
    pub fn complete(&mut self) -> Option<FetchRequest> {
        self.outstanding = self.outstanding.saturating_sub(1);

        let front = self.backlog.front_mut()?;
        let (request, done) = front.take();
        if done {
            self.backlog.pop_front();
        }
        self.outstanding += 1;
        Some(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(seq: SeqNo) -> FetchRequest {
        FetchRequest { session: Name::new(), seq }
    }

    fn range(low: SeqNo, high: SeqNo) -> MissingDataInfo {
        MissingDataInfo::new(Name::new(), low, high)
    }

    #[test]
    fn unbounded_issues_everything() {
        let mut queue = FetchQueue::new(None);
        let issued = queue.submit_range(range(1, 100));
        assert_eq!(issued.len(), 100);
        assert_eq!(queue.outstanding(), 100);
        assert_eq!(queue.backlog_len(), 0);
    }

    #[test]
    fn limit_defers_in_order() {
        let mut queue = FetchQueue::new(Some(2));
        assert_eq!(queue.submit_range(range(1, 4)), vec![request(1), request(2)]);
        assert_eq!(queue.backlog_len(), 1);

        assert_eq!(queue.complete(), Some(request(3)));
        assert_eq!(queue.complete(), Some(request(4)));
        assert_eq!(queue.outstanding(), 2);
        assert_eq!(queue.backlog_len(), 0);

        assert_eq!(queue.complete(), None);
        assert_eq!(queue.complete(), None);
        assert_eq!(queue.outstanding(), 0);
    }

    #[test]
    fn later_ranges_wait_behind_deferred_ones() {
        let mut queue = FetchQueue::new(Some(1));
        assert_eq!(queue.submit_range(range(1, 2)), vec![request(1)]);
        assert!(queue.submit_range(range(10, 10)).is_empty());
        assert_eq!(queue.backlog_len(), 2);

        assert_eq!(queue.complete(), Some(request(2)));
        assert_eq!(queue.complete(), Some(request(10)));
        assert_eq!(queue.backlog_len(), 0);
    }

    #[test]
    fn wide_range_is_held_as_one_entry() {
        let mut queue = FetchQueue::new(Some(3));
        assert_eq!(queue.submit_range(range(1, u64::MAX)).len(), 3);
        assert_eq!(queue.backlog_len(), 1);

        assert_eq!(queue.complete(), Some(request(4)));
        assert_eq!(queue.backlog_len(), 1);
    }

    #[test]
    fn range_ending_at_max_terminates() {
        let mut queue = FetchQueue::new(Some(1));
        let last = u64::MAX;
        assert_eq!(queue.submit_range(range(last - 1, last)), vec![request(last - 1)]);
        assert_eq!(queue.complete(), Some(request(last)));
        assert_eq!(queue.backlog_len(), 0);
        assert_eq!(queue.complete(), None);
    }

    #[test]
    fn inverted_range_issues_nothing() {
        let mut queue = FetchQueue::new(Some(1));
        assert!(queue.submit_range(range(5, 4)).is_empty());
        assert_eq!(queue.backlog_len(), 0);
    }

    #[test]
    fn spurious_completion_does_not_underflow() {
        let mut queue = FetchQueue::new(Some(1));
        assert_eq!(queue.complete(), None);
        assert_eq!(queue.outstanding(), 0);
    }
}
