//! Offset bookkeeping for the fetch loop.

/// What the fetch loop should do with a freshly fetched batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BatchDisposition {
    Forward,
    Skip,
}

/// Tracks the next identifier to request and the one-shot skip-pending gate.
///
/// Owned exclusively by the fetch loop for the duration of one run.
#[derive(Debug)]
pub(crate) struct OffsetTracker {
    next: i64,
    skip_gate: bool,
}

impl OffsetTracker {
    pub(crate) fn new(skip_pending: bool) -> Self {
        Self {
            next: 0,
            skip_gate: skip_pending,
        }
    }

    /// Offset to send with the next `get_updates` call.
    pub(crate) fn current(&self) -> i64 {
        self.next
    }

    /// Applies a successfully fetched batch: advances past the last identifier and
    /// consumes the skip-pending gate. The gate closes on the first successful fetch
    /// even when that batch is empty.
    pub(crate) fn observe<U>(
        &mut self,
        batch: &[U],
        update_id: impl Fn(&U) -> i64,
    ) -> BatchDisposition {
        if let Some(last) = batch.last() {
            self.advance_past(update_id(last));
        }

        if self.skip_gate {
            self.skip_gate = false;
            return BatchDisposition::Skip;
        }

        BatchDisposition::Forward
    }

    fn advance_past(&mut self, last_id: i64) {
        let candidate = last_id.saturating_add(1);
        if candidate < self.next {
            tracing::warn!(
                last_id,
                offset = self.next,
                "update source returned an identifier behind the current offset; keeping offset"
            );
            return;
        }
        self.next = candidate;
    }
}
