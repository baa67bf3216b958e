//! The ordered buffer of deferred write operations.

use serde_json::Value;

/// One deferred index or delete call.
///
/// Each variant carries the full payload of the intercepted call, so
/// replay reproduces it exactly (including the `safe` recovery flag on
/// deletes).
#[derive(Debug, Clone, PartialEq)]
pub enum PendingOp {
    /// A deferred document write.
    Index {
        /// Document type tag.
        doc_type: String,
        /// Document identifier.
        id: String,
        /// Document body.
        body: Value,
        /// Optional parent/routing key.
        parent: Option<String>,
    },
    /// A deferred document delete.
    Delete {
        /// Document type tag.
        doc_type: String,
        /// Document identifier.
        id: String,
        /// Optional routing key.
        routing: Option<String>,
        /// Treat a missing document as success on replay.
        safe: bool,
    },
}

/// Ordered queue of pending operations for one client.
///
/// Insertion order is preserved on replay. Savepoints snapshot the whole
/// queue; restoring replaces the live queue with the snapshot.
#[derive(Debug, Default)]
pub struct WriteBuffer {
    ops: Vec<PendingOp>,
}

impl WriteBuffer {
    /// Append an operation.
    pub fn push(&mut self, op: PendingOp) {
        self.ops.push(op);
    }

    /// Remove and return the oldest operation.
    pub fn pop_front(&mut self) -> Option<PendingOp> {
        if self.ops.is_empty() {
            None
        } else {
            Some(self.ops.remove(0))
        }
    }

    /// Copy the current queue.
    pub fn snapshot(&self) -> Vec<PendingOp> {
        self.ops.clone()
    }

    /// Replace the queue with a snapshot.
    pub fn restore(&mut self, snapshot: Vec<PendingOp>) {
        self.ops = snapshot;
    }

    /// Discard all pending operations.
    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// Number of pending operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
