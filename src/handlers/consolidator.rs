//! Message consolidation.
//!
//! Merges the message lists of successful execution groups into the single
//! batch published for a block. Failed and cancelled groups contribute nothing.

use crate::bus::OutboundMessage;

use super::error::HandlerError;

/// How one execution group ended.
#[derive(Debug)]
pub enum GroupOutcome {
    /// Every event was handled; messages are in handling order.
    Completed(Vec<OutboundMessage>),
    /// An event failed permanently or exhausted its retries.
    Failed {
        event_index: u32,
        error: HandlerError,
    },
    /// Stopped between events because the block was cancelled.
    Cancelled { handled_events: usize },
}

#[derive(Debug)]
pub struct GroupResult {
    pub group_id: usize,
    pub event_count: usize,
    pub outcome: GroupOutcome,
}

/// A group whose messages were withheld.
#[derive(Debug)]
pub struct GroupFailure {
    pub group_id: usize,
    pub event_index: u32,
    pub error: HandlerError,
}

/// The ordered outbound batch for one block.
#[derive(Debug, Default)]
pub struct ConsolidatedBatch {
    pub messages: Vec<OutboundMessage>,
    pub completed_groups: usize,
    pub failed_groups: Vec<GroupFailure>,
    pub cancelled_groups: usize,
}

/// Collects group results in completion order and emits them in group order.
#[derive(Debug, Default)]
pub struct MessageConsolidator {
    results: Vec<GroupResult>,
}

impl MessageConsolidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, result: GroupResult) {
        self.results.push(result);
    }

    pub fn finish(mut self) -> ConsolidatedBatch {
        self.results.sort_by_key(|r| r.group_id);

        let mut batch = ConsolidatedBatch::default();
        for result in self.results {
            match result.outcome {
                GroupOutcome::Completed(messages) => {
                    batch.messages.extend(messages);
                    batch.completed_groups += 1;
                }
                GroupOutcome::Failed { event_index, error } => {
                    batch.failed_groups.push(GroupFailure {
                        group_id: result.group_id,
                        event_index,
                        error,
                    });
                }
                GroupOutcome::Cancelled { .. } => batch.cancelled_groups += 1,
            }
        }
        batch
    }
}
