use dashmap::DashMap;
use std::collections::HashMap;

use super::{ConnectionId, GroupBackend, GroupName, MemberHandle};
use crate::ws::protocol::ServerEvent;

/// In-process group registry.
///
/// Each group's member map lives in one DashMap entry, so join, leave and
/// broadcast on the same group are serialized by the entry's shard lock while
/// unrelated groups proceed independently. Delivery only enqueues onto each
/// member's unbounded channel; a slow socket never stalls the fan-out.
/// Empty groups are removed.
#[derive(Debug, Default)]
pub struct InProcessRegistry {
    groups: DashMap<GroupName, HashMap<ConnectionId, MemberHandle>>,
}

impl InProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of non-empty groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

impl GroupBackend for InProcessRegistry {
    fn join(&self, group: &GroupName, member: MemberHandle) {
        let mut members = self.groups.entry(group.clone()).or_default();
        members.insert(member.id(), member);
        tracing::debug!(group = %group, members = members.len(), "Member joined group");
    }

    fn leave(&self, group: &GroupName, member: &MemberHandle) {
        let id = member.id();
        self.groups.remove_if_mut(group, |_, members| {
            members.remove(&id);
            members.is_empty()
        });
        tracing::debug!(group = %group, connection_id = %id, "Member left group");
    }

    fn broadcast(&self, group: &GroupName, event: &ServerEvent) {
        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(group = %group, error = %e, "Failed to encode event");
                return;
            }
        };

        // Deliver under the entry lock so the membership snapshot and the
        // per-group delivery order match the order calls were processed in.
        self.groups.remove_if_mut(group, |_, members| {
            members.retain(|_, member| match member.deliver(frame.clone()) {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(group = %group, error = %e, "Pruning dead member");
                    false
                }
            });
            members.is_empty()
        });

        tracing::trace!(group = %group, event = event.kind(), "Broadcast");
    }

    fn member_count(&self, group: &GroupName) -> usize {
        self.groups.get(group).map(|m| m.len()).unwrap_or(0)
    }
}
