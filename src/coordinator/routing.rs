//! Routing of inbound envelopes inside the coordinator

use crate::messages::{Envelope, Message, Role};
use crate::store::Mutation;

/// Represents how an inbound envelope should be handled
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingDecision {
    /// Only resets the idle timer
    KeepAlive,
    /// Push the current snapshot to the tab's observers, without mutating
    SnapshotRequest,
    /// Apply to the tab's store, then fan out
    Mutate(Mutation),
    /// Forward unmodified to the connection registered for this role on the same tab
    Forward(Role),
    /// Addressed to the coordinator but meaningless there
    Unroutable,
}

/// Determine how to route an inbound envelope
pub fn determine_routing(envelope: &Envelope) -> RoutingDecision {
    if envelope.msg == Message::KeepAlivePing {
        return RoutingDecision::KeepAlive;
    }

    if envelope.to != Role::Coordinator {
        return RoutingDecision::Forward(envelope.to);
    }

    if envelope.msg == Message::SnapshotRequest {
        return RoutingDecision::SnapshotRequest;
    }

    match Mutation::from_message(&envelope.msg) {
        Some(mutation) => RoutingDecision::Mutate(mutation),
        None => RoutingDecision::Unroutable,
    }
}
