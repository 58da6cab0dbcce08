//! The per-node actor of the tree.
//!
//! A [`TreeNode`] owns one element, a logical-removal flag, and up to two
//! child references. It processes its mailbox one message at a time:
//! operations are resolved here or forwarded by comparison, and a
//! `CopyTo` starts the node's part of the compaction protocol. A node is
//! spawned lazily by the first insert that needs its slot and terminates
//! only at the end of a copy, so the mailbox channel is the node's whole
//! lifecycle.

use std::collections::VecDeque;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::message::{
    CoordinatorMessage, CoordinatorRef, NodeMessage, NodeRef, Operation, OperationReply, Position,
    Requester,
};

/// Id carried by the insert a node issues for itself during a copy. It is
/// acknowledged into the node's own mailbox and never reaches a client,
/// so it shares no namespace with client-chosen ids.
const COPY_INSERT_ID: u64 = 0;

/// Where a node reports its own termination at the end of a copy.
#[derive(Debug, Clone)]
enum Parent {
    /// A regular node: notify the spawning node, identifying the slot
    /// this node occupies under it.
    Node { link: NodeRef, slot: Position },
    /// The root: its parent for lifecycle purposes is the coordinator.
    Coordinator(CoordinatorRef),
}

enum Phase {
    Normal,
    Copying {
        target: NodeRef,
        awaiting_left: bool,
        awaiting_right: bool,
        insert_confirmed: bool,
        stash: VecDeque<Operation>,
    },
}

/// One node of the distributed binary search tree.
pub struct TreeNode {
    elem: i64,
    removed: bool,
    sentinel: bool,
    left: Option<NodeRef>,
    right: Option<NodeRef>,
    parent: Parent,
    self_ref: NodeRef,
    inbox: mpsc::UnboundedReceiver<NodeMessage>,
    phase: Phase,
}

impl TreeNode {
    /// Spawns a sentinel root: permanently removed, never matched by a
    /// real query, existing purely to start routing. Both the initial
    /// root and every compaction target start this way.
    pub fn spawn_root(coordinator: CoordinatorRef) -> NodeRef {
        Self::spawn(0, true, true, Parent::Coordinator(coordinator))
    }

    fn spawn_child(elem: i64, link: NodeRef, slot: Position) -> NodeRef {
        Self::spawn(elem, false, false, Parent::Node { link, slot })
    }

    fn spawn(elem: i64, removed: bool, sentinel: bool, parent: Parent) -> NodeRef {
        let (tx, rx) = mpsc::unbounded_channel();
        let node = TreeNode {
            elem,
            removed,
            sentinel,
            left: None,
            right: None,
            parent,
            self_ref: tx.clone(),
            inbox: rx,
            phase: Phase::Normal,
        };
        tokio::spawn(node.run());
        tx
    }

    async fn run(mut self) {
        while let Some(msg) = self.inbox.recv().await {
            if self.handle(msg) {
                break;
            }
        }
        // Dropping the receiver turns any message still addressed to this
        // node into a failed send, which senders discard.
    }

    /// Processes one message. Returns `true` once the node has finished
    /// its copy and must terminate.
    fn handle(&mut self, msg: NodeMessage) -> bool {
        match msg {
            NodeMessage::Op(op) => {
                self.handle_op(op);
                false
            }
            NodeMessage::CopyTo { target } => self.start_copy(target),
            NodeMessage::CopyFinished { slot } => self.on_child_copied(slot),
            NodeMessage::InsertAck => self.on_insert_ack(),
        }
    }

    fn handle_op(&mut self, op: Operation) {
        if let Phase::Copying { stash, .. } = &mut self.phase {
            // Not reachable through the coordinator (it buffers traffic
            // during a compaction), but never drop an operation: hold it
            // and pass it on to the new tree when this node winds down.
            stash.push_back(op);
            return;
        }

        match op {
            Operation::Contains {
                requester,
                id,
                elem,
            } => {
                if elem == self.elem && !self.sentinel {
                    requester.deliver(OperationReply::ContainsResult {
                        id,
                        result: !self.removed,
                    });
                } else if let Some(child) = self.child(self.position(elem)) {
                    let _ = child.send(NodeMessage::Op(Operation::Contains {
                        requester,
                        id,
                        elem,
                    }));
                } else {
                    requester.deliver(OperationReply::ContainsResult { id, result: false });
                }
            }
            Operation::Insert {
                requester,
                id,
                elem,
            } => {
                if elem == self.elem && !self.sentinel {
                    self.removed = false;
                    requester.deliver(OperationReply::OperationFinished { id });
                } else {
                    let slot = self.position(elem);
                    match self.child(slot) {
                        Some(child) => {
                            let _ = child.send(NodeMessage::Op(Operation::Insert {
                                requester,
                                id,
                                elem,
                            }));
                        }
                        None => {
                            trace!(elem, ?slot, under = self.elem, "spawning node");
                            let child =
                                TreeNode::spawn_child(elem, self.self_ref.clone(), slot);
                            self.set_child(slot, child);
                            requester.deliver(OperationReply::OperationFinished { id });
                        }
                    }
                }
            }
            Operation::Remove {
                requester,
                id,
                elem,
            } => {
                if elem == self.elem && !self.sentinel {
                    self.removed = true;
                    requester.deliver(OperationReply::OperationFinished { id });
                } else if let Some(child) = self.child(self.position(elem)) {
                    let _ = child.send(NodeMessage::Op(Operation::Remove {
                        requester,
                        id,
                        elem,
                    }));
                } else {
                    // Removing an absent element is a no-op success.
                    requester.deliver(OperationReply::OperationFinished { id });
                }
            }
        }
    }

    /// Starts this node's part of a compaction: re-insert the element
    /// into the new tree (unless logically removed), fan the copy request
    /// out to the children, and wait for both to confirm.
    fn start_copy(&mut self, target: NodeRef) -> bool {
        if matches!(self.phase, Phase::Copying { .. }) {
            debug!(elem = self.elem, "already copying, ignoring copy request");
            return false;
        }

        let insert_confirmed = if self.removed {
            // Nothing to carry over; the insert counts as confirmed.
            true
        } else {
            let _ = target.send(NodeMessage::Op(Operation::Insert {
                requester: Requester::Node(self.self_ref.clone()),
                id: COPY_INSERT_ID,
                elem: self.elem,
            }));
            false
        };

        for slot in [Position::Left, Position::Right] {
            if let Some(child) = self.child(slot) {
                let _ = child.send(NodeMessage::CopyTo {
                    target: target.clone(),
                });
            }
        }

        self.phase = Phase::Copying {
            target,
            awaiting_left: self.left.is_some(),
            awaiting_right: self.right.is_some(),
            insert_confirmed,
            stash: VecDeque::new(),
        };
        self.try_finish_copy()
    }

    fn on_child_copied(&mut self, slot: Position) -> bool {
        // The child is gone either way; drop the reference.
        self.set_child_ref(slot, None);
        match &mut self.phase {
            Phase::Copying {
                awaiting_left,
                awaiting_right,
                ..
            } => {
                match slot {
                    Position::Left => *awaiting_left = false,
                    Position::Right => *awaiting_right = false,
                }
                self.try_finish_copy()
            }
            Phase::Normal => {
                warn!(elem = self.elem, ?slot, "child copy report outside a copy, dropping");
                false
            }
        }
    }

    fn on_insert_ack(&mut self) -> bool {
        match &mut self.phase {
            Phase::Copying {
                insert_confirmed, ..
            } => {
                *insert_confirmed = true;
                self.try_finish_copy()
            }
            Phase::Normal => {
                warn!(elem = self.elem, "insert ack outside a copy, dropping");
                false
            }
        }
    }

    /// If the self-insert is confirmed and every child has reported in,
    /// flush anything stashed, notify the parent, and signal termination.
    fn try_finish_copy(&mut self) -> bool {
        match &self.phase {
            Phase::Copying {
                awaiting_left: false,
                awaiting_right: false,
                insert_confirmed: true,
                ..
            } => {}
            _ => return false,
        }

        if let Phase::Copying {
            target, mut stash, ..
        } = std::mem::replace(&mut self.phase, Phase::Normal)
        {
            while let Some(op) = stash.pop_front() {
                let _ = target.send(NodeMessage::Op(op));
            }
        }

        trace!(elem = self.elem, "subtree copied, terminating");
        match &self.parent {
            Parent::Node { link, slot } => {
                let _ = link.send(NodeMessage::CopyFinished { slot: *slot });
            }
            Parent::Coordinator(coordinator) => {
                let _ = coordinator.send(CoordinatorMessage::CopyFinished);
            }
        }
        true
    }

    fn position(&self, elem: i64) -> Position {
        // Only meaningful once equality with this node has been ruled
        // out; the sentinel never rules it out and always routes.
        if elem > self.elem {
            Position::Right
        } else {
            Position::Left
        }
    }

    fn child(&self, slot: Position) -> Option<&NodeRef> {
        match slot {
            Position::Left => self.left.as_ref(),
            Position::Right => self.right.as_ref(),
        }
    }

    fn set_child(&mut self, slot: Position, child: NodeRef) {
        self.set_child_ref(slot, Some(child));
    }

    fn set_child_ref(&mut self, slot: Position, child: Option<NodeRef>) {
        match slot {
            Position::Left => self.left = child,
            Position::Right => self.right = child,
        }
    }
}
