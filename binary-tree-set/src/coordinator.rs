//! The stable entry point in front of the tree.
//!
//! The [`SetCoordinator`] owns the current root reference and is the only
//! entity whose address clients ever hold. In normal operation it does
//! nothing but forward; replies travel directly from the resolving node
//! back to the requester. When a compaction is triggered it spawns a
//! fresh sentinel root, tells the old root to copy itself into it, and
//! buffers every operation that arrives until the copy completes, at
//! which point the buffer is replayed in order against the new root and
//! the roots are swapped.

use std::collections::VecDeque;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::message::{
    ClientRef, CoordinatorMessage, CoordinatorRef, NodeMessage, NodeRef, Operation, Requester,
};
use crate::node::TreeNode;

/// Clonable handle for submitting operations to a running set.
///
/// Operations are fire-and-forget: each call enqueues a message and
/// returns immediately, and the reply arrives later on the requester's
/// channel, correlated by `id`. The only error a handle can produce is a
/// coordinator that has gone away.
#[derive(Clone)]
pub struct SetHandle {
    coordinator: CoordinatorRef,
}

impl SetHandle {
    /// Adds `elem` to the set. Replies `OperationFinished { id }`.
    pub fn insert(&self, requester: &ClientRef, id: u64, elem: i64) -> Result<()> {
        self.submit(Operation::Insert {
            requester: Requester::Client(requester.clone()),
            id,
            elem,
        })
    }

    /// Asks whether `elem` is in the set. Replies `ContainsResult { id, result }`.
    pub fn contains(&self, requester: &ClientRef, id: u64, elem: i64) -> Result<()> {
        self.submit(Operation::Contains {
            requester: Requester::Client(requester.clone()),
            id,
            elem,
        })
    }

    /// Removes `elem` from the set. Replies `OperationFinished { id }`
    /// whether or not the element was present.
    pub fn remove(&self, requester: &ClientRef, id: u64, elem: i64) -> Result<()> {
        self.submit(Operation::Remove {
            requester: Requester::Client(requester.clone()),
            id,
            elem,
        })
    }

    /// Submits an already-built operation.
    pub fn submit(&self, op: Operation) -> Result<()> {
        self.coordinator
            .send(CoordinatorMessage::Op(op))
            .context("set coordinator is gone")
    }

    /// Requests a compaction of the tree. A request that lands while a
    /// compaction is already running is ignored.
    pub fn trigger_gc(&self) -> Result<()> {
        self.coordinator
            .send(CoordinatorMessage::Gc)
            .context("set coordinator is gone")
    }
}

struct Compaction {
    new_root: NodeRef,
    buffered: VecDeque<Operation>,
}

/// The coordinator actor. Spawn one per set with [`SetCoordinator::spawn`].
pub struct SetCoordinator {
    inbox: mpsc::UnboundedReceiver<CoordinatorMessage>,
    self_ref: CoordinatorRef,
    root: NodeRef,
    compaction: Option<Compaction>,
}

impl SetCoordinator {
    /// Spawns a coordinator with an empty tree and returns the handle
    /// clients use to reach it.
    pub fn spawn() -> SetHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let root = TreeNode::spawn_root(tx.clone());
        let coordinator = SetCoordinator {
            inbox: rx,
            self_ref: tx.clone(),
            root,
            compaction: None,
        };
        tokio::spawn(coordinator.run());
        SetHandle { coordinator: tx }
    }

    async fn run(mut self) {
        while let Some(msg) = self.inbox.recv().await {
            match msg {
                CoordinatorMessage::Op(op) => self.handle_op(op),
                CoordinatorMessage::Gc => self.start_compaction(),
                CoordinatorMessage::CopyFinished => self.finish_compaction(),
            }
        }
    }

    fn handle_op(&mut self, op: Operation) {
        match &mut self.compaction {
            None => {
                let _ = self.root.send(NodeMessage::Op(op));
            }
            // Delayed, not dropped: replayed in arrival order once the
            // new tree is ready.
            Some(compaction) => compaction.buffered.push_back(op),
        }
    }

    fn start_compaction(&mut self) {
        if self.compaction.is_some() {
            debug!("compaction already in progress, ignoring trigger");
            return;
        }
        let new_root = TreeNode::spawn_root(self.self_ref.clone());
        let _ = self.root.send(NodeMessage::CopyTo {
            target: new_root.clone(),
        });
        info!("compaction started");
        self.compaction = Some(Compaction {
            new_root,
            buffered: VecDeque::new(),
        });
    }

    fn finish_compaction(&mut self) {
        let Some(Compaction {
            new_root,
            mut buffered,
        }) = self.compaction.take()
        else {
            warn!("copy completion outside a compaction, dropping");
            return;
        };

        let replayed = buffered.len();
        while let Some(op) = buffered.pop_front() {
            let _ = new_root.send(NodeMessage::Op(op));
        }
        self.root = new_root;
        info!(replayed, "compaction finished, root swapped");
    }
}
