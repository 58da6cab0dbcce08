use tokio::sync::mpsc;

/// Where replies to a client are delivered.
pub type ClientRef = mpsc::UnboundedSender<OperationReply>;

/// A tree node's mailbox.
pub type NodeRef = mpsc::UnboundedSender<NodeMessage>;

/// The coordinator's mailbox.
pub type CoordinatorRef = mpsc::UnboundedSender<CoordinatorMessage>;

/// Child slot of a node. Left holds elements `<=` the node's element,
/// right holds strictly greater ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Left,
    Right,
}

/// Who asked for an operation and therefore where its reply goes.
///
/// Splitting clients from nodes keeps the internal self-insert
/// confirmation out of the client id namespace entirely: a node can never
/// receive a client's reply and a client can never receive a copy
/// acknowledgement, whatever ids either side picks.
#[derive(Debug, Clone)]
pub enum Requester {
    Client(ClientRef),
    Node(NodeRef),
}

impl Requester {
    /// Delivers a reply to whoever issued the operation. A requester that
    /// has gone away is not an error; the reply is simply dropped.
    pub(crate) fn deliver(&self, reply: OperationReply) {
        match self {
            Requester::Client(tx) => {
                let _ = tx.send(reply);
            }
            Requester::Node(tx) => {
                let _ = tx.send(NodeMessage::InsertAck);
            }
        }
    }
}

/// A set operation. `id` is chosen by the caller and echoed verbatim in
/// the reply; uniqueness is the caller's responsibility.
#[derive(Debug, Clone)]
pub enum Operation {
    Insert {
        requester: Requester,
        id: u64,
        elem: i64,
    },
    Contains {
        requester: Requester,
        id: u64,
        elem: i64,
    },
    Remove {
        requester: Requester,
        id: u64,
        elem: i64,
    },
}

/// Reply to a single [`Operation`], sent directly from the resolving node
/// to the original requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationReply {
    ContainsResult { id: u64, result: bool },
    OperationFinished { id: u64 },
}

impl OperationReply {
    /// The id of the operation this reply answers.
    pub fn id(&self) -> u64 {
        match self {
            OperationReply::ContainsResult { id, .. } => *id,
            OperationReply::OperationFinished { id } => *id,
        }
    }
}

/// Everything a tree node can receive.
#[derive(Debug)]
pub enum NodeMessage {
    /// A client operation routed down the tree.
    Op(Operation),
    /// Copy yourself and your subtree into the tree rooted at `target`.
    CopyTo { target: NodeRef },
    /// The child in `slot` finished copying its subtree and terminated.
    CopyFinished { slot: Position },
    /// The self-insert issued during a copy has been applied.
    InsertAck,
}

/// Everything the coordinator can receive.
#[derive(Debug)]
pub enum CoordinatorMessage {
    /// A client operation to route (or buffer, mid-compaction).
    Op(Operation),
    /// Request to compact the tree. Ignored while one is already running.
    Gc,
    /// The old root finished copying the whole tree.
    CopyFinished,
}
