//! A mutable set of integers implemented as a tree of actors.
//!
//! Every node of a binary search tree runs as its own Tokio task with a
//! private mailbox; there is no shared mutable state anywhere. Clients
//! submit `Insert`, `Contains`, and `Remove` operations through a
//! [`coordinator::SetHandle`] and receive asynchronous replies correlated
//! by a caller-chosen operation id. Removal is logical (a node only flips
//! a flag), so a background compaction rebuilds the tree into a copy that
//! contains only live elements — without ever blocking or dropping
//! concurrently-arriving operations.
//!
//! Each module focuses on a concrete responsibility:
//!
//! - [`message`] defines the message contracts between clients, the
//!   coordinator, and tree nodes.
//! - [`node`] is the per-node actor: BST routing, logical removal, and
//!   the copy half of the compaction protocol.
//! - [`coordinator`] owns the current root, buffers traffic while a
//!   compaction runs, and swaps roots when the copy completes.
//! - [`client`] wraps the raw message plumbing in an awaitable
//!   one-operation-at-a-time API.
//! - [`cli`] parses the demo binary's arguments.
//!
//! Integration tests use this crate directly to exercise the operation
//! protocol and compaction under concurrent traffic.

pub mod cli;
pub mod client;
pub mod coordinator;
pub mod message;
pub mod node;
