//! An awaitable, one-operation-at-a-time view of the set.
//!
//! The raw [`SetHandle`](crate::coordinator::SetHandle) API is
//! fire-and-forget; callers that just want `insert(5).await` can use
//! [`SetClient`] instead. It owns a private reply channel and an id
//! counter, keeps exactly one operation outstanding, and checks that the
//! reply it receives answers the operation it sent.

use anyhow::{bail, ensure, Context, Result};
use tokio::sync::mpsc;

use crate::coordinator::SetHandle;
use crate::message::{ClientRef, OperationReply};

/// Sequential client over a running set.
pub struct SetClient {
    handle: SetHandle,
    reply_ref: ClientRef,
    replies: mpsc::UnboundedReceiver<OperationReply>,
    next_id: u64,
}

impl SetClient {
    pub fn new(handle: SetHandle) -> Self {
        let (reply_ref, replies) = mpsc::unbounded_channel();
        Self {
            handle,
            reply_ref,
            replies,
            next_id: 1,
        }
    }

    /// Adds `elem` to the set and waits for the acknowledgement.
    pub async fn insert(&mut self, elem: i64) -> Result<()> {
        let id = self.next_id();
        self.handle.insert(&self.reply_ref, id, elem)?;
        match self.await_reply(id).await? {
            OperationReply::OperationFinished { .. } => Ok(()),
            other => bail!("unexpected reply to insert: {other:?}"),
        }
    }

    /// Returns whether `elem` is currently in the set.
    pub async fn contains(&mut self, elem: i64) -> Result<bool> {
        let id = self.next_id();
        self.handle.contains(&self.reply_ref, id, elem)?;
        match self.await_reply(id).await? {
            OperationReply::ContainsResult { result, .. } => Ok(result),
            other => bail!("unexpected reply to contains: {other:?}"),
        }
    }

    /// Removes `elem` from the set and waits for the acknowledgement.
    pub async fn remove(&mut self, elem: i64) -> Result<()> {
        let id = self.next_id();
        self.handle.remove(&self.reply_ref, id, elem)?;
        match self.await_reply(id).await? {
            OperationReply::OperationFinished { .. } => Ok(()),
            other => bail!("unexpected reply to remove: {other:?}"),
        }
    }

    /// Requests a compaction. Returns as soon as the request is enqueued;
    /// compaction runs in the background and is invisible to later calls.
    pub fn gc(&self) -> Result<()> {
        self.handle.trigger_gc()
    }

    /// The underlying fire-and-forget handle.
    pub fn handle(&self) -> &SetHandle {
        &self.handle
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    async fn await_reply(&mut self, id: u64) -> Result<OperationReply> {
        let reply = self
            .replies
            .recv()
            .await
            .context("reply channel closed while waiting")?;
        // With a single outstanding operation the next reply must be ours.
        ensure!(
            reply.id() == id,
            "reply correlation mismatch: submitted {id}, answered {}",
            reply.id()
        );
        Ok(reply)
    }
}
