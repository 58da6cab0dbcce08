//! Integration tests for compaction running under live traffic.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Context, Result};
use binary_tree_set::{
    client::SetClient,
    coordinator::SetCoordinator,
    message::{ClientRef, OperationReply},
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::{sync::mpsc, time::timeout};

const REPLY_TIMEOUT: Duration = Duration::from_secs(1);

fn reply_channel() -> (ClientRef, mpsc::UnboundedReceiver<OperationReply>) {
    mpsc::unbounded_channel()
}

async fn next_reply(rx: &mut mpsc::UnboundedReceiver<OperationReply>) -> Result<OperationReply> {
    timeout(REPLY_TIMEOUT, rx.recv())
        .await
        .context("timed out waiting for a reply")?
        .context("reply channel closed")
}

#[tokio::test]
async fn compaction_preserves_live_elements() -> Result<()> {
    let handle = SetCoordinator::spawn();
    let (requester, mut replies) = reply_channel();

    for (id, elem) in [(1, 5), (2, 3), (3, 8)] {
        handle.insert(&requester, id, elem)?;
        next_reply(&mut replies).await?;
    }

    handle.trigger_gc()?;
    handle.contains(&requester, 9, 3)?;
    assert_eq!(
        next_reply(&mut replies).await?,
        OperationReply::ContainsResult {
            id: 9,
            result: true
        }
    );

    Ok(())
}

#[tokio::test]
async fn compaction_drops_logically_removed_elements() -> Result<()> {
    let handle = SetCoordinator::spawn();
    let (requester, mut replies) = reply_channel();

    handle.insert(&requester, 1, 5)?;
    next_reply(&mut replies).await?;
    handle.remove(&requester, 2, 5)?;
    next_reply(&mut replies).await?;

    handle.trigger_gc()?;
    handle.contains(&requester, 9, 5)?;
    assert_eq!(
        next_reply(&mut replies).await?,
        OperationReply::ContainsResult {
            id: 9,
            result: false
        }
    );

    // The element can come back after the rebuild.
    handle.insert(&requester, 10, 5)?;
    next_reply(&mut replies).await?;
    handle.contains(&requester, 11, 5)?;
    assert_eq!(
        next_reply(&mut replies).await?,
        OperationReply::ContainsResult {
            id: 11,
            result: true
        }
    );

    Ok(())
}

#[tokio::test]
async fn operation_submitted_mid_compaction_still_completes() -> Result<()> {
    let handle = SetCoordinator::spawn();
    let (requester, mut replies) = reply_channel();

    let mut id = 0;
    for elem in [50, 25, 75, 12, 37, 62, 87, 6, 18, 31, 43] {
        id += 1;
        handle.insert(&requester, id, elem)?;
        next_reply(&mut replies).await?;
    }

    // Submit before the copy can possibly have finished.
    handle.trigger_gc()?;
    handle.insert(&requester, 100, 9)?;
    assert_eq!(
        next_reply(&mut replies).await?,
        OperationReply::OperationFinished { id: 100 }
    );

    handle.contains(&requester, 101, 9)?;
    assert_eq!(
        next_reply(&mut replies).await?,
        OperationReply::ContainsResult {
            id: 101,
            result: true
        }
    );

    Ok(())
}

#[tokio::test]
async fn operations_buffered_during_compaction_keep_their_order() -> Result<()> {
    let handle = SetCoordinator::spawn();
    let (requester, mut replies) = reply_channel();

    handle.insert(&requester, 1, 7)?;
    next_reply(&mut replies).await?;

    // These all target the same element, so they follow the same path
    // through the tree and their replies must come back in order.
    handle.trigger_gc()?;
    handle.remove(&requester, 2, 7)?;
    handle.insert(&requester, 3, 7)?;
    handle.remove(&requester, 4, 7)?;

    for expected in [2, 3, 4] {
        assert_eq!(
            next_reply(&mut replies).await?,
            OperationReply::OperationFinished { id: expected }
        );
    }

    handle.contains(&requester, 5, 7)?;
    assert_eq!(
        next_reply(&mut replies).await?,
        OperationReply::ContainsResult {
            id: 5,
            result: false
        }
    );

    Ok(())
}

#[tokio::test]
async fn no_operation_is_lost_across_interleaved_compactions() -> Result<()> {
    let handle = SetCoordinator::spawn();
    let (requester, mut replies) = reply_channel();

    let total = 200u64;
    for id in 1..=total {
        match id % 4 {
            0 => handle.contains(&requester, id, (id % 23) as i64)?,
            3 => handle.remove(&requester, id, (id % 23) as i64)?,
            _ => handle.insert(&requester, id, (id % 23) as i64)?,
        }
        if id % 10 == 0 {
            handle.trigger_gc()?;
        }
    }

    let mut seen = BTreeSet::new();
    for _ in 0..total {
        let reply = next_reply(&mut replies).await?;
        assert!(seen.insert(reply.id()), "duplicate reply for {}", reply.id());
    }
    assert_eq!(seen, (1..=total).collect::<BTreeSet<_>>());

    Ok(())
}

#[tokio::test]
async fn repeated_triggers_run_a_single_compaction() -> Result<()> {
    let mut client = SetClient::new(SetCoordinator::spawn());

    for elem in [10, 4, 16, 2, 8] {
        client.insert(elem).await?;
    }
    client.remove(4).await?;

    // A second (and third) trigger while the first copy is in flight is
    // suppressed, not queued; the set must stay coherent regardless.
    client.gc()?;
    client.gc()?;
    client.gc()?;

    for (elem, expected) in [(10, true), (4, false), (16, true), (2, true), (8, true)] {
        assert_eq!(client.contains(elem).await?, expected, "element {elem}");
    }

    Ok(())
}

#[tokio::test]
async fn randomized_workload_is_transparent_to_compaction() -> Result<()> {
    let mut client = SetClient::new(SetCoordinator::spawn());
    let mut oracle = BTreeSet::new();
    let mut rng = StdRng::seed_from_u64(0xB57);

    for step in 1..=600usize {
        let elem = rng.gen_range(0..50);
        match rng.gen_range(0..3) {
            0 => {
                client.insert(elem).await?;
                oracle.insert(elem);
            }
            1 => {
                client.remove(elem).await?;
                oracle.remove(&elem);
            }
            _ => {
                assert_eq!(
                    client.contains(elem).await?,
                    oracle.contains(&elem),
                    "membership of {elem} diverged at step {step}"
                );
            }
        }
        if step % 7 == 0 {
            client.gc()?;
        }
    }

    for elem in 0..50 {
        assert_eq!(
            client.contains(elem).await?,
            oracle.contains(&elem),
            "final membership of {elem} diverged"
        );
    }

    Ok(())
}
