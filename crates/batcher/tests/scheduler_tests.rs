use alloy_primitives::{Address, B256, address};
use anyhow::{Result, bail};
use async_trait::async_trait;
use opflow_batcher::{BatchScheduler, BatchTransport, FlushMode, FlushPolicy};
use opflow_core::SignedOperation;
use opflow_core::test_utils::{create_settlement_event, create_test_operation};
use opflow_settlement::test_utils::MockEventSource;
use opflow_settlement::{SettlementCorrelator, SettlementError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

const SETTLEMENT: Address = address!("2000000000000000000000000000000000000002");
const CHAIN_ID: u64 = 8453;

#[derive(Clone, Default)]
struct MockTransport {
    batches: Arc<Mutex<Vec<Vec<SignedOperation>>>>,
    fail: Arc<AtomicBool>,
    delay: Option<Duration>,
}

impl MockTransport {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    fn batches(&self) -> Vec<Vec<SignedOperation>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl BatchTransport for MockTransport {
    async fn submit_batch(&self, batch: &[SignedOperation]) -> Result<B256> {
        if let Some(delay) = self.delay {
            sleep(delay).await;
        }
        if self.fail.load(Ordering::Acquire) {
            bail!("transport unavailable");
        }
        let mut batches = self.batches.lock().unwrap();
        batches.push(batch.to_vec());
        Ok(B256::with_last_byte(batches.len() as u8))
    }
}

fn scheduler(
    transport: MockTransport,
    source: &Arc<MockEventSource>,
    policy: FlushPolicy,
) -> BatchScheduler<MockTransport, MockEventSource> {
    let correlator = SettlementCorrelator::new(source.clone(), SETTLEMENT);
    BatchScheduler::new(transport, correlator, policy, SETTLEMENT, CHAIN_ID)
}

#[tokio::test(start_paused = true)]
async fn tick_waits_for_size_and_idle() {
    let transport = MockTransport::default();
    let source = Arc::new(MockEventSource::new(100));
    let scheduler = scheduler(
        transport.clone(),
        &source,
        FlushPolicy::new(3, Duration::from_secs(5)),
    );

    let _h1 = scheduler.enqueue(create_test_operation(1, 1));
    let _h2 = scheduler.enqueue(create_test_operation(2, 1));
    assert_eq!(scheduler.tick().await.unwrap(), None);

    // Size bar met, but the queue is still fresh.
    let _h3 = scheduler.enqueue(create_test_operation(3, 1));
    assert_eq!(scheduler.tick().await.unwrap(), None);
    sleep(Duration::from_secs(1)).await;
    assert_eq!(scheduler.tick().await.unwrap(), None);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(scheduler.tick().await.unwrap(), Some(3));

    let batches = transport.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 3);
}

#[tokio::test(start_paused = true)]
async fn size_alone_never_flushes_a_growing_queue() {
    let transport = MockTransport::default();
    let source = Arc::new(MockEventSource::new(100));
    let scheduler = scheduler(
        transport.clone(),
        &source,
        FlushPolicy::new(2, Duration::from_secs(5)),
    );

    // Keep the queue fresh: re-enqueue within the idle window every time.
    let mut handles = Vec::new();
    for sequence in 1..=4u64 {
        handles.push(scheduler.enqueue(create_test_operation(1, sequence)));
        assert_eq!(scheduler.tick().await.unwrap(), None);
        sleep(Duration::from_secs(2)).await;
    }
    assert!(transport.batches().is_empty());

    sleep(Duration::from_secs(5)).await;
    assert_eq!(scheduler.tick().await.unwrap(), Some(1));
}

#[tokio::test(start_paused = true)]
async fn or_mode_flushes_on_whichever_comes_first() {
    let transport = MockTransport::default();
    let source = Arc::new(MockEventSource::new(100));
    let scheduler = scheduler(
        transport.clone(),
        &source,
        FlushPolicy::new(3, Duration::from_secs(5)).with_mode(FlushMode::SizeOrIdle),
    );

    // Size first: three fresh operations flush immediately.
    let _h1 = scheduler.enqueue(create_test_operation(1, 1));
    let _h2 = scheduler.enqueue(create_test_operation(2, 1));
    let _h3 = scheduler.enqueue(create_test_operation(3, 1));
    assert_eq!(scheduler.tick().await.unwrap(), Some(3));

    // Idle first: a single operation flushes once the window elapses.
    let _h4 = scheduler.enqueue(create_test_operation(4, 1));
    assert_eq!(scheduler.tick().await.unwrap(), None);
    sleep(Duration::from_secs(5)).await;
    assert_eq!(scheduler.tick().await.unwrap(), Some(1));
}

#[tokio::test(start_paused = true)]
async fn flush_now_bypasses_idle_but_not_size() {
    let transport = MockTransport::default();
    let source = Arc::new(MockEventSource::new(100));
    let scheduler = scheduler(
        transport.clone(),
        &source,
        FlushPolicy::new(3, Duration::from_secs(3600)),
    );

    let _h1 = scheduler.enqueue(create_test_operation(1, 1));
    let _h2 = scheduler.enqueue(create_test_operation(2, 1));
    assert_eq!(scheduler.flush_now().await.unwrap(), None);

    let _h3 = scheduler.enqueue(create_test_operation(3, 1));
    assert_eq!(scheduler.flush_now().await.unwrap(), Some(3));
    assert_eq!(transport.batches().len(), 1);
}

#[tokio::test]
async fn concurrent_flushes_submit_exactly_once() {
    let transport = MockTransport::with_delay(Duration::from_millis(100));
    let source = Arc::new(MockEventSource::new(100));
    let scheduler = scheduler(
        transport.clone(),
        &source,
        FlushPolicy::new(1, Duration::ZERO),
    );

    let _h1 = scheduler.enqueue(create_test_operation(1, 1));
    let _h2 = scheduler.enqueue(create_test_operation(2, 1));

    let (first, second) = tokio::join!(scheduler.flush_now(), scheduler.flush_now());
    let mut sizes = [first.unwrap(), second.unwrap()];
    sizes.sort();

    // One submission carries both operations; the loser observes a no-op.
    assert_eq!(sizes, [None, Some(2)]);
    assert_eq!(transport.batches().len(), 1);
}

#[tokio::test]
async fn transport_failure_propagates_and_drops_batch() {
    let transport = MockTransport::default();
    transport.fail.store(true, Ordering::Release);
    let source = Arc::new(MockEventSource::new(100));
    let scheduler = scheduler(
        transport.clone(),
        &source,
        FlushPolicy::new(1, Duration::ZERO),
    );

    let handle = scheduler.enqueue(create_test_operation(1, 1));
    let err = scheduler.flush_now().await.unwrap_err();
    assert!(err.to_string().contains("transport unavailable"));

    // Drained operations are not re-enqueued; retry means enqueueing again.
    assert_eq!(scheduler.pending_count(), 0);
    assert_eq!(scheduler.flush_now().await.unwrap(), None);

    // The pending settlement is live (hand-off precedes the submit); the
    // caller decides when to give up.
    handle.cancel();
    assert_eq!(handle.wait().await, Err(SettlementError::Cancelled));
}

#[tokio::test]
async fn batch_settlement_resolves_each_waiter() {
    let transport = MockTransport::default();
    let source = Arc::new(MockEventSource::new(100));
    let scheduler = scheduler(
        transport.clone(),
        &source,
        FlushPolicy::new(1, Duration::ZERO),
    );

    let ops: Vec<_> = (1..=3u8).map(|tag| create_test_operation(tag, 1)).collect();
    let handles: Vec<_> = ops.iter().map(|op| scheduler.enqueue(op.clone())).collect();

    assert_eq!(scheduler.flush_now().await.unwrap(), Some(3));
    while source.subscriber_count() < 3 {
        tokio::task::yield_now().await;
    }

    // Events arrive in reverse submission order; matching is per-key.
    for op in ops.iter().rev() {
        source.emit(create_settlement_event(op.id(), true, 101));
    }

    for (handle, op) in handles.into_iter().zip(&ops) {
        let record = handle.wait().await.unwrap();
        assert_eq!(record.op_id, op.id());
        assert!(record.success);
        assert_eq!(record.op_hash, op.op_hash(&SETTLEMENT, CHAIN_ID));
    }
}

#[tokio::test(start_paused = true)]
async fn timer_drives_flushes() {
    let transport = MockTransport::default();
    let source = Arc::new(MockEventSource::new(100));
    let scheduler = scheduler(
        transport.clone(),
        &source,
        FlushPolicy::new(2, Duration::from_secs(1)),
    );

    let _h1 = scheduler.enqueue(create_test_operation(1, 1));
    let _h2 = scheduler.enqueue(create_test_operation(2, 1));

    scheduler.start_timer(Duration::from_millis(500));
    // Repeated ticks: first while fresh (no-op), then after the idle window.
    sleep(Duration::from_secs(3)).await;
    scheduler.stop_timer();

    let batches = transport.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 2);

    // Stopped timer no longer flushes.
    let _h3 = scheduler.enqueue(create_test_operation(3, 1));
    let _h4 = scheduler.enqueue(create_test_operation(4, 1));
    sleep(Duration::from_secs(3)).await;
    assert_eq!(transport.batches().len(), 1);
}

#[tokio::test]
async fn re_enqueueing_a_correlation_key_replaces_the_handle() {
    let transport = MockTransport::default();
    let source = Arc::new(MockEventSource::new(100));
    let scheduler = scheduler(
        transport.clone(),
        &source,
        FlushPolicy::new(1, Duration::ZERO),
    );

    let op = create_test_operation(1, 1);
    let old_handle = scheduler.enqueue(op.clone());
    let new_handle = scheduler.enqueue(op.clone());

    assert_eq!(old_handle.wait().await, Err(SettlementError::Abandoned));

    assert_eq!(scheduler.flush_now().await.unwrap(), Some(1));
    while source.subscriber_count() == 0 {
        tokio::task::yield_now().await;
    }
    source.emit(create_settlement_event(op.id(), true, 101));
    assert!(new_handle.wait().await.unwrap().success);
}
