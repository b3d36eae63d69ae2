//! End-to-end scenarios across stores, strategies and plans.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use storekit::group::{concurrent, sequence, PlanNode};
use storekit::store::{InlineExecutor, MainExecutor, TracingMiddleware};
use storekit::transaction::{ActionError, TransactionContext};
use storekit::{
    run_all, Action, ActionId, Model, Store, Strategy, TransactionInfo, TransactionState,
};

#[derive(Clone, Debug, Default, PartialEq)]
struct Counter {
    count: i64,
    flag: bool,
}

impl Model for Counter {}

struct Increment;

impl Action for Increment {
    type Model = Counter;

    fn reduce(&self, ctx: &TransactionContext<'_, Counter>) -> Result<(), ActionError> {
        ctx.reduce_model(|m| m.count += 1);
        Ok(())
    }
}

struct SetFlag(bool);

impl Action for SetFlag {
    type Model = Counter;

    fn reduce(&self, ctx: &TransactionContext<'_, Counter>) -> Result<(), ActionError> {
        ctx.reduce_model(|m| m.flag = self.0);
        Ok(())
    }
}

struct ReadCount(Arc<Mutex<Option<i64>>>);

impl Action for ReadCount {
    type Model = Counter;

    fn reduce(&self, ctx: &TransactionContext<'_, Counter>) -> Result<(), ActionError> {
        *self.0.lock().unwrap() = Some(ctx.read().count);
        Ok(())
    }
}

/// Increments after sleeping, so overlapping work is likely.
struct SlowIncrement(Duration);

impl Action for SlowIncrement {
    type Model = Counter;

    fn id(&self) -> ActionId {
        ActionId::new("slow-increment")
    }

    fn reduce(&self, ctx: &TransactionContext<'_, Counter>) -> Result<(), ActionError> {
        thread::sleep(self.0);
        ctx.reduce_model(|m| m.count += 1);
        Ok(())
    }
}

/// Records its tag, in execution order.
struct Record {
    tag: usize,
    log: Arc<Mutex<Vec<usize>>>,
}

impl Action for Record {
    type Model = Counter;

    fn reduce(&self, _ctx: &TransactionContext<'_, Counter>) -> Result<(), ActionError> {
        self.log.lock().unwrap().push(self.tag);
        Ok(())
    }
}

fn counter_store() -> Store<Counter> {
    Store::builder()
        .initial(Counter::default())
        .executor(Arc::new(InlineExecutor))
        .middleware(Arc::new(TracingMiddleware))
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn counter_walkthrough() {
    let store = counter_store();

    store.transaction(Increment).on(Strategy::Sync).run().unwrap();
    assert_eq!(store.read().count, 1);

    let handles = run_all(&store, [Increment, Increment], Strategy::Async).unwrap();
    for handle in handles {
        handle.wait().await.unwrap();
    }
    assert_eq!(store.read().count, 3);

    let observed = Arc::new(Mutex::new(None));
    let plan = sequence([
        PlanNode::action(SetFlag(true)),
        concurrent([PlanNode::action(Increment), PlanNode::action(Increment)]),
        PlanNode::action(ReadCount(Arc::clone(&observed))),
    ]);

    let report = plan.run(&store).await;

    assert!(report.is_success());
    assert_eq!(report.steps.len(), 4);
    assert_eq!(*observed.lock().unwrap(), Some(5));
    assert_eq!(
        *store.read(),
        Counter {
            count: 5,
            flag: true
        }
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn barrier_waits_for_every_member() {
    let store = counter_store();

    for round in 1..=10 {
        let before = store.read().count;
        let observed = Arc::new(Mutex::new(None));
        let plan = sequence([
            concurrent([
                PlanNode::action(SlowIncrement(Duration::from_millis(5))),
                PlanNode::single(store.transaction(Increment).on(Strategy::Detached)),
                PlanNode::single(store.transaction(Increment).on(Strategy::serial("barrier"))),
            ]),
            PlanNode::action(ReadCount(Arc::clone(&observed))),
        ]);

        let report = plan.run(&store).await;

        assert!(report.is_success(), "round {round}");
        assert_eq!(*observed.lock().unwrap(), Some(before + 3), "round {round}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn serial_queues_are_fifo_and_independent() {
    let store = counter_store();
    let log_a = Arc::new(Mutex::new(Vec::new()));
    let log_b = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for tag in 0..50 {
        handles.push(
            store
                .transaction(Record {
                    tag,
                    log: Arc::clone(&log_a),
                })
                .on(Strategy::serial("a"))
                .run()
                .unwrap(),
        );
        handles.push(
            store
                .transaction(Record {
                    tag,
                    log: Arc::clone(&log_b),
                })
                .on(Strategy::serial("b"))
                .run()
                .unwrap(),
        );
    }
    for handle in handles {
        handle.wait().await.unwrap();
    }

    let expected: Vec<usize> = (0..50).collect();
    assert_eq!(*log_a.lock().unwrap(), expected);
    assert_eq!(*log_b.lock().unwrap(), expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn stores_sharing_a_queue_name_share_the_lane() {
    struct Busy {
        tag: (usize, usize),
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        log: Arc<Mutex<Vec<(usize, usize)>>>,
    }

    impl Action for Busy {
        type Model = Counter;

        fn reduce(&self, ctx: &TransactionContext<'_, Counter>) -> Result<(), ActionError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            self.log.lock().unwrap().push(self.tag);
            ctx.reduce_model(|m| m.count += 1);
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let stores = [
        Store::new(Counter::default()).unwrap(),
        Store::new(Counter::default()).unwrap(),
    ];
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    let mut expected = Vec::new();
    for round in 0..5 {
        for (index, store) in stores.iter().enumerate() {
            expected.push((index, round));
            handles.push(
                store
                    .transaction(Busy {
                        tag: (index, round),
                        active: Arc::clone(&active),
                        peak: Arc::clone(&peak),
                        log: Arc::clone(&log),
                    })
                    .on(Strategy::serial("shared-io"))
                    .run()
                    .unwrap(),
            );
        }
    }
    for handle in handles {
        handle.wait().await.unwrap();
    }

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(*log.lock().unwrap(), expected);
    assert_eq!(stores[0].read().count, 5);
    assert_eq!(stores[1].read().count, 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn a_blocked_queue_does_not_stall_another() {
    struct WaitFor(Mutex<mpsc::Receiver<()>>);

    impl Action for WaitFor {
        type Model = Counter;

        fn reduce(&self, ctx: &TransactionContext<'_, Counter>) -> Result<(), ActionError> {
            self.0
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5))
                .map_err(|_| ActionError::rejected("other queue never ran"))?;
            ctx.reduce_model(|m| m.flag = true);
            Ok(())
        }
    }

    struct Signal(mpsc::Sender<()>);

    impl Action for Signal {
        type Model = Counter;

        fn reduce(&self, ctx: &TransactionContext<'_, Counter>) -> Result<(), ActionError> {
            ctx.reduce_model(|m| m.count += 1);
            let _ = self.0.send(());
            Ok(())
        }
    }

    let store = counter_store();
    let (tx, rx) = mpsc::channel();

    let waiting = store
        .transaction(WaitFor(Mutex::new(rx)))
        .on(Strategy::serial("blocked"))
        .run()
        .unwrap();
    let signalling = store
        .transaction(Signal(tx))
        .on(Strategy::serial("free"))
        .run()
        .unwrap();

    assert_eq!(signalling.wait().await, Ok(()));
    assert_eq!(waiting.wait().await, Ok(()));
    assert_eq!(
        *store.read(),
        Counter {
            count: 1,
            flag: true
        }
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn throttle_admits_exactly_one_run() {
    let store = counter_store();
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    store.register(Arc::new(move |t: &TransactionInfo| {
        sink.lock().unwrap().push(t.state);
    }));

    let (tx, rx) = tokio::sync::oneshot::channel();
    let first = store
        .transaction(SlowIncrement(Duration::from_millis(50)))
        .on(Strategy::Async)
        .throttle(Duration::from_secs(60))
        .run()
        .unwrap();
    let second = store
        .transaction(SlowIncrement(Duration::from_millis(50)))
        .on(Strategy::Async)
        .throttle(Duration::from_secs(60))
        .run_with(move |outcome| {
            let _ = tx.send(outcome.clone());
        })
        .unwrap();

    assert_eq!(first.wait().await, Ok(()));
    assert_eq!(second.wait().await, Ok(()));
    assert_eq!(rx.await.unwrap(), Ok(()));
    assert_eq!(store.read().count, 1);
    assert_eq!(
        *states.lock().unwrap(),
        vec![TransactionState::Running, TransactionState::Completed]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn throttle_is_keyed_by_action() {
    let store = counter_store();

    store
        .transaction(SlowIncrement(Duration::ZERO))
        .on(Strategy::Sync)
        .throttle(Duration::from_secs(60))
        .run()
        .unwrap();
    store
        .transaction(Increment)
        .on(Strategy::Sync)
        .throttle(Duration::from_secs(60))
        .run()
        .unwrap();

    assert_eq!(store.read().count, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn observers_are_delivered_on_the_main_executor() {
    let executor = MainExecutor::spawn("scenario-observers").unwrap();
    let store = Store::builder()
        .initial(Counter::default())
        .executor(Arc::new(executor.clone()))
        .build()
        .unwrap();
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let probe = executor.clone();
    store.subscribe(move |m: &Counter| {
        let _ = tx.lock().unwrap().send((m.count, probe.is_current()));
    });

    let handles = run_all(&store, [Increment, Increment, Increment], Strategy::Async).unwrap();
    for handle in handles {
        handle.wait().await.unwrap();
    }

    let mut deliveries = Vec::new();
    while let Ok(delivery) = rx.recv_timeout(Duration::from_secs(5)) {
        deliveries.push(delivery);
        if delivery.0 == 3 {
            break;
        }
    }

    assert!(!deliveries.is_empty());
    assert!(deliveries.iter().all(|(_, on_main)| *on_main));
    assert_eq!(deliveries.last().map(|(count, _)| *count), Some(3));
}

#[tokio::test(flavor = "multi_thread")]
async fn one_plan_targets_any_store() {
    let first = counter_store();
    let second = counter_store();
    second.mutate(None, |m| m.count = 100);

    let plan = || {
        sequence([
            PlanNode::action(Increment),
            concurrent([PlanNode::action(Increment), PlanNode::action(SetFlag(true))]),
        ])
    };

    assert!(plan().run(&first).await.is_success());
    assert!(plan().run(&second).await.is_success());

    assert_eq!(first.read().count, 2);
    assert_eq!(second.read().count, 102);
}
