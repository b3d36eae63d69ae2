//! Counter Store
//!
//! This example walks a counter model through every execution strategy
//! and a plan with a concurrent barrier step.
//!
//! Key concepts:
//! - Actions reduce a copy of the model; the store publishes it atomically
//! - Strategies decide where a transaction runs
//! - Middleware sees each transaction start and finish
//! - Plans run steps in order; concurrent steps wait for all members
//!
//! Run with: cargo run --example counter

use std::sync::Arc;
use std::time::Duration;
use storekit::group::{concurrent, sequence, PlanNode};
use storekit::transaction::{ActionError, TransactionContext};
use storekit::{run_all, Action, Model, Store, Strategy, TransactionInfo};

#[derive(Clone, Debug, Default)]
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

/// Refuses to take the counter below zero.
struct Decrement;

impl Action for Decrement {
    type Model = Counter;

    fn reduce(&self, ctx: &TransactionContext<'_, Counter>) -> Result<(), ActionError> {
        ctx.try_reduce_model(|m| {
            if m.count == 0 {
                return Err(ActionError::rejected("counter is already zero"));
            }
            m.count -= 1;
            Ok(())
        })
    }
}

#[tokio::main]
async fn main() {
    println!("=== Counter Store Example ===\n");

    let store = Store::new(Counter::default()).unwrap();
    store.register(Arc::new(|t: &TransactionInfo| {
        println!("  [{}] {} ({:?})", t.state, t.action, t.strategy);
    }));
    store.subscribe(|m: &Counter| {
        println!("  observer: count={} flag={}", m.count, m.flag);
    });

    println!("Sync increment:");
    store.transaction(Increment).on(Strategy::Sync).run().unwrap();
    println!("count is {}\n", store.read().count);

    println!("Two async increments:");
    for handle in run_all(&store, [Increment, Increment], Strategy::Async).unwrap() {
        handle.wait().await.unwrap();
    }
    println!("count is {}\n", store.read().count);

    println!("Serial and detached:");
    let serial = store
        .transaction(Increment)
        .on(Strategy::serial("counter"))
        .run()
        .unwrap();
    let detached = store
        .transaction(Increment)
        .on(Strategy::Detached)
        .run()
        .unwrap();
    serial.wait().await.unwrap();
    detached.wait().await.unwrap();
    println!("count is {}\n", store.read().count);

    println!("Throttled duplicates:");
    for _ in 0..3 {
        store
            .transaction(Increment)
            .on(Strategy::Sync)
            .throttle(Duration::from_secs(1))
            .run()
            .unwrap();
    }
    println!("count is {}\n", store.read().count);

    println!("Plan with a barrier:");
    let plan = sequence([
        PlanNode::action(SetFlag(true)),
        concurrent([PlanNode::action(Increment), PlanNode::action(Increment)]),
        PlanNode::action(Decrement),
    ]);
    let report = plan.run(&store).await;
    println!(
        "plan finished: {} steps, success={}",
        report.steps.len(),
        report.is_success()
    );

    println!("\nA rejected action:");
    let empty = Store::new(Counter::default()).unwrap();
    let outcome = empty
        .transaction(Decrement)
        .on(Strategy::Async)
        .run()
        .unwrap()
        .wait()
        .await;
    println!("outcome: {:?}", outcome);

    // give the observer thread a moment to drain
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("\nFinal model: {:?}", store.read());
    println!("\n=== Example Complete ===");
}
