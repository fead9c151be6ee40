use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

struct CycleSlot {
    pid: u32,
    done: oneshot::Sender<Result<u32>>,
}

// Single worker slot: the driver holds at most one pending completion and
// joins it before dispatching again, so cycles can never overlap and each
// cycle stops exactly the replica the previous one started. A cycle that
// outlasts the interval delays the next tick instead of piling up.
pub async fn run<F, Fut, S>(
    interval: Duration,
    first_pid: u32,
    mut cycle: F,
    shutdown: S,
) -> Result<()>
where
    F: FnMut(u32) -> Fut + Send + 'static,
    Fut: Future<Output = Result<u32>> + Send + 'static,
    S: Future<Output = ()>,
{
    let (slot_tx, mut slot_rx) = mpsc::channel::<CycleSlot>(1);
    let worker = tokio::spawn(async move {
        while let Some(slot) = slot_rx.recv().await {
            let outcome = cycle(slot.pid).await;
            let _ = slot.done.send(outcome);
        }
    });

    tokio::pin!(shutdown);
    let mut last_pid = first_pid;
    let mut pending: Option<oneshot::Receiver<Result<u32>>> = None;
    let mut stopping = false;
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("shutdown requested");
                stopping = true;
            }
            _ = tokio::time::sleep(interval) => {}
        }
        if let Some(mut done) = pending.take() {
            // a shutdown arriving while the join blocks is still honored:
            // the in-flight cycle is drained, no new one is dispatched
            let outcome = loop {
                if stopping {
                    break (&mut done).await;
                }
                tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        info!("shutdown requested");
                        stopping = true;
                    }
                    outcome = &mut done => break outcome,
                }
            };
            match outcome {
                Ok(Ok(pid)) => last_pid = pid,
                // the stale pid stays: the next tick retries against
                // whatever replica is still recorded
                Ok(Err(err)) => error!("backup cycle failed: {err:#}"),
                Err(_) => break,
            }
        }
        if stopping {
            break;
        }
        let (done_tx, done_rx) = oneshot::channel();
        let slot = CycleSlot {
            pid: last_pid,
            done: done_tx,
        };
        if slot_tx.send(slot).await.is_err() {
            break;
        }
        pending = Some(done_rx);
    }

    drop(slot_tx);
    drop(pending);
    worker.await?;
    info!("scheduler stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    const TICK: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn slow_cycles_run_strictly_sequentially_and_thread_pids() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let active = Arc::new(AtomicBool::new(false));
        let overlapped = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(Notify::new());

        let cycle = {
            let seen = seen.clone();
            let active = active.clone();
            let overlapped = overlapped.clone();
            let stop = stop.clone();
            move |pid: u32| {
                let seen = seen.clone();
                let active = active.clone();
                let overlapped = overlapped.clone();
                let stop = stop.clone();
                async move {
                    if active.swap(true, Ordering::SeqCst) {
                        overlapped.store(true, Ordering::SeqCst);
                    }
                    seen.lock().unwrap().push(pid);
                    // three times the tick interval
                    tokio::time::sleep(3 * TICK).await;
                    active.store(false, Ordering::SeqCst);
                    if seen.lock().unwrap().len() == 3 {
                        stop.notify_one();
                    }
                    Ok::<_, anyhow::Error>(pid + 1)
                }
            }
        };
        let shutdown = {
            let stop = stop.clone();
            async move { stop.notified().await }
        };

        run(TICK, 100, cycle, shutdown).await.unwrap();

        assert!(!overlapped.load(Ordering::SeqCst));
        assert_eq!(*seen.lock().unwrap(), vec![100, 101, 102]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_cycle_retries_with_the_previous_pid() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(Notify::new());

        let cycle = {
            let seen = seen.clone();
            let stop = stop.clone();
            move |pid: u32| {
                let seen = seen.clone();
                let stop = stop.clone();
                async move {
                    seen.lock().unwrap().push(pid);
                    let count = seen.lock().unwrap().len();
                    if count == 4 {
                        stop.notify_one();
                    }
                    if count == 2 {
                        Err(anyhow!("backup command failed"))
                    } else {
                        Ok(pid + 1)
                    }
                }
            }
        };
        let shutdown = {
            let stop = stop.clone();
            async move { stop.notified().await }
        };

        run(TICK, 7, cycle, shutdown).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![7, 8, 8, 9]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_before_the_first_tick_dispatches_nothing() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let cycle = {
            let seen = seen.clone();
            move |pid: u32| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(pid);
                    Ok::<_, anyhow::Error>(pid + 1)
                }
            }
        };

        run(TICK, 1, cycle, async {}).await.unwrap();

        assert!(seen.lock().unwrap().is_empty());
    }
}
