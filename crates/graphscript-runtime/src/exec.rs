//! Serial operation executors.
//!
//! Each controller category (run, terminate, connect/disconnect) gets its
//! own executor: a bounded queue drained by one worker task, so operations
//! in a category run in submission order while categories stay independent.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::{mpsc, oneshot};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Maximum operations waiting in one category.
const MAX_PENDING_OPS: usize = 32;

/// Runs submitted futures one at a time, in order.
pub struct SerialExecutor {
    name: &'static str,
    tx: mpsc::Sender<Job>,
}

impl SerialExecutor {
    pub fn new(name: &'static str) -> Self {
        let (tx, mut rx) = mpsc::channel::<Job>(MAX_PENDING_OPS);
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
            }
            log::debug!("{} worker stopped", name);
        });
        Self { name, tx }
    }

    /// Queue an operation, returning a receiver for its result.
    ///
    /// If the category queue is full the operation is dropped and the
    /// receiver resolves with an error.
    pub fn submit<T, F>(&self, fut: F) -> oneshot::Receiver<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let _ = result_tx.send(fut.await);
        });
        if self.tx.try_send(job).is_err() {
            log::warn!("{} operation queue full; request dropped", self.name);
        }
        result_rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test]
    async fn test_operations_run_in_submission_order() {
        let ex = SerialExecutor::new("test");
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        let first = ex.submit(async move {
            // even with a delay, the second operation must wait
            tokio::time::sleep(Duration::from_millis(50)).await;
            o.lock().unwrap().push(1);
        });
        let o = order.clone();
        let second = ex.submit(async move {
            o.lock().unwrap().push(2);
        });

        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_result_is_delivered() {
        let ex = SerialExecutor::new("test");
        let rx = ex.submit(async { 40 + 2 });
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_categories_are_independent() {
        let slow = SerialExecutor::new("slow");
        let fast = SerialExecutor::new("fast");

        let _blocked = slow.submit(async {
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        let rx = fast.submit(async { "done" });
        let result = tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, "done");
    }
}
