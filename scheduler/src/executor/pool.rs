use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::{AsyncRunnable, Executor, StolenJob, SyncRunnable};
use crate::scheduling::{ScheduleNodeId, Scheduler};

struct Job {
    item: Box<dyn SyncRunnable>,
    node: ScheduleNodeId,
    scheduler: Arc<Scheduler>,
}

/// The reference executor: a `tokio` multi-thread runtime for async
/// (LLM) tasks, and a fixed-size `crossbeam-channel`-backed thread
/// pool for synchronous (python agent) tasks.
pub struct ThreadPoolExecutor {
    runtime: Mutex<Option<tokio::runtime::Runtime>>,
    job_tx: Mutex<Option<Sender<Job>>>,
    job_rx: Receiver<Job>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
}

impl ThreadPoolExecutor {
    /// Builds an executor with `thread_pool_size` worker threads
    /// backing the synchronous task pool (`config.thread_pool_size`
    /// in the ambient configuration).
    pub fn new(thread_pool_size: usize) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("failed to start tokio runtime for the event loop");

        let (tx, rx) = unbounded::<Job>();
        let pending = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::with_capacity(thread_pool_size);
        for worker_id in 0..thread_pool_size {
            let rx = rx.clone();
            let pending = pending.clone();
            let handle = std::thread::Builder::new()
                .name(format!("agentflow-sync-worker-{worker_id}"))
                .spawn(move || {
                    for job in rx.iter() {
                        pending.fetch_sub(1, Ordering::SeqCst);
                        job.item.run(job.node, job.scheduler);
                    }
                })
                .expect("failed to spawn synchronous task worker thread");
            workers.push(handle);
        }

        ThreadPoolExecutor {
            runtime: Mutex::new(Some(runtime)),
            job_tx: Mutex::new(Some(tx)),
            job_rx: rx,
            workers: Mutex::new(workers),
            pending,
        }
    }
}

impl Executor for ThreadPoolExecutor {
    fn queue_item(&self, item: Box<dyn AsyncRunnable>, node: ScheduleNodeId, scheduler: Arc<Scheduler>) {
        let guard = self.runtime.lock().unwrap();
        let runtime = guard.as_ref().expect("queue_item called after shutdown");
        runtime.spawn(async move {
            item.run(node, scheduler).await;
        });
    }

    fn thread_queue_item(&self, item: Box<dyn SyncRunnable>, node: ScheduleNodeId, scheduler: Arc<Scheduler>) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let job = Job { item, node, scheduler };
        let guard = self.job_tx.lock().unwrap();
        let tx = guard.as_ref().expect("thread_queue_item called after shutdown");
        tx.send(job).expect("synchronous worker pool disconnected");
    }

    fn try_steal(&self) -> Option<StolenJob> {
        match self.job_rx.try_recv() {
            Ok(job) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                Some((job.item, job.node, job.scheduler))
            }
            Err(_) => None,
        }
    }

    fn pending_python_task_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn shutdown(&self) {
        self.job_tx.lock().unwrap().take();
        for handle in self.workers.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
        if let Some(runtime) = self.runtime.lock().unwrap().take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI64;

    struct Increment(Arc<AtomicI64>);
    impl SyncRunnable for Increment {
        fn run(self: Box<Self>, _node: ScheduleNodeId, _scheduler: Arc<Scheduler>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn thread_pool_runs_submitted_jobs() {
        let executor = ThreadPoolExecutor::new(2);
        let counter = Arc::new(AtomicI64::new(0));
        let scheduler = Scheduler::new_root_for_test();
        for _ in 0..10 {
            executor.thread_queue_item(
                Box::new(Increment(counter.clone())),
                ScheduleNodeId::new_for_test(1),
                scheduler.clone(),
            );
        }
        executor.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn stealing_runs_the_job_exactly_once() {
        let executor = ThreadPoolExecutor::new(0);
        let counter = Arc::new(AtomicI64::new(0));
        let scheduler = Scheduler::new_root_for_test();
        executor.thread_queue_item(
            Box::new(Increment(counter.clone())),
            ScheduleNodeId::new_for_test(1),
            scheduler,
        );
        assert_eq!(executor.pending_python_task_count(), 1);
        let (item, node, scheduler) = executor.try_steal().expect("job available to steal");
        item.run(node, scheduler);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(executor.try_steal().is_none());
        executor.shutdown();
    }
}
