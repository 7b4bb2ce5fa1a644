//! Fixed-size worker pool
//!
//! Work items are split into chunks and pushed onto a shared queue; each
//! worker thread runs its initializer once, then drains chunks until the queue
//! is empty. Results stream back over a channel in completion order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::unbounded;
use log::debug;
use parking_lot::Mutex;

use crate::core::error::{Error, Result};

/// Chunk size used to hand items to workers: `len / workers`, at least 1
pub fn chunk_size(items: usize, workers: usize) -> usize {
    (items / workers.max(1)).max(1)
}

/// Pool of OS threads with a single shared initialization lock
pub struct WorkerPool {
    workers: usize,
    init_lock: Mutex<()>,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            init_lock: Mutex::new(()),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `work` over every item
    ///
    /// `init` is called exactly once per spawned worker, with the worker index
    /// and the pool's lock, before that worker processes anything; its return
    /// value is the worker's private context. `observe` sees every result on
    /// the calling thread as it arrives.
    ///
    /// Returns one result per item, unordered. The first `Err` from `init` or
    /// `work` stops workers from taking further items and is returned once all
    /// threads have finished.
    pub fn run<T, C, R, I, W, O>(
        &self,
        items: Vec<T>,
        init: I,
        work: W,
        mut observe: O,
    ) -> Result<Vec<R>>
    where
        T: Send,
        R: Send,
        I: Fn(usize, &Mutex<()>) -> Result<C> + Sync,
        W: Fn(&mut C, T) -> Result<R> + Sync,
        O: FnMut(&R),
    {
        let total = items.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let size = chunk_size(total, self.workers);
        let (job_tx, job_rx) = unbounded::<Vec<T>>();
        let mut chunks = 0;
        let mut iter = items.into_iter().peekable();
        while iter.peek().is_some() {
            let chunk: Vec<T> = iter.by_ref().take(size).collect();
            // Receiver is alive for the whole function
            let _ = job_tx.send(chunk);
            chunks += 1;
        }
        drop(job_tx);

        // Idle workers would only pay for initialization
        let spawned = self.workers.min(chunks).max(1);
        debug!("Dispatching {total} items in {chunks} chunks of {size} over {spawned} workers");

        let (result_tx, result_rx) = unbounded::<Result<R>>();
        let abort = AtomicBool::new(false);

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(spawned);

            for index in 0..spawned {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let (init, work, abort, lock) = (&init, &work, &abort, &self.init_lock);

                handles.push(scope.spawn(move || {
                    let mut context = match init(index, lock) {
                        Ok(context) => context,
                        Err(e) => {
                            abort.store(true, Ordering::SeqCst);
                            let _ = result_tx.send(Err(e));
                            return;
                        }
                    };

                    while let Ok(chunk) = job_rx.recv() {
                        for item in chunk {
                            if abort.load(Ordering::SeqCst) {
                                return;
                            }
                            let result = work(&mut context, item);
                            let failed = result.is_err();
                            if failed {
                                abort.store(true, Ordering::SeqCst);
                            }
                            if result_tx.send(result).is_err() || failed {
                                return;
                            }
                        }
                    }
                }));
            }
            drop(result_tx);

            let mut results = Vec::with_capacity(total);
            let mut first_error = None;
            for result in result_rx.iter() {
                match result {
                    Ok(value) => {
                        observe(&value);
                        results.push(value);
                    }
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            }

            let mut panicked = false;
            for handle in handles {
                panicked |= handle.join().is_err();
            }

            match first_error {
                Some(e) => Err(e),
                None if panicked => Err(Error::WorkerPanicked),
                None => Ok(results),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_chunk_size() {
        assert_eq!(chunk_size(100, 4), 25);
        assert_eq!(chunk_size(3, 8), 1);
        assert_eq!(chunk_size(10, 3), 3);
        assert_eq!(chunk_size(5, 0), 5);
    }

    #[test]
    fn test_returns_one_result_per_item() {
        for workers in [1, 2, 3, 8, 32] {
            let pool = WorkerPool::new(workers);
            let items: Vec<u64> = (0..97).collect();
            let mut results = pool
                .run(items, |_, _| Ok(()), |_, x| Ok(x * 2), |_| {})
                .unwrap();

            assert_eq!(results.len(), 97, "workers = {workers}");
            results.sort_unstable();
            assert_eq!(results, (0..97).map(|x| x * 2).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_init_runs_once_per_worker_before_work() {
        let inits = AtomicUsize::new(0);
        let pool = WorkerPool::new(4);

        let results = pool
            .run(
                (0..40).collect::<Vec<u32>>(),
                |index, _| {
                    inits.fetch_add(1, Ordering::SeqCst);
                    Ok((index, 0usize))
                },
                |ctx, _| {
                    ctx.1 += 1;
                    Ok(ctx.0)
                },
                |_| {},
            )
            .unwrap();

        assert_eq!(inits.load(Ordering::SeqCst), 4);
        assert_eq!(results.len(), 40);
        assert!(results.iter().all(|&w| w < 4));
    }

    #[test]
    fn test_spawns_no_more_workers_than_chunks() {
        let inits = AtomicUsize::new(0);
        let pool = WorkerPool::new(16);

        pool.run(
            vec![1, 2, 3],
            |_, _| {
                inits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            |_, x| Ok(x),
            |_| {},
        )
        .unwrap();

        assert_eq!(inits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_init_lock_serializes_initialization() {
        let active = AtomicUsize::new(0);
        let overlaps = AtomicUsize::new(0);
        let pool = WorkerPool::new(6);

        pool.run(
            (0..60).collect::<Vec<u32>>(),
            |_, lock| {
                let _guard = lock.lock();
                if active.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                thread::sleep(Duration::from_millis(5));
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            },
            |_, x| Ok(x),
            |_| {},
        )
        .unwrap();

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_observer_sees_every_result() {
        let pool = WorkerPool::new(3);
        let mut seen = 0;
        pool.run((0..25).collect::<Vec<u8>>(), |_, _| Ok(()), |_, x| Ok(x), |_| seen += 1)
            .unwrap();
        assert_eq!(seen, 25);
    }

    #[test]
    fn test_work_error_aborts_run() {
        let pool = WorkerPool::new(2);
        let result = pool.run(
            (0..1000).collect::<Vec<u32>>(),
            |_, _| Ok(()),
            |_, x| {
                if x == 10 {
                    Err(Error::GenerationExhausted { attempts: 5 })
                } else {
                    Ok(x)
                }
            },
            |_| {},
        );

        assert!(matches!(result, Err(Error::GenerationExhausted { attempts: 5 })));
    }

    #[test]
    fn test_init_error_is_returned() {
        let pool = WorkerPool::new(3);
        let result: Result<Vec<u32>> = pool.run(
            (0..9).collect::<Vec<u32>>(),
            |index, _| {
                if index == 1 {
                    Err(Error::EngineInit("boom".to_string()))
                } else {
                    Ok(())
                }
            },
            |_, x| Ok(x),
            |_| {},
        );

        assert!(matches!(result, Err(Error::EngineInit(_))));
    }

    #[test]
    fn test_empty_input() {
        let pool = WorkerPool::new(4);
        let results: Vec<u8> = pool
            .run(Vec::<u8>::new(), |_, _| Ok(()), |_, x| Ok(x), |_| {})
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_worker_panic_is_reported() {
        let pool = WorkerPool::new(2);
        let result: Result<Vec<u32>> = pool.run(
            (0..4).collect::<Vec<u32>>(),
            |_, _| Ok(()),
            |_, x| {
                if x == 2 {
                    panic!("worker failure");
                }
                Ok(x)
            },
            |_| {},
        );

        assert!(matches!(result, Err(Error::WorkerPanicked)));
    }
}
