use crate::CancellationToken;
use phasec_error::{PhaseRequest, ResolveError, ResolveResult};
use phasec_tree::{NodeId, ResolvePhase};
use rustc_hash::FxHashMap;
use std::{
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, ThreadId},
    time::Duration,
};

#[derive(Debug, Clone, Copy)]
struct LockOwner {
    thread: ThreadId,
    depth: usize,
    phase: ResolvePhase,
}

#[derive(Debug, Default)]
struct LockTable {
    owners: FxHashMap<NodeId, LockOwner>,
    /// Wait-for edges: the request each blocked thread is waiting on.
    waiting: FxHashMap<ThreadId, PhaseRequest>,
}

impl LockTable {
    /// Follows owner -> waited-for request edges starting at `me`. Returns the
    /// chain if it leads back to a node `me` owns.
    fn find_cycle(&self, me: ThreadId) -> Option<Vec<PhaseRequest>> {
        let start = *self.waiting.get(&me)?;
        let mut chain = vec![start];
        let mut current = start.node;
        loop {
            let owner = self.owners.get(&current)?;
            if owner.thread == me {
                chain.push(start);
                return Some(chain);
            }
            let next = *self.waiting.get(&owner.thread)?;
            chain.push(next);
            current = next.node;
            // a cycle among other threads; they will report it themselves
            if chain.len() > self.waiting.len() + 1 {
                return None;
            }
        }
    }
}

/// Per-declaration exclusive locks, reentrant for the owning thread.
#[derive(Debug)]
pub struct LockProvider {
    table: Mutex<LockTable>,
    released: Condvar,
    poll: Duration,
}

impl Default for LockProvider {
    fn default() -> Self {
        LockProvider::new(Duration::from_millis(10))
    }
}

impl LockProvider {
    /// `poll` bounds how long a waiter sleeps before rechecking cancellation.
    pub fn new(poll: Duration) -> LockProvider {
        LockProvider {
            table: Mutex::new(LockTable::default()),
            released: Condvar::new(),
            poll,
        }
    }

    // Lock bookkeeping stays consistent across panics: every mutation
    // completes before the guard is dropped.
    fn table(&self) -> MutexGuard<'_, LockTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` while holding the lock of `target`.
    pub fn with_lock<R>(
        &self,
        target: NodeId,
        phase: ResolvePhase,
        cancel: &CancellationToken,
        f: impl FnOnce() -> ResolveResult<R>,
    ) -> ResolveResult<R> {
        let _guard = self.acquire(target, phase, cancel)?;
        f()
    }

    /// Blocks until `target` is free or owned by this thread.
    ///
    /// Fails with [`ResolveError::CyclicDependency`] when waiting would close a
    /// cycle of threads waiting on each other, and with
    /// [`ResolveError::Cancelled`] when `cancel` fires while waiting.
    pub fn acquire(
        &self,
        target: NodeId,
        phase: ResolvePhase,
        cancel: &CancellationToken,
    ) -> ResolveResult<LockGuard<'_>> {
        let me = thread::current().id();
        let mut table = self.table();
        loop {
            match table.owners.get_mut(&target) {
                None => {
                    table.owners.insert(
                        target,
                        LockOwner {
                            thread: me,
                            depth: 1,
                            phase,
                        },
                    );
                    table.waiting.remove(&me);
                    break;
                }
                Some(owner) if owner.thread == me => {
                    owner.depth += 1;
                    break;
                }
                Some(owner) => {
                    let held = owner.phase;
                    if cancel.is_cancelled() {
                        table.waiting.remove(&me);
                        return Err(ResolveError::Cancelled {
                            node: target,
                            phase,
                        });
                    }
                    table.waiting.insert(
                        me,
                        PhaseRequest {
                            node: target,
                            phase,
                        },
                    );
                    if let Some(chain) = table.find_cycle(me) {
                        table.waiting.remove(&me);
                        tracing::warn!(node = target.index(), %phase, "lock cycle detected");
                        return Err(ResolveError::cycle(chain));
                    }
                    tracing::trace!(node = target.index(), %phase, %held, "waiting for lock");
                    table = self
                        .released
                        .wait_timeout(table, self.poll)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
        tracing::trace!(node = target.index(), %phase, "lock acquired");
        Ok(LockGuard {
            provider: self,
            target,
        })
    }

    pub fn is_locked(&self, target: NodeId) -> bool {
        self.table().owners.contains_key(&target)
    }

    /// Number of threads currently blocked on a lock.
    pub fn waiting_count(&self) -> usize {
        self.table().waiting.len()
    }

    fn release(&self, target: NodeId) {
        let mut table = self.table();
        let owner = table
            .owners
            .get_mut(&target)
            .expect("bug! releasing a lock that is not held");
        owner.depth -= 1;
        if owner.depth == 0 {
            table.owners.remove(&target);
            tracing::trace!(node = target.index(), "lock released");
        }
        drop(table);
        self.released.notify_all();
    }
}

/// Held lock; released on drop, on every exit path.
#[must_use]
pub struct LockGuard<'p> {
    provider: &'p LockProvider,
    target: NodeId,
}

impl LockGuard<'_> {
    pub fn target(&self) -> NodeId {
        self.target
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.provider.release(self.target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Barrier,
        atomic::{AtomicBool, Ordering},
    };

    const PHASE: ResolvePhase = ResolvePhase::Types;

    fn node(index: usize) -> NodeId {
        NodeId::new(index)
    }

    fn wait_for_waiters(provider: &LockProvider, count: usize) {
        while provider.waiting_count() < count {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_reentrant_for_same_thread() {
        let provider = LockProvider::default();
        let cancel = CancellationToken::new();
        let result = provider.with_lock(node(0), PHASE, &cancel, || {
            provider.with_lock(node(0), PHASE, &cancel, || Ok(7))
        });
        assert_eq!(result.unwrap(), 7);
        assert!(!provider.is_locked(node(0)));
    }

    #[test]
    fn test_released_on_error() {
        let provider = LockProvider::default();
        let cancel = CancellationToken::new();
        let result: ResolveResult<()> = provider.with_lock(node(0), PHASE, &cancel, || {
            Err(ResolveError::Fault {
                node: node(0),
                phase: PHASE,
                message: "boom".into(),
            })
        });
        assert!(result.is_err());
        assert!(!provider.is_locked(node(0)));
    }

    #[test]
    fn test_released_on_panic() {
        let provider = LockProvider::default();
        let cancel = CancellationToken::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = provider.with_lock(node(0), PHASE, &cancel, || -> ResolveResult<()> {
                panic!("boom")
            });
        }));
        assert!(result.is_err());
        assert!(!provider.is_locked(node(0)));
    }

    #[test]
    fn test_excludes_other_threads() {
        let provider = LockProvider::default();
        let inside = AtomicBool::new(false);
        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    let cancel = CancellationToken::new();
                    for _ in 0..50 {
                        provider
                            .with_lock(node(1), PHASE, &cancel, || {
                                assert!(!inside.swap(true, Ordering::SeqCst));
                                thread::yield_now();
                                inside.store(false, Ordering::SeqCst);
                                Ok(())
                            })
                            .unwrap();
                    }
                });
            }
        });
        assert!(!provider.is_locked(node(1)));
    }

    #[test]
    fn test_cancel_while_waiting() {
        let provider = LockProvider::new(Duration::from_millis(1));
        let held = Barrier::new(2);
        let done = Barrier::new(2);
        let cancel = CancellationToken::new();
        thread::scope(|scope| {
            scope.spawn(|| {
                let _guard = provider
                    .acquire(node(2), PHASE, &CancellationToken::new())
                    .unwrap();
                held.wait();
                done.wait();
            });
            held.wait();
            let waiter = scope.spawn(|| provider.acquire(node(2), PHASE, &cancel).map(|_| ()));
            wait_for_waiters(&provider, 1);
            cancel.cancel();
            let result = waiter.join().unwrap();
            assert!(matches!(result, Err(ResolveError::Cancelled { .. })));
            assert_eq!(provider.waiting_count(), 0);
            done.wait();
        });
    }

    #[test]
    fn test_cross_thread_cycle_is_reported() {
        let provider = LockProvider::default();
        let (a, b) = (node(10), node(11));
        let both_held = Barrier::new(2);
        thread::scope(|scope| {
            let first = scope.spawn(|| {
                let cancel = CancellationToken::new();
                let _a = provider.acquire(a, PHASE, &cancel)?;
                both_held.wait();
                let _b = provider.acquire(b, PHASE, &cancel)?;
                Ok::<_, ResolveError>(())
            });
            let second = scope.spawn(|| {
                let cancel = CancellationToken::new();
                let _b = provider.acquire(b, PHASE, &cancel)?;
                both_held.wait();
                wait_for_waiters(&provider, 1);
                let _a = provider.acquire(a, PHASE, &cancel)?;
                Ok::<_, ResolveError>(())
            });

            let second = second.join().unwrap();
            let Err(ResolveError::CyclicDependency { chain }) = second else {
                panic!("expected a cycle, got {second:?}");
            };
            let nodes: Vec<_> = chain.0.iter().map(|request| request.node).collect();
            assert_eq!(nodes, vec![a, b, a]);
            assert!(first.join().unwrap().is_ok());
        });
        assert_eq!(provider.waiting_count(), 0);
    }
}
