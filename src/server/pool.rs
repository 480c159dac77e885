//! Bounded pool of handler units.
//!
//! At most `capacity` units run at once. Dispatches beyond that wait in a
//! FIFO backlog of `backlog` slots; when the backlog is full the dispatch is
//! rejected and the job is dropped.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use tokio::task::{Id, JoinError, JoinSet};

type Job<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// How a dispatch was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Started,
    Queued,
    /// Pool and backlog are full; the job was dropped.
    Rejected,
}

pub struct WorkerPool<T> {
    capacity: usize,
    backlog_limit: usize,
    running: JoinSet<T>,
    owners: HashMap<Id, SocketAddr>,
    backlog: VecDeque<(SocketAddr, Job<T>)>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// `capacity` is clamped to at least one unit.
    pub fn new(capacity: usize, backlog: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            backlog_limit: backlog,
            running: JoinSet::new(),
            owners: HashMap::new(),
            backlog: VecDeque::new(),
        }
    }

    pub fn dispatch<F>(&mut self, peer: SocketAddr, job: F) -> Dispatch
    where
        F: Future<Output = T> + Send + 'static,
    {
        if self.running.len() < self.capacity {
            self.spawn(peer, Box::pin(job));
            Dispatch::Started
        } else if self.backlog.len() < self.backlog_limit {
            self.backlog.push_back((peer, Box::pin(job)));
            Dispatch::Queued
        } else {
            Dispatch::Rejected
        }
    }

    /// Waits for the next unit to finish and starts queued work in its place.
    ///
    /// Yields the peer the unit was dispatched for, even if it panicked.
    /// Returns `None` when nothing is running.
    pub async fn join_next(&mut self) -> Option<(SocketAddr, Result<T, JoinError>)> {
        loop {
            let (id, result) = match self.running.join_next_with_id().await? {
                Ok((id, value)) => (id, Ok(value)),
                Err(e) => (e.id(), Err(e)),
            };
            self.promote();

            if let Some(peer) = self.owners.remove(&id) {
                return Some((peer, result));
            }
        }
    }

    /// Units currently executing.
    pub fn active(&self) -> usize {
        self.running.len()
    }

    /// Jobs waiting for a free unit.
    pub fn queued(&self) -> usize {
        self.backlog.len()
    }

    /// True when a dispatch right now would be rejected.
    pub fn is_saturated(&self) -> bool {
        self.running.len() >= self.capacity && self.backlog.len() >= self.backlog_limit
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty() && self.backlog.is_empty()
    }

    /// Lets running and queued units finish for up to `grace`, then aborts
    /// the rest. Returns how many were aborted.
    pub async fn drain(&mut self, grace: Duration) -> usize {
        let finished = tokio::time::timeout(grace, async {
            while self.join_next().await.is_some() {}
        })
        .await;

        if finished.is_ok() {
            return 0;
        }

        let abandoned = self.running.len() + self.backlog.len();
        self.backlog.clear();
        self.running.shutdown().await;
        self.owners.clear();
        abandoned
    }

    fn spawn(&mut self, peer: SocketAddr, job: Job<T>) {
        let handle = self.running.spawn(job);
        self.owners.insert(handle.id(), peer);
    }

    fn promote(&mut self) {
        while self.running.len() < self.capacity {
            match self.backlog.pop_front() {
                Some((peer, job)) => self.spawn(peer, job),
                None => break,
            }
        }
    }
}
