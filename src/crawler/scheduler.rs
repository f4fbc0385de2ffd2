//! Work-stealing scheduler shared by all crawl workers
//!
//! This module handles:
//! - The global link table (`url → Link`) and its visited flags
//! - Each worker's level queues and running flag
//! - Global completion detection
//! - Redistribution of pending links from the busiest worker to an idle one
//!
//! All of it lives behind a single mutex, so a visited check-and-set, a
//! link admission and a donation split are each one critical section.
//! The lock is only taken inside synchronous methods and therefore never
//! held across an `.await`.

use crate::crawler::level_queue::{LevelQueue, TraversalOrder};
use crate::state::Link;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Smallest queue the scheduler is willing to split
pub const MIN_STEAL_BATCH: usize = 5;

/// Per-worker bookkeeping
#[derive(Debug, Clone, Default)]
pub struct WorkerState {
    pub worker_id: usize,
    pub running: bool,
    pub queues: LevelQueue,
}

/// Outcome of offering a discovered link to the link table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Inserted into the table and queued for the discovering worker
    Admitted,
    /// Already in the table (queued, visited or in flight elsewhere)
    Known,
    /// The table holds `max_links` entries already
    CapReached,
}

#[derive(Debug, Default)]
struct SchedulerState {
    links: HashMap<String, Link>,
    workers: BTreeMap<usize, WorkerState>,
    donations: usize,
}

/// Coordinates link ownership and idle workers
///
/// Workers must all be registered before any of them starts pulling
/// links; otherwise a fast worker could observe "everyone else is idle"
/// before the others exist.
#[derive(Debug)]
pub struct WorkStealingScheduler {
    state: Mutex<SchedulerState>,
    order: TraversalOrder,
    max_links: usize,
}

impl WorkStealingScheduler {
    /// Creates an empty scheduler
    ///
    /// # Arguments
    ///
    /// * `order` - Level selection policy used by every worker
    /// * `max_links` - Cap on the number of entries in the link table
    pub fn new(order: TraversalOrder, max_links: usize) -> Self {
        Self {
            state: Mutex::new(SchedulerState::default()),
            order,
            max_links,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a worker as running with the seed in its queue
    ///
    /// Every worker gets the same seed; the shared visited flag makes sure
    /// only the first one actually fetches it. The seed enters the link
    /// table once, regardless of how many workers are registered.
    pub fn register_worker(&self, worker_id: usize, seed: &str) {
        let mut state = self.lock();

        state
            .links
            .entry(seed.to_string())
            .or_insert_with(|| Link::new(seed, 0));

        let mut queues = LevelQueue::new();
        queues.push(Link::new(seed, 0));

        state.workers.insert(
            worker_id,
            WorkerState {
                worker_id,
                running: true,
                queues,
            },
        );
    }

    /// Takes the next link for a worker
    ///
    /// The level is re-selected on every call. When the worker has nothing
    /// left it is marked not-running inside the same critical section.
    ///
    /// # Returns
    ///
    /// * `Some(Link)` - The worker is running and owns this link now
    /// * `None` - The worker's queues are empty; it is now idle
    pub fn next_link(&self, worker_id: usize) -> Option<Link> {
        let mut state = self.lock();
        let worker = state.workers.get_mut(&worker_id)?;

        match worker.queues.select_level(self.order) {
            Some(level) => {
                worker.running = true;
                let link = worker.queues.pop_from(level);
                tracing::trace!(worker_id, level, "Selected level");
                link
            }
            None => {
                worker.running = false;
                None
            }
        }
    }

    /// Atomically checks and sets the visited flag of `url`
    ///
    /// # Returns
    ///
    /// * `true` - The caller is the first to visit and must fetch the page
    /// * `false` - Someone already visited it
    pub fn claim_visit(&self, url: &str) -> bool {
        let mut state = self.lock();
        let link = state
            .links
            .entry(url.to_string())
            .or_insert_with(|| Link::new(url, 0));

        if link.visited {
            false
        } else {
            link.visited = true;
            true
        }
    }

    /// Returns true if `url` is in the link table
    pub fn is_known(&self, url: &str) -> bool {
        self.lock().links.contains_key(url)
    }

    /// Offers a discovered link to the link table
    ///
    /// If admitted, the link is appended to `worker_id`'s queue at `depth`.
    /// The known-check, the cap check and the insertion happen under one lock.
    pub fn admit_link(&self, worker_id: usize, url: &str, depth: u32) -> Admission {
        let mut state = self.lock();

        if state.links.contains_key(url) {
            return Admission::Known;
        }

        if state.links.len() >= self.max_links {
            return Admission::CapReached;
        }

        let link = Link::new(url, depth);
        state.links.insert(url.to_string(), link.clone());
        if let Some(worker) = state.workers.get_mut(&worker_id) {
            worker.queues.push(link);
        }

        Admission::Admitted
    }

    /// Returns true when no worker is running
    pub fn all_completed(&self) -> bool {
        self.lock().workers.values().all(|w| !w.running)
    }

    /// Marks a worker as permanently idle
    ///
    /// Called whenever a worker loop ends, whether on `Exit`, on a session
    /// error or by panic. Its pending links stay available to `steal_work`.
    pub fn retire(&self, worker_id: usize) {
        if let Some(worker) = self.lock().workers.get_mut(&worker_id) {
            worker.running = false;
        }
    }

    /// Moves pending links from the busiest worker to `worker_id`
    ///
    /// The donor is the worker whose currently selected level has the
    /// longest queue (first seen wins ties). If that queue holds fewer
    /// than `MIN_STEAL_BATCH` links nothing is moved. Otherwise its tail
    /// half becomes the idle worker's only queue and the idle worker is
    /// marked running, all in one critical section.
    ///
    /// # Returns
    ///
    /// * `true` - Work was donated; the caller should resume pulling links
    /// * `false` - Nothing worth stealing
    pub fn steal_work(&self, worker_id: usize) -> bool {
        let mut state = self.lock();

        let mut best: Option<(usize, u32, usize)> = None;
        for (id, worker) in state.workers.iter() {
            if *id == worker_id {
                continue;
            }
            if let Some(level) = worker.queues.select_level(self.order) {
                let len = worker.queues.len_at(level);
                if best.map_or(true, |(_, _, best_len)| len > best_len) {
                    best = Some((*id, level, len));
                }
            }
        }

        let Some((donor_id, level, len)) = best else {
            return false;
        };

        if len < MIN_STEAL_BATCH {
            tracing::trace!(worker_id, donor_id, len, "Queue too small to split");
            return false;
        }

        let tail = match state.workers.get_mut(&donor_id) {
            Some(donor) => donor.queues.split_off_tail(level),
            None => return false,
        };

        let donated = tail.len();
        match state.workers.get_mut(&worker_id) {
            Some(worker) => {
                worker.queues = LevelQueue::from_level(level, tail);
                worker.running = true;
            }
            None => {
                // Unknown donee: give the links back
                if let Some(donor) = state.workers.get_mut(&donor_id) {
                    for link in tail {
                        donor.queues.push(link);
                    }
                }
                return false;
            }
        }

        state.donations += 1;
        tracing::debug!(
            worker_id,
            donor_id,
            level,
            donated,
            "Redistributed pending links"
        );
        true
    }

    /// Number of successful [`steal_work`](Self::steal_work) calls so far
    pub fn donations(&self) -> usize {
        self.lock().donations
    }

    /// Copies the current link table
    pub fn links_snapshot(&self) -> Vec<Link> {
        let mut links: Vec<Link> = self.lock().links.values().cloned().collect();
        links.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.url.cmp(&b.url)));
        links
    }

    /// Number of links with the visited flag set
    pub fn visited_count(&self) -> usize {
        self.lock().links.values().filter(|l| l.visited).count()
    }

    /// Number of links pending across every worker
    pub fn pending_count(&self) -> usize {
        self.lock().workers.values().map(|w| w.queues.len()).sum()
    }
}
