//! A priority queue of future work sorted by time
//!
//! Defines a `Queue<T>` holding items of type `T` (called plans) ordered by
//! `f64` time, then by insertion order. Adding a plan is *O*(log(*n*));
//! cancellation and retrieval are *O*(1) amortized.
//!
//! `Context` uses this queue as its timer queue: the cycle scheduler plans
//! the next cycle `cycle_delay_ms` after the current one, and cancels the
//! pending plan when the run is paused.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;

/// Items of type `T` are stored in order by `f64` time and called `Plan<T>`.
/// Plans scheduled for the same time run in insertion order.
///
/// Entries live in a binary heap while the payload is kept in a map keyed
/// by plan id, so cancelling only removes the payload and the stale heap
/// entry is skipped on retrieval.
pub struct Queue<T> {
    queue: BinaryHeap<Entry>,
    data_map: FxHashMap<u64, T>,
    plan_counter: u64,
}

impl<T> Queue<T> {
    #[must_use]
    pub fn new() -> Queue<T> {
        Queue {
            queue: BinaryHeap::new(),
            data_map: FxHashMap::default(),
            plan_counter: 0,
        }
    }

    /// Add a plan to the queue at the specified time
    ///
    /// Returns a `PlanId` that can be used to cancel it.
    pub fn add_plan(&mut self, time: f64, data: T) -> PlanId {
        let id = self.plan_counter;
        self.queue.push(Entry { time, id });
        self.data_map.insert(id, data);
        self.plan_counter += 1;
        PlanId(id)
    }

    /// Cancel a plan that has been added to the queue
    ///
    /// # Panics
    ///
    /// Panics if the plan was already cancelled or executed.
    pub fn cancel_plan(&mut self, id: &PlanId) {
        self.data_map.remove(&id.0).expect("Plan does not exist");
    }

    /// Returns true if the plan is still waiting to be executed.
    #[must_use]
    pub fn is_pending(&self, id: &PlanId) -> bool {
        self.data_map.contains_key(&id.0)
    }

    /// Retrieve the earliest plan in the queue
    pub fn get_next_plan(&mut self) -> Option<Plan<T>> {
        while let Some(entry) = self.queue.pop() {
            // Cancelled plans have no data.
            if let Some(data) = self.data_map.remove(&entry.id) {
                return Some(Plan {
                    time: entry.time,
                    data,
                });
            }
        }
        None
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(PartialEq, Debug)]
struct Entry {
    time: f64,
    id: u64,
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// `BinaryHeap` is a max-heap, so every comparison is reversed to pop the
/// earliest time and lowest id first.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then_with(|| self.id.cmp(&other.id))
            .reverse()
    }
}

/// A unique identifier for a plan added to a `Queue<T>`
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlanId(u64);

pub struct Plan<T> {
    pub time: f64,
    pub data: T,
}
