//! The owned run state of a simulation
//!
//! `Context` holds everything one run needs: typed data containers (the
//! population, the parameter snapshot, the history, the scheduler state and
//! the random number generators), a time-ordered plan queue and a queue of
//! callbacks to run before the next plan. Every component receives the
//! context by `&mut` reference; there is no shared global run state.
//!
//! Time on the context clock is measured in milliseconds. By default the
//! clock only advances when a plan runs. With wall-clock pacing enabled the
//! context sleeps for the gap between plans, which turns the scheduler's
//! inter-cycle delay into a real delay.
use std::any::{Any, TypeId};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use log::trace;
use rustc_hash::FxHashMap;

use crate::plan::{PlanId, Queue};

/// A trait for objects that can provide data containers to be held by `Context`
pub trait DataPlugin: Any {
    type DataContainer;

    fn create_data_container() -> Self::DataContainer;
}

/// Defines a new type for storing data in `Context`.
#[macro_export]
macro_rules! define_data_plugin {
    ($plugin:ident, $data_container:ty, $default: expr) => {
        struct $plugin;

        impl $crate::context::DataPlugin for $plugin {
            type DataContainer = $data_container;

            fn create_data_container() -> Self::DataContainer {
                $default
            }
        }
    };
}
pub use define_data_plugin;

/// Marker trait for values broadcast to event subscribers. Events are copied
/// to every handler, so they must be small and immutable.
pub trait Event: Copy + 'static {}

type Callback = dyn FnOnce(&mut Context);
type EventHandler<E> = dyn Fn(&mut Context, E);

pub struct Context {
    plan_queue: Queue<Box<Callback>>,
    callback_queue: VecDeque<Box<Callback>>,
    data_plugins: FxHashMap<TypeId, Box<dyn Any>>,
    event_handlers: FxHashMap<TypeId, Box<dyn Any>>,
    current_time: f64,
    wall_clock_pacing: bool,
}

impl Context {
    #[must_use]
    pub fn new() -> Context {
        Context {
            plan_queue: Queue::new(),
            callback_queue: VecDeque::new(),
            data_plugins: FxHashMap::default(),
            event_handlers: FxHashMap::default(),
            current_time: 0.0,
            wall_clock_pacing: false,
        }
    }

    /// Add a plan to run at `time` (milliseconds on the context clock).
    ///
    /// # Panics
    ///
    /// Panics if `time` is NaN, infinite, or earlier than the current time.
    pub fn add_plan(&mut self, time: f64, callback: impl FnOnce(&mut Context) + 'static) -> PlanId {
        assert!(
            !time.is_nan() && !time.is_infinite() && time >= self.current_time,
            "Time is invalid"
        );
        trace!("adding plan at {time}");
        self.plan_queue.add_plan(time, Box::new(callback))
    }

    /// Cancel a plan that has not yet run.
    ///
    /// # Panics
    ///
    /// Panics if the plan has already run or been cancelled.
    pub fn cancel_plan(&mut self, id: &PlanId) {
        trace!("canceling plan {id:?}");
        self.plan_queue.cancel_plan(id);
    }

    #[must_use]
    pub fn is_plan_pending(&self, id: &PlanId) -> bool {
        self.plan_queue.is_pending(id)
    }

    /// Returns a mutable reference to the data container of a plugin,
    /// creating it on first access.
    ///
    /// # Panics
    ///
    /// Panics if the stored container does not have the plugin's type, which
    /// cannot happen through this API.
    pub fn get_data_mut<T: DataPlugin>(&mut self, _plugin: T) -> &mut T::DataContainer {
        self.data_plugins
            .entry(TypeId::of::<T>())
            .or_insert_with(|| -> Box<dyn Any> { Box::new(T::create_data_container()) })
            .downcast_mut::<T::DataContainer>()
            .expect("Data plugin type mismatch")
    }

    /// Returns the data container of a plugin, or `None` if nothing has
    /// created it yet.
    #[must_use]
    pub fn get_data<T: DataPlugin>(&self, _plugin: T) -> Option<&T::DataContainer> {
        self.data_plugins
            .get(&TypeId::of::<T>())
            .and_then(|container| container.downcast_ref::<T::DataContainer>())
    }

    /// Register a handler called with every event of type `E`.
    pub fn subscribe_to_event<E: Event>(&mut self, handler: impl Fn(&mut Context, E) + 'static) {
        let handlers = self
            .event_handlers
            .entry(TypeId::of::<E>())
            .or_insert_with(|| -> Box<dyn Any> { Box::new(Vec::<Rc<EventHandler<E>>>::new()) });
        if let Some(handlers) = handlers.downcast_mut::<Vec<Rc<EventHandler<E>>>>() {
            handlers.push(Rc::new(handler));
        }
    }

    /// Deliver an event to every subscriber. Handlers run as callbacks, after
    /// the currently executing plan returns and before the next plan.
    pub fn emit_event<E: Event>(&mut self, event: E) {
        let handlers: Vec<Rc<EventHandler<E>>> = match self
            .event_handlers
            .get(&TypeId::of::<E>())
            .and_then(|handlers| handlers.downcast_ref::<Vec<Rc<EventHandler<E>>>>())
        {
            Some(handlers) => handlers.clone(),
            None => return,
        };
        for handler in handlers {
            self.callback_queue
                .push_back(Box::new(move |context| handler(context, event)));
        }
    }

    /// Sleep between plans so that the context clock tracks wall time.
    pub fn set_wall_clock_pacing(&mut self, enabled: bool) {
        self.wall_clock_pacing = enabled;
    }

    #[must_use]
    pub fn get_current_time(&self) -> f64 {
        self.current_time
    }

    /// Run callbacks and plans until both queues are empty.
    pub fn execute(&mut self) {
        trace!("entering event loop");
        loop {
            if let Some(callback) = self.callback_queue.pop_front() {
                callback(self);
                continue;
            }

            let Some(plan) = self.plan_queue.get_next_plan() else {
                break;
            };
            if self.wall_clock_pacing && plan.time > self.current_time {
                std::thread::sleep(Duration::from_secs_f64(
                    (plan.time - self.current_time) / 1000.0,
                ));
            }
            self.current_time = plan.time;
            (plan.data)(self);
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
