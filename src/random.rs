//! Named random number streams held by `Context`.
//!
//! Each stochastic component defines its own stream with `define_rng!` and
//! draws from it through `ContextRandomExt`. Streams are seeded lazily from a
//! base seed plus a hash of the stream name, so adding a new stream does not
//! perturb the draws of existing ones. Runs normally start from a base seed
//! taken from OS entropy; a fixed seed is a testing convenience only.
use std::any::{Any, TypeId};
use std::cell::{RefCell, RefMut};

use log::trace;
use rand::distr::Distribution;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::xxh3_64;

use crate::context::Context;
use crate::define_data_plugin;

/// Use this to define a unique type which will be used as a key to retrieve
/// an independent rng instance.
#[macro_export]
macro_rules! define_rng {
    ($random_id:ident) => {
        #[derive(Copy, Clone)]
        struct $random_id;

        impl $crate::random::RngId for $random_id {
            type RngType = $crate::rand::rngs::SmallRng;

            fn get_name() -> &'static str {
                stringify!($random_id)
            }
        }

        // This ensures that you can't define two RngIds with the same name
        $crate::paste::paste! {
            #[doc(hidden)]
            #[no_mangle]
            #[allow(non_upper_case_globals)]
            pub static [<rng_name_duplication_guard_ $random_id>]: () = ();
        }
    };
}
pub use define_rng;

pub trait RngId: Copy + Clone + Any {
    type RngType: SeedableRng;
    fn get_name() -> &'static str;
}

struct RngHolder {
    rng: Box<dyn Any>,
}

struct RngData {
    base_seed: u64,
    rng_holders: RefCell<FxHashMap<TypeId, RngHolder>>,
}

// The map of streams sits in a RefCell so that sampling only needs a shared
// borrow of the context.
define_data_plugin!(
    RngPlugin,
    RngData,
    RngData {
        base_seed: 0,
        rng_holders: RefCell::new(FxHashMap::default()),
    }
);

fn get_rng<R: RngId>(context: &Context) -> RefMut<'_, R::RngType> {
    let data_container = context
        .get_data(RngPlugin)
        .expect("You must initialize the random number generator with a base seed");

    let rng_holders = data_container.rng_holders.borrow_mut();
    RefMut::map(rng_holders, |holders| {
        holders
            .entry(TypeId::of::<R>())
            .or_insert_with(|| {
                trace!(
                    "creating new RNG (seed={}) for {}",
                    data_container.base_seed,
                    R::get_name()
                );
                let seed_offset = xxh3_64(R::get_name().as_bytes());
                RngHolder {
                    rng: Box::new(R::RngType::seed_from_u64(
                        data_container.base_seed.wrapping_add(seed_offset),
                    )),
                }
            })
            .rng
            .downcast_mut::<R::RngType>()
            .expect("RNG type mismatch")
    })
}

pub trait ContextRandomExt {
    /// Sets the base seed and discards every existing stream, so streams are
    /// re-seeded on their next use.
    fn init_random(&mut self, base_seed: u64);

    /// Seeds the streams from OS entropy and returns the base seed that was
    /// drawn, so a surprising run can be logged and replayed.
    fn init_random_from_entropy(&mut self) -> u64;

    /// Applies `sampler` to the stream registered for `R`.
    ///
    /// # Panics
    ///
    /// Panics if `init_random` has not been called.
    fn sample<R: RngId, T>(&self, _rng_id: R, sampler: impl FnOnce(&mut R::RngType) -> T) -> T;

    /// Draws one value from `distribution`.
    fn sample_distr<R: RngId, T>(&self, rng_id: R, distribution: impl Distribution<T>) -> T
    where
        R::RngType: Rng,
    {
        self.sample(rng_id, |rng| distribution.sample(rng))
    }

    /// A Bernoulli trial: `true` with probability `p`. Values of `p` outside
    /// `[0, 1]` are clamped.
    fn sample_bool<R: RngId>(&self, rng_id: R, p: f64) -> bool
    where
        R::RngType: Rng,
    {
        self.sample(rng_id, |rng| rng.random_bool(p.clamp(0.0, 1.0)))
    }

    /// A uniform draw from `[low, high)`.
    fn sample_uniform<R: RngId>(&self, rng_id: R, low: f64, high: f64) -> f64
    where
        R::RngType: Rng,
    {
        if high <= low {
            return low;
        }
        self.sample(rng_id, |rng| rng.random_range(low..high))
    }
}

impl ContextRandomExt for Context {
    fn init_random(&mut self, base_seed: u64) {
        trace!("initializing random module with seed {base_seed}");
        let data_container = self.get_data_mut(RngPlugin);
        data_container.base_seed = base_seed;
        data_container.rng_holders.borrow_mut().clear();
    }

    fn init_random_from_entropy(&mut self) -> u64 {
        let base_seed: u64 = rand::random();
        self.init_random(base_seed);
        base_seed
    }

    fn sample<R: RngId, T>(&self, _rng_id: R, sampler: impl FnOnce(&mut R::RngType) -> T) -> T {
        let mut rng = get_rng::<R>(self);
        sampler(&mut rng)
    }
}

#[cfg(test)]
mod test {
    use rand::RngCore;
    use rand_distr::Normal;

    use crate::context::Context;
    use crate::random::ContextRandomExt;

    define_rng!(FooRng);
    define_rng!(BarRng);

    #[test]
    fn streams_advance() {
        let mut context = Context::new();
        context.init_random(42);

        assert_ne!(
            context.sample(FooRng, RngCore::next_u64),
            context.sample(FooRng, RngCore::next_u64)
        );
    }

    #[test]
    fn streams_are_independent() {
        let mut context = Context::new();
        context.init_random(42);

        assert_ne!(
            context.sample(FooRng, RngCore::next_u64),
            context.sample(BarRng, RngCore::next_u64)
        );
    }

    #[test]
    #[should_panic(expected = "You must initialize the random number generator with a base seed")]
    fn panic_if_not_initialized() {
        let context = Context::new();
        context.sample(FooRng, RngCore::next_u64);
    }

    #[test]
    fn reset_seed() {
        let mut context = Context::new();
        context.init_random(42);

        let run_0 = context.sample(FooRng, RngCore::next_u64);
        let run_1 = context.sample(FooRng, RngCore::next_u64);

        context.init_random(42);
        assert_eq!(run_0, context.sample(FooRng, RngCore::next_u64));
        assert_eq!(run_1, context.sample(FooRng, RngCore::next_u64));

        context.init_random(88);
        assert_ne!(run_0, context.sample(FooRng, RngCore::next_u64));
    }

    #[test]
    fn entropy_seed_is_reported() {
        let mut context = Context::new();
        let seed = context.init_random_from_entropy();
        let first = context.sample(FooRng, RngCore::next_u64);
        context.init_random(seed);
        assert_eq!(first, context.sample(FooRng, RngCore::next_u64));
    }

    #[test]
    fn bernoulli_extremes() {
        let mut context = Context::new();
        context.init_random(7);
        for _ in 0..100 {
            assert!(context.sample_bool(FooRng, 1.0));
            assert!(!context.sample_bool(FooRng, 0.0));
        }
    }

    #[test]
    fn bernoulli_frequency() {
        let mut context = Context::new();
        context.init_random(7);
        let hits = (0..10_000)
            .filter(|_| context.sample_bool(FooRng, 0.3))
            .count();
        assert!((2_700..3_300).contains(&hits));
    }

    #[test]
    fn normal_draws() {
        let mut context = Context::new();
        context.init_random(7);
        let distribution = Normal::new(15.0, 4.0).unwrap();
        let n = 10_000;
        let mean = (0..n)
            .map(|_| context.sample_distr(FooRng, distribution))
            .sum::<f64>()
            / f64::from(n);
        assert!((mean - 15.0).abs() < 0.2);
    }

    #[test]
    fn uniform_bounds() {
        let mut context = Context::new();
        context.init_random(7);
        for _ in 0..1_000 {
            let x = context.sample_uniform(FooRng, 0.0, 10.0);
            assert!((0.0..10.0).contains(&x));
        }
        assert_eq!(context.sample_uniform(FooRng, 5.0, 5.0), 5.0);
    }
}
