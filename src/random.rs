use crate::context::Context;
use rand::distr::uniform::{SampleRange, SampleUniform};
use rand::distr::Distribution;
use rand::{Rng, RngCore, SeedableRng};
use std::any::{Any, TypeId};
use std::cell::{RefCell, RefMut};
use std::collections::HashMap;
use xxhash_rust::xxh3::xxh3_64;

/// Use this to define a unique type which will be used as a key to retrieve
/// an independent rng instance when calling `.get_rng`.
#[macro_export]
macro_rules! define_rng {
    ($random_id:ident) => {
        struct $random_id;

        impl $crate::random::RngId for $random_id {
            type RngType = rand::rngs::StdRng;

            fn get_name() -> &'static str {
                stringify!($random_id)
            }
        }
    };
}
pub use define_rng;

pub trait RngId: Any {
    type RngType: SeedableRng + RngCore;
    fn get_name() -> &'static str;
}

struct RngHolder {
    rng: Box<dyn Any>,
}

struct RngData {
    base_seed: u64,
    rng_holders: RefCell<HashMap<TypeId, RngHolder>>,
}

// Registers a data container which stores:
// * base_seed: A base seed for all rngs
// * rng_holders: A map of rngs, keyed by their RngId. Note that this is
//   stored in a RefCell to allow for mutable borrow without requiring a
//   mutable borrow of the Context itself.
crate::context::define_data_plugin!(
    RngPlugin,
    RngData,
    RngData {
        base_seed: 0,
        rng_holders: RefCell::new(HashMap::new()),
    }
);

// This is a trait extension on Context
pub trait ContextRandomExt {
    fn init_random(&mut self, base_seed: u64);

    fn get_rng<R: RngId>(&self) -> RefMut<R::RngType>;

    /// Samples from `dist` using the rng associated with `R`.
    #[allow(clippy::needless_pass_by_value)]
    fn sample_distr<R: RngId + 'static, T, D: Distribution<T>>(&self, _rng: R, dist: D) -> T {
        dist.sample(&mut *self.get_rng::<R>())
    }

    /// A uniform draw in `[0, 1)`; the propensity primitive. Draws from a
    /// given stream are deterministic given the base seed and call order.
    #[allow(clippy::needless_pass_by_value)]
    fn sample_uniform<R: RngId + 'static>(&self, _rng: R) -> f64 {
        self.get_rng::<R>().random()
    }

    #[allow(clippy::needless_pass_by_value)]
    fn sample_range<R: RngId + 'static, T, Ra>(&self, _rng: R, range: Ra) -> T
    where
        T: SampleUniform,
        Ra: SampleRange<T>,
    {
        self.get_rng::<R>().random_range(range)
    }
}

impl ContextRandomExt for Context {
    /// Initializes the `RngPlugin` data container to store rngs as well as a
    /// base seed. Note that rngs are created lazily when `get_rng` is called.
    fn init_random(&mut self, base_seed: u64) {
        let data_container = self.get_data_container_mut(RngPlugin);
        data_container.base_seed = base_seed;

        // Clear any existing Rngs to ensure they get re-seeded when `get_rng` is called
        let mut rng_map = data_container.rng_holders.try_borrow_mut().unwrap();
        rng_map.clear();
    }

    /// Gets a mutable reference to the random number generator associated
    /// with the given `RngId`. If the rng has not been used before, one is
    /// created with the base seed offset by a hash of the stream name, so
    /// that streams are independent but reproducible. Panics if
    /// `init_random` was not called yet.
    fn get_rng<R: RngId + 'static>(&self) -> RefMut<R::RngType> {
        let data_container = self
            .get_data_container(RngPlugin)
            .expect("You must initialize the random number generator with a base seed");

        let rng_holders = data_container.rng_holders.try_borrow_mut().unwrap();
        RefMut::map(rng_holders, |holders| {
            holders
                .entry(TypeId::of::<R>())
                // Create a new rng holder if it doesn't exist yet
                .or_insert_with(|| {
                    let base_seed = data_container.base_seed;
                    let seed_offset = xxh3_64(R::get_name().as_bytes());
                    RngHolder {
                        rng: Box::new(R::RngType::seed_from_u64(
                            base_seed.wrapping_add(seed_offset),
                        )),
                    }
                })
                .rng
                .downcast_mut::<R::RngType>()
                .unwrap()
        })
    }
}
