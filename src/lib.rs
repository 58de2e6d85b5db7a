//! Simulation components for an individual-based model of childhood wasting
//! (acute malnutrition), its comorbidities, and treatment scenarios.
//!
//! The heart of the crate is the wasting rate-derivation engine: given
//! cross-sectional exposure prevalence, cause-specific mortality, and
//! duration assumptions, it inverts a four-state continuous-time Markov
//! model to recover the incidence and remission rates that reproduce the
//! observed prevalence under steady-state assumptions, with age- and
//! treatment-coverage-dependent corrections. Those rates drive a
//! discrete-time state machine over a simulated population.
//!
//! The simulation-specific logic is embedded in modules that rely on the
//! `Context` for core services:
//! * Maintaining a notion of time and advancing it in fixed steps
//! * Holding module-specific data so that the module and other modules can
//!   access it
//! * Named per-person value pipelines (producers and modifiers) with
//!   per-step memoization
//! * Seeded, named random streams
//!
//! A simulation consists of a set of modules that work together. Here:
//! * A population loader that initializes the simulated cohort and its
//!   fixed propensity draws.
//! * The wasting model, which derives transition rates from artifact data
//!   and moves people through the four wasting states.
//! * Treatment and prevention components that modify coverage and rates
//!   under policy scenarios.
//! * Reports that record state occupancy and transitions as CSV.
pub mod artifact;
pub mod context;
pub mod error;
pub mod global_properties;
pub mod log;
pub mod parameters;
pub mod people;
pub mod pipeline;
pub mod population;
pub mod random;
pub mod reports;
pub mod sq_lns;
pub mod stratification;
pub mod units;
pub mod wasting;

pub use context::Context;
pub use error::ModelError;
pub use people::PersonId;
