//! The four-state wasting model: state definitions, rate derivation at
//! setup, value producers for every directed edge, and the discrete-time
//! transition executor. The chain, ordered by severity:
//!
//! ```text
//! susceptible <-> mild <-> moderate <-> severe
//!                 ^                       |
//!                 +--- treated remission -+
//! ```
//!
//! Rates are derived once per run from the artifact (they vary by stratum
//! and by scenario-dependent treatment levels, not by individual history)
//! and served through named value producers so that sibling components can
//! modify them. The state column itself is written only by the transition
//! executor, between time steps.

pub mod exposure;
pub mod mortality;
pub mod transition_rates;
pub mod treatment;

use std::fmt;
use std::rc::Rc;

use crate::context::Context;
use crate::error::ModelError;
use crate::global_properties::ContextGlobalPropertiesExt;
use crate::log::{debug, info, trace};
use crate::artifact::{ArtifactKey, ContextArtifactExt};
use crate::parameters::{simulation_year, WastingConfig, WastingParameters};
use crate::people::{ContextPeopleExt, PersonId};
use crate::pipeline::ContextValuesExt;
use crate::population::ContextDemographicsExt;
use crate::random::ContextRandomExt;
use crate::stratification::{Category, CategoryTable, StratTable};
use crate::units::rate_to_probability;
use crate::{define_data_plugin, define_person_property, define_rng};

define_rng!(ChildWastingPropensityRng);
define_rng!(WastingTransitionRng);

define_person_property!(ChildWastingState, WastingState);
define_person_property!(ChildWastingPropensity, f64);

pub const EXPOSURE_VALUE: &str = "child_wasting.exposure";
pub const PROPENSITY_VALUE: &str = "child_wasting.propensity";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WastingState {
    Susceptible,
    Mild,
    Moderate,
    Severe,
}

impl WastingState {
    pub const ALL: [WastingState; 4] = [
        WastingState::Susceptible,
        WastingState::Mild,
        WastingState::Moderate,
        WastingState::Severe,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            WastingState::Susceptible => "susceptible_to_child_wasting",
            WastingState::Mild => "mild_child_wasting",
            WastingState::Moderate => "moderate_acute_malnutrition",
            WastingState::Severe => "severe_acute_malnutrition",
        }
    }

    /// The GBD exposure category this state corresponds to.
    #[must_use]
    pub fn category(self) -> Category {
        match self {
            WastingState::Susceptible => Category::Cat4,
            WastingState::Mild => Category::Cat3,
            WastingState::Moderate => Category::Cat2,
            WastingState::Severe => Category::Cat1,
        }
    }

    #[must_use]
    pub fn from_category(category: Category) -> Self {
        match category {
            Category::Cat4 => WastingState::Susceptible,
            Category::Cat3 => WastingState::Mild,
            Category::Cat2 => WastingState::Moderate,
            Category::Cat1 => WastingState::Severe,
        }
    }
}

impl fmt::Display for WastingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A directed edge of the chain and the value name its annual rate is
/// served under.
#[derive(Debug, Clone)]
pub struct Transition {
    pub from: WastingState,
    pub to: WastingState,
    pub rate_value: String,
}

#[must_use]
pub fn transition_rate_value_name(from: WastingState, to: WastingState) -> String {
    format!("{}_to_{}.transition_rate", from.name(), to.name())
}

struct WastingModelData {
    transitions: Vec<Transition>,
    exposures: Rc<CategoryTable>,
}

define_data_plugin!(
    WastingModelPlugin,
    WastingModelData,
    WastingModelData {
        transitions: Vec::new(),
        exposures: Rc::new(CategoryTable::new(Vec::new())),
    }
);

/// Registers the rate producer for one edge. Two tables are derived at
/// setup, one per treatment-level regime; which one serves a request
/// depends on whether the scale-up date has been reached at call time.
fn register_rate_producer(
    context: &mut Context,
    from: WastingState,
    to: WastingState,
    baseline: StratTable,
    scaled_up: StratTable,
) -> Transition {
    let name = transition_rate_value_name(from, to);
    let baseline = Rc::new(baseline);
    let scaled_up = Rc::new(scaled_up);
    context.register_value_producer(&name, move |context, person_id| {
        let table = if treatment::scale_up_reached(context) {
            &scaled_up
        } else {
            &baseline
        };
        stratum_value(context, person_id, table)
    });
    Transition {
        from,
        to,
        rate_value: name,
    }
}

/// Looks a person's current stratum up in a rate table. Strata outside the
/// tabulated range contribute no dynamics.
fn stratum_value(context: &Context, person_id: PersonId, table: &StratTable) -> f64 {
    let sex = context.person_sex(person_id);
    let age = context.person_age_years(person_id);
    let year = simulation_year(context);
    table.value_at(sex, age, year).unwrap_or(0.0)
}

/// Assembles the wasting model: installs the model constants, initializes
/// the treatment resolver, derives every transition-rate table from the
/// artifact, and registers the per-edge rate producers plus the exposure,
/// birth-prevalence, disability-weight, and excess-mortality producers.
///
/// # Errors
///
/// Fails on malformed artifact tables or misaligned stratification
/// indexes.
pub fn init(context: &mut Context) -> Result<(), ModelError> {
    context.set_global_property_value(WastingConfig, WastingParameters::standard());
    treatment::init(context)?;

    let config = *context.get_global_property_value(WastingConfig);
    let levels = *context.get_global_property_value(treatment::BaselineTreatmentLevels);

    let artifact = context.artifact();
    let exposures = exposure::load_wasting_exposures(artifact)?;
    let adjustment = exposure::load_acmr_adjustment(artifact)?;
    let mortality_inputs = mortality::load_mortality_inputs(artifact)?;
    let mortality = mortality::daily_mortality_probabilities(&mortality_inputs, &config);
    let rates = transition_rates::derive_transition_rates(
        &exposures,
        &adjustment,
        &mortality,
        &levels,
        &config,
    )?;
    let scaled_up_rates = transition_rates::derive_transition_rates(
        &exposures,
        &adjustment,
        &mortality,
        &treatment::alternative_levels(levels, &config),
        &config,
    )?;
    let pem_emr = artifact.table(ArtifactKey::PemEmr)?;
    let mam_disability_weight = artifact.table(ArtifactKey::MamDisabilityWeight)?;
    let sam_disability_weight = artifact.table(ArtifactKey::SamDisabilityWeight)?;
    debug!(
        "derived wasting transition rates over {} strata",
        exposures.len()
    );

    let transitions = vec![
        register_rate_producer(
            context,
            WastingState::Susceptible,
            WastingState::Mild,
            rates.mild_incidence,
            scaled_up_rates.mild_incidence,
        ),
        register_rate_producer(
            context,
            WastingState::Mild,
            WastingState::Susceptible,
            rates.mild_remission,
            scaled_up_rates.mild_remission,
        ),
        register_rate_producer(
            context,
            WastingState::Mild,
            WastingState::Moderate,
            rates.mam_incidence,
            scaled_up_rates.mam_incidence,
        ),
        register_rate_producer(
            context,
            WastingState::Moderate,
            WastingState::Mild,
            rates.mam_remission,
            scaled_up_rates.mam_remission,
        ),
        register_rate_producer(
            context,
            WastingState::Moderate,
            WastingState::Severe,
            rates.sam_incidence,
            scaled_up_rates.sam_incidence,
        ),
        register_rate_producer(
            context,
            WastingState::Severe,
            WastingState::Moderate,
            rates.sam_untreated_remission,
            scaled_up_rates.sam_untreated_remission,
        ),
        register_rate_producer(
            context,
            WastingState::Severe,
            WastingState::Mild,
            rates.sam_treated_remission,
            scaled_up_rates.sam_treated_remission,
        ),
    ];

    // The current exposure category, served as its cat number for
    // downstream relative-risk lookups by other risk factors.
    context.register_value_producer(EXPOSURE_VALUE, |context, person_id| {
        match wasting_exposure_category(context, person_id) {
            Category::Cat1 => 1.0,
            Category::Cat2 => 2.0,
            Category::Cat3 => 3.0,
            Category::Cat4 => 4.0,
        }
    });
    context.register_value_producer(PROPENSITY_VALUE, |context, person_id| {
        context.get_person_property(person_id, ChildWastingPropensity)
    });

    for state in WastingState::ALL {
        let birth_prevalence =
            exposure::birth_prevalence(&exposures, state.category(), config.start_age);
        let table = Rc::new(birth_prevalence);
        let start_age = config.start_age;
        context.register_value_producer(
            &format!("{}.birth_prevalence", state.name()),
            move |context, person_id| {
                let sex = context.person_sex(person_id);
                let year = simulation_year(context);
                table.value_at(sex, start_age, year).unwrap_or(0.0)
            },
        );

        let disability_weight = match state {
            WastingState::Susceptible | WastingState::Mild => None,
            WastingState::Moderate => Some(mam_disability_weight.clone()),
            WastingState::Severe => Some(sam_disability_weight.clone()),
        };
        register_state_table_producer(
            context,
            &format!("{}.disability_weight", state.name()),
            disability_weight,
        );

        // PEM carries the excess mortality of the two severe states.
        let excess_mortality = match state {
            WastingState::Susceptible | WastingState::Mild => None,
            WastingState::Moderate | WastingState::Severe => Some(pem_emr.clone()),
        };
        register_state_table_producer(
            context,
            &format!("{}.excess_mortality_rate", state.name()),
            excess_mortality,
        );
    }

    let data_container = context.get_data_container_mut(WastingModelPlugin);
    data_container.transitions = transitions;
    data_container.exposures = Rc::new(exposures);

    context.add_timestep_listener(execute_transitions);
    info!("wasting model assembled: 4 states, 7 transitions");
    Ok(())
}

fn register_state_table_producer(
    context: &mut Context,
    name: &str,
    table: Option<StratTable>,
) {
    match table {
        None => context.register_value_producer(name, |_, _| 0.0),
        Some(table) => {
            let table = Rc::new(table);
            context.register_value_producer(name, move |context, person_id| {
                stratum_value(context, person_id, &table)
            });
        }
    }
}

/// The exposure category implied by a person's current state.
#[must_use]
pub fn wasting_exposure_category(context: &Context, person_id: PersonId) -> Category {
    context
        .get_person_property(person_id, ChildWastingState)
        .category()
}

/// Creates the wasting propensity column and seeds the initial state for a
/// newly initialized individual. Individuals below the model start age get
/// the birth-prevalence distribution of the start-age stratum and keep
/// that assignment until wasting dynamics apply to them.
pub fn initialize_person(context: &mut Context, person_id: PersonId) {
    let propensity = context.sample_uniform(ChildWastingPropensityRng);
    context.initialize_person_property(person_id, ChildWastingPropensity, propensity);
    let state = initial_state(context, person_id, propensity);
    context.initialize_person_property(person_id, ChildWastingState, state);
}

fn initial_state(context: &Context, person_id: PersonId, propensity: f64) -> WastingState {
    let config = context.get_global_property_value(WastingConfig);
    let exposures = Rc::clone(
        &context
            .get_data_container(WastingModelPlugin)
            .expect("the wasting model must be initialized before people are created")
            .exposures,
    );
    let sex = context.person_sex(person_id);
    let age = context
        .person_age_years(person_id)
        .max(config.start_age);
    let year = simulation_year(context);

    let Some(values) = exposures.values_at(sex, age, year) else {
        return WastingState::Susceptible;
    };
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return WastingState::Susceptible;
    }

    // Propensity against the cumulative category cut points, cat1..cat4.
    let mut cumulative = 0.0;
    for category in [
        Category::Cat1,
        Category::Cat2,
        Category::Cat3,
        Category::Cat4,
    ] {
        cumulative += values[category.index()] / total;
        if propensity < cumulative {
            return WastingState::from_category(category);
        }
    }
    WastingState::Susceptible
}

/// Moves people between states at the end of each time step. Competing
/// transitions are resolved by total exit rate, then allocated in
/// proportion to the per-edge rates.
fn execute_transitions(context: &mut Context) {
    let config = *context.get_global_property_value(WastingConfig);
    let step_size = context.current_step_size();
    let transitions = context
        .get_data_container(WastingModelPlugin)
        .expect("the wasting model must be initialized")
        .transitions
        .clone();

    for index in 0..context.get_current_population() {
        let person_id = context.get_person_id(index);
        if context.person_age_years(person_id) < config.start_age {
            continue;
        }
        let state = context.get_person_property(person_id, ChildWastingState);

        let mut outgoing = Vec::new();
        let mut total_rate = 0.0;
        for transition in transitions.iter().filter(|t| t.from == state) {
            let rate = context.get_value(&transition.rate_value, person_id);
            if rate > 0.0 {
                outgoing.push((transition.to, rate));
                total_rate += rate;
            }
        }
        if total_rate <= 0.0 {
            continue;
        }

        let exit_probability = rate_to_probability(total_rate, step_size);
        if context.sample_uniform(WastingTransitionRng) >= exit_probability {
            continue;
        }

        let mut target = context.sample_uniform(WastingTransitionRng) * total_rate;
        let mut next_state = outgoing[outgoing.len() - 1].0;
        for (to, rate) in &outgoing {
            if target < *rate {
                next_state = *to;
                break;
            }
            target -= rate;
        }
        if next_state != state {
            trace!("person {person_id}: {state} -> {next_state}");
            context.set_person_property(person_id, ChildWastingState, next_state);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn state_category_mapping_round_trips() {
        for state in WastingState::ALL {
            assert_eq!(WastingState::from_category(state.category()), state);
        }
        assert_eq!(WastingState::Severe.category(), Category::Cat1);
        assert_eq!(WastingState::Susceptible.category(), Category::Cat4);
    }

    #[test]
    fn transition_value_names_follow_state_names() {
        assert_eq!(
            transition_rate_value_name(WastingState::Mild, WastingState::Moderate),
            "mild_child_wasting_to_moderate_acute_malnutrition.transition_rate"
        );
        assert_eq!(
            transition_rate_value_name(WastingState::Susceptible, WastingState::Mild),
            "susceptible_to_child_wasting_to_mild_child_wasting.transition_rate"
        );
    }
}
