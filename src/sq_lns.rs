//! SQ-LNS (small-quantity lipid-based nutrient supplement) prevention.
//! Coverage is determined per person from age and a fixed propensity
//! against the scenario coverage level; covered children progress to
//! moderate and severe wasting at rates reduced by the drawn risk ratios.

use crate::context::Context;
use crate::error::ModelError;
use crate::global_properties::ContextGlobalPropertiesExt;
use crate::log::info;
use crate::parameters::{simulation_year, Parameters, WastingConfig};
use crate::people::{ContextPeopleExt, PersonId};
use crate::pipeline::ContextValuesExt;
use crate::population::ContextDemographicsExt;
use crate::random::ContextRandomExt;
use crate::wasting::{transition_rate_value_name, WastingState};
use crate::{define_global_property, define_person_property, define_rng};

define_rng!(SqLnsRng);
define_rng!(SqLnsPropensityRng);

define_person_property!(SqLnsPropensity, f64);

pub const COVERAGE_VALUE: &str = "sq_lns.coverage";
pub const PROPENSITY_VALUE: &str = "sq_lns.propensity";

/// Wasting progression risk ratios for covered children, drawn once per
/// run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SqLnsEffects {
    pub risk_ratio_moderate: f64,
    pub risk_ratio_severe: f64,
}

define_global_property!(SqLnsEffectSizes, SqLnsEffects);

fn coverage_level(context: &Context) -> f64 {
    let scenario = context.get_global_property_value(Parameters).scenario;
    let config = context.get_global_property_value(WastingConfig);
    if scenario.has_sq_lns() && simulation_year(context) >= config.scale_up_start_year {
        config.sq_lns.coverage_ramp_up
    } else {
        config.sq_lns.coverage_baseline
    }
}

fn current_coverage(context: &Context, person_id: PersonId) -> f64 {
    let start_age = context
        .get_global_property_value(WastingConfig)
        .sq_lns
        .coverage_start_age;
    let age = context.person_age_years(person_id);
    let propensity = context.get_value(PROPENSITY_VALUE, person_id);
    if start_age <= age && propensity < coverage_level(context) {
        1.0
    } else {
        0.0
    }
}

/// Draws the effect sizes, registers the propensity and coverage
/// producers, and hooks the progression-rate modifiers.
///
/// # Errors
///
/// Fails if an effect-size spec is invalid.
pub fn init(context: &mut Context) -> Result<(), ModelError> {
    let config = *context.get_global_property_value(WastingConfig);
    let risk_ratio_severe = context.sample_distr(
        SqLnsRng,
        config.sq_lns.risk_ratio_wasting_severe.lognormal()?,
    );
    let risk_ratio_moderate = context.sample_distr(
        SqLnsRng,
        config.sq_lns.risk_ratio_wasting_moderate.lognormal()?,
    );
    info!(
        "SQ-LNS effect sizes: moderate {:.3}, severe {:.3}",
        risk_ratio_moderate, risk_ratio_severe
    );
    context.set_global_property_value(
        SqLnsEffectSizes,
        SqLnsEffects {
            risk_ratio_moderate,
            risk_ratio_severe,
        },
    );

    context.register_value_producer(PROPENSITY_VALUE, |context, person_id| {
        context.get_person_property(person_id, SqLnsPropensity)
    });
    context.register_value_producer(COVERAGE_VALUE, current_coverage);

    context.register_value_modifier(
        &transition_rate_value_name(WastingState::Mild, WastingState::Moderate),
        |context, person_id, rate| {
            if context.get_value(COVERAGE_VALUE, person_id) > 0.0 {
                rate * context
                    .get_global_property_value(SqLnsEffectSizes)
                    .risk_ratio_moderate
            } else {
                rate
            }
        },
    );
    context.register_value_modifier(
        &transition_rate_value_name(WastingState::Moderate, WastingState::Severe),
        |context, person_id, rate| {
            if context.get_value(COVERAGE_VALUE, person_id) > 0.0 {
                rate * context
                    .get_global_property_value(SqLnsEffectSizes)
                    .risk_ratio_severe
            } else {
                rate
            }
        },
    );
    Ok(())
}

/// Creates the fixed SQ-LNS propensity column for a newly initialized
/// individual.
pub fn initialize_person(context: &mut Context, person_id: PersonId) {
    let propensity = context.sample_uniform(SqLnsPropensityRng);
    context.initialize_person_property(person_id, SqLnsPropensity, propensity);
}
