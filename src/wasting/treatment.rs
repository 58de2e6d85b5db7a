//! Wasting treatment coverage and efficacy.
//!
//! Coverage and efficacy *levels* are population constants drawn once per
//! run from calibrated distributions; which level applies depends on the
//! scenario and on whether the scale-up date has been reached. Whether an
//! individual is actually covered is a per-person classification computed
//! on demand from age and two fixed propensity draws; it is never stored.

use serde::Serialize;
use strum::Display;

use crate::context::Context;
use crate::error::ModelError;
use crate::global_properties::ContextGlobalPropertiesExt;
use crate::log::info;
use crate::parameters::{simulation_year, Parameters, WastingConfig, WastingParameters};
use crate::people::{ContextPeopleExt, PersonId};
use crate::pipeline::ContextValuesExt;
use crate::population::ContextDemographicsExt;
use crate::random::ContextRandomExt;
use crate::{define_global_property, define_person_property, define_rng};

define_rng!(WastingTreatmentRng);
define_rng!(WastingTreatmentPropensityRng);
define_rng!(WastingTreatmentEfficacyPropensityRng);

define_person_property!(WastingTreatmentPropensity, f64);
define_person_property!(WastingTreatmentEfficacyPropensity, f64);

pub const SAM_COVERAGE_VALUE: &str = "wasting_treatment.sam_coverage";
pub const MAM_COVERAGE_VALUE: &str = "wasting_treatment.mam_coverage";

define_global_property!(BaselineTreatmentLevels, TreatmentLevels);

/// The run-level treatment constants realized from their calibration
/// distributions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreatmentLevels {
    pub tx_coverage: f64,
    pub sam_tx_efficacy: f64,
    pub mam_tx_efficacy: f64,
    /// Calibrated total annual exit rate out of SAM.
    pub sam_exit_rate: f64,
}

/// Per-person treatment coverage state, computed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TreatmentCategory {
    Ineligible,
    Untreated,
    NonResponsive,
    EffectivelyCovered,
}

/// The ordered coverage decision list. Ties resolve toward the
/// earlier-listed category: a propensity equal to the level is not
/// covered, and an efficacy propensity equal to the efficacy level is not
/// responsive.
#[must_use]
pub fn classify_treatment(
    age: f64,
    coverage_level: f64,
    efficacy_level: f64,
    treatment_propensity: f64,
    efficacy_propensity: f64,
    coverage_start_age: f64,
) -> TreatmentCategory {
    if age < coverage_start_age {
        TreatmentCategory::Ineligible
    } else if coverage_level <= treatment_propensity {
        TreatmentCategory::Untreated
    } else if efficacy_level <= efficacy_propensity {
        TreatmentCategory::NonResponsive
    } else {
        TreatmentCategory::EffectivelyCovered
    }
}

/// Draws the baseline levels from their calibration distributions; one
/// draw per run, identical for every individual.
///
/// # Errors
///
/// Fails if a calibration spec is invalid.
pub fn draw_baseline_levels(context: &mut Context) -> Result<TreatmentLevels, ModelError> {
    let config = *context.get_global_property_value(WastingConfig);
    let tx_coverage = context
        .sample_distr(WastingTreatmentRng, config.baseline_tx_coverage.normal()?)
        .clamp(0.0, 1.0);
    let sam_tx_efficacy = context
        .sample_distr(
            WastingTreatmentRng,
            config.baseline_sam_tx_efficacy.normal()?,
        )
        .clamp(0.0, 1.0);
    let mam_tx_efficacy = context
        .sample_distr(
            WastingTreatmentRng,
            config.baseline_mam_tx_efficacy.normal()?,
        )
        .clamp(0.0, 1.0);
    let sam_exit_rate =
        context.sample_distr(WastingTreatmentRng, config.sam_exit_rate.lognormal()?);
    Ok(TreatmentLevels {
        tx_coverage,
        sam_tx_efficacy,
        mam_tx_efficacy,
        sam_exit_rate,
    })
}

/// Whether the alternative-scenario constants are in force at the current
/// simulation time.
#[must_use]
pub fn scale_up_reached(context: &Context) -> bool {
    let scenario = context.get_global_property_value(Parameters).scenario;
    let config = context.get_global_property_value(WastingConfig);
    scenario.has_alternative_treatment() && simulation_year(context) >= config.scale_up_start_year
}

/// The fixed scale-up constants. The calibrated SAM exit rate is a
/// natural-history quantity and keeps its baseline draw.
#[must_use]
pub fn alternative_levels(
    baseline: TreatmentLevels,
    config: &WastingParameters,
) -> TreatmentLevels {
    TreatmentLevels {
        tx_coverage: config.alternative_tx_coverage,
        sam_tx_efficacy: config.alternative_sam_tx_efficacy,
        mam_tx_efficacy: config.alternative_mam_tx_efficacy,
        sam_exit_rate: baseline.sam_exit_rate,
    }
}

/// The levels in force at the current simulation time: the baseline draw,
/// or the fixed alternative-scenario constants once the scale-up date is
/// reached.
#[must_use]
pub fn levels_at(context: &Context) -> TreatmentLevels {
    let baseline = *context.get_global_property_value(BaselineTreatmentLevels);
    if scale_up_reached(context) {
        alternative_levels(baseline, context.get_global_property_value(WastingConfig))
    } else {
        baseline
    }
}

enum TreatmentBranch {
    Sam,
    Mam,
}

fn coverage_value(context: &Context, person_id: PersonId, branch: &TreatmentBranch) -> f64 {
    let config = context.get_global_property_value(WastingConfig);
    let levels = levels_at(context);
    let efficacy = match branch {
        TreatmentBranch::Sam => levels.sam_tx_efficacy,
        TreatmentBranch::Mam => levels.mam_tx_efficacy,
    };
    let category = classify_treatment(
        context.person_age_years(person_id),
        levels.tx_coverage,
        efficacy,
        context.get_person_property(person_id, WastingTreatmentPropensity),
        context.get_person_property(person_id, WastingTreatmentEfficacyPropensity),
        config.tx_coverage_start_age,
    );
    if category == TreatmentCategory::EffectivelyCovered {
        1.0
    } else {
        0.0
    }
}

/// Draws the run's baseline levels and registers the per-person coverage
/// producers.
///
/// # Errors
///
/// Fails if a calibration spec is invalid.
pub fn init(context: &mut Context) -> Result<(), ModelError> {
    let levels = draw_baseline_levels(context)?;
    info!(
        "baseline treatment levels: coverage {:.3}, SAM efficacy {:.3}, MAM efficacy {:.3}, SAM exit rate {:.2}",
        levels.tx_coverage, levels.sam_tx_efficacy, levels.mam_tx_efficacy, levels.sam_exit_rate
    );
    context.set_global_property_value(BaselineTreatmentLevels, levels);

    context.register_value_producer(SAM_COVERAGE_VALUE, |context, person_id| {
        coverage_value(context, person_id, &TreatmentBranch::Sam)
    });
    context.register_value_producer(MAM_COVERAGE_VALUE, |context, person_id| {
        coverage_value(context, person_id, &TreatmentBranch::Mam)
    });
    Ok(())
}

/// Creates the two fixed propensity columns for a newly initialized
/// individual.
pub fn initialize_person(context: &mut Context, person_id: PersonId) {
    let treatment_propensity = context.sample_uniform(WastingTreatmentPropensityRng);
    context.initialize_person_property(
        person_id,
        WastingTreatmentPropensity,
        treatment_propensity,
    );
    let efficacy_propensity = context.sample_uniform(WastingTreatmentEfficacyPropensityRng);
    context.initialize_person_property(
        person_id,
        WastingTreatmentEfficacyPropensity,
        efficacy_propensity,
    );
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parameters::{ParametersValues, Scenario, WastingParameters};

    const START_AGE: f64 = 28.0 / 365.25;

    #[test]
    fn classification_is_exhaustive_and_exclusive() {
        // Exactly one category holds for every combination, including the
        // boundary values.
        for age in [0.0, START_AGE, 0.5, 2.0] {
            for coverage_level in [0.0, 0.3, 0.5, 1.0] {
                for efficacy_level in [0.0, 0.5, 0.7, 1.0] {
                    for treatment_propensity in [0.0, 0.3, 0.5, 0.999] {
                        for efficacy_propensity in [0.0, 0.5, 0.7, 0.999] {
                            let category = classify_treatment(
                                age,
                                coverage_level,
                                efficacy_level,
                                treatment_propensity,
                                efficacy_propensity,
                                START_AGE,
                            );
                            let expected = if age < START_AGE {
                                TreatmentCategory::Ineligible
                            } else if coverage_level <= treatment_propensity {
                                TreatmentCategory::Untreated
                            } else if efficacy_level <= efficacy_propensity {
                                TreatmentCategory::NonResponsive
                            } else {
                                TreatmentCategory::EffectivelyCovered
                            };
                            assert_eq!(category, expected);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn boundary_ties_resolve_to_earlier_category() {
        // coverage == propensity is untreated, not covered
        assert_eq!(
            classify_treatment(1.0, 0.5, 0.7, 0.5, 0.0, START_AGE),
            TreatmentCategory::Untreated
        );
        // efficacy == propensity is non-responsive
        assert_eq!(
            classify_treatment(1.0, 0.5, 0.7, 0.4, 0.7, START_AGE),
            TreatmentCategory::NonResponsive
        );
        // age == start age is eligible
        assert_ne!(
            classify_treatment(START_AGE, 0.5, 0.7, 0.4, 0.3, START_AGE),
            TreatmentCategory::Ineligible
        );
    }

    fn fixture(scenario: Scenario) -> Context {
        let mut context = Context::new();
        context.init_random(42);
        context.set_global_property_value(WastingConfig, WastingParameters::standard());
        context.set_global_property_value(
            Parameters,
            ParametersValues {
                population: 1,
                seed: 42,
                draw: 0,
                scenario,
                start_year: 2022,
                max_time: 730.0,
                step_size: 1.0,
                data_dir: String::new(),
                output_file: String::new(),
                transition_output_file: String::new(),
            },
        );
        context
    }

    #[test]
    fn baseline_levels_are_reproducible_and_in_range() {
        let mut context = fixture(Scenario::Baseline);
        let first = draw_baseline_levels(&mut context).unwrap();
        context.init_random(42);
        let second = draw_baseline_levels(&mut context).unwrap();
        assert_eq!(first, second);
        assert!((0.0..=1.0).contains(&first.tx_coverage));
        assert!((0.0..=1.0).contains(&first.sam_tx_efficacy));
        assert!(first.sam_exit_rate > 0.0);
    }

    #[test]
    fn baseline_scenario_never_switches_levels() {
        let mut context = fixture(Scenario::Baseline);
        let baseline = draw_baseline_levels(&mut context).unwrap();
        context.set_global_property_value(BaselineTreatmentLevels, baseline);

        // Two years in, well past the scale-up date
        context.step(730.0);
        assert_eq!(levels_at(&context), baseline);
    }

    #[test]
    fn alternative_scenario_switches_at_scale_up() {
        let mut context = fixture(Scenario::WastingTreatment);
        let baseline = draw_baseline_levels(&mut context).unwrap();
        context.set_global_property_value(BaselineTreatmentLevels, baseline);

        assert_eq!(levels_at(&context), baseline);

        context.step(730.0);
        let switched = levels_at(&context);
        assert_eq!(switched.tx_coverage, 0.7);
        assert_eq!(switched.sam_tx_efficacy, 0.75);
        // the calibrated exit rate is not scenario-dependent
        assert_eq!(switched.sam_exit_rate, baseline.sam_exit_rate);
    }
}
