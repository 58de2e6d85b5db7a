//! The transition-rate solvers: the algebraic inversion of the four-state
//! wasting chain. Given observed exposures, the all-cause mortality
//! adjustment, per-category mortality probabilities, and the treatment
//! levels, each solver produces the daily probability of one directed
//! transition under steady-state assumptions and annualizes it.
//!
//! States are numbered by severity (1 = SAM .. 4 = TMREL); `f_k` is raw
//! exposure of category k, `ap_k` its mortality-adjusted exposure, `d_k`
//! its daily mortality probability and `adj` the all-cause daily
//! mortality probability.

use crate::error::ModelError;
use crate::parameters::WastingParameters;
use crate::stratification::{CategoryTable, StratTable, Stratum};
use crate::units::{
    annual_rate_to_daily_probability, daily_probability_to_annual_rate, YEAR_DURATION,
};
use crate::wasting::exposure::adjust_exposure;
use crate::wasting::treatment::TreatmentLevels;

const CAT1: usize = 0;
const CAT2: usize = 1;
const CAT3: usize = 2;
const CAT4: usize = 3;

/// Treated-recovery times are stratified at six months of age.
const SIX_MONTHS: f64 = 0.5;

/// Annual rates for the seven directed edges of the wasting chain, each
/// tabulated over the exposure index.
pub struct TransitionRateTables {
    /// susceptible -> mild (i3)
    pub mild_incidence: StratTable,
    /// mild -> susceptible (r4)
    pub mild_remission: StratTable,
    /// mild -> moderate (i2)
    pub mam_incidence: StratTable,
    /// moderate -> mild (r3)
    pub mam_remission: StratTable,
    /// moderate -> severe (i1)
    pub sam_incidence: StratTable,
    /// severe -> moderate (r2)
    pub sam_untreated_remission: StratTable,
    /// severe -> mild (t1)
    pub sam_treated_remission: StratTable,
}

/// r4: mild wasting resolves untreated over a fixed recovery time.
#[must_use]
pub fn mild_remission_daily_probability(config: &WastingParameters) -> f64 {
    1.0 / config.mild_ux_recovery_time
}

/// r3: a coverage-weighted mix of treated and untreated recovery, with
/// the treated recovery time depending on the under/over six months age
/// split.
#[must_use]
pub fn mam_remission_daily_probability(
    age_start: f64,
    levels: &TreatmentLevels,
    config: &WastingParameters,
) -> f64 {
    let recovery_time = if age_start < SIX_MONTHS {
        config.mam_tx_recovery_time_under_6mo
    } else {
        config.mam_tx_recovery_time_over_6mo
    };
    let effective_coverage = levels.tx_coverage * levels.mam_tx_efficacy;
    let annual_rate = effective_coverage * YEAR_DURATION / recovery_time
        + (1.0 - effective_coverage) * YEAR_DURATION / config.mam_ux_recovery_time;
    annual_rate_to_daily_probability(annual_rate)
}

/// t1: effectively covered SAM cases remit to mild over the treated
/// recovery time.
#[must_use]
pub fn sam_treated_remission_daily_probability(
    age_start: f64,
    levels: &TreatmentLevels,
    config: &WastingParameters,
) -> f64 {
    let recovery_time = if age_start < SIX_MONTHS {
        config.sam_tx_recovery_time_under_6mo
    } else {
        config.sam_tx_recovery_time_over_6mo
    };
    let annual_rate =
        levels.tx_coverage * levels.sam_tx_efficacy * YEAR_DURATION / recovery_time;
    annual_rate_to_daily_probability(annual_rate)
}

/// r2: whatever remains of the calibrated total SAM exit rate after the
/// treated-remission and mortality exits are taken out.
#[must_use]
pub fn sam_untreated_remission_daily_probability(
    age_start: f64,
    sam_mortality_daily_probability: f64,
    levels: &TreatmentLevels,
    config: &WastingParameters,
) -> f64 {
    let treated = sam_treated_remission_daily_probability(age_start, levels, config);
    let annual_rate = levels.sam_exit_rate
        - daily_probability_to_annual_rate(treated)
        - daily_probability_to_annual_rate(sam_mortality_daily_probability);
    annual_rate_to_daily_probability(annual_rate)
}

/// Per-stratum inputs shared by the three incidence solvers.
struct StratumInputs {
    adjustment: f64,
    exposure: [f64; 4],
    adjusted: [f64; 4],
    mortality: [f64; 4],
}

// i3: adj*f4/ap4 + ap3*r4/ap4 - d4
fn mild_incidence_daily_probability(inputs: &StratumInputs, config: &WastingParameters) -> f64 {
    let r4 = mild_remission_daily_probability(config);
    inputs.adjustment * inputs.exposure[CAT4] / inputs.adjusted[CAT4]
        + inputs.adjusted[CAT3] * r4 / inputs.adjusted[CAT4]
        - inputs.mortality[CAT4]
}

// i2: adj*f3/ap3 + adj*f4/ap3 + ap1*t1/ap3 + ap2*r3/ap3 - d3 - ap4*d4/ap3
fn mam_incidence_daily_probability(
    inputs: &StratumInputs,
    age_start: f64,
    levels: &TreatmentLevels,
    config: &WastingParameters,
) -> f64 {
    let t1 = sam_treated_remission_daily_probability(age_start, levels, config);
    let r3 = mam_remission_daily_probability(age_start, levels, config);
    inputs.adjustment * inputs.exposure[CAT3] / inputs.adjusted[CAT3]
        + inputs.adjustment * inputs.exposure[CAT4] / inputs.adjusted[CAT3]
        + inputs.adjusted[CAT1] * t1 / inputs.adjusted[CAT3]
        + inputs.adjusted[CAT2] * r3 / inputs.adjusted[CAT3]
        - inputs.mortality[CAT3]
        - inputs.adjusted[CAT4] * inputs.mortality[CAT4] / inputs.adjusted[CAT3]
}

// i1: adj*f2/ap2 + adj*f3/ap2 + adj*f4/ap2 + ap1*(r2 + t1)/ap2 - d2
//     - ap3*d3/ap2 - ap4*d4/ap2
fn sam_incidence_daily_probability(
    inputs: &StratumInputs,
    age_start: f64,
    levels: &TreatmentLevels,
    config: &WastingParameters,
) -> f64 {
    let t1 = sam_treated_remission_daily_probability(age_start, levels, config);
    let r2 = sam_untreated_remission_daily_probability(
        age_start,
        inputs.mortality[CAT1],
        levels,
        config,
    );
    inputs.adjustment * inputs.exposure[CAT2] / inputs.adjusted[CAT2]
        + inputs.adjustment * inputs.exposure[CAT3] / inputs.adjusted[CAT2]
        + inputs.adjustment * inputs.exposure[CAT4] / inputs.adjusted[CAT2]
        + inputs.adjusted[CAT1] * (r2 + t1) / inputs.adjusted[CAT2]
        - inputs.mortality[CAT2]
        - inputs.adjusted[CAT3] * inputs.mortality[CAT3] / inputs.adjusted[CAT2]
        - inputs.adjusted[CAT4] * inputs.mortality[CAT4] / inputs.adjusted[CAT2]
}

/// Turns a solved daily probability into the annual rate the state machine
/// consumes. Strata entirely below the model start age get exactly 0.
/// A division by a zero adjusted exposure (or any other degenerate
/// arithmetic) yields a non-finite probability, and a supersaturated or
/// negative probability has no meaningful rate; all collapse to 0 rather
/// than reaching the state machine.
fn finalize_rate(daily_probability: f64, stratum: &Stratum, config: &WastingParameters) -> f64 {
    if stratum.age_end <= config.start_age {
        return 0.0;
    }
    if !daily_probability.is_finite() || daily_probability < 0.0 {
        return 0.0;
    }
    let annual_rate = daily_probability_to_annual_rate(daily_probability);
    if annual_rate.is_finite() {
        annual_rate
    } else {
        0.0
    }
}

/// Solves all seven edges over the exposure index.
///
/// # Errors
///
/// Fails if the exposure, adjustment, and mortality indexes do not align
/// row-for-row.
pub fn derive_transition_rates(
    exposures: &CategoryTable,
    adjustment: &StratTable,
    mortality: &CategoryTable,
    levels: &TreatmentLevels,
    config: &WastingParameters,
) -> Result<TransitionRateTables, ModelError> {
    let adjusted = adjust_exposure(exposures, adjustment)?;
    if mortality.len() != exposures.len() {
        return Err(ModelError::ModelError(format!(
            "exposure and mortality indexes differ in length: {} vs {}",
            exposures.len(),
            mortality.len()
        )));
    }

    let mut mild_incidence = Vec::with_capacity(exposures.len());
    let mut mild_remission = Vec::with_capacity(exposures.len());
    let mut mam_incidence = Vec::with_capacity(exposures.len());
    let mut mam_remission = Vec::with_capacity(exposures.len());
    let mut sam_incidence = Vec::with_capacity(exposures.len());
    let mut sam_untreated_remission = Vec::with_capacity(exposures.len());
    let mut sam_treated_remission = Vec::with_capacity(exposures.len());

    for (((stratum, exposure), (_, adjusted_exposure)), ((mortality_stratum, d), (_, adj))) in
        exposures
            .iter()
            .zip(adjusted.iter())
            .zip(mortality.iter().zip(adjustment.iter()))
    {
        if stratum != mortality_stratum {
            return Err(ModelError::ModelError(format!(
                "exposure and mortality indexes do not align: {stratum} vs {mortality_stratum}"
            )));
        }
        let inputs = StratumInputs {
            adjustment: adj,
            exposure: *exposure,
            adjusted: *adjusted_exposure,
            mortality: *d,
        };
        let age = stratum.age_start;

        mild_incidence.push((
            *stratum,
            finalize_rate(mild_incidence_daily_probability(&inputs, config), stratum, config),
        ));
        mild_remission.push((
            *stratum,
            finalize_rate(mild_remission_daily_probability(config), stratum, config),
        ));
        mam_incidence.push((
            *stratum,
            finalize_rate(
                mam_incidence_daily_probability(&inputs, age, levels, config),
                stratum,
                config,
            ),
        ));
        mam_remission.push((
            *stratum,
            finalize_rate(
                mam_remission_daily_probability(age, levels, config),
                stratum,
                config,
            ),
        ));
        sam_incidence.push((
            *stratum,
            finalize_rate(
                sam_incidence_daily_probability(&inputs, age, levels, config),
                stratum,
                config,
            ),
        ));
        sam_untreated_remission.push((
            *stratum,
            finalize_rate(
                sam_untreated_remission_daily_probability(
                    age,
                    inputs.mortality[CAT1],
                    levels,
                    config,
                ),
                stratum,
                config,
            ),
        ));
        sam_treated_remission.push((
            *stratum,
            finalize_rate(
                sam_treated_remission_daily_probability(age, levels, config),
                stratum,
                config,
            ),
        ));
    }

    Ok(TransitionRateTables {
        mild_incidence: StratTable::new(mild_incidence),
        mild_remission: StratTable::new(mild_remission),
        mam_incidence: StratTable::new(mam_incidence),
        mam_remission: StratTable::new(mam_remission),
        sam_incidence: StratTable::new(sam_incidence),
        sam_untreated_remission: StratTable::new(sam_untreated_remission),
        sam_treated_remission: StratTable::new(sam_treated_remission),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stratification::Sex;
    use crate::units::rate_to_probability;
    use assert_approx_eq::assert_approx_eq;

    fn levels() -> TreatmentLevels {
        TreatmentLevels {
            tx_coverage: 0.488,
            sam_tx_efficacy: 0.700,
            mam_tx_efficacy: 0.731,
            sam_exit_rate: 6.7,
        }
    }

    fn stratum(age_start: f64, age_end: f64) -> Stratum {
        Stratum {
            sex: Sex::Male,
            age_start,
            age_end,
            year_start: 2022,
            year_end: 2023,
        }
    }

    fn fixture_tables() -> (CategoryTable, StratTable, CategoryTable) {
        let strata = [stratum(0.0, 0.5), stratum(0.5, 1.0), stratum(1.0, 5.0)];
        let exposures = CategoryTable::new(
            strata
                .iter()
                .map(|s| (*s, [0.03, 0.07, 0.2, 0.7]))
                .collect(),
        );
        let adjustment = StratTable::new(strata.iter().map(|s| (*s, 1e-4)).collect());
        let mortality = CategoryTable::new(
            strata
                .iter()
                .map(|s| (*s, [8e-4, 3e-4, 1.5e-4, 1e-4]))
                .collect(),
        );
        (exposures, adjustment, mortality)
    }

    #[test]
    fn treated_sam_remission_matches_closed_form() {
        // age 1.0, coverage 0.488, efficacy 0.700, recovery time 48.3 days
        let config = WastingParameters::standard();
        let expected: f64 = 1.0 - (-(0.488_f64 * 0.700 * 365.25 / 48.3) / 365.25).exp();
        let actual = sam_treated_remission_daily_probability(1.0, &levels(), &config);
        assert_approx_eq!(actual, expected, 1e-9);
    }

    #[test]
    fn treated_sam_remission_uses_infant_recovery_time_under_6mo() {
        let config = WastingParameters::standard();
        let under = sam_treated_remission_daily_probability(0.25, &levels(), &config);
        let expected: f64 = 1.0 - (-(0.488_f64 * 0.700 * 365.25 / 13.3) / 365.25).exp();
        assert_approx_eq!(under, expected, 1e-9);
    }

    #[test]
    fn treated_remission_is_monotone_in_efficacy() {
        let config = WastingParameters::standard();
        let mut previous = -1.0;
        for efficacy in [0.0, 0.2, 0.5, 0.7, 0.9, 1.0] {
            let current = sam_treated_remission_daily_probability(
                1.0,
                &TreatmentLevels {
                    sam_tx_efficacy: efficacy,
                    ..levels()
                },
                &config,
            );
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn untreated_remission_shrinks_as_efficacy_grows() {
        // The calibrated total exit rate is fixed, so a more effective
        // treated branch leaves less for the untreated branch.
        let config = WastingParameters::standard();
        let low = sam_untreated_remission_daily_probability(
            1.0,
            1e-3,
            &TreatmentLevels {
                sam_tx_efficacy: 0.5,
                ..levels()
            },
            &config,
        );
        let high = sam_untreated_remission_daily_probability(
            1.0,
            1e-3,
            &TreatmentLevels {
                sam_tx_efficacy: 0.9,
                ..levels()
            },
            &config,
        );
        assert!(high < low);
    }

    #[test]
    fn untreated_remission_decomposes_the_exit_rate() {
        let config = WastingParameters::standard();
        let d1 = 1e-3;
        let r2 = sam_untreated_remission_daily_probability(1.0, d1, &levels(), &config);
        let t1 = sam_treated_remission_daily_probability(1.0, &levels(), &config);
        let total = daily_probability_to_annual_rate(r2)
            + daily_probability_to_annual_rate(t1)
            + daily_probability_to_annual_rate(d1);
        assert_approx_eq!(total, 6.7, 1e-9);
    }

    #[test]
    fn mam_remission_mixes_treated_and_untreated_recovery() {
        let config = WastingParameters::standard();
        let effective_coverage: f64 = 0.488 * 0.731;
        let annual = effective_coverage * 365.25 / 41.3
            + (1.0 - effective_coverage) * 365.25 / 147.0;
        let expected: f64 = 1.0 - (-annual / 365.25).exp();
        assert_approx_eq!(
            mam_remission_daily_probability(1.0, &levels(), &config),
            expected,
            1e-9
        );
    }

    #[test]
    fn all_rates_are_zero_below_the_start_age() {
        let config = WastingParameters::standard();
        let (exposures, adjustment, mortality) = fixture_tables();
        let rates =
            derive_transition_rates(&exposures, &adjustment, &mortality, &levels(), &config)
                .unwrap();
        let gated = stratum(0.0, 0.5);
        for table in [
            &rates.mild_incidence,
            &rates.mild_remission,
            &rates.mam_incidence,
            &rates.mam_remission,
            &rates.sam_incidence,
            &rates.sam_untreated_remission,
            &rates.sam_treated_remission,
        ] {
            assert_eq!(table.get(&gated), Some(0.0));
        }
    }

    #[test]
    fn rates_are_nonnegative_and_finite_above_the_start_age() {
        let config = WastingParameters::standard();
        let (exposures, adjustment, mortality) = fixture_tables();
        let rates =
            derive_transition_rates(&exposures, &adjustment, &mortality, &levels(), &config)
                .unwrap();
        for table in [
            &rates.mild_incidence,
            &rates.mild_remission,
            &rates.mam_incidence,
            &rates.mam_remission,
            &rates.sam_incidence,
            &rates.sam_untreated_remission,
            &rates.sam_treated_remission,
        ] {
            for (_, rate) in table.iter() {
                assert!(rate.is_finite() && rate >= 0.0);
            }
        }
        // and the ungated strata actually carry dynamics
        assert!(rates.mild_incidence.get(&stratum(1.0, 5.0)).unwrap() > 0.0);
    }

    #[test]
    fn mild_incidence_matches_hand_computed_algebra() {
        let config = WastingParameters::standard();
        let (exposures, adjustment, mortality) = fixture_tables();
        let rates =
            derive_transition_rates(&exposures, &adjustment, &mortality, &levels(), &config)
                .unwrap();

        let adj = 1e-4;
        let ap4 = 0.7 / (1.0 + adj);
        let ap3 = 0.2 / (1.0 + adj);
        let r4 = 1.0 / 1000.0;
        let i3 = adj * 0.7 / ap4 + ap3 * r4 / ap4 - 1e-4;
        let expected = daily_probability_to_annual_rate(i3);
        assert_approx_eq!(
            rates.mild_incidence.get(&stratum(1.0, 5.0)).unwrap(),
            expected,
            1e-12
        );
    }

    #[test]
    fn zero_adjusted_exposure_denominator_collapses_to_zero() {
        let config = WastingParameters::standard();
        let strata = [stratum(1.0, 5.0)];
        // cat4 exposure of 0 makes every /ap4 term undefined
        let exposures =
            CategoryTable::new(strata.iter().map(|s| (*s, [0.1, 0.3, 0.6, 0.0])).collect());
        let adjustment = StratTable::new(strata.iter().map(|s| (*s, 1e-4)).collect());
        let mortality = CategoryTable::new(
            strata
                .iter()
                .map(|s| (*s, [8e-4, 3e-4, 1.5e-4, 1e-4]))
                .collect(),
        );
        let rates =
            derive_transition_rates(&exposures, &adjustment, &mortality, &levels(), &config)
                .unwrap();
        assert_eq!(rates.mild_incidence.get(&stratum(1.0, 5.0)), Some(0.0));
    }

    #[test]
    fn step_probability_round_trips_through_the_annual_rate() {
        // The state machine consumes annual rates; over a one-day step the
        // implied probability is the solver's daily probability again.
        let config = WastingParameters::standard();
        let t1 = sam_treated_remission_daily_probability(1.0, &levels(), &config);
        let annual = daily_probability_to_annual_rate(t1);
        assert_approx_eq!(rate_to_probability(annual, 1.0), t1, 1e-12);
    }
}
