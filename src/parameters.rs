//! Run configuration and model constants. The run-level parameters come
//! from a JSON file supplied by the operator; the calibration constants of
//! the wasting model live in an immutable [`WastingParameters`] struct
//! constructed once at setup and installed as a global property; there
//! are no process-wide mutable constant tables.

use std::fs::File;
use std::path::Path;

use clap::ValueEnum;
use rand_distr::{LogNormal, Normal};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::context::Context;
use crate::define_global_property;
use crate::error::ModelError;
use crate::global_properties::ContextGlobalPropertiesExt;
use crate::units::YEAR_DURATION;

/// Intervention scenarios. The alternative scenarios switch to the
/// scale-up treatment constants (and, for SQ-LNS, the ramped-up coverage)
/// once the scale-up date is reached.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Scenario {
    Baseline,
    WastingTreatment,
    WastingTreatmentAndSqLns,
}

impl Scenario {
    #[must_use]
    pub fn has_alternative_treatment(self) -> bool {
        !matches!(self, Scenario::Baseline)
    }

    #[must_use]
    pub fn has_sq_lns(self) -> bool {
        matches!(self, Scenario::WastingTreatmentAndSqLns)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ParametersValues {
    pub population: usize,
    pub seed: u64,
    /// Which Monte Carlo parameter draw to load from the artifact.
    pub draw: u32,
    pub scenario: Scenario,
    /// Calendar year at simulation time zero.
    pub start_year: i32,
    /// Simulation horizon in days.
    pub max_time: f64,
    /// Time step in days.
    pub step_size: f64,
    pub data_dir: String,
    pub output_file: String,
    pub transition_output_file: String,
}

define_global_property!(Parameters, ParametersValues);

/// Loads run parameters from a JSON file and installs them as a global
/// property.
///
/// # Errors
///
/// Fails if the file is unreadable, the JSON does not match
/// [`ParametersValues`] (an unrecognized scenario name fails here), or a
/// value is out of range.
pub fn init_parameters(context: &mut Context, file_path: &Path) -> Result<(), ModelError> {
    let file = File::open(file_path)?;
    let parameters: ParametersValues = serde_json::from_reader(file)?;
    validate(&parameters)?;
    context.set_global_property_value(Parameters, parameters);
    Ok(())
}

fn validate(parameters: &ParametersValues) -> Result<(), ModelError> {
    if parameters.population == 0 {
        return Err("population must be positive".into());
    }
    if !parameters.step_size.is_finite() || parameters.step_size <= 0.0 {
        return Err("step_size must be positive and finite".into());
    }
    if !parameters.max_time.is_finite() || parameters.max_time < parameters.step_size {
        return Err("max_time must be at least one step".into());
    }
    Ok(())
}

/// The calendar year (fractional) at the current simulation time.
#[must_use]
pub fn simulation_year(context: &Context) -> f64 {
    let parameters = context.get_global_property_value(Parameters);
    f64::from(parameters.start_year) + context.get_current_time() / YEAR_DURATION
}

// 95% interval half-width in standard normal units
const QUANTILE_Z: f64 = 1.959_964;

/// A calibrated quantity expressed as its median and 95% uncertainty
/// interval; realized once per run as a normal or log-normal draw.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantileSpec {
    pub median: f64,
    pub lower: f64,
    pub upper: f64,
}

impl QuantileSpec {
    /// The normal distribution whose 2.5th/97.5th percentiles match the
    /// spec.
    ///
    /// # Errors
    ///
    /// Fails if the implied standard deviation is not valid.
    pub fn normal(&self) -> Result<Normal<f64>, ModelError> {
        let std_dev = (self.upper - self.lower) / (2.0 * QUANTILE_Z);
        Normal::new(self.median, std_dev)
            .map_err(|error| format!("invalid normal spec {self:?}: {error}").into())
    }

    /// The log-normal distribution whose median and 2.5th/97.5th
    /// percentiles match the spec.
    ///
    /// # Errors
    ///
    /// Fails if any quantile is not positive.
    pub fn lognormal(&self) -> Result<LogNormal<f64>, ModelError> {
        if self.lower <= 0.0 || self.median <= 0.0 {
            return Err(format!("lognormal spec requires positive quantiles: {self:?}").into());
        }
        let sigma = (self.upper.ln() - self.lower.ln()) / (2.0 * QUANTILE_Z);
        LogNormal::new(self.median.ln(), sigma)
            .map_err(|error| format!("invalid lognormal spec {self:?}: {error}").into())
    }
}

/// SQ-LNS prevention constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SqLnsParameters {
    /// Age in years below which SQ-LNS is not given.
    pub coverage_start_age: f64,
    pub coverage_baseline: f64,
    /// Coverage once the scale-up date is reached in the SQ-LNS scenario.
    pub coverage_ramp_up: f64,
    pub risk_ratio_wasting_severe: QuantileSpec,
    pub risk_ratio_wasting_moderate: QuantileSpec,
}

/// Calibration constants of the wasting natural-history and treatment
/// model. Durations are days, ages are years, rates are annual.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WastingParameters {
    /// Wasting dynamics do not apply below this age; every transition rate
    /// is forced to zero for strata entirely below it.
    pub start_age: f64,
    /// Age below which treatment coverage does not apply (28 days).
    pub tx_coverage_start_age: f64,
    pub mild_ux_recovery_time: f64,
    pub mam_ux_recovery_time: f64,
    pub mam_tx_recovery_time_under_6mo: f64,
    pub mam_tx_recovery_time_over_6mo: f64,
    pub sam_tx_recovery_time_under_6mo: f64,
    pub sam_tx_recovery_time_over_6mo: f64,
    pub baseline_tx_coverage: QuantileSpec,
    pub baseline_sam_tx_efficacy: QuantileSpec,
    pub baseline_mam_tx_efficacy: QuantileSpec,
    /// Calibrated total annual exit rate out of SAM (`sam_k`); log-normal.
    pub sam_exit_rate: QuantileSpec,
    pub alternative_tx_coverage: f64,
    pub alternative_sam_tx_efficacy: f64,
    pub alternative_mam_tx_efficacy: f64,
    pub scale_up_start_year: f64,
    pub diarrhea_duration: f64,
    pub measles_duration: f64,
    pub lri_duration: f64,
    /// Comorbidity duration in the earliest age bin: the bin resolves
    /// faster than true remission, so duration is half the bin width.
    pub early_neonatal_cause_duration: f64,
    pub sq_lns: SqLnsParameters,
}

impl WastingParameters {
    #[must_use]
    pub fn standard() -> Self {
        WastingParameters {
            start_age: 0.5,
            tx_coverage_start_age: 28.0 / YEAR_DURATION,
            mild_ux_recovery_time: 1000.0,
            mam_ux_recovery_time: 147.0,
            mam_tx_recovery_time_under_6mo: 13.3,
            mam_tx_recovery_time_over_6mo: 41.3,
            sam_tx_recovery_time_under_6mo: 13.3,
            sam_tx_recovery_time_over_6mo: 48.3,
            baseline_tx_coverage: QuantileSpec {
                median: 0.488,
                lower: 0.374,
                upper: 0.604,
            },
            baseline_sam_tx_efficacy: QuantileSpec {
                median: 0.700,
                lower: 0.64,
                upper: 0.76,
            },
            baseline_mam_tx_efficacy: QuantileSpec {
                median: 0.731,
                lower: 0.585,
                upper: 0.877,
            },
            sam_exit_rate: QuantileSpec {
                median: 6.7,
                lower: 5.3,
                upper: 8.4,
            },
            alternative_tx_coverage: 0.7,
            alternative_sam_tx_efficacy: 0.75,
            alternative_mam_tx_efficacy: 0.75,
            scale_up_start_year: 2023.0,
            diarrhea_duration: 10.0,
            measles_duration: 10.0,
            lri_duration: 10.0,
            early_neonatal_cause_duration: 3.5,
            sq_lns: SqLnsParameters {
                coverage_start_age: 0.5,
                coverage_baseline: 0.0,
                coverage_ramp_up: 0.9,
                risk_ratio_wasting_severe: QuantileSpec {
                    median: 0.85,
                    lower: 0.74,
                    upper: 0.98,
                },
                risk_ratio_wasting_moderate: QuantileSpec {
                    median: 0.82,
                    lower: 0.74,
                    upper: 0.91,
                },
            },
        }
    }
}

define_global_property!(WastingConfig, WastingParameters);
