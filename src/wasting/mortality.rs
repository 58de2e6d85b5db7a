//! The mortality-probability composer: one daily all-cause-equivalent
//! mortality probability per wasting category and stratum.
//!
//! For each comorbid cause the incidence attributable to a wasting
//! category is `RR * incidence * (1 - PAF)`; prevalence follows as
//! incidence times a fixed mean duration, except protein-energy
//! malnutrition, whose prevalence is a prior (definitionally coincident
//! with SAM/MAM). Summing `prevalence * EMR - CSMR` over causes on top of
//! the all-cause rate yields the per-category mortality rate, which is
//! converted to a daily probability. Individual cause terms may be
//! transiently negative; only the summed total is expected to be
//! physically sensible, so there is no per-term clamping.

use strum::IntoEnumIterator;

use crate::artifact::{Artifact, ArtifactKey, Cause};
use crate::error::ModelError;
use crate::parameters::WastingParameters;
use crate::stratification::{Category, CategoryTable, StratTable, Stratum};
use crate::units::{annual_rate_to_daily_probability, YEAR_DURATION};

/// Prevalence prior for protein-energy malnutrition over cat1..cat4: PEM
/// is definitionally present in the two severe categories and absent in
/// the two mild ones.
const PEM_PREVALENCE_PRIOR: [f64; Category::COUNT] = [1.0, 1.0, 0.0, 0.0];

/// Mortality inputs for one comorbid cause. Lookups that miss a stratum
/// contribute 0: absence encodes "not applicable in this stratum".
pub struct CauseInputs {
    pub cause: Cause,
    pub emr: StratTable,
    pub csmr: StratTable,
    pub incidence: Option<StratTable>,
    pub paf: StratTable,
    pub relative_risk: CategoryTable,
}

pub struct MortalityInputs {
    pub acmr: StratTable,
    pub causes: Vec<CauseInputs>,
}

/// Loads every table the composer needs for the configured draw.
///
/// # Errors
///
/// Fails if any artifact table is malformed.
pub fn load_mortality_inputs(artifact: &Artifact) -> Result<MortalityInputs, ModelError> {
    let acmr = artifact.table(ArtifactKey::Acmr)?;
    let mut causes = Vec::new();
    for cause in Cause::iter() {
        let entity = cause.to_string();
        let incidence = match cause.incidence_key() {
            Some(key) => Some(artifact.table(key)?),
            None => None,
        };
        causes.push(CauseInputs {
            cause,
            emr: artifact.table(cause.emr_key())?,
            csmr: artifact.table(cause.csmr_key())?,
            incidence,
            paf: artifact.table_for_entity(ArtifactKey::WastingPaf, &entity)?,
            relative_risk: artifact
                .category_table_for_entity(ArtifactKey::WastingRelativeRisk, &entity)?,
        });
    }
    Ok(MortalityInputs { acmr, causes })
}

fn cause_duration_years(cause: Cause, stratum: &Stratum, config: &WastingParameters) -> f64 {
    // The earliest age bin resolves faster than true remission can occur,
    // so duration there is half the bin width.
    let days = if stratum.age_start == 0.0 {
        config.early_neonatal_cause_duration
    } else {
        match cause {
            Cause::DiarrhealDiseases => config.diarrhea_duration,
            Cause::Measles => config.measles_duration,
            Cause::LowerRespiratoryInfections => config.lri_duration,
            Cause::ProteinEnergyMalnutrition => 0.0,
        }
    };
    days / YEAR_DURATION
}

/// The composed daily mortality probability per category and stratum,
/// over the ACMR index. Non-finite totals follow the missing-data
/// convention and become 0.
#[must_use]
pub fn daily_mortality_probabilities(
    inputs: &MortalityInputs,
    config: &WastingParameters,
) -> CategoryTable {
    let mut totals: Vec<(Stratum, [f64; Category::COUNT])> = inputs
        .acmr
        .iter()
        .map(|(stratum, acmr)| (*stratum, [acmr; Category::COUNT]))
        .collect();

    for cause_inputs in &inputs.causes {
        for (stratum, values) in &mut totals {
            let emr = cause_inputs.emr.get(stratum).unwrap_or(0.0);
            let csmr = cause_inputs.csmr.get(stratum).unwrap_or(0.0);
            let prevalence = category_prevalence(cause_inputs, stratum, config);
            for category in Category::iter() {
                let index = category.index();
                values[index] += prevalence[index] * emr - csmr;
            }
        }
    }

    CategoryTable::new(totals).map(|rate| {
        if rate.is_finite() {
            annual_rate_to_daily_probability(rate)
        } else {
            0.0
        }
    })
}

fn category_prevalence(
    cause_inputs: &CauseInputs,
    stratum: &Stratum,
    config: &WastingParameters,
) -> [f64; Category::COUNT] {
    if cause_inputs.cause == Cause::ProteinEnergyMalnutrition {
        return PEM_PREVALENCE_PRIOR;
    }
    let incidence = cause_inputs
        .incidence
        .as_ref()
        .and_then(|table| table.get(stratum))
        .unwrap_or(0.0);
    let paf = cause_inputs.paf.get(stratum).unwrap_or(0.0);
    let duration = cause_duration_years(cause_inputs.cause, stratum, config);

    let mut prevalence = [0.0; Category::COUNT];
    for category in Category::iter() {
        let relative_risk = cause_inputs
            .relative_risk
            .get(stratum, category)
            .unwrap_or(0.0);
        // prevalence_ci = rr_ci * incidence_c * (1 - paf_c) * duration_c
        prevalence[category.index()] = relative_risk * incidence * (1.0 - paf) * duration;
    }
    prevalence
}
