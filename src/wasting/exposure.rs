//! Wasting exposure loading and the mortality-feedback adjustment.
//!
//! Observed cross-sectional prevalence already reflects differential
//! mortality by category (higher mortality in the severe categories
//! depletes their prevalence), so the rate solvers divide every exposure
//! by `1 + daily all-cause mortality probability` before using it as a
//! denominator.

use crate::artifact::{Artifact, ArtifactKey};
use crate::error::ModelError;
use crate::stratification::{Category, CategoryTable, StratTable};
use crate::units::annual_rate_to_daily_probability;

/// The wide per-stratum exposure table, one proportion per category. The
/// proportions are used as loaded; callers that need exact category
/// closure renormalize explicitly via [`CategoryTable::normalized`].
pub fn load_wasting_exposures(artifact: &Artifact) -> Result<CategoryTable, ModelError> {
    artifact.category_table(ArtifactKey::WastingExposure)
}

/// The all-cause mortality rate as a daily probability; the adjustment
/// denominator used throughout the rate solvers.
pub fn load_acmr_adjustment(artifact: &Artifact) -> Result<StratTable, ModelError> {
    Ok(artifact
        .table(ArtifactKey::Acmr)?
        .map(annual_rate_to_daily_probability))
}

/// `adjusted = raw / (1 + adjustment)`, element-wise over an index shared
/// with the adjustment table.
///
/// # Errors
///
/// Fails if the exposure and adjustment indexes do not align
/// row-for-row.
pub fn adjust_exposure(
    exposures: &CategoryTable,
    adjustment: &StratTable,
) -> Result<CategoryTable, ModelError> {
    if exposures.len() != adjustment.len() {
        return Err(ModelError::ModelError(format!(
            "exposure and adjustment indexes differ in length: {} vs {}",
            exposures.len(),
            adjustment.len()
        )));
    }
    let mut rows = Vec::with_capacity(exposures.len());
    for ((stratum, values), (adjustment_stratum, adjustment_value)) in
        exposures.iter().zip(adjustment.iter())
    {
        if stratum != adjustment_stratum {
            return Err(ModelError::ModelError(format!(
                "exposure and adjustment indexes do not align: {stratum} vs {adjustment_stratum}"
            )));
        }
        rows.push((*stratum, values.map(|value| value / (1.0 + adjustment_value))));
    }
    Ok(CategoryTable::new(rows))
}

/// One category's exposure in the strata whose age bin starts at the model
/// start age; used to seed the wasting state of individuals entering the
/// model.
#[must_use]
pub fn birth_prevalence(
    exposures: &CategoryTable,
    category: Category,
    start_age: f64,
) -> StratTable {
    StratTable::new(
        exposures
            .iter()
            .filter(|(stratum, _)| stratum.age_start == start_age)
            .map(|(stratum, values)| (*stratum, values[category.index()]))
            .collect(),
    )
}
