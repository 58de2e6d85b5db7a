//! The artifact: precomputed stratified epidemiological tables, one CSV
//! file per hierarchical data key. The key space is a closed enumeration:
//! every table the model can request is named here, unknown keys cannot be
//! expressed, and a missing table is a fatal configuration error at load
//! time, never a silent default.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use strum::{EnumIter, IntoEnumIterator};

use crate::context::Context;
use crate::define_data_plugin;
use crate::error::ModelError;
use crate::global_properties::ContextGlobalPropertiesExt;
use crate::log::debug;
use crate::parameters::Parameters;
use crate::stratification::{Category, CategoryTable, Sex, StratTable, Stratum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum ArtifactKey {
    WastingExposure,
    WastingRelativeRisk,
    WastingPaf,
    Acmr,
    DiarrheaIncidenceRate,
    DiarrheaEmr,
    DiarrheaCsmr,
    MeaslesIncidenceRate,
    MeaslesEmr,
    MeaslesCsmr,
    LriIncidenceRate,
    LriEmr,
    LriCsmr,
    PemEmr,
    PemCsmr,
    MamDisabilityWeight,
    SamDisabilityWeight,
}

impl ArtifactKey {
    /// The hierarchical string form of the key, which is also the file
    /// stem of the backing CSV table.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            ArtifactKey::WastingExposure => "risk_factor.child_wasting.exposure",
            ArtifactKey::WastingRelativeRisk => "risk_factor.child_wasting.relative_risk",
            ArtifactKey::WastingPaf => {
                "risk_factor.child_wasting.population_attributable_fraction"
            }
            ArtifactKey::Acmr => "cause.all_causes.cause_specific_mortality_rate",
            ArtifactKey::DiarrheaIncidenceRate => "cause.diarrheal_diseases.incidence_rate",
            ArtifactKey::DiarrheaEmr => "cause.diarrheal_diseases.excess_mortality_rate",
            ArtifactKey::DiarrheaCsmr => "cause.diarrheal_diseases.cause_specific_mortality_rate",
            ArtifactKey::MeaslesIncidenceRate => "cause.measles.incidence_rate",
            ArtifactKey::MeaslesEmr => "cause.measles.excess_mortality_rate",
            ArtifactKey::MeaslesCsmr => "cause.measles.cause_specific_mortality_rate",
            ArtifactKey::LriIncidenceRate => {
                "cause.lower_respiratory_infections.incidence_rate"
            }
            ArtifactKey::LriEmr => "cause.lower_respiratory_infections.excess_mortality_rate",
            ArtifactKey::LriCsmr => {
                "cause.lower_respiratory_infections.cause_specific_mortality_rate"
            }
            ArtifactKey::PemEmr => "cause.protein_energy_malnutrition.excess_mortality_rate",
            ArtifactKey::PemCsmr => {
                "cause.protein_energy_malnutrition.cause_specific_mortality_rate"
            }
            ArtifactKey::MamDisabilityWeight => {
                "sequela.moderate_acute_malnutrition.disability_weight"
            }
            ArtifactKey::SamDisabilityWeight => {
                "sequela.severe_acute_malnutrition.disability_weight"
            }
        }
    }

    fn file_name(self) -> String {
        format!("{}.csv", self.path())
    }
}

/// The comorbid causes whose excess mortality feeds the wasting mortality
/// composer. The display form matches the `affected_entity` labels in the
/// relative-risk and PAF tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Cause {
    DiarrhealDiseases,
    Measles,
    LowerRespiratoryInfections,
    ProteinEnergyMalnutrition,
}

impl Cause {
    #[must_use]
    pub fn emr_key(self) -> ArtifactKey {
        match self {
            Cause::DiarrhealDiseases => ArtifactKey::DiarrheaEmr,
            Cause::Measles => ArtifactKey::MeaslesEmr,
            Cause::LowerRespiratoryInfections => ArtifactKey::LriEmr,
            Cause::ProteinEnergyMalnutrition => ArtifactKey::PemEmr,
        }
    }

    #[must_use]
    pub fn csmr_key(self) -> ArtifactKey {
        match self {
            Cause::DiarrhealDiseases => ArtifactKey::DiarrheaCsmr,
            Cause::Measles => ArtifactKey::MeaslesCsmr,
            Cause::LowerRespiratoryInfections => ArtifactKey::LriCsmr,
            Cause::ProteinEnergyMalnutrition => ArtifactKey::PemCsmr,
        }
    }

    /// PEM prevalence is prior-derived, not incidence-derived, so it has
    /// no incidence key.
    #[must_use]
    pub fn incidence_key(self) -> Option<ArtifactKey> {
        match self {
            Cause::DiarrhealDiseases => Some(ArtifactKey::DiarrheaIncidenceRate),
            Cause::Measles => Some(ArtifactKey::MeaslesIncidenceRate),
            Cause::LowerRespiratoryInfections => Some(ArtifactKey::LriIncidenceRate),
            Cause::ProteinEnergyMalnutrition => None,
        }
    }
}

#[derive(Deserialize)]
struct ArtifactFileRow {
    sex: Sex,
    age_start: f64,
    age_end: f64,
    year_start: i32,
    year_end: i32,
    #[serde(default)]
    affected_entity: Option<String>,
    #[serde(default)]
    parameter: Option<Category>,
    #[serde(default)]
    draw: Option<u32>,
    value: f64,
}

struct RawRow {
    stratum: Stratum,
    entity: Option<String>,
    category: Option<Category>,
    value: f64,
}

/// All artifact tables for one location and one Monte Carlo draw, loaded
/// once per run and held immutably thereafter.
pub struct Artifact {
    tables: HashMap<ArtifactKey, Vec<RawRow>>,
}

impl Artifact {
    /// Loads every key's table from `dir`, keeping only rows for `draw`
    /// (rows without a draw column apply to all draws).
    ///
    /// # Errors
    ///
    /// Fails if any table file is missing or malformed.
    pub fn from_dir(dir: &Path, draw: u32) -> Result<Self, ModelError> {
        let mut tables = HashMap::new();
        for key in ArtifactKey::iter() {
            let path = dir.join(key.file_name());
            let rows = load_table_file(key, &path, draw)?;
            debug!("loaded artifact table {}: {} rows", key.path(), rows.len());
            tables.insert(key, rows);
        }
        Ok(Artifact { tables })
    }

    fn rows(&self, key: ArtifactKey) -> &[RawRow] {
        // Every key is loaded by `from_dir`; the map is total.
        self.tables.get(&key).unwrap()
    }

    /// A scalar table: one row per stratum, no category dimension.
    ///
    /// # Errors
    ///
    /// Fails if the table carries a category dimension or duplicates a
    /// stratum.
    pub fn table(&self, key: ArtifactKey) -> Result<StratTable, ModelError> {
        let mut rows = Vec::new();
        for row in self.rows(key) {
            if row.category.is_some() {
                return Err(ModelError::ModelError(format!(
                    "artifact table '{}' unexpectedly has a parameter column",
                    key.path()
                )));
            }
            if rows.iter().any(|(stratum, _)| *stratum == row.stratum) {
                return Err(duplicate_stratum_error(key, &row.stratum));
            }
            rows.push((row.stratum, row.value));
        }
        Ok(StratTable::new(rows))
    }

    /// A scalar table filtered to one `affected_entity`.
    ///
    /// # Errors
    ///
    /// Fails on duplicated strata within the entity.
    pub fn table_for_entity(
        &self,
        key: ArtifactKey,
        entity: &str,
    ) -> Result<StratTable, ModelError> {
        let mut rows = Vec::new();
        for row in self
            .rows(key)
            .iter()
            .filter(|row| row.entity.as_deref() == Some(entity))
        {
            if rows.iter().any(|(stratum, _)| *stratum == row.stratum) {
                return Err(duplicate_stratum_error(key, &row.stratum));
            }
            rows.push((row.stratum, row.value));
        }
        Ok(StratTable::new(rows))
    }

    /// Pivots a long table with a `parameter` column into one row per
    /// stratum with one value per category (spec: the exposure wide
    /// format). Row order follows first appearance of each stratum.
    ///
    /// # Errors
    ///
    /// Fails if any stratum is missing a category or repeats one.
    pub fn category_table(&self, key: ArtifactKey) -> Result<CategoryTable, ModelError> {
        pivot_categories(key, self.rows(key).iter())
    }

    /// Like [`Artifact::category_table`], filtered to one
    /// `affected_entity` (the relative-risk layout).
    ///
    /// # Errors
    ///
    /// Fails if any stratum is missing a category or repeats one.
    pub fn category_table_for_entity(
        &self,
        key: ArtifactKey,
        entity: &str,
    ) -> Result<CategoryTable, ModelError> {
        pivot_categories(
            key,
            self.rows(key)
                .iter()
                .filter(|row| row.entity.as_deref() == Some(entity)),
        )
    }
}

fn duplicate_stratum_error(key: ArtifactKey, stratum: &Stratum) -> ModelError {
    ModelError::ModelError(format!(
        "artifact table '{}' has duplicate rows for stratum {stratum}",
        key.path()
    ))
}

fn load_table_file(key: ArtifactKey, path: &PathBuf, draw: u32) -> Result<Vec<RawRow>, ModelError> {
    if !path.exists() {
        return Err(ModelError::ModelError(format!(
            "missing artifact table '{}': expected a file at {}",
            key.path(),
            path.display()
        )));
    }
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for result in reader.deserialize::<ArtifactFileRow>() {
        let row = result?;
        if row.draw.is_some_and(|row_draw| row_draw != draw) {
            continue;
        }
        rows.push(RawRow {
            stratum: Stratum {
                sex: row.sex,
                age_start: row.age_start,
                age_end: row.age_end,
                year_start: row.year_start,
                year_end: row.year_end,
            },
            entity: row.affected_entity,
            category: row.parameter,
            value: row.value,
        });
    }
    Ok(rows)
}

fn pivot_categories<'a>(
    key: ArtifactKey,
    rows: impl Iterator<Item = &'a RawRow>,
) -> Result<CategoryTable, ModelError> {
    let mut pivoted: Vec<(Stratum, [Option<f64>; Category::COUNT])> = Vec::new();
    for row in rows {
        let category = row.category.ok_or_else(|| {
            ModelError::ModelError(format!(
                "artifact table '{}' is missing the parameter column",
                key.path()
            ))
        })?;
        let index = match pivoted
            .iter()
            .position(|(stratum, _)| *stratum == row.stratum)
        {
            Some(index) => index,
            None => {
                pivoted.push((row.stratum, [None; Category::COUNT]));
                pivoted.len() - 1
            }
        };
        let entry = &mut pivoted[index].1;
        if entry[category.index()].is_some() {
            return Err(ModelError::ModelError(format!(
                "artifact table '{}' repeats {category} for stratum {}",
                key.path(),
                row.stratum
            )));
        }
        entry[category.index()] = Some(row.value);
    }

    let mut result = Vec::with_capacity(pivoted.len());
    for (stratum, values) in pivoted {
        let mut complete = [0.0; Category::COUNT];
        for category in Category::iter() {
            complete[category.index()] = values[category.index()].ok_or_else(|| {
                ModelError::ModelError(format!(
                    "artifact table '{}' is missing {category} for stratum {stratum}",
                    key.path()
                ))
            })?;
        }
        result.push((stratum, complete));
    }
    Ok(CategoryTable::new(result))
}

define_data_plugin!(ArtifactPlugin, Option<Artifact>, None);

pub trait ContextArtifactExt {
    /// Loads the artifact for the configured data directory and draw.
    /// Called once during setup, before any component that reads data.
    ///
    /// # Errors
    ///
    /// Fails if any table is missing or malformed.
    fn load_artifact(&mut self, dir: &Path) -> Result<(), ModelError>;

    /// The loaded artifact. Panics if `load_artifact` has not run.
    fn artifact(&self) -> &Artifact;
}

impl ContextArtifactExt for Context {
    fn load_artifact(&mut self, dir: &Path) -> Result<(), ModelError> {
        let draw = self.get_global_property_value(Parameters).draw;
        let artifact = Artifact::from_dir(dir, draw)?;
        *self.get_data_container_mut(ArtifactPlugin) = Some(artifact);
        Ok(())
    }

    fn artifact(&self) -> &Artifact {
        self.get_data_container(ArtifactPlugin)
            .and_then(Option::as_ref)
            .expect("the artifact has not been loaded")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use strum::IntoEnumIterator;
    use tempfile::tempdir;

    const SCALAR_HEADER: &str = "sex,age_start,age_end,year_start,year_end,value";

    fn write_minimal_artifact(dir: &Path) {
        for key in ArtifactKey::iter() {
            let contents = match key {
                ArtifactKey::WastingExposure => exposure_csv(),
                ArtifactKey::WastingRelativeRisk | ArtifactKey::WastingPaf => entity_csv(key),
                _ => format!("{SCALAR_HEADER}\nMale,0.0,0.5,2022,2023,0.01\n"),
            };
            fs::write(dir.join(key.file_name()), contents).unwrap();
        }
    }

    fn exposure_csv() -> String {
        let mut contents =
            String::from("sex,age_start,age_end,year_start,year_end,parameter,draw,value\n");
        for (category, value, draw) in [
            ("cat1", 0.03, 0),
            ("cat2", 0.07, 0),
            ("cat3", 0.2, 0),
            ("cat4", 0.7, 0),
            ("cat1", 0.9, 1),
            ("cat2", 0.05, 1),
            ("cat3", 0.03, 1),
            ("cat4", 0.02, 1),
        ] {
            contents.push_str(&format!("Male,0.0,0.5,2022,2023,{category},{draw},{value}\n"));
        }
        contents
    }

    fn entity_csv(key: ArtifactKey) -> String {
        if key == ArtifactKey::WastingPaf {
            return String::from(
                "sex,age_start,age_end,year_start,year_end,affected_entity,value\n\
                 Male,0.0,0.5,2022,2023,diarrheal_diseases,0.3\n",
            );
        }
        let mut contents = String::from(
            "sex,age_start,age_end,year_start,year_end,affected_entity,parameter,value\n",
        );
        for (category, value) in [("cat1", 9.0), ("cat2", 3.4), ("cat3", 1.6), ("cat4", 1.0)] {
            contents.push_str(&format!(
                "Male,0.0,0.5,2022,2023,diarrheal_diseases,{category},{value}\n"
            ));
        }
        contents
    }

    #[test]
    fn load_and_pivot_exposure_for_requested_draw() {
        let dir = tempdir().unwrap();
        write_minimal_artifact(dir.path());
        let artifact = Artifact::from_dir(dir.path(), 0).unwrap();

        let exposures = artifact.category_table(ArtifactKey::WastingExposure).unwrap();
        assert_eq!(exposures.len(), 1);
        let (_, values) = exposures.iter().next().unwrap();
        assert_eq!(*values, [0.03, 0.07, 0.2, 0.7]);
    }

    #[test]
    fn draw_filter_selects_other_draw() {
        let dir = tempdir().unwrap();
        write_minimal_artifact(dir.path());
        let artifact = Artifact::from_dir(dir.path(), 1).unwrap();
        let exposures = artifact.category_table(ArtifactKey::WastingExposure).unwrap();
        let (_, values) = exposures.iter().next().unwrap();
        assert_eq!(*values, [0.9, 0.05, 0.03, 0.02]);
    }

    #[test]
    fn missing_table_is_fatal() {
        let dir = tempdir().unwrap();
        write_minimal_artifact(dir.path());
        fs::remove_file(dir.path().join(ArtifactKey::Acmr.file_name())).unwrap();
        let result = Artifact::from_dir(dir.path(), 0);
        match result {
            Err(ModelError::ModelError(message)) => {
                assert!(message.contains("missing artifact table"));
            }
            _ => panic!("expected a configuration error"),
        }
    }

    #[test]
    fn relative_risk_by_entity() {
        let dir = tempdir().unwrap();
        write_minimal_artifact(dir.path());
        let artifact = Artifact::from_dir(dir.path(), 0).unwrap();
        let rr = artifact
            .category_table_for_entity(
                ArtifactKey::WastingRelativeRisk,
                &Cause::DiarrhealDiseases.to_string(),
            )
            .unwrap();
        let (_, values) = rr.iter().next().unwrap();
        assert_eq!(*values, [9.0, 3.4, 1.6, 1.0]);

        let missing = artifact
            .category_table_for_entity(ArtifactKey::WastingRelativeRisk, "measles")
            .unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn incomplete_categories_are_fatal() {
        let dir = tempdir().unwrap();
        write_minimal_artifact(dir.path());
        fs::write(
            dir.path().join(ArtifactKey::WastingExposure.file_name()),
            "sex,age_start,age_end,year_start,year_end,parameter,value\n\
             Male,0.0,0.5,2022,2023,cat1,0.5\n",
        )
        .unwrap();
        let artifact = Artifact::from_dir(dir.path(), 0).unwrap();
        assert!(artifact.category_table(ArtifactKey::WastingExposure).is_err());
    }

    #[test]
    fn cause_entity_labels() {
        assert_eq!(Cause::DiarrhealDiseases.to_string(), "diarrheal_diseases");
        assert_eq!(
            Cause::LowerRespiratoryInfections.to_string(),
            "lower_respiratory_infections"
        );
        assert_eq!(
            Cause::ProteinEnergyMalnutrition.to_string(),
            "protein_energy_malnutrition"
        );
    }
}
