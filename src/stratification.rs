//! Strongly-typed stratified tables. Every epidemiological quantity in the
//! model is tabulated over the cross-product of sex, a half-open age bin in
//! years, and a half-open calendar-year bin; exposure-like quantities carry
//! an additional closed category dimension. Tables preserve their
//! stratification index under every element-wise operation, and binary
//! operations refuse to combine tables whose indexes do not align
//! row-for-row; there is no silent broadcasting across mismatched strata.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
pub enum Sex {
    Male,
    Female,
}

/// The four mutually exclusive wasting exposure categories, ordered by
/// severity: cat1 (severe) > cat2 (moderate) > cat3 (mild) > cat4 (TMREL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Category {
    Cat1,
    Cat2,
    Cat3,
    Cat4,
}

impl Category {
    pub const COUNT: usize = 4;

    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Category::Cat1 => 0,
            Category::Cat2 => 1,
            Category::Cat3 => 2,
            Category::Cat4 => 3,
        }
    }
}

/// One cell of the stratification index. Age bins are half-open intervals
/// in years, year bins half-open intervals of calendar years.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stratum {
    pub sex: Sex,
    pub age_start: f64,
    pub age_end: f64,
    pub year_start: i32,
    pub year_end: i32,
}

impl Stratum {
    #[must_use]
    pub fn contains(&self, sex: Sex, age: f64, year: f64) -> bool {
        self.sex == sex
            && self.age_start <= age
            && age < self.age_end
            && f64::from(self.year_start) <= year
            && year < f64::from(self.year_end)
    }
}

impl fmt::Display for Stratum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/[{}, {})/[{}, {})",
            self.sex, self.age_start, self.age_end, self.year_start, self.year_end
        )
    }
}

fn alignment_error(left: &Stratum, right: &Stratum) -> ModelError {
    ModelError::ModelError(format!(
        "stratification indexes do not align: {left} vs {right}"
    ))
}

/// A scalar quantity tabulated per stratum. Row order is the load order of
/// the underlying artifact table and is preserved by every operation.
#[derive(Debug, Clone, PartialEq)]
pub struct StratTable {
    rows: Vec<(Stratum, f64)>,
}

impl StratTable {
    #[must_use]
    pub fn new(rows: Vec<(Stratum, f64)>) -> Self {
        StratTable { rows }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Stratum, f64)> {
        self.rows.iter().map(|(stratum, value)| (stratum, *value))
    }

    pub fn strata(&self) -> impl Iterator<Item = &Stratum> {
        self.rows.iter().map(|(stratum, _)| stratum)
    }

    #[must_use]
    pub fn get(&self, stratum: &Stratum) -> Option<f64> {
        self.rows
            .iter()
            .find(|(candidate, _)| candidate == stratum)
            .map(|(_, value)| *value)
    }

    /// Range lookup: the value of the stratum containing `(sex, age, year)`,
    /// if any.
    #[must_use]
    pub fn value_at(&self, sex: Sex, age: f64, year: f64) -> Option<f64> {
        self.rows
            .iter()
            .find(|(stratum, _)| stratum.contains(sex, age, year))
            .map(|(_, value)| *value)
    }

    #[must_use]
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        StratTable {
            rows: self
                .rows
                .iter()
                .map(|(stratum, value)| (*stratum, f(*value)))
                .collect(),
        }
    }

    #[must_use]
    pub fn map_with_stratum(&self, f: impl Fn(&Stratum, f64) -> f64) -> Self {
        StratTable {
            rows: self
                .rows
                .iter()
                .map(|(stratum, value)| (*stratum, f(stratum, *value)))
                .collect(),
        }
    }

    /// Element-wise combination of two tables over the same index.
    ///
    /// # Errors
    ///
    /// Fails if the two indexes differ in length or in any row's stratum.
    pub fn zip_with(
        &self,
        other: &Self,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Self, ModelError> {
        if self.len() != other.len() {
            return Err(ModelError::ModelError(format!(
                "stratification indexes differ in length: {} vs {}",
                self.len(),
                other.len()
            )));
        }
        let mut rows = Vec::with_capacity(self.len());
        for ((left, a), (right, b)) in self.rows.iter().zip(other.rows.iter()) {
            if left != right {
                return Err(alignment_error(left, right));
            }
            rows.push((*left, f(*a, *b)));
        }
        Ok(StratTable { rows })
    }

    /// The host's missing-data convention: undefined arithmetic results
    /// (NaN, ±∞) are replaced with 0 rather than propagated.
    #[must_use]
    pub fn zero_non_finite(&self) -> Self {
        self.map(|value| if value.is_finite() { value } else { 0.0 })
    }
}

/// A per-category quantity tabulated per stratum, one value for each of
/// the four wasting categories.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryTable {
    rows: Vec<(Stratum, [f64; Category::COUNT])>,
}

impl CategoryTable {
    #[must_use]
    pub fn new(rows: Vec<(Stratum, [f64; Category::COUNT])>) -> Self {
        CategoryTable { rows }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Stratum, &[f64; Category::COUNT])> {
        self.rows.iter().map(|(stratum, values)| (stratum, values))
    }

    pub fn strata(&self) -> impl Iterator<Item = &Stratum> {
        self.rows.iter().map(|(stratum, _)| stratum)
    }

    #[must_use]
    pub fn get(&self, stratum: &Stratum, category: Category) -> Option<f64> {
        self.rows
            .iter()
            .find(|(candidate, _)| candidate == stratum)
            .map(|(_, values)| values[category.index()])
    }

    #[must_use]
    pub fn values_at(&self, sex: Sex, age: f64, year: f64) -> Option<[f64; Category::COUNT]> {
        self.rows
            .iter()
            .find(|(stratum, _)| stratum.contains(sex, age, year))
            .map(|(_, values)| *values)
    }

    /// Extracts one category's column as a scalar table over the same
    /// index.
    #[must_use]
    pub fn category(&self, category: Category) -> StratTable {
        StratTable::new(
            self.rows
                .iter()
                .map(|(stratum, values)| (*stratum, values[category.index()]))
                .collect(),
        )
    }

    #[must_use]
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        self.map_rows(|_, values| values.map(&f))
    }

    #[must_use]
    pub fn map_rows(
        &self,
        f: impl Fn(&Stratum, [f64; Category::COUNT]) -> [f64; Category::COUNT],
    ) -> Self {
        CategoryTable {
            rows: self
                .rows
                .iter()
                .map(|(stratum, values)| (*stratum, f(stratum, *values)))
                .collect(),
        }
    }

    #[must_use]
    pub fn row_sums(&self) -> StratTable {
        StratTable::new(
            self.rows
                .iter()
                .map(|(stratum, values)| (*stratum, values.iter().sum()))
                .collect(),
        )
    }

    /// Renormalizes each row to sum to 1. Rows summing to 0 are left
    /// untouched. Upstream fill conventions can leave category proportions
    /// off unity; callers opt into renormalization explicitly.
    #[must_use]
    pub fn normalized(&self) -> Self {
        self.map_rows(|_, values| {
            let total: f64 = values.iter().sum();
            if total == 0.0 {
                values
            } else {
                values.map(|value| value / total)
            }
        })
    }
}
