//! Population initialization: seeds the under-5 cohort with sex, age, and
//! every component's fixed propensity columns, then assigns each child's
//! initial wasting state. Propensity columns are written exactly once
//! here; every later read is deterministic.

use crate::context::Context;
use crate::error::ModelError;
use crate::global_properties::ContextGlobalPropertiesExt;
use crate::log::info;
use crate::parameters::Parameters;
use crate::people::{ContextPeopleExt, PersonId};
use crate::random::ContextRandomExt;
use crate::stratification::Sex;
use crate::units::YEAR_DURATION;
use crate::{define_person_property, define_rng, sq_lns, wasting};

define_rng!(PopulationRng);

// Birth time in days relative to simulation start; negative for people
// alive at initialization.
define_person_property!(Birth, f64);
define_person_property!(PersonSex, Sex);

/// Ages are sampled uniformly over the under-5 range the wasting model
/// covers.
pub const MAX_INITIAL_AGE: f64 = 5.0;

pub trait ContextDemographicsExt {
    fn person_age_years(&self, person_id: PersonId) -> f64;
    fn person_sex(&self, person_id: PersonId) -> Sex;
}

impl ContextDemographicsExt for Context {
    fn person_age_years(&self, person_id: PersonId) -> f64 {
        let birth = self.get_person_property(person_id, Birth);
        (self.get_current_time() - birth) / YEAR_DURATION
    }

    fn person_sex(&self, person_id: PersonId) -> Sex {
        self.get_person_property(person_id, PersonSex)
    }
}

/// Creates one person with the given demographics and runs every
/// component's per-person initialization.
pub fn create_person(context: &mut Context, age_years: f64, sex: Sex) -> PersonId {
    let person_id = context.add_person();
    let birth = context.get_current_time() - age_years * YEAR_DURATION;
    context.initialize_person_property(person_id, Birth, birth);
    context.initialize_person_property(person_id, PersonSex, sex);

    wasting::initialize_person(context, person_id);
    crate::wasting::treatment::initialize_person(context, person_id);
    sq_lns::initialize_person(context, person_id);
    person_id
}

/// Seeds the configured cohort. Requires the wasting model (and its
/// config) to be initialized first, since initial states are sampled from
/// the loaded exposure distribution.
///
/// # Errors
///
/// Currently infallible; kept fallible to match the other components'
/// setup signatures.
pub fn init(context: &mut Context) -> Result<(), ModelError> {
    let population = context.get_global_property_value(Parameters).population;
    for _ in 0..population {
        let age_years = context.sample_range(PopulationRng, 0.0..MAX_INITIAL_AGE);
        let sex = if context.sample_uniform(PopulationRng) < 0.5 {
            Sex::Male
        } else {
            Sex::Female
        };
        create_person(context, age_years, sex);
    }
    info!("initialized a cohort of {population} children");
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn age_advances_with_simulation_time() {
        let mut context = Context::new();
        let person_id = context.add_person();
        context.initialize_person_property(person_id, Birth, -YEAR_DURATION);
        context.initialize_person_property(person_id, PersonSex, Sex::Female);

        assert_approx_eq!(context.person_age_years(person_id), 1.0);
        context.step(YEAR_DURATION / 2.0);
        assert_approx_eq!(context.person_age_years(person_id), 1.5);
        assert_eq!(context.person_sex(person_id), Sex::Female);
    }
}
