use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
};

use crate::{context::Context, define_data_plugin};

/// An individual in the simulated population. The id is the index of the
/// person in creation order and is stable for the lifetime of the run.
#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug)]
pub struct PersonId(pub usize);

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named per-person column. Required properties (no default) must be
/// initialized before they are read; properties with a default read as the
/// default until written.
pub trait PersonProperty: Any {
    type Value: Copy + 'static;

    fn get_default() -> Option<Self::Value> {
        None
    }

    fn name() -> &'static str;
}

/// Defines a required person property. Reading it for a person before it
/// has been initialized is a programmer error and panics.
#[macro_export]
macro_rules! define_person_property {
    ($person_property:ident, $value:ty) => {
        pub struct $person_property;

        impl $crate::people::PersonProperty for $person_property {
            type Value = $value;

            fn name() -> &'static str {
                stringify!($person_property)
            }
        }
    };
}
pub use define_person_property;

/// Defines a person property that reads as `$default` until written.
#[macro_export]
macro_rules! define_person_property_with_default {
    ($person_property:ident, $value:ty, $default: expr) => {
        pub struct $person_property;

        impl $crate::people::PersonProperty for $person_property {
            type Value = $value;

            fn get_default() -> Option<Self::Value> {
                Some($default)
            }

            fn name() -> &'static str {
                stringify!($person_property)
            }
        }
    };
}
pub use define_person_property_with_default;

struct PeopleData {
    population: usize,
    properties: HashMap<TypeId, Box<dyn Any>>,
}

define_data_plugin!(
    PeoplePlugin,
    PeopleData,
    PeopleData {
        population: 0,
        properties: HashMap::new(),
    }
);

impl PeopleData {
    fn get_person_property<T: PersonProperty>(&self, person_id: PersonId) -> Option<T::Value> {
        self.properties
            .get(&TypeId::of::<T>())
            .and_then(|column| {
                let column = column.downcast_ref::<Vec<Option<T::Value>>>().unwrap();
                column.get(person_id.0).copied().flatten()
            })
            .or_else(T::get_default)
    }

    fn set_person_property<T: PersonProperty>(&mut self, person_id: PersonId, value: T::Value) {
        let column = self
            .properties
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Vec::<Option<T::Value>>::new()));
        let column: &mut Vec<Option<T::Value>> = column.downcast_mut().unwrap();
        if person_id.0 >= column.len() {
            column.resize(person_id.0 + 1, None);
        }
        column[person_id.0] = Some(value);
    }
}

pub trait ContextPeopleExt {
    fn add_person(&mut self) -> PersonId;

    fn get_current_population(&self) -> usize;

    /// Returns the `PersonId` for the person at `index` in creation order.
    fn get_person_id(&self, index: usize) -> PersonId;

    fn get_person_property<T: PersonProperty>(&self, person_id: PersonId, property: T) -> T::Value;

    fn set_person_property<T: PersonProperty>(
        &mut self,
        person_id: PersonId,
        property: T,
        value: T::Value,
    );

    /// Writes a property for the first time. Property columns created at
    /// individual initialization (propensities in particular) are written
    /// exactly once; a second write through this method panics.
    fn initialize_person_property<T: PersonProperty>(
        &mut self,
        person_id: PersonId,
        property: T,
        value: T::Value,
    );
}

impl ContextPeopleExt for Context {
    fn add_person(&mut self) -> PersonId {
        let data_container = self.get_data_container_mut(PeoplePlugin);
        let person_id = PersonId(data_container.population);
        data_container.population += 1;
        person_id
    }

    fn get_current_population(&self) -> usize {
        self.get_data_container(PeoplePlugin)
            .map_or(0, |data_container| data_container.population)
    }

    fn get_person_id(&self, index: usize) -> PersonId {
        assert!(
            index < self.get_current_population(),
            "person index {index} out of range"
        );
        PersonId(index)
    }

    #[allow(clippy::needless_pass_by_value)]
    fn get_person_property<T: PersonProperty>(&self, person_id: PersonId, _property: T) -> T::Value {
        self.get_data_container(PeoplePlugin)
            .and_then(|data_container| data_container.get_person_property::<T>(person_id))
            .unwrap_or_else(|| {
                panic!(
                    "person property '{}' is not initialized for person {person_id}",
                    T::name()
                )
            })
    }

    #[allow(clippy::needless_pass_by_value)]
    fn set_person_property<T: PersonProperty>(
        &mut self,
        person_id: PersonId,
        _property: T,
        value: T::Value,
    ) {
        self.get_data_container_mut(PeoplePlugin)
            .set_person_property::<T>(person_id, value);
    }

    #[allow(clippy::needless_pass_by_value)]
    fn initialize_person_property<T: PersonProperty>(
        &mut self,
        person_id: PersonId,
        _property: T,
        value: T::Value,
    ) {
        let data_container = self.get_data_container_mut(PeoplePlugin);
        let current = data_container
            .properties
            .get(&TypeId::of::<T>())
            .and_then(|column| {
                let column = column.downcast_ref::<Vec<Option<T::Value>>>().unwrap();
                column.get(person_id.0).copied().flatten()
            });
        assert!(
            current.is_none(),
            "person property '{}' is already initialized for person {person_id}",
            T::name()
        );
        data_container.set_person_property::<T>(person_id, value);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    define_person_property!(Age, u8);

    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub enum Sex {
        Male,
        Female,
    }
    define_person_property_with_default!(PersonSex, Sex, Sex::Female);

    #[test]
    fn add_person_defaulted_property() {
        let mut context = Context::new();
        let person_id = context.add_person();
        assert_eq!(context.get_current_population(), 1);
        assert_eq!(context.get_person_property(person_id, PersonSex), Sex::Female);
    }

    #[test]
    #[should_panic(expected = "person property 'Age' is not initialized")]
    fn required_property_panics_before_initialization() {
        let mut context = Context::new();
        let person_id = context.add_person();
        context.get_person_property(person_id, Age);
    }

    #[test]
    fn initialize_then_set_properties() {
        let mut context = Context::new();
        let person_id = context.add_person();
        context.initialize_person_property(person_id, Age, 10);
        context.initialize_person_property(person_id, PersonSex, Sex::Male);
        assert_eq!(context.get_person_property(person_id, Age), 10);
        assert_eq!(context.get_person_property(person_id, PersonSex), Sex::Male);

        context.set_person_property(person_id, Age, 11);
        assert_eq!(context.get_person_property(person_id, Age), 11);
    }

    #[test]
    #[should_panic(expected = "already initialized")]
    fn initialize_twice_panics() {
        let mut context = Context::new();
        let person_id = context.add_person();
        context.initialize_person_property(person_id, Age, 10);
        context.initialize_person_property(person_id, Age, 11);
    }

    #[test]
    fn properties_are_per_person() {
        let mut context = Context::new();
        let first = context.add_person();
        let second = context.add_person();
        context.initialize_person_property(first, Age, 1);
        context.initialize_person_property(second, Age, 2);
        assert_eq!(context.get_person_property(first, Age), 1);
        assert_eq!(context.get_person_property(second, Age), 2);
    }

    #[test]
    #[should_panic(expected = "person index 0 out of range")]
    fn person_id_out_of_range() {
        let context = Context::new();
        context.get_person_id(0);
    }
}
