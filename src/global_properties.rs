use crate::context::Context;
use crate::define_data_plugin;
use std::any::{Any, TypeId};
use std::collections::HashMap;

/// Defines a typed, run-wide constant installed once at setup. Global
/// properties hold configuration and calibration values; they are never
/// mutated during a time step.
#[macro_export]
macro_rules! define_global_property {
    ($global_property:ident, $value:ty) => {
        #[derive(Copy, Clone)]
        pub struct $global_property;

        impl $crate::global_properties::GlobalProperty for $global_property {
            type Value = $value;

            fn name() -> &'static str {
                stringify!($global_property)
            }
        }
    };
}
pub use define_global_property;

pub trait GlobalProperty: Any {
    type Value: Any;

    fn name() -> &'static str;
}

struct GlobalPropertiesDataContainer {
    global_property_container: HashMap<TypeId, Box<dyn Any>>,
}

define_data_plugin!(
    GlobalPropertiesPlugin,
    GlobalPropertiesDataContainer,
    GlobalPropertiesDataContainer {
        global_property_container: HashMap::default(),
    }
);

pub trait ContextGlobalPropertiesExt {
    fn set_global_property_value<T: GlobalProperty>(&mut self, property: T, value: T::Value);

    /// Reads a global property installed at setup. Components are entitled
    /// to assume setup completed, so a missing property is a programmer
    /// error and panics with the property name.
    fn get_global_property_value<T: GlobalProperty>(&self, property: T) -> &T::Value;
}

impl ContextGlobalPropertiesExt for Context {
    #[allow(clippy::needless_pass_by_value)]
    fn set_global_property_value<T: GlobalProperty>(&mut self, _property: T, value: T::Value) {
        let data_container = self.get_data_container_mut(GlobalPropertiesPlugin);
        data_container
            .global_property_container
            .insert(TypeId::of::<T>(), Box::new(value));
    }

    #[allow(clippy::needless_pass_by_value)]
    fn get_global_property_value<T: GlobalProperty>(&self, _property: T) -> &T::Value {
        self.get_data_container(GlobalPropertiesPlugin)
            .and_then(|data_container| {
                data_container
                    .global_property_container
                    .get(&TypeId::of::<T>())
            })
            .and_then(|boxed| boxed.downcast_ref::<T::Value>())
            .unwrap_or_else(|| panic!("global property '{}' has not been set", T::name()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    define_global_property!(PopulationSize, usize);

    #[test]
    fn set_and_get() {
        let mut context = Context::new();
        context.set_global_property_value(PopulationSize, 100);
        assert_eq!(*context.get_global_property_value(PopulationSize), 100);
    }

    #[test]
    fn set_overwrites() {
        let mut context = Context::new();
        context.set_global_property_value(PopulationSize, 100);
        context.set_global_property_value(PopulationSize, 200);
        assert_eq!(*context.get_global_property_value(PopulationSize), 200);
    }

    #[test]
    #[should_panic(expected = "global property 'PopulationSize' has not been set")]
    fn get_unset_panics() {
        let context = Context::new();
        context.get_global_property_value(PopulationSize);
    }
}
