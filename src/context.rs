use std::{
    any::{Any, TypeId},
    collections::HashMap,
    rc::Rc,
};

pub trait DataPlugin: Any {
    type DataContainer;

    fn create_data_container() -> Self::DataContainer;
}

#[macro_export]
macro_rules! define_data_plugin {
    ($plugin:ident, $data_container:ty, $default: expr) => {
        struct $plugin;

        impl $crate::context::DataPlugin for $plugin {
            type DataContainer = $data_container;

            fn create_data_container() -> Self::DataContainer {
                $default
            }
        }
    };
}
pub use define_data_plugin;

type TimestepListener = Rc<dyn Fn(&mut Context)>;

/// The central object of a simulation. Holds module-specific data
/// containers, the current simulation time, and the registered
/// time-step listeners. Time is measured in days since simulation start;
/// the host advances it in fixed steps with [`Context::step`].
pub struct Context {
    data_plugins: HashMap<TypeId, Box<dyn Any>>,
    timestep_listeners: Vec<TimestepListener>,
    current_time: f64,
    current_step_size: f64,
    step_index: u64,
}

impl Context {
    #[must_use]
    pub fn new() -> Context {
        Context {
            data_plugins: HashMap::new(),
            timestep_listeners: Vec::new(),
            current_time: 0.0,
            current_step_size: 0.0,
            step_index: 0,
        }
    }

    fn add_plugin<T: DataPlugin>(&mut self) {
        self.data_plugins
            .insert(TypeId::of::<T>(), Box::new(T::create_data_container()));
    }

    #[allow(clippy::needless_pass_by_value)]
    pub fn get_data_container_mut<T: DataPlugin>(&mut self, _plugin: T) -> &mut T::DataContainer {
        let type_id = &TypeId::of::<T>();
        if !self.data_plugins.contains_key(type_id) {
            self.add_plugin::<T>();
        }
        self.data_plugins
            .get_mut(type_id)
            .unwrap()
            .downcast_mut::<T::DataContainer>()
            .unwrap()
    }

    #[allow(clippy::needless_pass_by_value)]
    pub fn get_data_container<T: DataPlugin>(&self, _plugin: T) -> Option<&T::DataContainer> {
        self.data_plugins
            .get(&TypeId::of::<T>())
            .and_then(|container| container.downcast_ref::<T::DataContainer>())
    }

    /// Register a callback to run once per time step, after time has
    /// advanced. Listeners run in registration order; within a step every
    /// listener observes the same (current) time.
    pub fn add_timestep_listener(&mut self, listener: impl Fn(&mut Context) + 'static) {
        self.timestep_listeners.push(Rc::new(listener));
    }

    /// Current simulation time in days since simulation start.
    #[must_use]
    pub fn get_current_time(&self) -> f64 {
        self.current_time
    }

    /// The size in days of the step currently being executed. Zero before
    /// the first step.
    #[must_use]
    pub fn current_step_size(&self) -> f64 {
        self.current_step_size
    }

    /// Monotone counter incremented by every [`Context::step`]. Value
    /// pipelines stamp their memoized results with this counter, so
    /// advancing it invalidates everything cached in the previous step.
    #[must_use]
    pub fn step_index(&self) -> u64 {
        self.step_index
    }

    /// Advance the simulation clock by `days` and run the registered
    /// time-step listeners. The step counter is incremented before any
    /// listener runs, so no consumer can observe a value memoized against
    /// the previous step's population state.
    pub fn step(&mut self, days: f64) {
        assert!(
            days.is_finite() && days > 0.0,
            "step size must be positive and finite"
        );
        self.step_index += 1;
        self.current_time += days;
        self.current_step_size = days;
        let listeners = self.timestep_listeners.clone();
        for listener in &listeners {
            listener(self);
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
