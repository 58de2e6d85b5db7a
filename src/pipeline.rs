//! Named per-person value pipelines. A component registers a *producer*
//! for a value name; other components may register *modifiers* that are
//! applied, in registration order, to the produced value. Consumers pull
//! values by name; results are memoized per `(name, person)` within a
//! time step and invalidated when the step counter advances, so within a
//! step every consumer observes the same value and across steps no stale
//! value survives.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::context::Context;
use crate::define_data_plugin;
use crate::people::PersonId;

type ValueSource = Rc<dyn Fn(&Context, PersonId) -> f64>;
type ValueModifier = Rc<dyn Fn(&Context, PersonId, f64) -> f64>;

#[derive(Default)]
struct ValuePipeline {
    source: Option<ValueSource>,
    modifiers: Vec<ValueModifier>,
}

struct ValuesData {
    pipelines: HashMap<String, ValuePipeline>,
    // (step stamp, value) per person, per value name
    cache: RefCell<HashMap<String, HashMap<PersonId, (u64, f64)>>>,
}

define_data_plugin!(
    ValuesPlugin,
    ValuesData,
    ValuesData {
        pipelines: HashMap::new(),
        cache: RefCell::new(HashMap::new()),
    }
);

pub trait ContextValuesExt {
    /// Declares this component as the source of the named value. At most
    /// one producer may be registered per name.
    fn register_value_producer(
        &mut self,
        name: &str,
        source: impl Fn(&Context, PersonId) -> f64 + 'static,
    );

    /// Appends a modifier to the named value's pipeline. Modifiers may be
    /// registered before the producer; they run in registration order.
    fn register_value_modifier(
        &mut self,
        name: &str,
        modifier: impl Fn(&Context, PersonId, f64) -> f64 + 'static,
    );

    /// Resolves the named value for one person: source, then modifiers.
    /// Panics if no producer was registered for `name`; requesting an
    /// undeclared value is a wiring error, never silently zero.
    fn get_value(&self, name: &str, person_id: PersonId) -> f64;

    fn has_value_producer(&self, name: &str) -> bool;
}

impl ContextValuesExt for Context {
    fn register_value_producer(
        &mut self,
        name: &str,
        source: impl Fn(&Context, PersonId) -> f64 + 'static,
    ) {
        let data_container = self.get_data_container_mut(ValuesPlugin);
        let pipeline = data_container
            .pipelines
            .entry(name.to_string())
            .or_default();
        assert!(
            pipeline.source.is_none(),
            "a value producer is already registered for '{name}'"
        );
        pipeline.source = Some(Rc::new(source));
    }

    fn register_value_modifier(
        &mut self,
        name: &str,
        modifier: impl Fn(&Context, PersonId, f64) -> f64 + 'static,
    ) {
        let data_container = self.get_data_container_mut(ValuesPlugin);
        data_container
            .pipelines
            .entry(name.to_string())
            .or_default()
            .modifiers
            .push(Rc::new(modifier));
    }

    fn get_value(&self, name: &str, person_id: PersonId) -> f64 {
        let data_container = self
            .get_data_container(ValuesPlugin)
            .expect("no value producers have been registered");

        let step = self.step_index();
        let cached = data_container
            .cache
            .borrow()
            .get(name)
            .and_then(|memo| memo.get(&person_id))
            .copied();
        if let Some((stamp, value)) = cached {
            if stamp == step {
                return value;
            }
        }

        let pipeline = data_container
            .pipelines
            .get(name)
            .unwrap_or_else(|| panic!("no value pipeline exists for '{name}'"));
        let source = pipeline
            .source
            .clone()
            .unwrap_or_else(|| panic!("no value producer registered for '{name}'"));
        let modifiers = pipeline.modifiers.clone();

        // The cache borrow is released above: a source or modifier may
        // itself pull other values through the pipeline.
        let mut value = source(self, person_id);
        for modifier in &modifiers {
            value = modifier(self, person_id, value);
        }

        data_container
            .cache
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .insert(person_id, (step, value));
        value
    }

    fn has_value_producer(&self, name: &str) -> bool {
        self.get_data_container(ValuesPlugin)
            .and_then(|data_container| data_container.pipelines.get(name))
            .is_some_and(|pipeline| pipeline.source.is_some())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::people::ContextPeopleExt;
    use std::cell::Cell;

    #[test]
    fn producer_only() {
        let mut context = Context::new();
        let person = context.add_person();
        context.register_value_producer("answer", |_, _| 42.0);
        assert_eq!(context.get_value("answer", person), 42.0);
    }

    #[test]
    fn modifiers_apply_in_registration_order() {
        let mut context = Context::new();
        let person = context.add_person();
        context.register_value_producer("rate", |_, _| 2.0);
        context.register_value_modifier("rate", |_, _, value| value + 1.0);
        context.register_value_modifier("rate", |_, _, value| value * 10.0);
        // (2 + 1) * 10, not 2 * 10 + 1
        assert_eq!(context.get_value("rate", person), 30.0);
    }

    #[test]
    fn modifier_may_register_before_producer() {
        let mut context = Context::new();
        let person = context.add_person();
        context.register_value_modifier("rate", |_, _, value| value / 2.0);
        context.register_value_producer("rate", |_, _| 8.0);
        assert_eq!(context.get_value("rate", person), 4.0);
    }

    #[test]
    #[should_panic(expected = "no value pipeline exists for 'missing'")]
    fn unknown_value_panics() {
        let mut context = Context::new();
        let person = context.add_person();
        context.register_value_producer("present", |_, _| 1.0);
        context.get_value("missing", person);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_producer_panics() {
        let mut context = Context::new();
        context.register_value_producer("rate", |_, _| 1.0);
        context.register_value_producer("rate", |_, _| 2.0);
    }

    #[test]
    fn memoized_within_step_invalidated_across_steps() {
        thread_local! {
            static CALLS: Cell<u32> = const { Cell::new(0) };
        }
        let mut context = Context::new();
        let person = context.add_person();
        context.register_value_producer("rate", |_, _| {
            CALLS.with(|calls| calls.set(calls.get() + 1));
            1.0
        });

        context.get_value("rate", person);
        context.get_value("rate", person);
        assert_eq!(CALLS.with(Cell::get), 1);

        context.step(1.0);
        context.get_value("rate", person);
        assert_eq!(CALLS.with(Cell::get), 2);
    }

    #[test]
    fn values_are_per_person() {
        let mut context = Context::new();
        let first = context.add_person();
        let second = context.add_person();
        context.register_value_producer("id", |_, person| person.0 as f64);
        assert_eq!(context.get_value("id", first), 0.0);
        assert_eq!(context.get_value("id", second), 1.0);
    }

    #[test]
    fn source_may_pull_other_values() {
        let mut context = Context::new();
        let person = context.add_person();
        context.register_value_producer("base", |_, _| 3.0);
        context.register_value_producer("derived", |context, person| {
            context.get_value("base", person) * 2.0
        });
        assert_eq!(context.get_value("derived", person), 6.0);
    }
}
