//! Model-level reports: per-step state occupancy counts and individual
//! state transitions, written as CSV. Transitions are detected by diffing
//! the state column against the previous step, so the reporter stays
//! decoupled from the transition executor.

use std::ffi::OsStr;
use std::fs::{create_dir_all, File};
use std::path::Path;

use csv::Writer;
use serde::Serialize;

use crate::context::Context;
use crate::define_data_plugin;
use crate::error::ModelError;
use crate::parameters::simulation_year;
use crate::people::ContextPeopleExt;
use crate::wasting::{ChildWastingState, WastingState};

#[derive(Serialize)]
struct StateCountRow {
    time: f64,
    year: f64,
    state: String,
    count: usize,
}

#[derive(Serialize)]
struct TransitionRow {
    time: f64,
    person_id: String,
    from_state: String,
    to_state: String,
}

struct ReportsData {
    state_counts: Writer<File>,
    transitions: Writer<File>,
    // last observed state per person, indexed by person id
    last_states: Vec<Option<WastingState>>,
}

define_data_plugin!(ReportsPlugin, Option<ReportsData>, None);

/// Opens a CSV writer at `path`, creating parent directories as needed.
/// Reports have no other output format, so a non-`.csv` target is a
/// configuration error.
fn open_csv_writer(path: &Path) -> Result<Writer<File>, ModelError> {
    if path.extension().and_then(OsStr::to_str) != Some("csv") {
        return Err(ModelError::ReportError(format!(
            "report output must be a .csv path, got {}",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    Ok(Writer::from_writer(File::create(path)?))
}

/// Opens the two report files and registers the per-step recorder. Must
/// be registered after the wasting model so each step's rows reflect the
/// step's transitions.
///
/// # Errors
///
/// Fails if either output path is not a writable CSV location.
pub fn init(
    context: &mut Context,
    state_count_path: &Path,
    transition_path: &Path,
) -> Result<(), ModelError> {
    let data = ReportsData {
        state_counts: open_csv_writer(state_count_path)?,
        transitions: open_csv_writer(transition_path)?,
        last_states: Vec::new(),
    };
    *context.get_data_container_mut(ReportsPlugin) = Some(data);
    context.add_timestep_listener(record_timestep);
    Ok(())
}

fn record_timestep(context: &mut Context) {
    let time = context.get_current_time();
    let year = simulation_year(context);
    let population = context.get_current_population();

    let current_states: Vec<WastingState> = (0..population)
        .map(|index| context.get_person_property(context.get_person_id(index), ChildWastingState))
        .collect();

    let data = context
        .get_data_container_mut(ReportsPlugin)
        .as_mut()
        .expect("the reports have not been initialized");

    let mut counts = [0_usize; 4];
    for (index, state) in current_states.iter().enumerate() {
        counts[state.category().index()] += 1;
        let previous = data.last_states.get(index).copied().flatten();
        if let Some(previous_state) = previous {
            if previous_state != *state {
                data.transitions
                    .serialize(TransitionRow {
                        time,
                        person_id: index.to_string(),
                        from_state: previous_state.to_string(),
                        to_state: state.to_string(),
                    })
                    .expect("failed to write a transition row");
            }
        }
    }
    data.last_states = current_states.iter().copied().map(Some).collect();

    for state in WastingState::ALL {
        data.state_counts
            .serialize(StateCountRow {
                time,
                year,
                state: state.to_string(),
                count: counts[state.category().index()],
            })
            .expect("failed to write a state count row");
    }
    data.state_counts
        .flush()
        .expect("failed to flush the state count report");
    data.transitions
        .flush()
        .expect("failed to flush the transition report");
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::global_properties::ContextGlobalPropertiesExt;
    use crate::parameters::{Parameters, ParametersValues, Scenario};
    use crate::people::ContextPeopleExt;
    use tempfile::tempdir;

    fn fixture() -> Context {
        let mut context = Context::new();
        context.set_global_property_value(
            Parameters,
            ParametersValues {
                population: 2,
                seed: 42,
                draw: 0,
                scenario: Scenario::Baseline,
                start_year: 2022,
                max_time: 2.0,
                step_size: 1.0,
                data_dir: String::new(),
                output_file: String::new(),
                transition_output_file: String::new(),
            },
        );
        context
    }

    #[test]
    fn records_counts_and_detected_transitions() {
        let mut context = fixture();
        let dir = tempdir().unwrap();
        let counts_path = dir.path().join("state_counts.csv");
        let transitions_path = dir.path().join("transitions.csv");
        init(&mut context, &counts_path, &transitions_path).unwrap();

        let first = context.add_person();
        let second = context.add_person();
        context.initialize_person_property(first, ChildWastingState, WastingState::Susceptible);
        context.initialize_person_property(second, ChildWastingState, WastingState::Moderate);

        context.step(1.0);
        context.set_person_property(second, ChildWastingState, WastingState::Severe);
        context.step(1.0);

        let mut counts_reader = csv::Reader::from_path(&counts_path).unwrap();
        let count_rows: Vec<csv::StringRecord> =
            counts_reader.records().map(Result::unwrap).collect();
        // four states per step, two steps
        assert_eq!(count_rows.len(), 8);

        let mut transitions_reader = csv::Reader::from_path(&transitions_path).unwrap();
        let transition_rows: Vec<csv::StringRecord> =
            transitions_reader.records().map(Result::unwrap).collect();
        assert_eq!(transition_rows.len(), 1);
        assert_eq!(&transition_rows[0][2], "moderate_acute_malnutrition");
        assert_eq!(&transition_rows[0][3], "severe_acute_malnutrition");
    }

    #[test]
    fn nested_output_directories_are_created() {
        let mut context = fixture();
        let dir = tempdir().unwrap();
        let counts_path = dir.path().join("output").join("state_counts.csv");
        let transitions_path = dir.path().join("output").join("transitions.csv");
        init(&mut context, &counts_path, &transitions_path).unwrap();

        context.step(1.0);
        assert!(counts_path.exists());
        assert!(transitions_path.exists());
    }

    #[test]
    fn non_csv_output_path_is_a_configuration_error() {
        let dir = tempdir().unwrap();
        let result = open_csv_writer(&dir.path().join("state_counts.tsv"));
        match result {
            Err(ModelError::ReportError(message)) => {
                assert!(message.contains("must be a .csv path"));
            }
            _ => panic!("expected a report configuration error"),
        }
    }
}
