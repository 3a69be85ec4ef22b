use crate::action::Action;
use crate::schedule::Schedule;
use relay_core::Validation;
use std::collections::HashSet;
use std::sync::Arc;

/// A destination loading jobs into a third-party service, of any kind: an
/// API, a database, a file system.
///
/// A destination exposes the actions it can run. An action named `"*"` is a
/// wildcard, resolved for any action name the destination has no exact match
/// for.
pub trait Destination: Send + Sync {
    /// String representation of the destination.
    ///
    /// Example: "warehouse"
    fn name(&self) -> &str;

    /// Default schedule for every action of the destination. When None, the
    /// platform default is applied.
    fn schedule(&self) -> Option<Schedule> {
        None
    }

    /// Actions the destination can run
    fn actions(&self) -> Vec<Arc<dyn Action>>;
}

/// Validate a destination before it enters the registry. Scheduling options
/// are not validated here: empty fields fall back at resolution time.
pub(crate) fn validate_destination(destination: &dyn Destination) -> Vec<Validation> {
    let mut validations = Vec::new();

    if destination.name().is_empty() {
        validations.push(Validation::new(
            "Destination ID must not be empty",
            &["Destination", "unknown", "name()"],
        ));
        return validations;
    }

    let actions = destination.actions();
    if actions.is_empty() {
        validations.push(Validation::new(
            "Destination must expose at least one action",
            &["Destination", destination.name(), "actions()"],
        ));
        return validations;
    }

    let mut seen = HashSet::new();
    for action in &actions {
        if action.name().is_empty() {
            validations.push(Validation::new(
                "Action ID must not be empty",
                &["Destination", destination.name(), "actions()", "unknown"],
            ));
            continue;
        }

        if !seen.insert(action.name().to_string()) {
            validations.push(Validation::new(
                "Action ID must be unique within its destination",
                &[
                    "Destination",
                    destination.name(),
                    "actions()",
                    action.name(),
                ],
            ));
        }
    }

    validations
}
