use crate::action::Action;
use crate::destination::{Destination, validate_destination};
use crate::schedule::Schedule;
use relay_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Configuration-time registry of destinations and their actions.
///
/// Destinations are registered once at construction; lookups are cheap and
/// lock-free afterwards. This replaces runtime adapter loading with plain
/// dependency injection: anything implementing [`Destination`] can be wired
/// in.
#[derive(Default)]
pub struct Registry {
    destinations: HashMap<String, Arc<dyn Destination>>,
    actions: HashMap<(String, String), Arc<dyn Action>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a destination and its actions. Fails with a validation
    /// report when the destination is not usable, without touching the
    /// registry.
    pub fn register(&mut self, destination: Arc<dyn Destination>) -> Result<()> {
        let validations = validate_destination(destination.as_ref());
        if !validations.is_empty() {
            return Err(Error::validation(
                format!(
                    "destination/{}: Failed to register",
                    destination.name()
                ),
                validations,
            ));
        }

        if self.destinations.contains_key(destination.name()) {
            return Err(Error::config(format!(
                "Destination '{}' is already registered",
                destination.name()
            )));
        }

        let name = destination.name().to_string();
        for action in destination.actions() {
            self.actions
                .insert((name.clone(), action.name().to_string()), action);
        }
        self.destinations.insert(name.clone(), destination);

        debug!(destination = %name, "registered destination");
        Ok(())
    }

    /// Return a registered destination by name
    pub fn destination(&self, name: &str) -> Option<&Arc<dyn Destination>> {
        self.destinations.get(name)
    }

    /// Resolve the action to run for a destination/action pair. Falls back
    /// to the destination's wildcard action when no exact match exists.
    pub fn resolve(&self, destination: &str, action: &str) -> Option<Arc<dyn Action>> {
        self.actions
            .get(&(destination.to_string(), action.to_string()))
            .or_else(|| self.actions.get(&(destination.to_string(), "*".to_string())))
            .cloned()
    }

    /// Resolve the schedule for a destination/action pair: action-level
    /// schedule, else destination default, else the platform default.
    pub fn schedule_for(&self, destination: &str, action: &str, platform: &Schedule) -> Schedule {
        let action_schedule = self
            .resolve(destination, action)
            .and_then(|action| action.schedule());
        let destination_schedule = self
            .destinations
            .get(destination)
            .and_then(|destination| destination.schedule());

        Schedule::resolve(action_schedule, destination_schedule, platform)
    }

    /// Names of every registered destination
    pub fn destination_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.destinations.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether no destination is registered
    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Then, ThenSender};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use relay_store::Queue;

    struct NamedAction {
        name: &'static str,
        schedule: Option<Schedule>,
    }

    #[async_trait]
    impl Action for NamedAction {
        fn name(&self) -> &str {
            self.name
        }

        fn schedule(&self) -> Option<Schedule> {
            self.schedule.clone()
        }

        async fn load(&self, _queue: &Queue, results: ThenSender) -> Result<()> {
            let _ = results.send(Then::success()).await;
            Ok(())
        }
    }

    struct TestDestination {
        name: &'static str,
        schedule: Option<Schedule>,
        actions: Vec<(&'static str, Option<Schedule>)>,
    }

    impl Destination for TestDestination {
        fn name(&self) -> &str {
            self.name
        }

        fn schedule(&self) -> Option<Schedule> {
            self.schedule.clone()
        }

        fn actions(&self) -> Vec<Arc<dyn Action>> {
            self.actions
                .iter()
                .map(|(name, schedule)| {
                    Arc::new(NamedAction {
                        name,
                        schedule: schedule.clone(),
                    }) as Arc<dyn Action>
                })
                .collect()
        }
    }

    fn warehouse() -> Arc<dyn Destination> {
        Arc::new(TestDestination {
            name: "warehouse",
            schedule: Some(Schedule {
                realtime: false,
                interval: "@every 6h".to_string(),
                max_retries: 10,
            }),
            actions: vec![
                (
                    "insert",
                    Some(Schedule {
                        realtime: true,
                        interval: "@every 1m".to_string(),
                        max_retries: 3,
                    }),
                ),
                ("*", None),
            ],
        })
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = Registry::new();
        registry.register(warehouse()).unwrap();

        assert!(registry.destination("warehouse").is_some());
        assert!(registry.resolve("warehouse", "insert").is_some());
        assert!(registry.resolve("unknown", "insert").is_none());
    }

    #[test]
    fn test_resolve_falls_back_to_wildcard() {
        let mut registry = Registry::new();
        registry.register(warehouse()).unwrap();

        let actual = registry.resolve("warehouse", "upsert").unwrap();
        assert_eq!(actual.name(), "*");
    }

    #[test]
    fn test_register_rejects_invalid_destination() {
        let mut registry = Registry::new();
        let invalid = Arc::new(TestDestination {
            name: "",
            schedule: None,
            actions: vec![("insert", None)],
        });

        let actual = registry.register(invalid);

        assert!(actual.is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_rejects_duplicate_destination() {
        let mut registry = Registry::new();
        registry.register(warehouse()).unwrap();

        let actual = registry.register(warehouse());

        assert!(actual.is_err());
    }

    #[test]
    fn test_schedule_resolution_order() {
        let mut registry = Registry::new();
        registry.register(warehouse()).unwrap();
        let platform = Schedule::default();

        // Action-level schedule wins.
        let actual = registry.schedule_for("warehouse", "insert", &platform);
        assert!(actual.realtime);
        assert_eq!(actual.interval, "@every 1m");

        // Wildcard action has no schedule: destination default applies.
        let actual = registry.schedule_for("warehouse", "upsert", &platform);
        assert_eq!(actual.interval, "@every 6h");
        assert_eq!(actual.max_retries, 10);

        // Unknown destination: platform default applies.
        let actual = registry.schedule_for("mailer", "welcome", &platform);
        assert_eq!(actual, platform);
    }
}
