use relay_core::{Id, generate_id};
use serde::{Deserialize, Serialize};

/// Identity of a running instance, recorded as holder metadata when the
/// instance acquires a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Name of the instance
    ///
    /// Example: "relay-scheduler"
    pub name: String,
    /// Address of the instance
    ///
    /// Example: ":9091"
    pub address: String,
    /// Session started by the running instance
    pub session_id: Id,
}

impl Identity {
    /// Create an identity with a fresh session id
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            session_id: generate_id(),
        }
    }
}

/// Status of a semaphore key, as reported by the supervisor.
///
/// These details are surfaced to operators to inform them about the
/// semaphore of a given trigger, polling cycle, or purge policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Semaphore {
    /// The key looked up. Set even when `is_applicable` is false.
    pub key: String,
    /// Whether a semaphore is needed for the resource. Cron/CDC triggers and
    /// scheduled polling need one; HTTP and subscription work does not.
    pub is_applicable: bool,
    /// Whether the key is currently in use. None when the supervisor could
    /// not look up the key, or when no semaphore applies.
    pub is_acquired: Option<bool>,
    /// Name of the acquirer currently holding the key, empty when free
    pub acquirer_name: String,
    /// Address of the acquirer currently holding the key, empty when free
    pub acquirer_address: String,
    /// Session of the instance currently holding the key, empty when free
    pub session_id: String,
}

impl Semaphore {
    /// A semaphore report for a key that is applicable but currently free
    pub fn free(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            is_applicable: true,
            is_acquired: Some(false),
            acquirer_name: String::new(),
            acquirer_address: String::new(),
            session_id: String::new(),
        }
    }

    /// A semaphore report for a key held by `identity`
    pub fn held_by(key: impl Into<String>, identity: &Identity) -> Self {
        Self {
            key: key.into(),
            is_applicable: true,
            is_acquired: Some(true),
            acquirer_name: identity.name.clone(),
            acquirer_address: identity.address.clone(),
            session_id: identity.session_id.to_string(),
        }
    }

    /// A semaphore report for a key that does not need a lock
    pub fn not_applicable(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            is_applicable: false,
            is_acquired: None,
            acquirer_name: String::new(),
            acquirer_address: String::new(),
            session_id: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_identity_generates_session() {
        let actual = Identity::new("relay-scheduler", ":9091");
        assert_eq!(actual.name, "relay-scheduler");
        assert_eq!(actual.address, ":9091");
        assert!(!actual.session_id.as_str().is_empty());
    }

    #[test]
    fn test_semaphore_free() {
        let actual = Semaphore::free("scheduler/warehouse/insert");
        assert!(actual.is_applicable);
        assert_eq!(actual.is_acquired, Some(false));
        assert_eq!(actual.acquirer_name, "");
    }

    #[test]
    fn test_semaphore_held_by() {
        let identity = Identity::new("relay-scheduler", ":9091");
        let actual = Semaphore::held_by("scheduler/warehouse/insert", &identity);

        assert_eq!(actual.is_acquired, Some(true));
        assert_eq!(actual.acquirer_name, "relay-scheduler");
        assert_eq!(actual.acquirer_address, ":9091");
        assert_eq!(actual.session_id, identity.session_id.to_string());
    }

    #[test]
    fn test_semaphore_not_applicable() {
        let actual = Semaphore::not_applicable("http/crm/identify");
        assert!(!actual.is_applicable);
        assert_eq!(actual.is_acquired, None);
    }
}
