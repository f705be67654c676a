//! Identifier newtypes.
//!
//! Runs and tasks are both keyed by strings; separate types keep a task id
//! out of a lineage lookup. Fresh ids are UUID v7, so they sort by creation
//! time.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Chat identifier assigned by the host application.
pub type ChatId = i64;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Allocate a fresh UUID v7 id.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7().hyphenated().to_string())
            }

            /// Borrow the id text.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_owned())
            }
        }
    };
}

string_id! {
    /// One agent invocation, primary or sub-agent.
    RunId
}

string_id! {
    /// One orchestrator task.
    TaskId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_v7_and_distinct() {
        let a = TaskId::new();
        let b = TaskId::new();
        assert_ne!(a, b);
        let parsed = Uuid::parse_str(a.as_str()).unwrap();
        assert_eq!(parsed.get_version_num(), 7);
    }

    #[test]
    fn later_ids_sort_after_earlier_ones() {
        let first = RunId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = RunId::new();
        assert!(first < second);
    }

    #[test]
    fn wraps_host_supplied_text() {
        let id = RunId::from("run-123");
        assert_eq!(id.as_str(), "run-123");
        assert_eq!(id.to_string(), "run-123");
        assert_eq!(TaskId::from(String::from("t")), TaskId::from("t"));
    }

    #[test]
    fn serializes_as_bare_string() {
        let id = TaskId::from("task-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"task-1\"");
        assert_eq!(serde_json::from_str::<TaskId>(&json).unwrap(), id);
    }
}
