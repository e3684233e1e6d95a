//! Activities (classes, sessions, stations) that participants check into.

use serde::{Deserialize, Serialize};

use super::ids::{ActivityId, EventId};
use super::normalize;
use crate::error::{Result, RollcallError};

/// An activity within one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub event_id: EventId,
    /// Display name, unique within the event (case-insensitive).
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Where the activity takes place ("Hall B", "Lake Front").
    pub location: String,
}

impl Activity {
    /// Whether two names collide under the event's uniqueness rule.
    pub fn same_name(&self, name: &str) -> bool {
        normalize(&self.name) == normalize(name)
    }
}

/// Administrative input for creating or editing an activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub location: String,
}

impl ActivityDraft {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            location: location.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Name and location are required; surrounding whitespace is dropped.
    pub fn validated(self) -> Result<Self> {
        let name = self.name.trim().to_string();
        let location = self.location.trim().to_string();
        if name.is_empty() {
            return Err(RollcallError::validation("Activity name is required"));
        }
        if location.is_empty() {
            return Err(RollcallError::validation("Activity location is required"));
        }
        Ok(Self {
            name,
            description: self.description.trim().to_string(),
            location,
        })
    }

    pub fn into_activity(self, event_id: EventId) -> Activity {
        Activity {
            id: ActivityId::new(),
            event_id,
            name: self.name,
            description: self.description,
            location: self.location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_draft_trims_fields() {
        let draft = ActivityDraft::new("  Archery ", " Field 2 ")
            .with_description(" bows ")
            .validated()
            .unwrap();
        assert_eq!(draft.name, "Archery");
        assert_eq!(draft.location, "Field 2");
        assert_eq!(draft.description, "bows");
    }

    #[test]
    fn test_draft_requires_name_and_location() {
        let err = ActivityDraft::new("   ", "Field 2").validated().unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        let err = ActivityDraft::new("Archery", "").validated().unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn test_same_name_ignores_case_and_padding() {
        let activity = ActivityDraft::new("Archery", "Field 2").into_activity(EventId::new());
        assert!(activity.same_name(" archery"));
        assert!(!activity.same_name("Archery II"));
    }
}
