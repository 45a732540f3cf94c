//! Serde types describing the persisted state file.
//!
//! Only durable fields are represented: live process handles, thumbnails,
//! and transient UI flags never reach disk. Restored tabs always come back
//! with an unstarted shell.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Terminal appearance preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub font_name: String,
    pub font_size: f32,
    pub color_scheme: ColorScheme,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            font_name: "SF Mono".to_string(),
            font_size: 13.0,
            color_scheme: ColorScheme::System,
        }
    }
}

/// Persisted as `"Light" | "Dark" | "System"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorScheme {
    Light,
    Dark,
    System,
}

/// Root of the state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub groups: Vec<PersistedGroup>,
    pub selected_group_id: Option<Uuid>,
    pub preferences: Preferences,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedGroup {
    pub id: Uuid,
    pub name: String,
    pub tabs: Vec<PersistedTab>,
    pub is_expanded: bool,
    pub selected_tab_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_working_directory: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTab {
    pub id: Uuid,
    pub title: String,
    pub working_directory: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_match_wire_format() {
        let state = PersistedState {
            groups: vec![PersistedGroup {
                id: Uuid::new_v4(),
                name: "Group 1".to_string(),
                tabs: vec![PersistedTab {
                    id: Uuid::new_v4(),
                    title: "Terminal".to_string(),
                    working_directory: PathBuf::from("/home/alice"),
                }],
                is_expanded: true,
                selected_tab_id: None,
                default_working_directory: None,
            }],
            selected_group_id: None,
            preferences: Preferences::default(),
        };

        let json = serde_json::to_string(&state).unwrap();
        for key in [
            "\"groups\"",
            "\"selectedGroupId\"",
            "\"preferences\"",
            "\"isExpanded\"",
            "\"selectedTabId\"",
            "\"workingDirectory\"",
            "\"fontName\"",
            "\"fontSize\"",
            "\"colorScheme\"",
        ] {
            assert!(json.contains(key), "missing {key} in {json}");
        }
        assert!(json.contains("\"System\""));
        // Absent group default directory is omitted entirely.
        assert!(!json.contains("defaultWorkingDirectory"));
    }

    #[test]
    fn test_color_scheme_strings() {
        assert_eq!(serde_json::to_string(&ColorScheme::Light).unwrap(), "\"Light\"");
        assert_eq!(serde_json::to_string(&ColorScheme::Dark).unwrap(), "\"Dark\"");
        assert_eq!(
            serde_json::from_str::<ColorScheme>("\"System\"").unwrap(),
            ColorScheme::System
        );
    }
}
