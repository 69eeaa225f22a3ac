//! Registry of remote participants and their selections.
//!
//! This is a derived cache for rendering other participants' cursors. It is
//! fed from presence messages and kept aligned with the document by mapping
//! every tracked selection through each operation applied locally.

use crate::operation::TextOperation;
use crate::selection::Selection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Configuration for the participant registry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Idle threshold in milliseconds.
    pub idle_threshold_ms: u64,
    /// Palette used for round-robin colour assignment.
    pub colors: Vec<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            idle_threshold_ms: 60_000, // 1 minute
            colors: default_colors(),
        }
    }
}

impl RegistryConfig {
    /// Create a configuration with a custom idle threshold.
    pub fn with_idle_threshold(idle_threshold_ms: u64) -> Self {
        Self {
            idle_threshold_ms,
            ..Default::default()
        }
    }
}

/// Another participant editing the same document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: String,
    pub display_name: String,
    /// Assigned color (hex)
    pub color: String,
    /// Last known selection, in local document coordinates.
    pub selection: Selection,
    /// Last activity timestamp (ms since epoch)
    pub last_active: u64,
}

impl Participant {
    fn touch(&mut self) {
        self.last_active = current_timestamp_ms();
    }

    /// Check if the participant has been inactive for longer than the threshold
    pub fn is_idle(&self, idle_threshold_ms: u64) -> bool {
        current_timestamp_ms().saturating_sub(self.last_active) > idle_threshold_ms
    }
}

/// A remote selection ready for rendering.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSelection {
    pub user_id: String,
    pub display_name: String,
    pub color: String,
    pub selection: Selection,
}

/// Participant id → last known selection and display name.
#[derive(Clone, Debug, Default)]
pub struct ParticipantRegistry {
    participants: HashMap<String, Participant>,
    /// Colors survive `remove` so a returning participant keeps theirs;
    /// idle cleanup drops them.
    color_assignments: HashMap<String, String>,
    next_color_index: usize,
    config: RegistryConfig,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            participants: HashMap::new(),
            color_assignments: HashMap::new(),
            next_color_index: 0,
            config,
        }
    }

    /// Replace a participant's selection, registering them if unseen.
    pub fn update_selection(&mut self, user_id: &str, selection: Selection) -> &Participant {
        let color = self.assign_color(user_id);
        let participant = self
            .participants
            .entry(user_id.to_string())
            .or_insert_with(|| Participant {
                user_id: user_id.to_string(),
                display_name: user_id.to_string(),
                color,
                selection: Selection::default(),
                last_active: 0,
            });
        participant.selection = selection;
        participant.touch();
        tracing::trace!("Updated selection for {}", user_id);
        participant
    }

    /// Set the name shown next to a participant's cursor.
    pub fn set_display_name(&mut self, user_id: &str, display_name: impl Into<String>) {
        if let Some(participant) = self.participants.get_mut(user_id) {
            participant.display_name = display_name.into();
        }
    }

    /// Forget a participant that left the session.
    pub fn remove(&mut self, user_id: &str) -> Option<Participant> {
        tracing::trace!("Removing participant {}", user_id);
        self.participants.remove(user_id)
    }

    pub fn get(&self, user_id: &str) -> Option<&Participant> {
        self.participants.get(user_id)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Map every tracked selection through an operation applied locally.
    pub fn transform_all(&mut self, op: &TextOperation) {
        for participant in self.participants.values_mut() {
            participant.selection = participant.selection.transform(op);
        }
    }

    /// Selections to render, excluding `exclude_user_id`, ordered by user id.
    pub fn remote_selections(&self, exclude_user_id: &str) -> Vec<RemoteSelection> {
        let mut selections: Vec<RemoteSelection> = self
            .participants
            .values()
            .filter(|participant| participant.user_id != exclude_user_id)
            .map(|participant| RemoteSelection {
                user_id: participant.user_id.clone(),
                display_name: participant.display_name.clone(),
                color: participant.color.clone(),
                selection: participant.selection.clone(),
            })
            .collect();
        selections.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        selections
    }

    /// Drop idle participants and return their ids.
    pub fn cleanup_idle(&mut self) -> Vec<String> {
        let threshold = self.config.idle_threshold_ms;
        let idle: Vec<String> = self
            .participants
            .values()
            .filter(|participant| participant.is_idle(threshold))
            .map(|participant| participant.user_id.clone())
            .collect();
        for id in &idle {
            self.participants.remove(id);
            self.color_assignments.remove(id);
        }
        idle
    }

    /// Colour for `user_id`, assigning the next palette entry on first sight.
    pub fn assign_color(&mut self, user_id: &str) -> String {
        if let Some(color) = self.color_assignments.get(user_id) {
            return color.clone();
        }
        let color = if self.config.colors.is_empty() {
            default_colors()[0].clone()
        } else {
            let color = self.config.colors[self.next_color_index % self.config.colors.len()].clone();
            self.next_color_index = (self.next_color_index + 1) % self.config.colors.len();
            color
        };
        self.color_assignments.insert(user_id.to_string(), color.clone());
        color
    }
}

/// Default color palette for remote cursors
pub fn default_colors() -> Vec<String> {
    vec![
        "#E91E63".into(), // Pink
        "#9C27B0".into(), // Purple
        "#3F51B5".into(), // Indigo
        "#2196F3".into(), // Blue
        "#00BCD4".into(), // Cyan
        "#4CAF50".into(), // Green
        "#FF9800".into(), // Orange
        "#795548".into(), // Brown
    ]
}

fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
