use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A call-to-action attached to a notification.
///
/// Actions have no identity of their own; they are stored and removed
/// together with their parent notification and keep the order in which they
/// were added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub label: String,
    pub link: String,
    /// HTTP verb token, e.g. `GET` or `DELETE`.
    pub request_type: String,
    pub is_primary: bool,
}

impl Action {
    pub fn new(
        label: impl Into<String>,
        link: impl Into<String>,
        request_type: impl Into<String>,
        is_primary: bool,
    ) -> Self {
        Action {
            label: label.into(),
            link: link.into(),
            request_type: request_type.into(),
            is_primary,
        }
    }
}

/// A user notification.
///
/// The same type doubles as a query template: every non-empty string field
/// is an exact-match constraint and every empty one is a wildcard. An empty
/// string cannot be matched exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub app: String,
    pub user: String,
    pub timestamp: DateTime<Utc>,
    pub object_type: String,
    pub object_id: String,
    pub subject: String,
    #[serde(default)]
    pub subject_parameters: Vec<String>,
    pub message: String,
    #[serde(default)]
    pub message_parameters: Vec<String>,
    pub link: String,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Default for Notification {
    fn default() -> Self {
        Notification {
            app: String::new(),
            user: String::new(),
            timestamp: DateTime::<Utc>::default(),
            object_type: String::new(),
            object_id: String::new(),
            subject: String::new(),
            subject_parameters: Vec::new(),
            message: String::new(),
            message_parameters: Vec::new(),
            link: String::new(),
            actions: Vec::new(),
        }
    }
}

impl Notification {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_app(mut self, app: impl Into<String>) -> Self {
        self.app = app.into();
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_object(
        mut self,
        object_type: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Self {
        self.object_type = object_type.into();
        self.object_id = object_id.into();
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>, parameters: Vec<String>) -> Self {
        self.subject = subject.into();
        self.subject_parameters = parameters;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>, parameters: Vec<String>) -> Self {
        self.message = message.into();
        self.message_parameters = parameters;
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = link.into();
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// True when no field would constrain an exact-match query.
    pub fn is_wildcard(&self) -> bool {
        self.app.is_empty()
            && self.user.is_empty()
            && self.object_type.is_empty()
            && self.object_id.is_empty()
            && self.subject.is_empty()
            && self.message.is_empty()
            && self.link.is_empty()
    }
}

/// Raw `notifications` row.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationRow {
    pub id: i64,
    pub app: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub object_type: String,
    pub object_id: String,
    pub subject: String,
    pub subject_parameters: String,
    pub message: String,
    pub message_parameters: String,
    pub link: String,
}

/// Raw `notification_actions` row.
#[derive(Debug, Clone, FromRow)]
pub struct ActionRow {
    pub notification_id: i64,
    pub label: String,
    pub link: String,
    pub request_type: String,
    pub is_primary: bool,
}

impl From<ActionRow> for Action {
    fn from(row: ActionRow) -> Self {
        Action {
            label: row.label,
            link: row.link,
            request_type: row.request_type,
            is_primary: row.is_primary,
        }
    }
}

impl NotificationRow {
    /// Build the notification without its actions; they are attached by the
    /// repository after a separate lookup.
    pub fn into_notification(self) -> Notification {
        Notification {
            timestamp: self.timestamp,
            subject_parameters: decode_parameters(self.id, &self.subject_parameters),
            message_parameters: decode_parameters(self.id, &self.message_parameters),
            app: self.app,
            user: self.user_id,
            object_type: self.object_type,
            object_id: self.object_id,
            subject: self.subject,
            message: self.message,
            link: self.link,
            actions: Vec::new(),
        }
    }
}

/// Serialize subject/message parameters as a JSON array of strings.
pub fn encode_parameters(parameters: &[String]) -> String {
    serde_json::to_string(parameters).unwrap_or_else(|_| "[]".to_string())
}

/// Parse a stored parameter column. Columns that are empty or not a JSON
/// string array decode to an empty list.
pub fn decode_parameters(notification_id: i64, raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(parameters) => parameters,
        Err(e) => {
            tracing::warn!(
                "Undecodable parameters on notification {}: {}",
                notification_id,
                e
            );
            Vec::new()
        }
    }
}
