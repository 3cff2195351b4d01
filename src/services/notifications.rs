use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db::{Notification, NotificationRepository};
use crate::error::{AppError, AppResult};
use crate::AppState;

/// App id stamped on notifications generated by administrators.
pub const ADMIN_APP: &str = "notifications";
/// Subject, message and object type key of administrator notifications.
pub const ADMIN_NOTIFICATION: &str = "admin-notification";

pub const MAX_SUBJECT_LENGTH: usize = 255;
pub const MAX_MESSAGE_LENGTH: usize = 4000;

/// Who a generated notification goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    User(String),
    /// Members of a group, already resolved by the caller.
    Members(Vec<String>),
}

impl Recipients {
    pub fn into_users(self) -> Vec<String> {
        match self {
            Recipients::User(user) => vec![user],
            Recipients::Members(members) => members,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub recipients: Recipients,
    pub subject: String,
    pub message: Option<String>,
}

/// Resolves a group name to the ids of its members.
#[async_trait]
pub trait GroupDirectory: Send + Sync + 'static {
    /// `None` when the group is not known.
    async fn members(&self, group: &str) -> AppResult<Option<Vec<String>>>;
}

/// Group directory backed by a fixed in-memory map.
#[derive(Debug, Clone, Default)]
pub struct StaticGroupDirectory {
    groups: HashMap<String, Vec<String>>,
}

impl StaticGroupDirectory {
    /// Parse `group=user1,user2;other=user3`. Blank entries and blank member
    /// names are skipped; a group may have no members.
    pub fn parse(spec: &str) -> Self {
        let mut groups = HashMap::new();
        for entry in spec.split(';') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (name, members) = entry.split_once('=').unwrap_or((entry, ""));
            let name = name.trim();
            if name.is_empty() {
                tracing::warn!("Ignoring group entry without a name: {}", entry);
                continue;
            }
            let members: Vec<String> = members
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
            groups.insert(name.to_string(), members);
        }
        Self { groups }
    }
}

#[async_trait]
impl GroupDirectory for StaticGroupDirectory {
    async fn members(&self, group: &str) -> AppResult<Option<Vec<String>>> {
        Ok(self.groups.get(group).cloned())
    }
}

/// Pick recipients from an optional user and an optional group. The group
/// wins when both are given.
pub async fn resolve_recipients(
    directory: &dyn GroupDirectory,
    user: Option<String>,
    group: Option<String>,
) -> AppResult<Recipients> {
    match (user, group) {
        (_, Some(group)) => match directory.members(&group).await? {
            Some(members) => Ok(Recipients::Members(members)),
            None => Err(AppError::NotFound("Group is not known.".to_string())),
        },
        (Some(user), None) => Ok(Recipients::User(user)),
        (None, None) => Err(AppError::InvalidArgument(
            "Either user or group needs to be given.".to_string(),
        )),
    }
}

/// Build the administrator notification for one recipient.
pub fn build_admin_notification(
    user: &str,
    subject: &str,
    message: Option<&str>,
    now: DateTime<Utc>,
) -> Notification {
    let mut notification = Notification::new()
        .with_app(ADMIN_APP)
        .with_user(user)
        .with_timestamp(now)
        .with_subject(ADMIN_NOTIFICATION, vec![subject.to_string()])
        .with_object(ADMIN_NOTIFICATION, now.timestamp().to_string());

    if let Some(message) = message {
        notification = notification.with_message(ADMIN_NOTIFICATION, vec![message.to_string()]);
    }

    notification
}

fn validate_request(request: &GenerateRequest) -> AppResult<()> {
    if let Recipients::User(user) = &request.recipients {
        if user.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "Either user or group needs to be given.".to_string(),
            ));
        }
    }
    if request.subject.is_empty() {
        return Err(AppError::Validation("Subject must not be empty".to_string()));
    }
    if request.subject.chars().count() > MAX_SUBJECT_LENGTH {
        return Err(AppError::Validation(format!(
            "Subject exceeds {} characters",
            MAX_SUBJECT_LENGTH
        )));
    }
    if let Some(message) = &request.message {
        if message.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(AppError::Validation(format!(
                "Message exceeds {} characters",
                MAX_MESSAGE_LENGTH
            )));
        }
    }
    Ok(())
}

/// Service that creates notifications on behalf of callers and fans them
/// out to every recipient.
pub struct NotificationService {
    pool: SqlitePool,
}

impl NotificationService {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self::with_pool(state.db.clone())
    }

    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store one administrator notification per recipient and return the new
    /// ids in recipient order.
    pub async fn generate(&self, request: GenerateRequest) -> AppResult<Vec<i64>> {
        validate_request(&request)?;

        let now = Utc::now();
        let message = request.message.as_deref();
        let users = request.recipients.into_users();
        let mut ids = Vec::with_capacity(users.len());

        for user in &users {
            let notification = build_admin_notification(user, &request.subject, message, now);
            let id = NotificationRepository::add(&self.pool, &notification).await?;
            ids.push(id);
        }

        tracing::info!(
            "Generated {} admin notifications ({} recipients)",
            ids.len(),
            users.len()
        );

        Ok(ids)
    }
}
