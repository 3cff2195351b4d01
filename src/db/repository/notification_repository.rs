use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::db::models::{encode_parameters, Action, ActionRow, Notification, NotificationRow};
use crate::error::{AppError, AppResult};

const NOTIFICATION_COLUMNS: &str = r#"
    id, app, user_id, timestamp, object_type, object_id,
    subject, subject_parameters, message, message_parameters, link
"#;

/// Upper bound on ids bound into a single `IN (...)` clause.
const ACTION_LOOKUP_CHUNK: usize = 500;

/// Traversal direction for the paginated list operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListOrder {
    /// Newest first (`id` strictly decreasing).
    #[default]
    #[serde(alias = "descending")]
    Desc,
    /// Oldest first (`id` strictly increasing).
    #[serde(alias = "ascending")]
    Asc,
}

/// Repository for stored notifications and their actions.
///
/// Implementation notes:
/// - `id` comes from SQLite `AUTOINCREMENT`, so it is unique, monotonic and
///   never reused. It is the only ordering key; `timestamp` is informational.
/// - Writes that touch both tables (`add`, `delete`, `delete_by_id`) run in a
///   single transaction so readers never see a record without its actions.
/// - Exact-match operations take a template `Notification`: non-empty fields
///   constrain the query, empty fields match anything.
pub struct NotificationRepository;

impl NotificationRepository {
    /// Persist a notification together with its actions and return its id.
    pub async fn add(pool: &SqlitePool, notification: &Notification) -> AppResult<i64> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO notifications (
                app,
                user_id,
                timestamp,
                object_type,
                object_id,
                subject,
                subject_parameters,
                message,
                message_parameters,
                link
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&notification.app)
        .bind(&notification.user)
        .bind(notification.timestamp)
        .bind(&notification.object_type)
        .bind(&notification.object_id)
        .bind(&notification.subject)
        .bind(encode_parameters(&notification.subject_parameters))
        .bind(&notification.message)
        .bind(encode_parameters(&notification.message_parameters))
        .bind(&notification.link)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        for (position, action) in notification.actions.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO notification_actions (
                    notification_id,
                    position,
                    label,
                    link,
                    request_type,
                    is_primary
                ) VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(position as i64)
            .bind(&action.label)
            .bind(&action.link)
            .bind(&action.request_type)
            .bind(action.is_primary)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;
        }

        tx.commit().await.map_err(AppError::Database)?;

        tracing::debug!(
            "Stored notification {} for user {} ({} actions)",
            id,
            notification.user,
            notification.actions.len()
        );

        Ok(id)
    }

    /// Count notifications matching the template.
    pub async fn count(pool: &SqlitePool, template: &Notification) -> AppResult<i64> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM notifications");
        push_template_filter(&mut builder, template);

        let count = builder
            .build_query_scalar::<i64>()
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(count)
    }

    /// Fetch every notification matching the template, keyed by id.
    /// The order of the returned map carries no meaning.
    pub async fn get(
        pool: &SqlitePool,
        template: &Notification,
    ) -> AppResult<IndexMap<i64, Notification>> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT ");
        builder.push(NOTIFICATION_COLUMNS).push(" FROM notifications");
        push_template_filter(&mut builder, template);

        let rows = builder
            .build_query_as::<NotificationRow>()
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)?;

        Self::hydrate(pool, rows).await
    }

    /// Fetch a single notification, only if it belongs to `user`.
    pub async fn get_by_id(
        pool: &SqlitePool,
        id: i64,
        user: &str,
    ) -> AppResult<Option<Notification>> {
        let sql = format!(
            "SELECT {} FROM notifications WHERE id = ? AND user_id = ?",
            NOTIFICATION_COLUMNS
        );
        let row = sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(id)
            .bind(user)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)?;

        match row {
            Some(row) => Ok(Self::hydrate(pool, vec![row]).await?.swap_remove(&id)),
            None => Ok(None),
        }
    }

    /// Delete a notification and its actions if it belongs to `user`.
    /// A notification owned by someone else is left untouched.
    pub async fn delete_by_id(pool: &SqlitePool, id: i64, user: &str) -> AppResult<()> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        sqlx::query(
            r#"
            DELETE FROM notification_actions
            WHERE notification_id IN (
                SELECT id FROM notifications WHERE id = ? AND user_id = ?
            )
            "#,
        )
        .bind(id)
        .bind(user)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        let result = sqlx::query("DELETE FROM notifications WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            tracing::debug!("No notification {} owned by {}, nothing deleted", id, user);
        }

        Ok(())
    }

    /// Delete every notification matching the template along with its
    /// actions. Returns the number of notifications removed.
    pub async fn delete(pool: &SqlitePool, template: &Notification) -> AppResult<u64> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        let mut actions = QueryBuilder::<Sqlite>::new(
            "DELETE FROM notification_actions \
             WHERE notification_id IN (SELECT id FROM notifications",
        );
        push_template_filter(&mut actions, template);
        actions.push(")");
        actions
            .build()
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        let mut notifications = QueryBuilder::<Sqlite>::new("DELETE FROM notifications");
        push_template_filter(&mut notifications, template);
        let result = notifications
            .build()
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;

        tracing::debug!("Deleted {} notifications", result.rows_affected());

        Ok(result.rows_affected())
    }

    /// Newest-first page of `user`'s notifications with ids below `since_id`.
    pub async fn fetch_descendent_list(
        pool: &SqlitePool,
        user: &str,
        since_id: Option<i64>,
        limit: i64,
    ) -> AppResult<IndexMap<i64, Notification>> {
        Self::fetch_list(pool, user, since_id, limit, ListOrder::Desc, Some).await
    }

    /// Like [`Self::fetch_descendent_list`], keeping only what `filter`
    /// returns. The page is still filled up to `limit` entries when enough
    /// notifications pass the filter.
    pub async fn fetch_descendent_list_filtered<F>(
        pool: &SqlitePool,
        user: &str,
        since_id: Option<i64>,
        limit: i64,
        filter: F,
    ) -> AppResult<IndexMap<i64, Notification>>
    where
        F: FnMut(Notification) -> Option<Notification> + Send,
    {
        Self::fetch_list(pool, user, since_id, limit, ListOrder::Desc, filter).await
    }

    /// Oldest-first page of `user`'s notifications with ids above `since_id`.
    pub async fn fetch_ascendent_list(
        pool: &SqlitePool,
        user: &str,
        since_id: Option<i64>,
        limit: i64,
    ) -> AppResult<IndexMap<i64, Notification>> {
        Self::fetch_list(pool, user, since_id, limit, ListOrder::Asc, Some).await
    }

    /// Filtered counterpart of [`Self::fetch_ascendent_list`].
    pub async fn fetch_ascendent_list_filtered<F>(
        pool: &SqlitePool,
        user: &str,
        since_id: Option<i64>,
        limit: i64,
        filter: F,
    ) -> AppResult<IndexMap<i64, Notification>>
    where
        F: FnMut(Notification) -> Option<Notification> + Send,
    {
        Self::fetch_list(pool, user, since_id, limit, ListOrder::Asc, filter).await
    }

    /// Keyset walk over a user's notifications.
    ///
    /// Rows are read in batches of `limit`, each batch starting after the
    /// last raw row of the previous one. Filtering happens before counting
    /// towards `limit`, so rejected rows never shrink the page; the walk only
    /// ends early when the user runs out of notifications.
    pub async fn fetch_list<F>(
        pool: &SqlitePool,
        user: &str,
        since_id: Option<i64>,
        limit: i64,
        order: ListOrder,
        mut filter: F,
    ) -> AppResult<IndexMap<i64, Notification>>
    where
        F: FnMut(Notification) -> Option<Notification> + Send,
    {
        let mut list = IndexMap::new();
        if limit <= 0 {
            return Ok(list);
        }

        let mut cursor = since_id;
        loop {
            let rows = Self::fetch_batch(pool, user, cursor, limit, order).await?;
            let fetched = rows.len() as i64;
            if let Some(last) = rows.last() {
                cursor = Some(last.id);
            }

            for (id, notification) in Self::hydrate(pool, rows).await? {
                if let Some(kept) = filter(notification) {
                    list.insert(id, kept);
                    if list.len() as i64 >= limit {
                        return Ok(list);
                    }
                }
            }

            if fetched < limit {
                break;
            }
        }

        Ok(list)
    }

    async fn fetch_batch(
        pool: &SqlitePool,
        user: &str,
        cursor: Option<i64>,
        limit: i64,
        order: ListOrder,
    ) -> AppResult<Vec<NotificationRow>> {
        let sql = match order {
            ListOrder::Desc => format!(
                "SELECT {} FROM notifications \
                 WHERE user_id = ? AND (? IS NULL OR id < ?) \
                 ORDER BY id DESC LIMIT ?",
                NOTIFICATION_COLUMNS
            ),
            ListOrder::Asc => format!(
                "SELECT {} FROM notifications \
                 WHERE user_id = ? AND (? IS NULL OR id > ?) \
                 ORDER BY id ASC LIMIT ?",
                NOTIFICATION_COLUMNS
            ),
        };

        let rows = sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(user)
            .bind(cursor)
            .bind(cursor)
            .bind(limit)
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Turn rows into notifications with their actions attached, keeping the
    /// row order.
    async fn hydrate(
        pool: &SqlitePool,
        rows: Vec<NotificationRow>,
    ) -> AppResult<IndexMap<i64, Notification>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut actions = Self::actions_for(pool, &ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let id = row.id;
                let mut notification = row.into_notification();
                notification.actions = actions.remove(&id).unwrap_or_default();
                (id, notification)
            })
            .collect())
    }

    async fn actions_for(
        pool: &SqlitePool,
        ids: &[i64],
    ) -> AppResult<HashMap<i64, Vec<Action>>> {
        let mut actions: HashMap<i64, Vec<Action>> = HashMap::new();

        for chunk in ids.chunks(ACTION_LOOKUP_CHUNK) {
            let mut builder = QueryBuilder::<Sqlite>::new(
                "SELECT notification_id, label, link, request_type, is_primary \
                 FROM notification_actions WHERE notification_id IN (",
            );
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(") ORDER BY notification_id, position");

            let rows = builder
                .build_query_as::<ActionRow>()
                .fetch_all(pool)
                .await
                .map_err(AppError::Database)?;

            for row in rows {
                actions
                    .entry(row.notification_id)
                    .or_default()
                    .push(row.into());
            }
        }

        Ok(actions)
    }
}

/// Columns constrained by a template, with their values. Empty fields are
/// wildcards and are left out.
fn template_constraints(template: &Notification) -> Vec<(&'static str, &str)> {
    [
        ("app", template.app.as_str()),
        ("user_id", template.user.as_str()),
        ("object_type", template.object_type.as_str()),
        ("object_id", template.object_id.as_str()),
        ("subject", template.subject.as_str()),
        ("message", template.message.as_str()),
        ("link", template.link.as_str()),
    ]
    .into_iter()
    .filter(|(_, value)| !value.is_empty())
    .collect()
}

fn push_template_filter(builder: &mut QueryBuilder<'_, Sqlite>, template: &Notification) {
    builder.push(" WHERE 1 = 1");
    for (column, value) in template_constraints(template) {
        builder
            .push(" AND ")
            .push(column)
            .push(" = ")
            .push_bind(value.to_string());
    }
}
