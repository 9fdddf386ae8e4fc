use sqlx::{Row, sqlite::SqlitePool};
use tracing::info;

use tandem_protocol::UserId;

use crate::{Result, now_secs};

/// A mutually accepted pair. The row's lifetime spans the voice session:
/// created on mutual accept, deleted when either participant disconnects.
#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub id: i64,
    pub user1_id: UserId,
    pub user2_id: UserId,
    pub matched_at: i64,
}

#[derive(Clone)]
pub struct Rooms {
    pool: SqlitePool,
}

impl Rooms {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the room for a pair, reusing an existing row in either
    /// participant order. Participants are stored numerically sorted, which
    /// the UNIQUE constraint keys on.
    pub async fn create_between(&self, a: UserId, b: UserId) -> Result<Room> {
        let (user1, user2) = (a.min(b), a.max(b));
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            r#"SELECT id, user1_id, user2_id, matched_at FROM matched_rooms
               WHERE (user1_id = ? AND user2_id = ?) OR (user1_id = ? AND user2_id = ?)"#,
        )
        .bind(user1)
        .bind(user2)
        .bind(user2)
        .bind(user1)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(row) = existing {
            return Ok(Room {
                id: row.try_get("id")?,
                user1_id: row.try_get("user1_id")?,
                user2_id: row.try_get("user2_id")?,
                matched_at: row.try_get("matched_at")?,
            });
        }

        let matched_at = now_secs();
        let result = sqlx::query(
            "INSERT INTO matched_rooms (user1_id, user2_id, matched_at) VALUES (?, ?, ?)",
        )
        .bind(user1)
        .bind(user2)
        .bind(matched_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(user1, user2, "room created");
        Ok(Room {
            id: result.last_insert_rowid(),
            user1_id: user1,
            user2_id: user2,
            matched_at,
        })
    }

    pub async fn find_between(&self, a: UserId, b: UserId) -> Result<Option<Room>> {
        let row = sqlx::query(
            r#"SELECT id, user1_id, user2_id, matched_at FROM matched_rooms
               WHERE (user1_id = ? AND user2_id = ?) OR (user1_id = ? AND user2_id = ?)"#,
        )
        .bind(a)
        .bind(b)
        .bind(b)
        .bind(a)
        .fetch_optional(&self.pool)
        .await?;
        Ok(match row {
            Some(row) => Some(Room {
                id: row.try_get("id")?,
                user1_id: row.try_get("user1_id")?,
                user2_id: row.try_get("user2_id")?,
                matched_at: row.try_get("matched_at")?,
            }),
            None => None,
        })
    }

    /// Delete every room naming `user`; returns the partner on the other
    /// side of each deleted room.
    pub async fn delete_for_user(&self, user: UserId) -> Result<Vec<UserId>> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(
            "SELECT user1_id, user2_id FROM matched_rooms WHERE user1_id = ? OR user2_id = ?",
        )
        .bind(user)
        .bind(user)
        .fetch_all(&mut *tx)
        .await?;

        let mut partners = Vec::with_capacity(rows.len());
        for row in &rows {
            let user1: UserId = row.try_get("user1_id")?;
            let user2: UserId = row.try_get("user2_id")?;
            partners.push(if user1 == user { user2 } else { user1 });
        }

        if !rows.is_empty() {
            sqlx::query("DELETE FROM matched_rooms WHERE user1_id = ? OR user2_id = ?")
                .bind(user)
                .bind(user)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        if !partners.is_empty() {
            info!(user_id = user, rooms = partners.len(), "rooms deleted on disconnect");
        }
        Ok(partners)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    async fn rooms() -> Rooms {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::init_schema(&pool).await.unwrap();
        Rooms::new(pool)
    }

    #[tokio::test]
    async fn creation_is_idempotent_across_argument_order() {
        let rooms = rooms().await;
        let first = rooms.create_between(12, 3).await.unwrap();
        assert_eq!((first.user1_id, first.user2_id), (3, 12));

        let again = rooms.create_between(3, 12).await.unwrap();
        assert_eq!(again.id, first.id);
    }

    #[tokio::test]
    async fn delete_for_user_reports_partners() {
        let rooms = rooms().await;
        rooms.create_between(1, 2).await.unwrap();
        rooms.create_between(5, 1).await.unwrap();
        rooms.create_between(7, 8).await.unwrap();

        let mut partners = rooms.delete_for_user(1).await.unwrap();
        partners.sort_unstable();
        assert_eq!(partners, vec![2, 5]);

        assert_eq!(rooms.find_between(1, 2).await.unwrap(), None);
        assert!(rooms.find_between(7, 8).await.unwrap().is_some());
        assert_eq!(rooms.delete_for_user(4).await.unwrap(), Vec::<i64>::new());
    }
}
