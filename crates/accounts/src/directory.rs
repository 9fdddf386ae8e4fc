use sqlx::{Row, sqlite::SqlitePool};

use tandem_protocol::{Gender, PreferredGender, UserId};

use crate::{Error, Result};

/// A user's demographic attributes, as shown to a matched partner.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub image_url: Option<String>,
    pub age: i64,
    pub gender: Gender,
}

/// A user's saved matching constraints. Users without one are ineligible
/// for matching. `radius_km` is reserved and not evaluated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchSetting {
    pub preferred_gender: PreferredGender,
    pub age_min: i64,
    pub age_max: i64,
    pub radius_km: Option<i64>,
}

/// Read-only access to users and their match settings.
#[derive(Clone)]
pub struct Directory {
    pool: SqlitePool,
}

impl Directory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn user(&self, id: UserId) -> Result<Option<UserProfile>> {
        let row = sqlx::query("SELECT id, username, image_url, age, gender FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let gender: String = row.try_get("gender")?;
        let gender = Gender::from_name(&gender)
            .ok_or_else(|| Error::message(format!("user {id}: unknown gender {gender:?}")))?;
        Ok(Some(UserProfile {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            image_url: row.try_get("image_url")?,
            age: row.try_get("age")?,
            gender,
        }))
    }

    pub async fn setting(&self, user: UserId) -> Result<Option<MatchSetting>> {
        let row = sqlx::query(
            "SELECT preferred_gender, age_min, age_max, radius_km FROM match_settings WHERE user_id = ?",
        )
        .bind(user)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let preferred: String = row.try_get("preferred_gender")?;
        let preferred_gender = PreferredGender::from_name(&preferred).ok_or_else(|| {
            Error::message(format!("user {user}: unknown preferred gender {preferred:?}"))
        })?;
        let setting = MatchSetting {
            preferred_gender,
            age_min: row.try_get("age_min")?,
            age_max: row.try_get("age_max")?,
            radius_km: row.try_get("radius_km")?,
        };
        debug_assert!(setting.age_min <= setting.age_max);
        Ok(Some(setting))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    async fn pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::init_schema(&pool).await.unwrap();
        pool
    }

    async fn seed_user(pool: &SqlitePool, id: i64, username: &str, age: i64, gender: &str) {
        sqlx::query("INSERT INTO users (id, username, age, gender) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(username)
            .bind(age)
            .bind(gender)
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reads_profiles_and_settings() {
        let pool = pool().await;
        seed_user(&pool, 1, "ana", 25, "female").await;
        sqlx::query(
            "INSERT INTO match_settings (user_id, preferred_gender, age_min, age_max) VALUES (1, 'any', 20, 30)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let directory = Directory::new(pool);
        let ana = directory.user(1).await.unwrap().unwrap();
        assert_eq!(ana.username, "ana");
        assert_eq!(ana.gender, Gender::Female);
        assert_eq!(ana.image_url, None);

        let setting = directory.setting(1).await.unwrap().unwrap();
        assert_eq!(setting.preferred_gender, PreferredGender::Any);
        assert_eq!((setting.age_min, setting.age_max), (20, 30));
        assert_eq!(setting.radius_km, None);
    }

    #[tokio::test]
    async fn missing_rows_read_as_none() {
        let pool = pool().await;
        seed_user(&pool, 1, "ana", 25, "female").await;

        let directory = Directory::new(pool);
        assert_eq!(directory.user(9).await.unwrap(), None);
        // A user without a saved setting is simply ineligible.
        assert_eq!(directory.setting(1).await.unwrap(), None);
    }
}
