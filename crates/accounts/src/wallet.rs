use sqlx::{Row, sqlite::SqlitePool};
use tracing::info;

use tandem_protocol::UserId;

use crate::{Error, Result};

/// Gem wallet debits. Top-ups, ad rewards, and receipts are external; the
/// matchmaking core only ever spends.
#[derive(Clone)]
pub struct GemWallets {
    pool: SqlitePool,
}

impl GemWallets {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Current balance; a user without a wallet row reads as zero.
    pub async fn balance(&self, user: UserId) -> Result<i64> {
        let row = sqlx::query("SELECT balance FROM gem_wallets WHERE user_id = ?")
            .bind(user)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => row.try_get("balance")?,
            None => 0,
        })
    }

    /// Debit `price` gems inside one serializable transaction, creating the
    /// wallet (empty) when missing. Returns the new balance, or
    /// [`Error::InsufficientFunds`] without touching the row.
    pub async fn debit(&self, user: UserId, price: i64) -> Result<i64> {
        if price < 0 {
            return Err(Error::message(format!("negative debit {price} for user {user}")));
        }

        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT balance FROM gem_wallets WHERE user_id = ?")
            .bind(user)
            .fetch_optional(&mut *tx)
            .await?;
        let balance: i64 = match row {
            Some(row) => row.try_get("balance")?,
            None => {
                sqlx::query("INSERT INTO gem_wallets (user_id, balance) VALUES (?, 0)")
                    .bind(user)
                    .execute(&mut *tx)
                    .await?;
                0
            },
        };

        if balance < price {
            return Err(Error::InsufficientFunds { balance, price });
        }

        sqlx::query(
            "UPDATE gem_wallets SET balance = balance - ?, updated_at = strftime('%s','now') WHERE user_id = ?",
        )
        .bind(price)
        .bind(user)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(user_id = user, price, balance = balance - price, "wallet: debited");
        Ok(balance - price)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    async fn wallets_with(user: i64, balance: i64) -> GemWallets {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::init_schema(&pool).await.unwrap();
        sqlx::query("INSERT INTO users (id, username, age, gender) VALUES (?, 'u', 25, 'male')")
            .bind(user)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO gem_wallets (user_id, balance) VALUES (?, ?)")
            .bind(user)
            .bind(balance)
            .execute(&pool)
            .await
            .unwrap();
        GemWallets::new(pool)
    }

    #[tokio::test]
    async fn debit_decrements_balance() {
        let wallets = wallets_with(1, 50).await;
        assert_eq!(wallets.debit(1, 30).await.unwrap(), 20);
        assert_eq!(wallets.balance(1).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn short_balance_fails_without_spending() {
        let wallets = wallets_with(1, 10).await;
        let err = wallets.debit(1, 30).await.unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { balance: 10, price: 30 }));
        assert_eq!(wallets.balance(1).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn missing_wallet_is_created_empty() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::init_schema(&pool).await.unwrap();
        let wallets = GemWallets::new(pool);

        // Zero-price debit succeeds against the fresh wallet...
        assert_eq!(wallets.debit(5, 0).await.unwrap(), 0);
        // ...while any positive price does not.
        assert!(matches!(
            wallets.debit(5, 5).await.unwrap_err(),
            Error::InsufficientFunds { balance: 0, price: 5 }
        ));
    }
}
