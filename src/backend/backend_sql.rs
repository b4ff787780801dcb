use std::future::Future;
use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{query, query_as, query_scalar, Pool, Sqlite, Transaction};

use log::{error, info, trace};

use crate::auth::PasswordHash;
use crate::backend::StoreError;
use crate::user::{ProfileUpdate, UserRecord};

type Result<T> = std::result::Result<T, StoreError>;

/// A single pooled connection: the interactive front end issues one
/// operation at a time.
const MAX_CONNECTIONS: u32 = 1;

pub struct Backend(pub Pool<Sqlite>);

fn into_sql(path: &Path) -> PathBuf {
    path.join("profile.sql")
}

#[derive(sqlx::FromRow)]
struct UserRow {
    username: String,
    first_name: String,
    last_name: String,
    dob: String,
    pwhash: String,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self> {
        let date_of_birth = row.dob.parse().map_err(|()| {
            error!("stored date of birth for {} is invalid", row.username);
            StoreError::Corrupt
        })?;

        Ok(Self {
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            date_of_birth,
            pwhash: PasswordHash::from_stored(row.pwhash),
        })
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db_err) = e else {
        return false;
    };

    // SQLITE_CONSTRAINT_PRIMARYKEY, SQLITE_CONSTRAINT_UNIQUE
    matches!(db_err.code().as_deref(), Some("1555") | Some("2067"))
        || db_err.message().contains("UNIQUE constraint failed")
}

impl Backend {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        let db_path = into_sql(data_dir);
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| {
                error!("couldn't open {}: {e}", db_path.display());
                StoreError::Unavailable
            })?;

        if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
            error!("migrating {}: {e}", db_path.display());
            pool.close().await;
            return Err(StoreError::Unavailable);
        }

        info!("Using {}", db_path.display());
        Ok(Self(pool))
    }

    pub async fn close(&self) {
        self.0.close().await;
    }
}

impl Backend {
    async fn transact<'t, T, R, F>(&self, transaction: T) -> Result<R>
    where
        T: FnOnce(Transaction<'t, Sqlite>) -> F,
        F: Future<Output = Result<(Transaction<'t, Sqlite>, R)>>,
    {
        let tx = self.0.begin().await.map_err(|e| {
            error!("error beginning transaction: {:?}", e);
            StoreError::Unavailable
        })?;

        // dropping `tx` on the error path rolls it back
        let (tx, r) = transaction(tx).await?;

        tx.commit().await.map_err(|e| {
            error!("error committing transaction: {:?}", e);
            StoreError::Unavailable
        })?;

        Ok(r)
    }
}

impl Backend {
    pub async fn insert_user(&self, user: &UserRecord) -> Result<()> {
        let dob = user.date_of_birth.to_string();

        query(
            "
            INSERT INTO users
            (firstName, lastName, userName, dob, passwordhash)
            VALUES
            (?, ?, ?, ?, ?)
            ",
        )
        .bind(user.first_name.as_str())
        .bind(user.last_name.as_str())
        .bind(user.username.as_str())
        .bind(dob.as_str())
        .bind(user.pwhash.as_str())
        .execute(&self.0)
        .await
        .map(|_| ())
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Exists
            } else {
                error!("error inserting user {}: {e:?}", user.username);
                StoreError::Unavailable
            }
        })
    }

    pub async fn find_pwhash(&self, username: &str) -> Result<PasswordHash> {
        query_scalar::<_, String>(
            "
            SELECT passwordhash
            FROM users
            WHERE userName = ?
            ",
        )
        .bind(username)
        .fetch_optional(&self.0)
        .await
        .map_err(|e| {
            error!("couldn't look up {username}: {e:?}");
            StoreError::Unavailable
        })?
        .map(PasswordHash::from_stored)
        .ok_or(StoreError::NotFound)
    }

    pub async fn find_user(&self, username: &str) -> Result<UserRecord> {
        let row = query_as::<_, UserRow>(
            "
            SELECT userName AS username,
                firstName AS first_name,
                lastName AS last_name,
                dob,
                passwordhash AS pwhash
            FROM users
            WHERE userName = ?
            ",
        )
        .bind(username)
        .fetch_optional(&self.0)
        .await
        .map_err(|e| {
            error!("couldn't look up {username}: {e:?}");
            StoreError::Unavailable
        })?
        .ok_or(StoreError::NotFound)?;

        row.try_into()
    }

    pub async fn users(&self) -> Result<Vec<UserRecord>> {
        let rows = query_as::<_, UserRow>(
            "
            SELECT userName AS username,
                firstName AS first_name,
                lastName AS last_name,
                dob,
                passwordhash AS pwhash
            FROM users
            ORDER BY userName
            ",
        )
        .fetch_all(&self.0)
        .await
        .map_err(|e| {
            error!("error selecting users: {e:?}");
            StoreError::Unavailable
        })?;

        trace!("{} users", rows.len());

        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn update_user(&self, username: &str, update: &ProfileUpdate) -> Result<()> {
        let dob = update.date_of_birth.map(|d| d.to_string());

        self.transact(|mut tx| async move {
            let done = query(
                "
                UPDATE users
                SET
                    firstName = coalesce(?, firstName),
                    lastName = coalesce(?, lastName),
                    dob = coalesce(?, dob),
                    passwordhash = coalesce(?, passwordhash)
                WHERE userName = ?
                ",
            )
            .bind(update.first_name.as_deref())
            .bind(update.last_name.as_deref())
            .bind(dob.as_deref())
            .bind(update.pwhash.as_ref().map(PasswordHash::as_str))
            .bind(username)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("error updating user {username}: {e:?}");
                StoreError::Unavailable
            })?;

            if done.rows_affected() == 0 {
                return Err(StoreError::NotFound);
            }

            Ok((tx, ()))
        })
        .await
    }
}
