use std::{fmt, result};

use log::{debug, error, info, warn};

use crate::auth::{DigestAlgorithm, Session};
use crate::backend::{Backend, StoreError};
use crate::user::{is_storable, DateOfBirth, ProfileUpdate, UserRecord};

pub struct ProfileDb {
    backend: Backend,
    digest: DigestAlgorithm,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    StorageUnavailable,
    NotFound,
    UsernameTaken,
    HashingUnsupported,
    InvalidDate,
    BadRequest,
    Internal,
}

pub type Result<T> = result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::StorageUnavailable => "user database unavailable",
            Self::NotFound => "no such user",
            Self::UsernameTaken => "username already registered",
            Self::HashingUnsupported => "password digest not supported",
            Self::InvalidDate => "date must be YYYY-MM-DD",
            Self::BadRequest => "invalid input",
            Self::Internal => "stored user data is corrupt",
        };
        write!(fmt, "{msg}")
    }
}

impl std::error::Error for Error {}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => Self::NotFound,
            StoreError::Exists => Self::UsernameTaken,
            StoreError::Unavailable => Self::StorageUnavailable,
            StoreError::InvalidKey => Self::BadRequest,
            StoreError::Corrupt => Self::Internal,
        }
    }
}

/// Details collected by the front end for a new account.
#[derive(Debug)]
pub struct Registration<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub username: &'a str,
    pub date_of_birth: &'a str,
    pub password: &'a str,
}

fn parse_date(text: &str) -> Result<DateOfBirth> {
    text.parse().map_err(|()| Error::InvalidDate)
}

fn check_fields(fields: &[(&str, &str)]) -> Result<()> {
    for (name, value) in fields {
        if !is_storable(value) {
            warn!("rejecting {name}: contains a line break or NUL");
            return Err(Error::BadRequest);
        }
    }
    Ok(())
}

impl ProfileDb {
    pub fn new(backend: Backend, digest: DigestAlgorithm) -> Self {
        Self { backend, digest }
    }

    pub async fn close(&self) {
        self.backend.close().await;
    }

    pub async fn register(&self, reg: Registration<'_>) -> Result<()> {
        let Registration {
            first_name,
            last_name,
            username,
            date_of_birth,
            password,
        } = reg;

        if username.is_empty() || password.is_empty() {
            warn!("rejecting registration with empty username or password");
            return Err(Error::BadRequest);
        }
        check_fields(&[
            ("first name", first_name),
            ("last name", last_name),
            ("username", username),
            ("password", password),
        ])?;

        let record = UserRecord {
            username: username.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            date_of_birth: parse_date(date_of_birth)?,
            pwhash: self.digest.hash_password(password),
        };

        self.backend.insert_user(&record).await.map_err(|e| {
            if e == StoreError::Exists {
                warn!("{username} is already registered");
            }
            Error::from(e)
        })?;

        info!("{username} registered");
        Ok(())
    }

    /// Whether `password` matches the hash stored for `username`. An unknown
    /// username is a mismatch, not an error.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<bool> {
        let stored = match self.backend.find_pwhash(username).await {
            Ok(hash) => hash,
            Err(StoreError::NotFound) | Err(StoreError::InvalidKey) => {
                debug!("no user {username:?}");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        Ok(self.digest.hash_password(password) == stored)
    }

    pub async fn sign_in(&self, username: &str, password: &str) -> Result<Option<Session>> {
        if !self.authenticate(username, password).await? {
            error!("login failed for {username:?}");
            return Ok(None);
        }

        let session = Session::start(username);
        info!(
            "{} login: session {} at {}",
            session.username(),
            session.id(),
            session.logged_in_at()
        );
        Ok(Some(session))
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<bool> {
        self.sign_in(username, password)
            .await
            .map(|session| session.is_some())
    }

    pub async fn profile(&self, username: &str) -> Result<UserRecord> {
        self.backend.find_user(username).await.map_err(|e| {
            if e == StoreError::NotFound {
                error!("no user {username:?}");
            }
            e.into()
        })
    }

    pub async fn users(&self) -> Result<Vec<UserRecord>> {
        let users = self.backend.users().await?;
        debug!("{} registered users", users.len());
        Ok(users)
    }

    pub async fn update_profile(
        &self,
        username: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
        date_of_birth: Option<&str>,
        password: Option<&str>,
    ) -> Result<()> {
        if password == Some("") {
            warn!("rejecting empty password for {username}");
            return Err(Error::BadRequest);
        }
        check_fields(&[
            ("first name", first_name.unwrap_or_default()),
            ("last name", last_name.unwrap_or_default()),
            ("password", password.unwrap_or_default()),
        ])?;

        let update = ProfileUpdate {
            first_name: first_name.map(Into::into),
            last_name: last_name.map(Into::into),
            date_of_birth: date_of_birth.map(parse_date).transpose()?,
            pwhash: password.map(|p| self.digest.hash_password(p)),
        };

        if update.is_empty() {
            debug!("{username}: nothing to update");
            return Ok(());
        }

        self.backend.update_user(username, &update).await?;

        info!("{username} profile updated");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::mock::create_profiledb;

    fn ada<'a>(password: &'a str) -> Registration<'a> {
        Registration {
            first_name: "Ada",
            last_name: "Lovelace",
            username: "ada",
            date_of_birth: "1815-12-10",
            password,
        }
    }

    #[tokio::test]
    async fn register_then_login() {
        let (_dir, db) = create_profiledb().await;

        db.register(ada("analytical")).await.unwrap();

        assert!(db.login("ada", "analytical").await.unwrap());
        assert!(!db.login("ada", "analyticalx").await.unwrap());
        assert!(!db.login("ada", "").await.unwrap());
    }

    #[tokio::test]
    async fn unknown_user_is_a_mismatch() {
        let (_dir, db) = create_profiledb().await;

        assert_eq!(db.authenticate("nonexistent", "anything").await, Ok(false));
        assert_eq!(db.login("nonexistent", "").await, Ok(false));
    }

    #[tokio::test]
    async fn lookup_is_case_sensitive() {
        let (_dir, db) = create_profiledb().await;
        db.register(ada("analytical")).await.unwrap();

        assert_eq!(db.authenticate("Ada", "analytical").await, Ok(false));
    }

    #[tokio::test]
    async fn duplicate_username_rejected() {
        let (_dir, db) = create_profiledb().await;

        db.register(ada("first")).await.unwrap();
        assert_eq!(
            db.register(Registration {
                first_name: "Someone",
                last_name: "Else",
                ..ada("second")
            })
            .await,
            Err(Error::UsernameTaken)
        );

        // the first registration is untouched
        assert!(db.login("ada", "first").await.unwrap());
        assert!(!db.login("ada", "second").await.unwrap());
        assert_eq!(db.profile("ada").await.unwrap().first_name, "Ada");
    }

    #[tokio::test]
    async fn stored_hash_is_digest() {
        let (_dir, db) = create_profiledb().await;
        db.register(ada("analytical")).await.unwrap();

        let record = db.profile("ada").await.unwrap();
        assert_eq!(
            record.pwhash,
            DigestAlgorithm::Sha256.hash_password("analytical")
        );
        assert_ne!(record.pwhash.as_str(), "analytical");
    }

    #[tokio::test]
    async fn invalid_input_writes_nothing() {
        let (_dir, db) = create_profiledb().await;

        assert_eq!(
            db.register(Registration {
                date_of_birth: "10/12/1815",
                ..ada("pw")
            })
            .await,
            Err(Error::InvalidDate)
        );
        assert_eq!(
            db.register(Registration {
                username: "",
                ..ada("pw")
            })
            .await,
            Err(Error::BadRequest)
        );
        assert_eq!(db.register(ada("")).await, Err(Error::BadRequest));
        assert_eq!(
            db.register(Registration {
                last_name: "Love\nlace",
                ..ada("pw")
            })
            .await,
            Err(Error::BadRequest)
        );

        assert!(db.users().await.unwrap().is_empty());
        assert_eq!(db.profile("ada").await, Err(Error::NotFound));
    }

    #[tokio::test]
    async fn sign_in_yields_session() {
        let (_dir, db) = create_profiledb().await;
        db.register(ada("analytical")).await.unwrap();

        let session = db.sign_in("ada", "analytical").await.unwrap().unwrap();
        assert_eq!(session.username(), "ada");

        assert!(db.sign_in("ada", "wrong").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn profile_and_listing() {
        let (_dir, db) = create_profiledb().await;

        db.register(Registration {
            first_name: "Charles",
            last_name: "Babbage",
            username: "charles",
            date_of_birth: "1791-12-26",
            password: "engine",
        })
        .await
        .unwrap();
        db.register(ada("analytical")).await.unwrap();

        let ada = db.profile("ada").await.unwrap();
        assert_eq!(ada.full_name(), "Ada Lovelace");
        assert_eq!(ada.date_of_birth.to_string(), "1815-12-10");

        let names: Vec<_> = db
            .users()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, ["ada", "charles"]);
    }

    #[tokio::test]
    async fn update_profile_fields() {
        let (_dir, db) = create_profiledb().await;
        db.register(ada("analytical")).await.unwrap();

        db.update_profile("ada", None, Some("King"), Some("1815-12-11"), None)
            .await
            .unwrap();

        let ada = db.profile("ada").await.unwrap();
        assert_eq!(ada.first_name, "Ada");
        assert_eq!(ada.last_name, "King");
        assert_eq!(ada.date_of_birth.to_string(), "1815-12-11");
        assert!(db.login("ada", "analytical").await.unwrap());
    }

    #[tokio::test]
    async fn update_password() {
        let (_dir, db) = create_profiledb().await;
        db.register(ada("analytical")).await.unwrap();

        db.update_profile("ada", None, None, None, Some("difference"))
            .await
            .unwrap();

        assert!(!db.login("ada", "analytical").await.unwrap());
        assert!(db.login("ada", "difference").await.unwrap());
    }

    #[tokio::test]
    async fn update_rejections() {
        let (_dir, db) = create_profiledb().await;
        db.register(ada("analytical")).await.unwrap();

        assert_eq!(
            db.update_profile("nobody", Some("X"), None, None, None).await,
            Err(Error::NotFound)
        );
        assert_eq!(
            db.update_profile("ada", None, None, Some("1815-13-10"), None)
                .await,
            Err(Error::InvalidDate)
        );
        assert_eq!(
            db.update_profile("ada", None, None, None, Some("")).await,
            Err(Error::BadRequest)
        );

        // no fields is a no-op
        assert_eq!(
            db.update_profile("ada", None, None, None, None).await,
            Ok(())
        );
        assert_eq!(db.profile("ada").await.unwrap().last_name, "Lovelace");
    }

    #[tokio::test]
    #[cfg(feature = "backend-sql")]
    async fn storage_failure_is_not_a_mismatch() {
        let (_dir, db) = create_profiledb().await;
        db.register(ada("analytical")).await.unwrap();

        db.close().await;

        assert_eq!(
            db.authenticate("ada", "analytical").await,
            Err(Error::StorageUnavailable)
        );
        assert_eq!(
            db.authenticate("x", "y").await,
            Err(Error::StorageUnavailable)
        );
        assert_eq!(
            db.login("ada", "analytical").await,
            Err(Error::StorageUnavailable)
        );
        assert!(db.sign_in("ada", "analytical").await.is_err());
        assert_eq!(
            db.register(Registration {
                username: "charles",
                ..ada("engine")
            })
            .await,
            Err(Error::StorageUnavailable)
        );
    }

    #[tokio::test]
    async fn signed_years_rejected() {
        let (_dir, db) = create_profiledb().await;

        for dob in ["-0001-05-07", "+1990-05-07"] {
            assert_eq!(
                db.register(Registration {
                    username: "neg",
                    date_of_birth: dob,
                    ..ada("pw")
                })
                .await,
                Err(Error::InvalidDate),
                "{dob}"
            );
        }

        db.register(Registration {
            date_of_birth: "0001-05-07",
            ..ada("pw")
        })
        .await
        .unwrap();

        assert_eq!(
            db.profile("ada").await.unwrap().date_of_birth.to_string(),
            "0001-05-07"
        );
        assert_eq!(db.users().await.unwrap().len(), 1);
        assert_eq!(db.profile("neg").await, Err(Error::NotFound));
    }
}
