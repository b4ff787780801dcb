use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use log::{error, info, trace, warn};
use uuid::Uuid;

use crate::auth::PasswordHash;
use crate::backend::StoreError;
use crate::user::{ProfileUpdate, UserRecord};

mod kv;
use kv::KeyValues;

type Result<T> = std::result::Result<T, StoreError>;

const CREDS_KEYS: [&str; 4] = ["first_name", "last_name", "dob", "pwhash"];

pub struct Backend {
    root: PathBuf,
}

macro_rules! path {
    ($root: expr, $($components: expr),*) => {
        {
            let mut p = $root.clone();
            path!(@internal, p, $($components),*);
            p
        }
    };
    (@internal, $p:expr, $next:expr, $($rest: expr),*) => {
        $p.push($next);
        path!(@internal, $p, $($rest),*);
    };
    (@internal, $p:expr, $next:expr) => {
        $p.push($next);
    };
}

impl Backend {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        let root = data_dir.to_path_buf();
        let users = path!(root, "users");

        fs::create_dir_all(&users).map_err(|e| {
            error!("couldn't create \"{users:?}\": {e:?}");
            StoreError::Unavailable
        })?;

        info!("Using {}", root.display());
        Ok(Self { root })
    }

    pub async fn close(&self) {}
}

// one directory per user, so the name must be a single, ordinary path component
fn check_key(username: &str) -> Result<()> {
    if username.is_empty()
        || username == "."
        || username == ".."
        || username.contains(['/', '\\'])
    {
        warn!("can't store username {username:?}");
        return Err(StoreError::InvalidKey);
    }
    Ok(())
}

fn encode(user: &UserRecord) -> KeyValues {
    [
        ("first_name", user.first_name.clone()),
        ("last_name", user.last_name.clone()),
        ("dob", user.date_of_birth.to_string()),
        ("pwhash", user.pwhash.as_str().to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn decode(username: &str, mut kv: KeyValues) -> Result<UserRecord> {
    let mut take = |k: &str| kv.remove(k).ok_or(StoreError::Corrupt);

    let first_name = take("first_name")?;
    let last_name = take("last_name")?;
    let dob = take("dob")?;
    let pwhash = take("pwhash")?;

    let date_of_birth = dob.parse().map_err(|()| {
        error!("stored date of birth for {username} is invalid");
        StoreError::Corrupt
    })?;

    Ok(UserRecord {
        username: username.into(),
        first_name,
        last_name,
        date_of_birth,
        pwhash: PasswordHash::from_stored(pwhash),
    })
}

impl Backend {
    fn creds_path(&self, username: &str) -> Result<PathBuf> {
        check_key(username)?;
        Ok(path!(self.root, "users", username, "creds.txt"))
    }

    fn read_user(&self, username: &str) -> Result<KeyValues> {
        let path = self.creds_path(username)?;
        let file = File::open(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                return StoreError::NotFound;
            }
            error!("open \"{path:?}\": {e:?}");
            StoreError::Unavailable
        })?;

        kv::read(file, &CREDS_KEYS)
    }

    fn write_user(&self, path: &Path, create: bool, keyvalues: &KeyValues) -> Result<()> {
        commit(path, create, |file| kv::write(file, keyvalues))
    }
}

fn stage(staged: &Path, write: impl FnOnce(&mut File) -> io::Result<()>) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(staged)?;

    write(&mut file)?;
    file.sync_all()
}

/// Writes to a sibling temp file and only then moves it to `path`, so a failed
/// write never leaves a short or truncated record behind. With `create`, an
/// existing `path` is left alone and the result is `Exists`.
fn commit(
    path: &Path,
    create: bool,
    write: impl FnOnce(&mut File) -> io::Result<()>,
) -> Result<()> {
    let staged = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));

    let r = stage(&staged, write).and_then(|()| {
        if create {
            fs::hard_link(&staged, path)
        } else {
            fs::rename(&staged, path)
        }
    });

    // gone already after a rename
    if let Err(e) = fs::remove_file(&staged) {
        if e.kind() != ErrorKind::NotFound {
            warn!("couldn't remove \"{staged:?}\": {e:?}");
        }
    }

    r.map_err(|e| match e.kind() {
        ErrorKind::AlreadyExists => StoreError::Exists,
        ErrorKind::NotFound => StoreError::NotFound,
        _ => {
            error!("write \"{path:?}\": {e:?}");
            StoreError::Unavailable
        }
    })
}

impl Backend {
    pub async fn insert_user(&self, user: &UserRecord) -> Result<()> {
        let path = self.creds_path(&user.username)?;
        let dir = path!(self.root, "users", &user.username);

        fs::create_dir_all(&dir).map_err(|e| {
            error!("couldn't create \"{dir:?}\": {e:?}");
            StoreError::Unavailable
        })?;

        self.write_user(&path, true, &encode(user))
    }

    pub async fn find_pwhash(&self, username: &str) -> Result<PasswordHash> {
        let mut user = self.read_user(username)?;

        user.remove("pwhash")
            .map(PasswordHash::from_stored)
            .ok_or(StoreError::Corrupt)
    }

    pub async fn find_user(&self, username: &str) -> Result<UserRecord> {
        decode(username, self.read_user(username)?)
    }

    pub async fn users(&self) -> Result<Vec<UserRecord>> {
        let path = path!(self.root, "users");
        let mut users = vec![];

        let emap = |e: &dyn std::fmt::Debug| {
            error!("error listing users: {e:?}");
            StoreError::Unavailable
        };

        for ent in fs::read_dir(path).map_err(|e| emap(&e))? {
            let ent = ent.map_err(|e| emap(&e))?;

            if !ent.file_type().map_err(|e| emap(&e))?.is_dir() {
                trace!("skipping {:?}", ent.file_name());
                continue;
            }

            let fname = match ent.file_name().into_string() {
                Ok(x) => x,
                Err(e) => {
                    warn!("couldn't convert path into string: {e:?}");
                    continue;
                }
            };

            match self.find_user(&fname).await {
                Ok(u) => users.push(u),
                // directory left behind by a failed registration
                Err(StoreError::NotFound) => continue,
                Err(e) => return Err(e),
            }
        }

        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    pub async fn update_user(&self, username: &str, update: &ProfileUpdate) -> Result<()> {
        let mut user = self.find_user(username).await?;

        if let Some(ref first_name) = update.first_name {
            user.first_name = first_name.clone();
        }
        if let Some(ref last_name) = update.last_name {
            user.last_name = last_name.clone();
        }
        if let Some(dob) = update.date_of_birth {
            user.date_of_birth = dob;
        }
        if let Some(ref pwhash) = update.pwhash {
            user.pwhash = pwhash.clone();
        }

        let path = self.creds_path(username)?;
        self.write_user(&path, false, &encode(&user))
    }
}
