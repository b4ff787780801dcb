use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::auth::DigestAlgorithm;
use crate::profiledb;

#[derive(Parser, Debug)]
pub struct Args {
    /// Directory holding the user database. Created if missing.
    #[arg(short, long, default_value = ".")]
    data_dir: PathBuf,

    /// Digest used to hash passwords.
    #[arg(long, default_value = "sha256")]
    digest: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new account.
    Register {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        /// Date of birth, YYYY-MM-DD.
        #[arg(long)]
        dob: String,
        username: String,
        /// Read from stdin when omitted.
        #[arg(long)]
        password: Option<String>,
    },

    /// Check a username and password.
    Login {
        username: String,
        /// Read from stdin when omitted.
        #[arg(long)]
        password: Option<String>,
    },

    /// Print one user's profile.
    Show { username: String },

    /// List every registered user.
    List {
        #[arg(long)]
        json: bool,
    },

    /// Change profile fields; omitted fields are kept.
    Update {
        username: String,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        dob: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
}

impl Args {
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn digest(&self) -> profiledb::Result<DigestAlgorithm> {
        self.digest.parse()
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}
