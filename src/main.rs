use std::io::{self, BufRead};
use std::process::ExitCode;

use clap::Parser;
use log::error;

mod args;
use args::{Args, Command};

mod auth;
mod backend;
mod profiledb;
mod time;
mod user;

#[cfg(test)]
mod mock;

use backend::Backend;
use profiledb::{ProfileDb, Registration};

#[tokio::main]
async fn main() -> ExitCode {
    pretty_env_logger::init_custom_env("PROFILEDB_LOG");

    let args = Args::parse();

    let digest = match args.digest() {
        Ok(d) => d,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let backend = match Backend::new(args.data_dir()).await {
        Ok(b) => b,
        Err(e) => {
            eprintln!("{}", profiledb::Error::from(e));
            return ExitCode::FAILURE;
        }
    };
    let db = ProfileDb::new(backend, digest);

    let result = run(&db, args.command()).await;
    db.close().await;

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:?}", e);
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(db: &ProfileDb, command: &Command) -> profiledb::Result<ExitCode> {
    match command {
        Command::Register {
            first_name,
            last_name,
            dob,
            username,
            password,
        } => {
            let password = password_or_stdin(password.as_deref())?;

            db.register(Registration {
                first_name,
                last_name,
                username,
                date_of_birth: dob,
                password: &password,
            })
            .await?;

            println!("Registration is successful!");
        }
        Command::Login { username, password } => {
            let password = password_or_stdin(password.as_deref())?;

            if db.login(username, &password).await? {
                println!("Login is successful!");
            } else {
                println!("Invalid username or password");
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Show { username } => {
            let user = db.profile(username).await?;

            println!("Username: {}", user.username);
            println!("Name: {}", user.full_name());
            println!("D.O.B.: {}", user.date_of_birth);
        }
        Command::List { json } => {
            let users = db.users().await?;

            if *json {
                let out = serde_json::to_string_pretty(&users).map_err(|e| {
                    error!("couldn't serialize users: {e:?}");
                    profiledb::Error::Internal
                })?;
                println!("{out}");
            } else {
                for user in users {
                    println!(
                        "{}  {}  {}  {}",
                        user.username, user.first_name, user.last_name, user.date_of_birth
                    );
                }
            }
        }
        Command::Update {
            username,
            first_name,
            last_name,
            dob,
            password,
        } => {
            db.update_profile(
                username,
                first_name.as_deref(),
                last_name.as_deref(),
                dob.as_deref(),
                password.as_deref(),
            )
            .await?;

            println!("Profile updated");
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn password_or_stdin(password: Option<&str>) -> profiledb::Result<String> {
    if let Some(p) = password {
        return Ok(p.to_string());
    }

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).map_err(|e| {
        error!("couldn't read password: {e}");
        profiledb::Error::BadRequest
    })?;

    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
