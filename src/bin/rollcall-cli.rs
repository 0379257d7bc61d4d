/*!
Command-line front end to the attendance API.

```text
rollcall-cli login --email admin@example.com --password adminpass
export ROLLCALL_TOKEN=...
rollcall-cli students
rollcall-cli mark 12 2025-01-15 present
rollcall-cli attendance --from 2025-01-01
```
*/
use clap::{Parser, Subcommand};
use serde::Serialize;
use time::Date;

use rollcall::attendance::{parse_date, Status};
use rollcall::client::{Client, ClientError};
use rollcall::student::StudentInput;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Student attendance API client")]
struct Cli {
    /// Server base URL.
    #[clap(long, env = "ROLLCALL_URL", default_value = "http://localhost:4000")]
    url: String,

    /// Session token from a previous `login`.
    #[clap(long, env = "ROLLCALL_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in and print the session token.
    Login {
        #[clap(long)]
        email: String,
        #[clap(long)]
        password: String,
    },
    /// List students.
    Students,
    /// Show one student.
    Student { id: i32 },
    /// Add a student.
    AddStudent {
        #[clap(long)]
        first_name: String,
        #[clap(long)]
        last_name: String,
        #[clap(long)]
        phone: Option<String>,
        #[clap(long)]
        batch: Option<String>,
        /// Ignored by the server for staff accounts.
        #[clap(long)]
        institute_code: Option<String>,
    },
    /// Delete a student and their attendance.
    RemoveStudent { id: i32 },
    /// Record one student's attendance for a day.
    Mark {
        student_id: i32,
        #[clap(value_parser = parse_date)]
        date: Date,
        status: Status,
    },
    /// Show attendance for a day, or over a range of days.
    Attendance {
        #[clap(long, value_parser = parse_date, conflicts_with_all = ["from", "to"])]
        date: Option<Date>,
        #[clap(long, value_parser = parse_date)]
        from: Option<Date>,
        #[clap(long, value_parser = parse_date)]
        to: Option<Date>,
    },
    /// Per-student attendance totals.
    Summary,
    /// List accounts (admin only).
    Users,
}

fn show<T: Serialize>(x: &T) -> Result<(), ClientError> {
    let s = serde_json::to_string_pretty(x)
        .map_err(|e| ClientError::Decode(e.to_string()))?;
    println!("{}", &s);
    Ok(())
}

async fn run(cli: Cli) -> Result<(), ClientError> {
    let mut client = Client::new(cli.url);
    if let Some(t) = cli.token {
        client = client.with_token(t);
    }

    match cli.command {
        Commands::Login { email, password } => {
            let sess = client.login(&email, &password).await?;
            log::info!("Logged in as {:?} ({}).", &sess.user.email, &sess.user.role);
            println!("{}", &sess.token);
        },
        Commands::Students => show(&client.students().await?)?,
        Commands::Student { id } => show(&client.student(id).await?)?,
        Commands::AddStudent { first_name, last_name, phone, batch, institute_code } => {
            let input = StudentInput {
                first_name: Some(first_name),
                last_name: Some(last_name),
                phone,
                batch,
                institute_code,
                ..Default::default()
            };
            show(&client.create_student(&input).await?)?;
        },
        Commands::RemoveStudent { id } => show(&client.delete_student(id).await?)?,
        Commands::Mark { student_id, date, status } => {
            show(&client.record_attendance(student_id, date, status).await?)?;
        },
        Commands::Attendance { date: Some(d), .. } => {
            show(&client.attendance_by_date(d).await?)?;
        },
        Commands::Attendance { date: None, from, to } => {
            show(&client.attendance_between(from, to).await?)?;
        },
        Commands::Summary => show(&client.summary().await?)?,
        Commands::Users => show(&client.users().await?)?,
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = rollcall::start_logging() {
        eprintln!("{}", &e);
    }

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{}", e.message());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli_structure() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn mark_parses_date_and_status() {
        let cli = Cli::try_parse_from([
            "rollcall-cli", "--token", "t", "mark", "7", "2025-01-15", "Absent",
        ]).unwrap();
        match cli.command {
            Commands::Mark { student_id, date, status } => {
                assert_eq!(student_id, 7);
                assert_eq!(rollcall::attendance::format_date(date), "2025-01-15");
                assert_eq!(status, Status::Absent);
            },
            x => panic!("unexpected {:?}", x),
        }

        assert!(Cli::try_parse_from(["rollcall-cli", "mark", "7", "15/01/2025", "present"]).is_err());
        assert!(Cli::try_parse_from([
            "rollcall-cli", "attendance", "--date", "2025-01-15", "--from", "2025-01-01",
        ]).is_err());
    }
}
