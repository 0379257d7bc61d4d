/*!
Database interaction module.

The Postgres database to which this connects is meant to have the following
tables.

```sql
CREATE TABLE users (
    id              SERIAL PRIMARY KEY,
    name            TEXT NOT NULL DEFAULT '',
    email           TEXT UNIQUE NOT NULL,
    password        TEXT NOT NULL,  /* argon2 PHC string */
    phone           TEXT NOT NULL DEFAULT '',
    institute_code  TEXT NOT NULL DEFAULT '',
    role            TEXT NOT NULL,  /* one of { 'admin', 'user' } */
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE students (
    id              SERIAL PRIMARY KEY,
    first_name      TEXT NOT NULL,
    last_name       TEXT NOT NULL,
    phone           TEXT NOT NULL DEFAULT '',
    institute_code  TEXT NOT NULL DEFAULT '',
    batch           TEXT NOT NULL DEFAULT '',
    photo           TEXT,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE attendance (
    id          SERIAL PRIMARY KEY,
    student_id  INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
    date        TEXT NOT NULL,  /* YYYY-MM-DD */
    status      TEXT NOT NULL,  /* one of { 'present', 'absent' } */
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);
```

There is no unique constraint on `attendance (student_id, date)`.
`Store::save_bulk_attendance()` keeps one row per pair by deleting before it
inserts; two concurrent bulk saves of the same day can still leave
duplicates.
*/
use std::fmt::Write;

use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio_postgres::NoTls;

mod attendance;
mod students;
mod users;

static SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'users'",
        "CREATE TABLE users (
            id              SERIAL PRIMARY KEY,
            name            TEXT NOT NULL DEFAULT '',
            email           TEXT UNIQUE NOT NULL,
            password        TEXT NOT NULL,
            phone           TEXT NOT NULL DEFAULT '',
            institute_code  TEXT NOT NULL DEFAULT '',
            role            TEXT NOT NULL,
            created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "DROP TABLE users",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'students'",
        "CREATE TABLE students (
            id              SERIAL PRIMARY KEY,
            first_name      TEXT NOT NULL,
            last_name       TEXT NOT NULL,
            phone           TEXT NOT NULL DEFAULT '',
            institute_code  TEXT NOT NULL DEFAULT '',
            batch           TEXT NOT NULL DEFAULT '',
            photo           TEXT,
            created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "DROP TABLE students",
    ),

    (
        "SELECT FROM pg_indexes WHERE indexname = 'students_institute_code'",
        "CREATE INDEX students_institute_code ON students (institute_code)",
        "DROP INDEX students_institute_code",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'attendance'",
        "CREATE TABLE attendance (
            id          SERIAL PRIMARY KEY,
            student_id  INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
            date        TEXT NOT NULL,
            status      TEXT NOT NULL,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "DROP TABLE attendance",
    ),

    (
        "SELECT FROM pg_indexes WHERE indexname = 'attendance_student_date'",
        "CREATE INDEX attendance_student_date ON attendance (student_id, date)",
        "DROP INDEX attendance_student_date",
    ),
];

#[derive(Debug, PartialEq)]
pub struct DbError(String);

impl DbError {
    /// Prepend some contextual `annotation` for the error.
    fn annotate(self, annotation: &str) -> Self {
        let s = format!("{}: {}", annotation, &self.0);
        Self(s)
    }

    pub fn display(&self) -> &str { &self.0 }
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

impl std::error::Error for DbError {}

impl From<tokio_postgres::error::Error> for DbError {
    fn from(e: tokio_postgres::error::Error) -> DbError {
        let mut s = format!("Data DB: {}", &e);
        if let Some(dbe) = e.as_db_error() {
            // Writing to a String can't fail.
            let _ = write!(&mut s, "; {}", dbe);
        }
        DbError(s)
    }
}

impl From<String> for DbError {
    fn from(s: String) -> DbError { DbError(s) }
}

/// Handle to the attendance database. Cheap to share behind an `Arc`; every
/// method checks a connection out of the pool for the duration of the call.
pub struct Store {
    pool: Pool,
}

impl Store {
    /// Builds the pool. No connection is attempted until first use.
    pub fn new(
        pg_config: tokio_postgres::Config,
        max_connections: usize,
    ) -> Result<Self, DbError> {
        log::trace!(
            "Store::new( [ config for db {:?} ], {} ) called.",
            pg_config.get_dbname(), max_connections
        );

        if max_connections == 0 {
            return Err(DbError("Connection pool needs room for at least one connection.".to_owned()));
        }

        let mgr = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig { recycling_method: RecyclingMethod::Fast },
        );
        let pool = Pool::builder(mgr)
            .max_size(max_connections)
            .build()
            .map_err(|e| DbError(format!("Unable to build connection pool: {}", &e)))?;

        Ok(Self { pool })
    }

    async fn connect(&self) -> Result<Object, DbError> {
        log::trace!("Store::connect() called.");

        match self.pool.get().await {
            Ok(client) => {
                log::trace!("    ...connection successful.");
                Ok(client)
            },
            Err(e) => {
                let dberr = DbError(format!("{}", &e));
                log::trace!("    ...connection failed: {:?}", &dberr);
                Err(dberr.annotate("Unable to connect"))
            },
        }
    }

    pub async fn ensure_db_schema(&self) -> Result<(), DbError> {
        log::trace!("Store::ensure_db_schema() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| DbError::from(e)
                .annotate("Data DB unable to begin transaction"))?;

        for (test_stmt, create_stmt, _) in SCHEMA.iter() {
            if t.query_opt(*test_stmt, &[]).await?.is_none() {
                log::info!(
                    "{:?} returned no results; attempting to create.",
                    test_stmt
                );
                t.execute(*create_stmt, &[]).await?;
            }
        }

        t.commit().await
            .map_err(|e| DbError::from(e)
                .annotate("Error committing transaction"))
    }

    /**
    Drop all database tables to fully reset database state.

    This is only meant for cleanup after testing. It is advisable to look at
    the ERROR level log output when testing to ensure this method did its job.
    */
    #[cfg(test)]
    pub async fn nuke_database(&self) -> Result<(), DbError> {
        log::trace!("Store::nuke_database() called.");

        let client = self.connect().await?;

        for (_, _, drop_stmt) in SCHEMA.iter().rev() {
            if let Err(e) = client.execute(*drop_stmt, &[]).await {
                let err = DbError::from(e);
                log::error!("Error dropping: {:?}: {}", &drop_stmt, &err.display());
            }
        }

        log::trace!("    ....nuking complete.");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    /*!
    These tests assume you have a Postgres instance running on your local
    machine with resources named according to what you see in the
    `static TEST_CONNECTION &str`:

    ```text
    user: rollcall_test
    password: rollcall_test

    with write access to:

    database: rollcall_test
    ```

    They are ignored by default; run them with

    ```bash
    cargo test -- --ignored
    ```
    */
    use super::*;
    use crate::tests::ensure_logging;

    use serial_test::serial;

    pub(crate) static TEST_CONNECTION: &str = "host=localhost user=rollcall_test password='rollcall_test' dbname=rollcall_test";

    pub(crate) fn test_store() -> Store {
        Store::new(TEST_CONNECTION.parse().unwrap(), 4).unwrap()
    }

    /**
    This function is for getting the database back in a blank slate state if
    a test panics partway through and leaves it munged.

    ```bash
    cargo test reset_store -- --ignored
    ```
    */
    #[tokio::test]
    #[ignore]
    #[serial]
    async fn reset_store() {
        ensure_logging();
        let db = test_store();
        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn create_store() {
        ensure_logging();

        let db = test_store();
        db.ensure_db_schema().await.unwrap();
        // A second pass must find everything already there.
        db.ensure_db_schema().await.unwrap();
        db.nuke_database().await.unwrap();
    }

    #[test]
    fn pool_builds_without_a_server() {
        let cfg: tokio_postgres::Config = "host=127.0.0.1 port=1 user=x dbname=y connect_timeout=2"
            .parse().unwrap();
        assert!(Store::new(cfg.clone(), 2).is_ok());
        assert!(Store::new(cfg, 0).is_err());
    }
}
