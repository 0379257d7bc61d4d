/*!
`Store` methods for staff and admin accounts.
*/
use tokio_postgres::Row;

use super::{Store, DbError};
use crate::user::{NewUser, Role, User};

fn user_from_row(row: &Row) -> Result<User, DbError> {
    let role_str: &str = row.try_get("role")?;
    let u = User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password")?,
        phone: row.try_get("phone")?,
        institute_code: row.try_get("institute_code")?,
        role: role_str.parse()?,
        created_at: row.try_get("created_at")?,
    };
    Ok(u)
}

impl Store {
    pub async fn get_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<User>, DbError> {
        log::trace!("Store::get_user_by_email( {:?} ) called.", email);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM users WHERE email = $1",
            &[&email]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(user_from_row(&row)?)),
        }
    }

    /**
    Inserts a new user and returns the stored row.

    Returns `Ok(None)` if the email address is already taken; the unique
    constraint on `users.email` decides, so two racing registrations for the
    same address can't both succeed.
    */
    pub async fn insert_user(
        &self,
        u: &NewUser<'_>,
    ) -> Result<Option<User>, DbError> {
        log::trace!(
            "Store::insert_user( {:?}, {:?}, {} ) called.",
            u.email, u.institute_code, u.role
        );

        let client = self.connect().await?;
        let role = u.role.to_string();
        let row = client.query_opt(
            "INSERT INTO users (name, email, password, phone, institute_code, role)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (email) DO NOTHING
                RETURNING *",
            &[&u.name, &u.email, &u.password_hash, &u.phone, &u.institute_code, &role]
        ).await.map_err(|e| DbError::from(e).annotate("Error inserting user"))?;

        match row {
            None => {
                log::trace!("    ...email {:?} already in use.", u.email);
                Ok(None)
            },
            Some(row) => Ok(Some(user_from_row(&row)?)),
        }
    }

    pub async fn count_admins(&self) -> Result<i64, DbError> {
        log::trace!("Store::count_admins() called.");

        let client = self.connect().await?;
        let row = client.query_one(
            "SELECT COUNT(*) AS n FROM users WHERE role = $1",
            &[&Role::Admin.to_string()]
        ).await?;
        let n: i64 = row.try_get("n")?;
        Ok(n)
    }

    pub async fn get_users(&self) -> Result<Vec<User>, DbError> {
        log::trace!("Store::get_users() called.");

        let client = self.connect().await?;
        let rows = client.query("SELECT * FROM users ORDER BY id", &[]).await?;
        let mut users: Vec<User> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            users.push(user_from_row(row)?);
        }

        Ok(users)
    }

    /**
    Deletes a user account. Not reachable from the HTTP API; it exists for
    maintenance and for cleaning up after tests.

    Returns whether there was such a user.
    */
    pub async fn delete_user(&self, id: i32) -> Result<bool, DbError> {
        log::trace!("Store::delete_user( {} ) called.", &id);

        let client = self.connect().await?;
        let n = client.execute("DELETE FROM users WHERE id = $1", &[&id]).await?;

        match n {
            0 => Ok(false),
            1 => Ok(true),
            n => {
                log::warn!("Deleting single user {} affected {} rows.", &id, &n);
                Ok(true)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::tests::ensure_logging;
    use crate::store::tests::test_store;

    static STAFF: &[(&str, &str, &str)] = &[
        ("Priya Nair", "priya@ncc-a.org", "NCC-A"),
        ("Tomas Ruiz", "tomas@ncc-b.org", "NCC-B"),
    ];

    fn new_user<'a>(name: &'a str, email: &'a str, code: &'a str, role: Role) -> NewUser<'a> {
        NewUser {
            name,
            email,
            password_hash: "$argon2id$placeholder",
            phone: "",
            institute_code: code,
            role,
        }
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn insert_users() {
        ensure_logging();

        let db = test_store();
        db.ensure_db_schema().await.unwrap();

        assert_eq!(db.count_admins().await.unwrap(), 0);
        let admin = db.insert_user(
            &new_user("Admin", "admin@example.com", "", Role::Admin)
        ).await.unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(db.count_admins().await.unwrap(), 1);

        for (name, email, code) in STAFF.iter() {
            let u = db.insert_user(&new_user(name, email, code, Role::User))
                .await.unwrap().unwrap();
            assert_eq!(
                (*name, *email, *code, Role::User),
                (u.name.as_str(), u.email.as_str(), u.institute_code.as_str(), u.role)
            );
        }

        // Same address again is refused without an error.
        let dup = db.insert_user(
            &new_user("Impostor", STAFF[0].1, "NCC-B", Role::User)
        ).await.unwrap();
        assert!(dup.is_none());

        let users = db.get_users().await.unwrap();
        assert_eq!(users.len(), 1 + STAFF.len());

        let priya = db.get_user_by_email(STAFF[0].1).await.unwrap().unwrap();
        assert_eq!(priya.institute_code, "NCC-A");
        assert!(db.delete_user(priya.id).await.unwrap());
        assert!(!db.delete_user(priya.id).await.unwrap());
        assert!(db.get_user_by_email(STAFF[0].1).await.unwrap().is_none());

        db.nuke_database().await.unwrap();
    }
}
