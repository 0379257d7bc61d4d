/*!
`Store` methods for student records.
*/
use tokio_postgres::{Row, types::{ToSql, Type}};

use super::{Store, DbError};
use crate::student::{Student, StudentInput};

pub(super) fn student_from_row(row: &Row) -> Result<Student, DbError> {
    Ok(Student {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        phone: row.try_get("phone")?,
        institute_code: row.try_get("institute_code")?,
        batch: row.try_get("batch")?,
        photo: row.try_get("photo")?,
        created_at: row.try_get("created_at")?,
    })
}

fn students_from_rows(rows: &[Row]) -> Result<Vec<Student>, DbError> {
    let mut studs: Vec<Student> = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        studs.push(student_from_row(row)?);
    }
    Ok(studs)
}

impl Store {
    /// All students, or only those of `institute_code` if given; newest
    /// first.
    pub async fn get_students(
        &self,
        institute_code: Option<&str>,
    ) -> Result<Vec<Student>, DbError> {
        log::trace!("Store::get_students( {:?} ) called.", &institute_code);

        let client = self.connect().await?;
        let rows = match institute_code {
            None => client.query(
                "SELECT * FROM students ORDER BY id DESC",
                &[]
            ).await?,
            Some(code) => client.query(
                "SELECT * FROM students WHERE institute_code = $1
                    ORDER BY id DESC",
                &[&code]
            ).await?,
        };

        students_from_rows(&rows)
    }

    pub async fn get_student(&self, id: i32) -> Result<Option<Student>, DbError> {
        log::trace!("Store::get_student( {} ) called.", &id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM students WHERE id = $1",
            &[&id]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(student_from_row(&row)?)),
        }
    }

    /// Those of the given students that exist, in id order.
    pub async fn get_students_by_ids(
        &self,
        ids: &[i32],
    ) -> Result<Vec<Student>, DbError> {
        log::trace!("Store::get_students_by_ids( [ {} ids ] ) called.", ids.len());

        let client = self.connect().await?;
        let stmt = client.prepare_typed(
            "SELECT * FROM students WHERE id = ANY($1) ORDER BY id",
            &[Type::INT4_ARRAY]
        ).await?;
        let rows = client.query(&stmt, &[&ids]).await?;

        students_from_rows(&rows)
    }

    /// Inserts a student, defaulting absent fields to empty, and returns
    /// the new id. `input` is assumed to have passed
    /// `StudentInput::validate(true)`.
    pub async fn insert_student(&self, input: &StudentInput) -> Result<i32, DbError> {
        log::trace!(
            "Store::insert_student( {:?}, {:?}, {:?} ) called.",
            &input.first_name, &input.last_name, &input.institute_code
        );

        fn or_blank(s: &Option<String>) -> &str { s.as_deref().unwrap_or("") }

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO students
                (first_name, last_name, phone, institute_code, batch, photo)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id",
            &[
                &or_blank(&input.first_name),
                &or_blank(&input.last_name),
                &or_blank(&input.phone),
                &or_blank(&input.institute_code),
                &or_blank(&input.batch),
                &input.photo,
            ]
        ).await.map_err(|e| DbError::from(e).annotate("Error inserting student"))?;

        let id: i32 = row.try_get("id")?;
        log::trace!("Inserted student {}.", &id);
        Ok(id)
    }

    /**
    Sets exactly those columns for which `input` has a value.

    Returns the number of rows changed (0 if there is no such student or
    `input` is empty).
    */
    pub async fn update_student(
        &self,
        id: i32,
        input: &StudentInput,
    ) -> Result<u64, DbError> {
        log::trace!("Store::update_student( {}, {:?} ) called.", &id, input);

        let fields: [(&str, &Option<String>); 6] = [
            ("first_name", &input.first_name),
            ("last_name", &input.last_name),
            ("phone", &input.phone),
            ("institute_code", &input.institute_code),
            ("batch", &input.batch),
            ("photo", &input.photo),
        ];

        let mut sets: Vec<String> = Vec::with_capacity(fields.len());
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(fields.len() + 1);
        for (col, val) in fields.iter() {
            if let Some(v) = val {
                params.push(v);
                sets.push(format!("{} = ${}", col, params.len()));
            }
        }

        if sets.is_empty() {
            log::trace!("    ...nothing to update.");
            return Ok(0);
        }

        params.push(&id);
        let stmt = format!(
            "UPDATE students SET {} WHERE id = ${}",
            sets.join(", "), params.len()
        );

        let client = self.connect().await?;
        let n = client.execute(stmt.as_str(), &params[..]).await
            .map_err(|e| DbError::from(e).annotate("Error updating student"))?;
        Ok(n)
    }

    /// Deletes a student; their attendance rows go with them (`ON DELETE
    /// CASCADE`). Returns whether there was such a student.
    pub async fn delete_student(&self, id: i32) -> Result<bool, DbError> {
        log::trace!("Store::delete_student( {} ) called.", &id);

        let client = self.connect().await?;
        let n = client.execute("DELETE FROM students WHERE id = $1", &[&id]).await?;

        match n {
            0 => Ok(false),
            1 => Ok(true),
            n => {
                log::warn!("Deleting single student {} affected {} rows.", &id, &n);
                Ok(true)
            },
        }
    }
}
