/*!
`Store` methods for attendance rows and the summary report.
*/
use time::Date;
use tokio_postgres::{Row, types::ToSql};

use super::{Store, DbError};
use crate::attendance::{
    format_date, AttendanceFilter, AttendanceRow, BulkAttendance, Status,
    SummaryRow,
};

fn attendance_from_row(row: &Row) -> Result<AttendanceRow, DbError> {
    Ok(AttendanceRow {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        date: row.try_get("date")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        institute_code: row.try_get("institute_code")?,
    })
}

fn summary_from_row(row: &Row) -> Result<SummaryRow, DbError> {
    Ok(SummaryRow {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        institute_code: row.try_get("institute_code")?,
        present_count: row.try_get("present_count")?,
        total_records: row.try_get("total_records")?,
    })
}

impl Store {
    /// Appends a single attendance row and returns its id. Earlier rows for
    /// the same student and day are left alone.
    pub async fn insert_attendance(
        &self,
        student_id: i32,
        date: Date,
        status: Status,
    ) -> Result<i32, DbError> {
        log::trace!(
            "Store::insert_attendance( {}, {}, {} ) called.",
            &student_id, &date, &status
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO attendance (student_id, date, status)
                VALUES ($1, $2, $3)
                RETURNING id",
            &[&student_id, &format_date(date), &status.to_string()]
        ).await.map_err(|e| DbError::from(e).annotate("Error inserting attendance"))?;

        let id: i32 = row.try_get("id")?;
        Ok(id)
    }

    /// Removes every row for one student on one day; returns how many went.
    pub async fn delete_attendance_for(
        &self,
        student_id: i32,
        date: Date,
    ) -> Result<u64, DbError> {
        log::trace!(
            "Store::delete_attendance_for( {}, {} ) called.",
            &student_id, &date
        );

        let client = self.connect().await?;
        let n = client.execute(
            "DELETE FROM attendance WHERE student_id = $1 AND date = $2",
            &[&student_id, &format_date(date)]
        ).await?;
        Ok(n)
    }

    /**
    Replaces each listed student's attendance for the batch date.

    Entries are applied in order, each as a delete followed by an insert, on
    one connection but outside any transaction: a failure partway leaves the
    earlier entries saved. Returns the number of entries applied.
    */
    pub async fn save_bulk_attendance(
        &self,
        bulk: &BulkAttendance,
    ) -> Result<usize, DbError> {
        log::trace!(
            "Store::save_bulk_attendance( {}, [ {} entries ] ) called.",
            &bulk.date, bulk.entries.len()
        );

        let date = format_date(bulk.date);
        let client = self.connect().await?;
        let del = client.prepare(
            "DELETE FROM attendance WHERE student_id = $1 AND date = $2"
        ).await?;
        let ins = client.prepare(
            "INSERT INTO attendance (student_id, date, status) VALUES ($1, $2, $3)"
        ).await?;

        let mut n_saved: usize = 0;
        for (student_id, status) in bulk.entries.iter() {
            client.execute(&del, &[student_id, &date]).await
                .map_err(|e| DbError::from(e).annotate(&format!(
                    "Error clearing attendance for student {}", student_id
                )))?;
            client.execute(&ins, &[student_id, &date, &status.to_string()]).await
                .map_err(|e| DbError::from(e).annotate(&format!(
                    "Error saving attendance for student {}", student_id
                )))?;
            n_saved += 1;
        }

        log::trace!("    ...saved {} entries for {}.", &n_saved, &date);
        Ok(n_saved)
    }

    /**
    Attendance rows matching `filter`, each joined with its student.

    If `institute_code` is given, only that institute's students are
    included. A single-day query is ordered by first name; a range by date,
    newest first.
    */
    pub async fn get_attendance(
        &self,
        filter: &AttendanceFilter,
        institute_code: Option<&str>,
    ) -> Result<Vec<AttendanceRow>, DbError> {
        log::trace!(
            "Store::get_attendance( {:?}, {:?} ) called.",
            filter, &institute_code
        );

        let mut dates: Vec<(&str, String)> = Vec::with_capacity(2);
        let order = match filter {
            AttendanceFilter::OnDate(d) => {
                dates.push(("a.date =", format_date(*d)));
                "s.first_name, a.id"
            },
            AttendanceFilter::Between { from, to } => {
                if let Some(d) = from {
                    dates.push(("a.date >=", format_date(*d)));
                }
                if let Some(d) = to {
                    dates.push(("a.date <=", format_date(*d)));
                }
                "a.date DESC, a.id DESC"
            },
        };

        let mut clauses: Vec<String> = Vec::with_capacity(3);
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(3);
        for (cmp, d) in dates.iter() {
            params.push(d);
            clauses.push(format!("{} ${}", cmp, params.len()));
        }
        if let Some(code) = institute_code.as_ref() {
            params.push(code);
            clauses.push(format!("s.institute_code = ${}", params.len()));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let stmt = format!(
            "SELECT a.id, a.student_id, a.date, a.status, a.created_at,
                    s.first_name, s.last_name, s.institute_code
                FROM attendance a
                JOIN students s ON s.id = a.student_id
                {}
                ORDER BY {}",
            &where_clause, order
        );

        let client = self.connect().await?;
        let rows = client.query(stmt.as_str(), &params[..]).await?;
        let mut recs: Vec<AttendanceRow> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            recs.push(attendance_from_row(row)?);
        }

        Ok(recs)
    }

    /// Per-student present and total counts over all recorded days. Students
    /// with no attendance at all appear with zero counts.
    pub async fn attendance_summary(
        &self,
        institute_code: Option<&str>,
    ) -> Result<Vec<SummaryRow>, DbError> {
        log::trace!("Store::attendance_summary( {:?} ) called.", &institute_code);

        let base = "SELECT s.id, s.first_name, s.last_name, s.institute_code,
                COALESCE(SUM(CASE WHEN a.status = 'present' THEN 1 ELSE 0 END), 0)::int
                    AS present_count,
                COUNT(a.id)::int AS total_records
            FROM students s
            LEFT JOIN attendance a ON a.student_id = s.id";

        let client = self.connect().await?;
        let rows = match institute_code {
            None => client.query(
                format!("{} GROUP BY s.id ORDER BY s.id", base).as_str(),
                &[]
            ).await?,
            Some(code) => client.query(
                format!(
                    "{} WHERE s.institute_code = $1 GROUP BY s.id ORDER BY s.id",
                    base
                ).as_str(),
                &[&code]
            ).await?,
        };

        let mut summ: Vec<SummaryRow> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            summ.push(summary_from_row(row)?);
        }

        Ok(summ)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;
    use time::{Month, macros::date};

    use crate::student::StudentInput;
    use crate::tests::ensure_logging;
    use crate::store::tests::test_store;

    fn input(first: &str, code: &str) -> StudentInput {
        StudentInput {
            first_name: Some(first.to_owned()),
            last_name: Some("Test".to_owned()),
            institute_code: Some(code.to_owned()),
            ..Default::default()
        }
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn bulk_replaces_and_summarizes() {
        ensure_logging();

        let db = test_store();
        db.ensure_db_schema().await.unwrap();

        let zed = db.insert_student(&input("Zed", "A")).await.unwrap();
        let amy = db.insert_student(&input("Amy", "A")).await.unwrap();
        let bob = db.insert_student(&input("Bob", "B")).await.unwrap();

        let day = date!(2025 - 01 - 15);
        let next = Date::from_calendar_date(2025, Month::January, 16).unwrap();

        // Single records pile up.
        db.insert_attendance(zed, day, Status::Present).await.unwrap();
        db.insert_attendance(zed, day, Status::Present).await.unwrap();
        assert_eq!(
            db.get_attendance(&AttendanceFilter::OnDate(day), None).await.unwrap().len(),
            2
        );

        // A bulk save leaves one row per student; the later entry wins.
        let bulk = BulkAttendance {
            date: day,
            entries: vec![
                (zed, Status::Present),
                (amy, Status::Present),
                (zed, Status::Absent),
            ],
        };
        assert_eq!(db.save_bulk_attendance(&bulk).await.unwrap(), 3);
        let rows = db.get_attendance(&AttendanceFilter::OnDate(day), None).await.unwrap();
        assert_eq!(
            rows.iter().map(|r| (r.first_name.as_str(), r.status.as_str())).collect::<Vec<_>>(),
            vec![("Amy", "present"), ("Zed", "absent")]
        );

        db.insert_attendance(amy, next, Status::Absent).await.unwrap();
        db.insert_attendance(bob, next, Status::Present).await.unwrap();

        let range = AttendanceFilter::Between { from: Some(day), to: None };
        let rows = db.get_attendance(&range, Some("A")).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].date, "2025-01-16");
        assert!(rows.iter().all(|r| r.institute_code == "A"));

        let only_first = AttendanceFilter::Between { from: None, to: Some(day) };
        assert_eq!(db.get_attendance(&only_first, None).await.unwrap().len(), 2);

        let summ = db.attendance_summary(Some("A")).await.unwrap();
        assert_eq!(
            summ.iter().map(|s| (s.id, s.present_count, s.total_records)).collect::<Vec<_>>(),
            vec![(zed, 0, 1), (amy, 1, 2)]
        );
        assert!(db.attendance_summary(Some("nowhere")).await.unwrap().is_empty());

        let lonely = db.insert_student(&input("Lonely", "C")).await.unwrap();
        let summ = db.attendance_summary(None).await.unwrap();
        let row = summ.iter().find(|s| s.id == lonely).unwrap();
        assert_eq!((row.present_count, row.total_records), (0, 0));

        assert_eq!(db.delete_attendance_for(amy, next).await.unwrap(), 1);

        // Deleting a student takes their attendance with them.
        assert!(db.delete_student(zed).await.unwrap());
        let rows = db.get_attendance(&AttendanceFilter::OnDate(day), None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].student_id, amy);

        db.nuke_database().await.unwrap();
    }
}
