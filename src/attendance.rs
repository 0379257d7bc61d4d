/*!
Attendance records, the requests that create them, and date handling.

Dates are stored as `YYYY-MM-DD` text. Every date entering the system is
parsed into a `time::Date` and formatted back out, so stored dates compare
correctly as strings.
*/
use serde::{Deserialize, Serialize};
use time::{
    Date,
    format_description::FormatItem,
    macros::format_description,
    OffsetDateTime,
};

pub const DATE_FMT: &[FormatItem] = format_description!("[year]-[month]-[day]");

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Present,
    Absent,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Status::Present => "present",
            Status::Absent  => "absent",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("present") {
            Ok(Status::Present)
        } else if s.eq_ignore_ascii_case("absent") {
            Ok(Status::Absent)
        } else {
            Err(format!("{:?} is not a valid Status.", s))
        }
    }
}

pub fn parse_date(s: &str) -> Result<Date, String> {
    Date::parse(s.trim(), &DATE_FMT)
        .map_err(|e| format!("{:?} is not a valid date: {}", s, &e))
}

pub fn format_date(d: Date) -> String {
    // Formatting a Date with a purely numeric description can't fail.
    d.format(&DATE_FMT).unwrap_or_else(|_| d.to_string())
}

/// A student id as it arrives from a client: forms tend to send strings.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StudentRef {
    Number(i64),
    Text(String),
}

impl StudentRef {
    pub fn id(&self) -> Option<i32> {
        let n = match self {
            StudentRef::Number(n) => *n,
            StudentRef::Text(s) => s.trim().parse::<i64>().ok()?,
        };
        i32::try_from(n).ok().filter(|n| *n > 0)
    }
}

fn status_of(s: &Option<String>) -> Option<Status> {
    s.as_deref().and_then(|s| s.parse().ok())
}

fn date_of(s: &Option<String>) -> Option<Date> {
    s.as_deref().and_then(|s| parse_date(s).ok())
}

/// Body of `POST /api/attendance`.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRequest {
    pub student_id: Option<StudentRef>,
    pub date: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, PartialEq)]
pub struct NewAttendance {
    pub student_id: i32,
    pub date: Date,
    pub status: Status,
}

impl RecordRequest {
    pub fn check(&self) -> Result<NewAttendance, String> {
        let student_id = self.student_id.as_ref()
            .and_then(StudentRef::id)
            .ok_or_else(|| "Student ID is required".to_owned())?;
        let date = date_of(&self.date)
            .ok_or_else(|| "Valid date is required".to_owned())?;
        let status = status_of(&self.status)
            .ok_or_else(|| r#"Status must be "present" or "absent""#.to_owned())?;

        Ok(NewAttendance { student_id, date, status })
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkEntry {
    pub student_id: Option<StudentRef>,
    pub status: Option<String>,
}

/// Body of `POST /api/attendance/bulk`.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct BulkRequest {
    pub date: Option<String>,
    pub records: Option<Vec<BulkEntry>>,
}

#[derive(Debug, PartialEq)]
pub struct BulkAttendance {
    pub date: Date,
    /// In submission order; a student listed twice ends up with the later
    /// status.
    pub entries: Vec<(i32, Status)>,
}

impl BulkAttendance {
    /// Distinct student ids referenced by this batch.
    pub fn student_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.entries.iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

impl BulkRequest {
    /// The whole batch is rejected if any single entry is bad.
    pub fn check(&self) -> Result<BulkAttendance, String> {
        let date = date_of(&self.date)
            .ok_or_else(|| "Valid date is required".to_owned())?;

        let records = match &self.records {
            Some(r) if !r.is_empty() => r,
            _ => { return Err("Records array is required and must not be empty".to_owned()); },
        };

        let mut entries: Vec<(i32, Status)> = Vec::with_capacity(records.len());
        for rec in records.iter() {
            let id = rec.student_id.as_ref()
                .and_then(StudentRef::id)
                .ok_or_else(|| "Each record must have a studentId".to_owned())?;
            let status = status_of(&rec.status)
                .ok_or_else(|| r#"Each record must have status "present" or "absent""#.to_owned())?;
            entries.push((id, status));
        }

        Ok(BulkAttendance { date, entries })
    }
}

/// Query string of `GET /api/attendance`.
#[derive(Debug, Default, Deserialize)]
pub struct AttendanceQuery {
    pub date: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AttendanceFilter {
    OnDate(Date),
    /// Inclusive on both ends; a missing end is unbounded.
    Between { from: Option<Date>, to: Option<Date> },
}

impl AttendanceQuery {
    /// An exact `date` wins over `from`/`to`.
    pub fn filter(&self) -> Result<AttendanceFilter, String> {
        fn bound(s: &Option<String>, msg: &str) -> Result<Option<Date>, String> {
            match s.as_deref() {
                None | Some("") => Ok(None),
                Some(s) => parse_date(s).map(Some).map_err(|_| msg.to_owned()),
            }
        }

        if let Some(d) = bound(&self.date, "Invalid date format")? {
            return Ok(AttendanceFilter::OnDate(d));
        }

        let from = bound(&self.from, r#"Invalid "from" date format"#)?;
        let to = bound(&self.to, r#"Invalid "to" date format"#)?;
        Ok(AttendanceFilter::Between { from, to })
    }
}

/// An attendance row joined with the student it belongs to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRow {
    pub id: i32,
    pub student_id: i32,
    pub date: String,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub first_name: String,
    pub last_name: String,
    pub institute_code: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRow {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub institute_code: String,
    #[serde(rename = "present_count")]
    pub present_count: i32,
    #[serde(rename = "total_records")]
    pub total_records: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Month;

    #[test]
    fn status_parsing() {
        assert_eq!("PRESENT".parse::<Status>().unwrap(), Status::Present);
        assert_eq!("absent".parse::<Status>().unwrap(), Status::Absent);
        assert!("late".parse::<Status>().is_err());
        assert_eq!(Status::Absent.to_string(), "absent");
    }

    #[test]
    fn dates() {
        let d = parse_date("2025-12-09").unwrap();
        assert_eq!(d, Date::from_calendar_date(2025, Month::December, 9).unwrap());
        assert_eq!(format_date(d), "2025-12-09");
        assert!(parse_date("2025-02-30").is_err());
        assert!(parse_date("09/12/2025").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn student_refs() {
        let r: RecordRequest = serde_json::from_str(
            r#"{"studentId": "42", "date": "2025-12-09", "status": "Present"}"#
        ).unwrap();
        assert_eq!(
            r.check().unwrap(),
            NewAttendance {
                student_id: 42,
                date: Date::from_calendar_date(2025, Month::December, 9).unwrap(),
                status: Status::Present,
            }
        );

        assert_eq!(StudentRef::Number(7).id(), Some(7));
        assert_eq!(StudentRef::Number(0).id(), None);
        assert_eq!(StudentRef::Text("abc".to_owned()).id(), None);
        assert_eq!(StudentRef::Number(i64::MAX).id(), None);
    }

    #[test]
    fn record_request_complaints() {
        let mut r = RecordRequest::default();
        assert_eq!(r.check().unwrap_err(), "Student ID is required");
        r.student_id = Some(StudentRef::Number(1));
        assert_eq!(r.check().unwrap_err(), "Valid date is required");
        r.date = Some("2025-01-15".to_owned());
        assert_eq!(r.check().unwrap_err(), r#"Status must be "present" or "absent""#);
        r.status = Some("tardy".to_owned());
        assert!(r.check().is_err());
    }

    #[test]
    fn bulk_request_checks() {
        let empty = BulkRequest {
            date: Some("2025-01-15".to_owned()),
            records: Some(vec![]),
        };
        assert_eq!(
            empty.check().unwrap_err(),
            "Records array is required and must not be empty"
        );

        let b: BulkRequest = serde_json::from_str(r#"{
            "date": "2025-01-15",
            "records": [
                {"studentId": 3, "status": "present"},
                {"studentId": 1, "status": "ABSENT"},
                {"studentId": 3, "status": "absent"}
            ]
        }"#).unwrap();
        let bulk = b.check().unwrap();
        assert_eq!(bulk.entries.len(), 3);
        assert_eq!(bulk.student_ids(), vec![1, 3]);

        let bad: BulkRequest = serde_json::from_str(r#"{
            "date": "2025-01-15",
            "records": [{"studentId": 3, "status": "present"}, {"status": "absent"}]
        }"#).unwrap();
        assert_eq!(bad.check().unwrap_err(), "Each record must have a studentId");
    }

    #[test]
    fn query_filters() {
        let q = AttendanceQuery {
            date: Some("2025-01-15".to_owned()),
            from: Some("garbage".to_owned()),
            to: None,
        };
        assert!(matches!(q.filter().unwrap(), AttendanceFilter::OnDate(_)));

        let q = AttendanceQuery {
            date: None,
            from: Some("2025-01-01".to_owned()),
            to: None,
        };
        match q.filter().unwrap() {
            AttendanceFilter::Between { from, to } => {
                assert!(from.is_some());
                assert!(to.is_none());
            },
            x => panic!("unexpected filter {:?}", x),
        }

        let q = AttendanceQuery {
            date: None,
            from: None,
            to: Some("2025-13-01".to_owned()),
        };
        assert_eq!(q.filter().unwrap_err(), r#"Invalid "to" date format"#);
    }

    #[test]
    fn summary_row_field_names() {
        let row = SummaryRow {
            id: 1,
            first_name: "Asha".to_owned(),
            last_name: "Khan".to_owned(),
            institute_code: "A".to_owned(),
            present_count: 0,
            total_records: 0,
        };
        let v = serde_json::to_value(&row).unwrap();
        assert_eq!(v["firstName"], "Asha");
        assert_eq!(v["present_count"], 0);
        assert_eq!(v["total_records"], 0);
    }
}
