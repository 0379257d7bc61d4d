/*!
Student records and the checks applied to incoming student data.
*/
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const MAX_NAME_LENGTH: usize = 100;

static PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{10,15}$").unwrap());
static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());
static BATCH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{4}$").unwrap());

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub institute_code: String,
    /// Year of enrollment, e.g. `"2025"`.
    pub batch: String,
    /// Server path of the uploaded photo, e.g. `"/uploads/1733790000000-me.jpg"`.
    pub photo: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/**
Student fields as submitted on create or update.

Every field is optional; on update only the fields present are changed.
`photo` is never taken from the client directly; it is filled in by the
server after an uploaded file has been stored.
*/
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    /// Checked for shape only; students have no email column.
    pub email: Option<String>,
    pub institute_code: Option<String>,
    pub batch: Option<String>,
    #[serde(skip)]
    pub photo: Option<String>,
}

fn filled(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.is_empty())
}

pub fn valid_phone(phone: &str) -> bool {
    let digits: String = phone.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    PHONE.is_match(&digits)
}

pub fn valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

impl StudentInput {
    /**
    Returns every problem with this input, joined into one message.

    Names are only required when `creating`; all other checks apply only to
    fields that are present and non-empty.
    */
    pub fn validate(&self, creating: bool) -> Result<(), String> {
        let mut errors: Vec<String> = Vec::new();

        if creating {
            if filled(&self.first_name).map_or(true, |s| s.trim().is_empty()) {
                errors.push("First name is required".to_owned());
            }
            if filled(&self.last_name).map_or(true, |s| s.trim().is_empty()) {
                errors.push("Last name is required".to_owned());
            }
        }

        if let Some(s) = filled(&self.first_name) {
            if s.chars().count() > MAX_NAME_LENGTH {
                errors.push(format!(
                    "First name must be less than {} characters", MAX_NAME_LENGTH
                ));
            }
        }
        if let Some(s) = filled(&self.last_name) {
            if s.chars().count() > MAX_NAME_LENGTH {
                errors.push(format!(
                    "Last name must be less than {} characters", MAX_NAME_LENGTH
                ));
            }
        }
        if let Some(s) = filled(&self.phone) {
            if !valid_phone(s) {
                errors.push("Invalid phone number format".to_owned());
            }
        }
        if let Some(s) = filled(&self.email) {
            if !valid_email(s) {
                errors.push("Invalid email format".to_owned());
            }
        }
        if let Some(s) = filled(&self.batch) {
            if !BATCH.is_match(s) {
                errors.push("Batch must be a valid year (e.g., 2025)".to_owned());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join(", "))
        }
    }

    /// True if applying this input as an update would change nothing.
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.phone.is_none()
            && self.institute_code.is_none()
            && self.batch.is_none()
            && self.photo.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(first: &str, last: &str) -> StudentInput {
        StudentInput {
            first_name: Some(first.to_owned()),
            last_name: Some(last.to_owned()),
            ..Default::default()
        }
    }

    #[test]
    fn names_required_only_on_create() {
        let blank = StudentInput::default();
        assert_eq!(
            blank.validate(true).unwrap_err(),
            "First name is required, Last name is required"
        );
        assert!(blank.validate(false).is_ok());

        assert_eq!(
            named("   ", "Khan").validate(true).unwrap_err(),
            "First name is required"
        );
    }

    #[test]
    fn field_shapes() {
        let mut s = named("Asha", "Khan");
        s.phone = Some("98765-43210".to_owned());
        s.batch = Some("2025".to_owned());
        s.email = Some("asha@school.in".to_owned());
        assert!(s.validate(true).is_ok());

        s.phone = Some("12345".to_owned());
        s.batch = Some("25".to_owned());
        s.email = Some("asha@school".to_owned());
        assert_eq!(
            s.validate(true).unwrap_err(),
            "Invalid phone number format, Invalid email format, Batch must be a valid year (e.g., 2025)"
        );
    }

    #[test]
    fn empty_optional_fields_are_skipped() {
        let mut s = named("Asha", "Khan");
        s.phone = Some(String::new());
        s.batch = Some(String::new());
        assert!(s.validate(true).is_ok());
    }

    #[test]
    fn long_names() {
        let long = "x".repeat(MAX_NAME_LENGTH + 1);
        let s = named(&long, "Khan");
        assert_eq!(
            s.validate(false).unwrap_err(),
            "First name must be less than 100 characters"
        );
        assert!(named(&"x".repeat(MAX_NAME_LENGTH), "Khan").validate(true).is_ok());
    }

    #[test]
    fn photo_is_not_read_from_json() {
        let s: StudentInput = serde_json::from_str(
            r#"{"firstName": "Asha", "photo": "/etc/passwd"}"#
        ).unwrap();
        assert_eq!(s.first_name.as_deref(), Some("Asha"));
        assert!(s.photo.is_none());
        assert!(!s.is_empty());
        assert!(StudentInput::default().is_empty());
    }
}
