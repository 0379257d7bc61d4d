/*!
Staff and admin accounts.
*/
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Role::Admin => "admin",
            Role::User  => "user",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user"  => Ok(Role::User),
            _ => Err(format!("{:?} is not a valid Role.", s)),
        }
    }
}

/// A full `users` row, password hash included. Never serialized; use
/// `User::public()` for anything leaving the server.
#[derive(Clone, Debug)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: String,
    pub institute_code: String,
    pub role: Role,
    pub created_at: OffsetDateTime,
}

impl User {
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            institute_code: if self.institute_code.is_empty() {
                None
            } else {
                Some(self.institute_code.clone())
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub institute_code: Option<String>,
}

/// Everything needed to insert a `users` row.
#[derive(Debug)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub phone: &'a str,
    pub institute_code: &'a str,
    pub role: Role,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub confirm_password: Option<String>,
    pub phone: Option<String>,
    pub institute_code: Option<String>,
}

/// A registration request that has passed `RegisterRequest::check()`.
#[derive(Debug)]
pub struct Registration<'a> {
    pub name: String,
    pub email: &'a str,
    pub password: &'a str,
    pub phone: &'a str,
    pub institute_code: &'a str,
}

fn present(s: &Option<String>) -> Option<&str> {
    match s.as_deref() {
        Some("") | None => None,
        Some(s) => Some(s),
    }
}

impl RegisterRequest {
    /// Checks required fields, password confirmation, and password length,
    /// in that order, returning the first complaint.
    pub fn check(&self) -> Result<Registration<'_>, String> {
        let (email, password) = match (present(&self.email), present(&self.password)) {
            (Some(e), Some(p)) => (e, p),
            _ => { return Err("Email and password are required".to_owned()); },
        };

        if self.confirm_password.as_deref() != Some(password) {
            return Err("Passwords do not match".to_owned());
        }
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(format!(
                "Password must be at least {} characters", MIN_PASSWORD_LENGTH
            ));
        }

        let name = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        ).trim().to_owned();

        Ok(Registration {
            name,
            email,
            password,
            phone: self.phone.as_deref().unwrap_or(""),
            institute_code: self.institute_code.as_deref().unwrap_or(""),
        })
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl LoginRequest {
    pub fn check(&self) -> Result<(&str, &str), String> {
        match (present(&self.email), present(&self.password)) {
            (Some(e), Some(p)) => Ok((e, p)),
            _ => Err("Email and password are required".to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(pw: &str, confirm: &str) -> RegisterRequest {
        RegisterRequest {
            first_name: Some("Ada".to_owned()),
            last_name: Some("Lovelace".to_owned()),
            email: Some("ada@example.com".to_owned()),
            password: Some(pw.to_owned()),
            confirm_password: Some(confirm.to_owned()),
            phone: None,
            institute_code: Some("NCC-7".to_owned()),
        }
    }

    #[test]
    fn role_round_trips_through_text() {
        for r in [Role::Admin, Role::User] {
            assert_eq!(r, r.to_string().parse::<Role>().unwrap());
        }
        assert!("Admin".parse::<Role>().is_err());
    }

    #[test]
    fn registration_checks() {
        let good = request("hunter22", "hunter22");
        let reg = good.check().unwrap();
        assert_eq!(reg.name, "Ada Lovelace");
        assert_eq!(reg.institute_code, "NCC-7");
        assert_eq!(reg.phone, "");

        assert_eq!(
            request("hunter22", "hunter23").check().unwrap_err(),
            "Passwords do not match"
        );
        assert_eq!(
            request("abc", "abc").check().unwrap_err(),
            "Password must be at least 6 characters"
        );

        let mut no_email = request("hunter22", "hunter22");
        no_email.email = Some(String::new());
        assert_eq!(no_email.check().unwrap_err(), "Email and password are required");

        let mut no_confirm = request("hunter22", "hunter22");
        no_confirm.confirm_password = None;
        assert_eq!(no_confirm.check().unwrap_err(), "Passwords do not match");
    }

    #[test]
    fn name_is_trimmed_when_parts_missing() {
        let mut r = request("hunter22", "hunter22");
        r.last_name = None;
        assert_eq!(r.check().unwrap().name, "Ada");
    }

    #[test]
    fn blank_institute_is_null_in_public_view() {
        let u = User {
            id: 3,
            name: "Admin".to_owned(),
            email: "admin@example.com".to_owned(),
            password_hash: "x".to_owned(),
            phone: String::new(),
            institute_code: String::new(),
            role: Role::Admin,
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        let v = serde_json::to_value(u.public()).unwrap();
        assert_eq!(v["instituteCode"], serde_json::Value::Null);
        assert_eq!(v["role"], "admin");
        assert!(v.get("passwordHash").is_none());
    }
}
