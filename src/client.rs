/*!
Client for the attendance API.

Holds a base URL and, once logged in, a bearer token that is attached to
every request. Every non-success response is turned into
`ClientError::Api` carrying the server's `error` message.

```no_run
use rollcall::client::{Client, ClientError};

async fn roster() -> Result<(), ClientError> {
    let mut c = Client::new("http://localhost:4000");
    c.login("admin@example.com", "adminpass").await?;
    for s in c.students().await? {
        println!("{} {}", &s.first_name, &s.last_name);
    }
    Ok(())
}
```
*/
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use time::Date;

use crate::{
    attendance::{format_date, AttendanceRow, Status, SummaryRow},
    student::{Student, StudentInput},
    user::{PublicUser, RegisterRequest},
};

/// Used when an error response doesn't say what went wrong.
pub const FALLBACK_MESSAGE: &str = "An error occurred";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("network: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("decode: {0}")]
    Decode(String),
}

impl ClientError {
    /// The message worth showing a person.
    pub fn message(&self) -> String {
        match self {
            ClientError::Api { message, .. } => message.clone(),
            x => x.to_string(),
        }
    }
}

/// Pull the `error` field out of an error response body.
pub fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<String>,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { error: Some(msg) }) if !msg.is_empty() => msg,
        _ => FALLBACK_MESSAGE.to_owned(),
    }
}

/// Response to a successful login or registration.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Session {
    pub token: String,
    pub user: PublicUser,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Created {
    pub id: i32,
    pub message: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Ack {
    pub ok: bool,
    pub message: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BulkSaved {
    pub ok: bool,
    pub count: usize,
    pub message: String,
}

pub struct Client {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl Client {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> { self.token.as_deref() }

    pub fn logout(&mut self) { self.token = None; }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", &self.base_url, path)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.as_deref() {
            Some(t) => builder.bearer_auth(t),
            None => builder,
        }
    }

    async fn send<R: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<R, ClientError> {
        let resp = self.authed(builder).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        resp.json::<R>().await
            .map_err(|e| ClientError::Decode(format!("response body: {}", e)))
    }

    /// Logs in and keeps the issued token for subsequent requests.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<Session, ClientError> {
        let req = self.http.post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }));
        let sess: Session = self.send(req).await?;
        self.token = Some(sess.token.clone());
        Ok(sess)
    }

    /// Registers a staff account and keeps the issued token.
    pub async fn register(&mut self, reg: &RegisterRequest) -> Result<Session, ClientError> {
        let req = self.http.post(self.url("/auth/register")).json(reg);
        let sess: Session = self.send(req).await?;
        self.token = Some(sess.token.clone());
        Ok(sess)
    }

    pub async fn students(&self) -> Result<Vec<Student>, ClientError> {
        self.send(self.http.get(self.url("/students"))).await
    }

    pub async fn student(&self, id: i32) -> Result<Student, ClientError> {
        self.send(self.http.get(self.url(&format!("/students/{}", id)))).await
    }

    pub async fn create_student(&self, input: &StudentInput) -> Result<Created, ClientError> {
        self.send(self.http.post(self.url("/students")).json(input)).await
    }

    pub async fn update_student(
        &self,
        id: i32,
        input: &StudentInput,
    ) -> Result<Ack, ClientError> {
        let req = self.http.put(self.url(&format!("/students/{}", id))).json(input);
        self.send(req).await
    }

    pub async fn delete_student(&self, id: i32) -> Result<Ack, ClientError> {
        self.send(self.http.delete(self.url(&format!("/students/{}", id)))).await
    }

    pub async fn record_attendance(
        &self,
        student_id: i32,
        date: Date,
        status: Status,
    ) -> Result<Created, ClientError> {
        let req = self.http.post(self.url("/attendance")).json(&json!({
            "studentId": student_id,
            "date": format_date(date),
            "status": status,
        }));
        self.send(req).await
    }

    pub async fn bulk_attendance(
        &self,
        date: Date,
        records: &[(i32, Status)],
    ) -> Result<BulkSaved, ClientError> {
        let records: Vec<_> = records.iter()
            .map(|(id, status)| json!({ "studentId": id, "status": status }))
            .collect();
        let req = self.http.post(self.url("/attendance/bulk")).json(&json!({
            "date": format_date(date),
            "records": records,
        }));
        self.send(req).await
    }

    pub async fn attendance_by_date(&self, date: Date) -> Result<Vec<AttendanceRow>, ClientError> {
        let req = self.http.get(self.url("/attendance"))
            .query(&[("date", format_date(date))]);
        self.send(req).await
    }

    /// Either bound may be left open.
    pub async fn attendance_between(
        &self,
        from: Option<Date>,
        to: Option<Date>,
    ) -> Result<Vec<AttendanceRow>, ClientError> {
        let mut params: Vec<(&str, String)> = Vec::with_capacity(2);
        if let Some(d) = from {
            params.push(("from", format_date(d)));
        }
        if let Some(d) = to {
            params.push(("to", format_date(d)));
        }
        let req = self.http.get(self.url("/attendance")).query(&params);
        self.send(req).await
    }

    pub async fn summary(&self) -> Result<Vec<SummaryRow>, ClientError> {
        self.send(self.http.get(self.url("/reports/summary"))).await
    }

    pub async fn users(&self) -> Result<Vec<PublicUser>, ClientError> {
        self.send(self.http.get(self.url("/users"))).await
    }
}
