/*!
Structs to hold configuration data and global variables.

Configuration is layered: hard-coded defaults, then an optional TOML file,
then environment variables.
*/
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{
    auth::{self, Auth},
    store::Store,
    user::{NewUser, Role},
};

const DEFAULT_JWT_SECRET: &str = "replace_this_secret";
const DEFAULT_ADMIN_EMAIL: &str = "admin@example.com";
const DEFAULT_ADMIN_PASSWORD: &str = "adminpass";

#[derive(Deserialize)]
struct ConfigFile {
    db_host: Option<String>,
    db_port: Option<u16>,
    db_name: Option<String>,
    db_user: Option<String>,
    db_password: Option<String>,
    db_pool_size: Option<usize>,
    jwt_secret: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    upload_dir: Option<String>,
    admin_email: Option<String>,
    admin_password: Option<String>,
    max_upload_bytes: Option<usize>,
}

pub struct Cfg {
    pub db_host: String,
    pub db_port: u16,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub db_pool_size: usize,
    pub jwt_secret: String,
    pub addr: SocketAddr,
    pub upload_dir: PathBuf,
    pub default_admin_email: String,
    pub default_admin_password: String,
    pub max_upload_bytes: usize,
}

impl std::default::Default for Cfg {
    fn default() -> Self {
        Self {
            db_host: "localhost".to_owned(),
            db_port: 5432,
            db_name: "postgres".to_owned(),
            db_user: "postgres".to_owned(),
            db_password: "postgres".to_owned(),
            db_pool_size: 8,
            jwt_secret: DEFAULT_JWT_SECRET.to_owned(),
            addr: SocketAddr::from(([0, 0, 0, 0], 4000)),
            upload_dir: PathBuf::from("uploads"),
            default_admin_email: DEFAULT_ADMIN_EMAIL.to_owned(),
            default_admin_password: DEFAULT_ADMIN_PASSWORD.to_owned(),
            max_upload_bytes: 5 * 1024 * 1024,
        }
    }
}

// Passwords and the signing secret are redacted.
impl std::fmt::Debug for Cfg {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Cfg")
            .field("db_host", &self.db_host)
            .field("db_port", &self.db_port)
            .field("db_name", &self.db_name)
            .field("db_user", &self.db_user)
            .field("db_password", &"[redacted]")
            .field("db_pool_size", &self.db_pool_size)
            .field("jwt_secret", &"[redacted]")
            .field("addr", &self.addr)
            .field("upload_dir", &self.upload_dir)
            .field("default_admin_email", &self.default_admin_email)
            .field("default_admin_password", &"[redacted]")
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

fn parse_env<T>(name: &str, val: &str) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    val.trim().parse().map_err(|e| format!(
        "Error parsing environment variable {} value {:?}: {}",
        name, val, &e
    ))
}

/// An empty pool never hands out a connection.
fn check_pool_size(n: usize) -> Result<usize, String> {
    if n == 0 {
        return Err("Database pool size must be at least 1.".to_owned());
    }
    Ok(n)
}

impl Cfg {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Unable to read config file: {}", &e))?;
        let cf: ConfigFile = toml::from_str(&file_contents)
            .map_err(|e| format!("Unable to deserialize config file: {}", &e))?;

        let mut c = Self::default();

        if let Some(s) = cf.db_host {
            c.db_host = s;
        }
        if let Some(n) = cf.db_port {
            c.db_port = n;
        }
        if let Some(s) = cf.db_name {
            c.db_name = s;
        }
        if let Some(s) = cf.db_user {
            c.db_user = s;
        }
        if let Some(s) = cf.db_password {
            c.db_password = s;
        }
        if let Some(n) = cf.db_pool_size {
            c.db_pool_size = check_pool_size(n)?;
        }
        if let Some(s) = cf.jwt_secret {
            c.jwt_secret = s;
        }
        if let Some(s) = cf.host {
            c.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing {:?} as IP address: {}",
                    &s, &e
                ))?
            );
        }
        if let Some(n) = cf.port {
            c.addr.set_port(n);
        }
        if let Some(s) = cf.upload_dir {
            c.upload_dir = PathBuf::from(s);
        }
        if let Some(s) = cf.admin_email {
            c.default_admin_email = s;
        }
        if let Some(s) = cf.admin_password {
            c.default_admin_password = s;
        }
        if let Some(n) = cf.max_upload_bytes {
            c.max_upload_bytes = n;
        }

        Ok(c)
    }

    /**
    Overlay values from environment variables, as looked up by `lookup`
    (pass `|k| std::env::var(k).ok()` for the real environment).

    Empty values are treated as unset.
    */
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.is_empty());

        if let Some(s) = get("DB_HOST") {
            self.db_host = s;
        }
        if let Some(s) = get("DB_PORT") {
            self.db_port = parse_env("DB_PORT", &s)?;
        }
        if let Some(s) = get("DB_NAME") {
            self.db_name = s;
        }
        if let Some(s) = get("DB_USER") {
            self.db_user = s;
        }
        if let Some(s) = get("DB_PASSWORD") {
            self.db_password = s;
        }
        if let Some(s) = get("DB_POOL_SIZE") {
            self.db_pool_size = check_pool_size(parse_env("DB_POOL_SIZE", &s)?)?;
        }
        if let Some(s) = get("JWT_SECRET") {
            self.jwt_secret = s;
        }
        if let Some(s) = get("HOST") {
            self.addr.set_ip(parse_env("HOST", &s)?);
        }
        if let Some(s) = get("PORT") {
            self.addr.set_port(parse_env("PORT", &s)?);
        }
        if let Some(s) = get("UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(s);
        }
        if let Some(s) = get("ADMIN_EMAIL") {
            self.default_admin_email = s;
        }
        if let Some(s) = get("ADMIN_PASSWORD") {
            self.default_admin_password = s;
        }
        if let Some(s) = get("MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = parse_env("MAX_UPLOAD_BYTES", &s)?;
        }

        Ok(self)
    }

    /// Defaults, then the file at `path` if given, then the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let c = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        c.with_env(|k| std::env::var(k).ok())
    }

    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&self.db_host)
            .port(self.db_port)
            .dbname(&self.db_name)
            .user(&self.db_user)
            .password(&self.db_password);
        pg
    }

    /// Complaints about settings left at their insecure defaults.
    pub fn insecure_defaults(&self) -> Vec<&'static str> {
        let mut v = Vec::new();
        if self.jwt_secret == DEFAULT_JWT_SECRET {
            v.push("JWT signing secret is the built-in default; set JWT_SECRET.");
        }
        if self.default_admin_password == DEFAULT_ADMIN_PASSWORD {
            v.push("Default admin password is the built-in default; set ADMIN_PASSWORD.");
        }
        v
    }
}

/**
This guy will haul around some global variables and be passed in an
`axum::Extension` to the handlers who need him.
*/
pub struct Glob {
    pub store: Store,
    pub auth: Auth,
    pub upload_dir: PathBuf,
}

/// Ensures all appropriate database tables exist, that the default admin
/// exists, and that the upload directory is there.
pub async fn load_configuration(cfg: &Cfg) -> Result<Glob, String> {
    for complaint in cfg.insecure_defaults().iter() {
        log::warn!("{}", complaint);
    }

    let store = Store::new(cfg.pg_config(), cfg.db_pool_size)
        .map_err(|e| format!("Unable to set up data DB: {}", &e))?;

    log::trace!("Checking state of data DB...");
    if let Err(e) = store.ensure_db_schema().await {
        let estr = format!("Unable to ensure state of data DB: {}", &e);
        return Err(estr);
    }
    log::trace!("...data DB okay.");

    log::trace!("Checking existence of default Admin...");
    match store.get_user_by_email(&cfg.default_admin_email).await {
        Err(e) => {
            let estr = format!(
                "Error attempting to check existence of default Admin ({}): {}",
                &cfg.default_admin_email, &e
            );
            return Err(estr);
        },
        Ok(Some(u)) if u.role != Role::Admin => {
            log::warn!(
                "Default Admin address {} belongs to a non-admin account.",
                &u.email
            );
        },
        Ok(Some(_)) => {
            log::trace!("Default Admin OK.");
        },
        Ok(None) => {
            log::info!(
                "Default Admin ({}) doesn't exist; inserting.",
                &cfg.default_admin_email
            );
            let password_hash = auth::hash_password(&cfg.default_admin_password)
                .map_err(|e| format!("Error hashing default Admin password: {}", &e))?;
            let admin = NewUser {
                name: "Admin",
                email: &cfg.default_admin_email,
                password_hash: &password_hash,
                phone: "",
                institute_code: "",
                role: Role::Admin,
            };
            if let Err(e) = store.insert_user(&admin).await {
                let estr = format!("Error inserting default Admin: {}", &e);
                return Err(estr);
            }
        },
    }

    match store.count_admins().await {
        Ok(n) => { log::info!("{} admin account(s) present.", &n); },
        Err(e) => { log::warn!("Unable to count admin accounts: {}", &e); },
    }

    std::fs::create_dir_all(&cfg.upload_dir)
        .map_err(|e| format!(
            "Unable to create upload directory {}: {}",
            cfg.upload_dir.display(), &e
        ))?;

    let glob = Glob {
        store,
        auth: Auth::new(&cfg.jwt_secret),
        upload_dir: cfg.upload_dir.clone(),
    };

    Ok(glob)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults() {
        let c = Cfg::default();
        assert_eq!(c.addr.port(), 4000);
        assert_eq!(c.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(c.insecure_defaults().len(), 2);
    }

    #[test]
    fn file_then_env() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"
db_host = "db.internal"
db_name = "attendance"
port = 8080
jwt_secret = "from-file"
upload_dir = "/var/lib/rollcall/uploads"
"#).unwrap();

        let c = Cfg::from_file(f.path()).unwrap();
        assert_eq!(c.db_host, "db.internal");
        assert_eq!(c.db_port, 5432);
        assert_eq!(c.addr.port(), 8080);
        assert_eq!(c.jwt_secret, "from-file");
        assert_eq!(c.insecure_defaults().len(), 1);

        let c = c.with_env(env(&[
            ("PORT", "9000"),
            ("JWT_SECRET", "from-env"),
            ("DB_NAME", ""),
            ("HOST", "127.0.0.1"),
        ])).unwrap();
        assert_eq!(c.addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(c.jwt_secret, "from-env");
        assert_eq!(c.db_name, "attendance");
        assert_eq!(c.upload_dir, PathBuf::from("/var/lib/rollcall/uploads"));
    }

    #[test]
    fn bad_values() {
        assert!(Cfg::default().with_env(env(&[("PORT", "eighty")])).is_err());
        assert!(Cfg::default().with_env(env(&[("HOST", "not-an-ip")])).is_err());

        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "port = \"eighty\"\n").unwrap();
        assert!(Cfg::from_file(f.path()).is_err());

        assert!(Cfg::default().with_env(env(&[("DB_POOL_SIZE", "0")])).is_err());
        assert_eq!(
            Cfg::default().with_env(env(&[("DB_POOL_SIZE", "3")])).unwrap().db_pool_size,
            3
        );
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "db_pool_size = 0\n").unwrap();
        assert!(Cfg::from_file(f.path()).is_err());
    }

    #[test]
    fn secrets_stay_out_of_debug() {
        let mut c = Cfg::default();
        c.jwt_secret = "hunter2-jwt".to_owned();
        c.db_password = "hunter2-db".to_owned();
        let s = format!("{:?}", &c);
        assert!(!s.contains("hunter2"));
        assert!(s.contains("localhost"));
    }

    #[test]
    fn postgres_settings() {
        let pg = Cfg::default().pg_config();
        assert_eq!(pg.get_dbname(), Some("postgres"));
        assert_eq!(pg.get_user(), Some("postgres"));
        assert_eq!(pg.get_ports(), &[5432]);
    }
}
