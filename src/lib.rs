/*!
Student attendance tracking: a JSON API over a Postgres store, plus a
client for talking to it.
*/
pub mod attendance;
pub mod auth;
pub mod client;
pub mod config;
pub mod inter;
pub mod store;
pub mod student;
pub mod user;

pub fn log_level_from_env() -> simplelog::LevelFilter {
    use simplelog::LevelFilter;

    let mut level_string = match std::env::var("LOG_LEVEL") {
        Err(_) => { return LevelFilter::Warn; },
        Ok(s) => s,
    };

    level_string.make_ascii_lowercase();
    level_from_str(&level_string)
}

fn level_from_str(s: &str) -> simplelog::LevelFilter {
    use simplelog::LevelFilter;

    match s {
        "max" => LevelFilter::max(),
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Warn,
    }
}

/// Start terminal logging for one of this crate's binaries.
pub fn start_logging() -> Result<(), String> {
    use simplelog::{ColorChoice, TerminalMode, TermLogger};

    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("rollcall")
        .build();
    TermLogger::init(
        log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ).map_err(|e| format!("Unable to start logging: {}", &e))
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn ensure_logging() {
        use simplelog::{TermLogger, TerminalMode, ColorChoice};
        let log_cfg = simplelog::ConfigBuilder::new()
            .add_filter_allow_str("rollcall")
            .build();
        let res = TermLogger::init(
            log_level_from_env(),
            log_cfg,
            TerminalMode::Stdout,
            ColorChoice::Auto
        );

        match res {
            Ok(_) => { log::info!("Test logging started."); },
            Err(_) => { log::info!("Test logging already started."); },
        }
    }

    #[test]
    fn level_names() {
        use simplelog::LevelFilter;

        assert_eq!(level_from_str("trace"), LevelFilter::Trace);
        assert_eq!(level_from_str("off"), LevelFilter::Off);
        assert_eq!(level_from_str("max"), LevelFilter::max());
        assert_eq!(level_from_str("chatty"), LevelFilter::Warn);
    }
}
