/*!
The attendance server.

```text
rollcall [ config.toml ]
```
*/
use std::path::PathBuf;
use std::sync::Arc;

use tokio::signal;

use rollcall::config::{self, Cfg};
use rollcall::inter;

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Unable to listen for Ctrl-C: {}", &e);
            std::future::pending::<()>().await;
        }
        log::info!("Received Ctrl-C; shutting down.");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => { sig.recv().await; },
            Err(e) => {
                log::error!("Unable to listen for SIGTERM: {}", &e);
                std::future::pending::<()>().await;
            },
        }
        log::info!("Received SIGTERM; shutting down.");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn run() -> Result<(), String> {
    let cfg_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = Cfg::load(cfg_path.as_deref())?;
    log::info!("Configuration:\n{:#?}", &cfg);

    let glob = config::load_configuration(&cfg).await?;
    let app = inter::router(Arc::new(glob), cfg.max_upload_bytes);

    log::info!("Listening on {}", &cfg.addr);
    axum::Server::try_bind(&cfg.addr)
        .map_err(|e| format!("Unable to bind {}: {}", &cfg.addr, &e))?
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("Server error: {}", &e))?;

    log::info!("Server stopped.");
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = rollcall::start_logging() {
        eprintln!("{}", &e);
    }
    log::info!("Logging started.");

    if let Err(e) = run().await {
        log::error!("{}", &e);
        eprintln!("{}", &e);
        std::process::exit(1);
    }
}
