//! Starting the daemon.

use std::net::SocketAddr;
use std::path::Path;
use std::process;
use std::sync::Arc;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use log::{debug, error, info};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::select;
use tokio::sync::oneshot;
use tokio_rustls::TlsAcceptor;
use crate::commons::file;
use crate::commons::error::Error;
use crate::config::Config;
use crate::server::manager::PkiManager;
use crate::server::scheduler;
use super::http::{tls, tls_keys};
use super::http::server::HttpServer;


/// Runs the daemon until the HTTP server or the scheduler stops.
///
/// If `signal_running` is given, it is signalled once the listener is
/// bound and ready to accept connections.
pub async fn start_pki_daemon(
    config: Arc<Config>,
    signal_running: Option<oneshot::Sender<()>>,
) -> Result<(), Error> {
    write_pid_file_or_die(&config);
    test_data_dir_or_die("data_dir", &config.data_dir);

    // Create the manager, this opens or initializes the CA and the
    // repositories in the configured storage.
    let manager = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || PkiManager::build(config))
            .await
            .map_err(|e| Error::custom(format!("cannot start server: {e}")))??
    };
    let manager = Arc::new(manager);

    let scheduler_future = scheduler::run(manager.clone());

    let server = HttpServer::new(manager, config.clone())?;

    // Create self-signed HTTPS cert if configured and not generated earlier.
    if config.https_mode().is_generate_https_cert() {
        tls_keys::create_key_cert_if_needed(&config.data_dir)
            .map_err(|e| Error::HttpsSetup(format!("{e}")))?;
    }

    let listener = tokio::spawn(single_http_listener(
        server, config.socket_addr(), config.clone(), signal_running,
    ));

    select!(
        _ = listener => error!("http server stopped unexpectedly"),
        _ = scheduler_future => error!("scheduler stopped unexpectedly"),
    );

    Err(Error::custom("stopping pkid process"))
}

/// Runs an HTTP listener on a single socket.
async fn single_http_listener(
    server: Arc<HttpServer>,
    addr: SocketAddr,
    config: Arc<Config>,
    signal_running: Option<oneshot::Sender<()>>,
) {
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("Could not bind to {addr}: {err}");
            return;
        }
    };

    let tls = if config.https_mode().is_disabled() {
        None
    }
    else {
        match tls::create_server_config(
            &config.https_key_file(), &config.https_cert_file(),
        ) {
            Ok(config) => Some(TlsAcceptor::from(Arc::new(config))),
            Err(err) => {
                error!("{err}");
                return;
            }
        }
    };

    info!(
        "Listening on {}://{addr}",
        if tls.is_some() { "https" } else { "http" }
    );

    if let Some(tx) = signal_running {
        let _ = tx.send(());
    }

    loop {
        let stream = match listener.accept().await {
            Ok((stream, _addr)) => stream,
            Err(err) => {
                error!("Fatal error in HTTP server {addr}: {err}");
                return;
            }
        };
        let server = server.clone();
        let tls = tls.clone();
        tokio::task::spawn(async move {
            match tls {
                Some(tls) => match tls.accept(stream).await {
                    Ok(stream) => serve_connection(server, stream).await,
                    Err(err) => debug!("TLS handshake failed: {err}"),
                },
                None => serve_connection(server, stream).await,
            }
        });
    }
}

/// Serves HTTP/1 requests on an accepted connection.
async fn serve_connection<S>(server: Arc<HttpServer>, stream: S)
where S: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    let res = hyper::server::conn::http1::Builder::new()
        .serve_connection(
            TokioIo::new(stream),
            service_fn(move |req| {
                let server = server.clone();
                async move { server.process_request(req).await }
            }),
        )
        .await;
    if let Err(err) = res {
        debug!("HTTP connection closed with error: {err}");
    }
}

fn write_pid_file_or_die(config: &Config) {
    if let Err(e) = file::save(
        process::id().to_string().as_bytes(), &config.pid_file()
    ) {
        print_write_error_hint_and_die(format!(
            "Could not write PID file: {e}"
        ));
    }
}

fn test_data_dir_or_die(config_item: &str, dir: &Path) {
    let test_file = dir.join("test");

    if let Err(e) = file::save(b"test", &test_file) {
        print_write_error_hint_and_die(format!(
            "Cannot write to dir '{}' for configuration setting '{}', \
             Error: {}",
            dir.to_string_lossy(),
            config_item,
            e
        ));
    }
    else if let Err(e) = file::delete_file(&test_file) {
        print_write_error_hint_and_die(format!(
            "Cannot delete test file '{}' in dir for configuration setting \
             '{}', Error: {}",
            test_file.to_string_lossy(),
            config_item,
            e
        ));
    }
}

fn print_write_error_hint_and_die(error_msg: String) -> ! {
    eprintln!("{error_msg}");
    eprintln!();
    eprintln!("Hint: if you use systemd you may need to override the allowed");
    eprintln!("ReadWritePaths, the easiest way may be by doing ");
    eprintln!("'systemctl edit pkid' and add a section like:");
    eprintln!();
    eprintln!("[Service]");
    eprintln!("ReadWritePaths=/local/path1 /local/path2 ...");
    process::exit(1);
}
