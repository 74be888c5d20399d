//! Time triggered background tasks.

use std::sync::Arc;
use std::time::Duration;
use log::{debug, error};
use super::manager::PkiManager;


/// Runs the certificate expiry check forever.
///
/// The first check happens right away, later ones every
/// `expiry_check_seconds`.
pub async fn run(manager: Arc<PkiManager>) {
    let period = Duration::from_secs(manager.config.expiry_check_seconds);
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        debug!("Checking for expired certificates");
        let task_manager = manager.clone();
        let res = tokio::task::spawn_blocking(move || {
            task_manager.expire_certs()
        }).await;
        match res {
            Ok(Ok(())) => { }
            Ok(Err(err)) => error!("Expiry check failed: {err}"),
            Err(err) => error!("Expiry check panicked: {err}"),
        }
    }
}
