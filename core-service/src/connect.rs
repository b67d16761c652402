//! Adapter connection with a short fixed retry.

use crate::error::{CoreError, Result};
use bridge_traits::catalog::CatalogAdapter;
use std::time::Duration;
use tracing::{debug, warn};

/// Connection attempts before an adapter is reported unreachable.
pub const CONNECT_ATTEMPTS: u32 = 3;

/// Pause between connection attempts.
pub const CONNECT_PAUSE: Duration = Duration::from_secs(1);

/// Connect `adapter`, trying up to `attempts` times with `pause` in between.
///
/// # Errors
///
/// Returns [`CoreError::ConnectFailed`] carrying the last adapter error once
/// every attempt has failed.
pub async fn connect_with_retry(
    adapter: &dyn CatalogAdapter,
    attempts: u32,
    pause: Duration,
) -> Result<()> {
    let attempts = attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match adapter.connect().await {
            Ok(()) => {
                debug!(library = adapter.name(), attempt, "Adapter connected");
                return Ok(());
            }
            Err(e) if attempt >= attempts => {
                return Err(CoreError::ConnectFailed {
                    library: adapter.name().to_string(),
                    attempts: attempt,
                    source: e,
                });
            }
            Err(e) => {
                warn!(library = adapter.name(), attempt, error = %e, "Connect failed, retrying");
                tokio::time::sleep(pause).await;
            }
        }
    }
}
