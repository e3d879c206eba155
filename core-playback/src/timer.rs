//! Wall-clock timers usable on every target.

use futures::future::{self, Either};
use futures::pin_mut;
use std::future::Future;
use std::time::Duration;

/// Sleep for `duration`.
#[cfg(not(target_arch = "wasm32"))]
pub async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Sleep for `duration`.
#[cfg(target_arch = "wasm32")]
pub async fn sleep(duration: Duration) {
    gloo_timers::future::sleep(duration).await;
}

/// Race `future` against a timer. Returns `None` on timeout.
///
/// The timer is dropped (cleared) as soon as the future settles, and the
/// future is dropped when the timer fires.
pub async fn with_timeout<F>(duration: Duration, future: F) -> Option<F::Output>
where
    F: Future,
{
    let delay = sleep(duration);
    pin_mut!(future);
    pin_mut!(delay);

    match future::select(future, delay).await {
        Either::Left((output, _)) => Some(output),
        Either::Right(((), _)) => None,
    }
}
