use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Delay between two revealed characters.
pub const DEFAULT_REVEAL_INTERVAL: Duration = Duration::from_millis(10);

/// Cumulative character counts to reveal `text` with. A zero interval
/// batches the whole text into a single step.
pub fn reveal_steps(text: &str, interval: Duration) -> Vec<usize> {
    let count = text.chars().count();
    match count {
        0 => Vec::new(),
        _ if interval.is_zero() => vec![count],
        _ => (1..=count).collect(),
    }
}

/// Reveals `text` one step at a time, calling `on_step` with the number of
/// characters visible so far and waiting `interval` between steps.
///
/// Returns `false` if `token` was cancelled before the text was fully shown.
pub async fn reveal(
    text: &str,
    interval: Duration,
    token: &CancellationToken,
    mut on_step: impl FnMut(usize),
) -> bool {
    for step in reveal_steps(text, interval) {
        if token.is_cancelled() {
            return false;
        }
        on_step(step);
        if !interval.is_zero()
            && token
                .run_until_cancelled(gloo_timers::future::sleep(interval))
                .await
                .is_none()
        {
            return false;
        }
    }
    !token.is_cancelled()
}
