use std::time::Duration;

/// Run `op` up to `attempts` times, doubling the delay between tries.
///
/// The delay starts at `base_delay_ms` and is slept after every failed try
/// except the last; the final error is returned unchanged. `what` names
/// the operation in the retry logs.
pub fn retry_with_backoff<F, T, E>(
    mut op: F,
    attempts: u32,
    base_delay_ms: u64,
    what: &str,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                let delay = base_delay_ms.saturating_mul(1u64 << (attempt - 1).min(16));
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {}ms",
                    what,
                    attempt,
                    attempts,
                    e,
                    delay
                );
                std::thread::sleep(Duration::from_millis(delay));
            }
            Err(e) => {
                tracing::error!("{} failed after {} attempts: {}", what, attempts, e);
                return Err(e);
            }
        }
    }
}
