/// Retry an async collaborator call a few times before giving up.
///
/// `$operation` is re-evaluated for every attempt, so it must build a fresh
/// future each time.
macro_rules! retry_collaborator_call {
    ($label:expr, $operation:expr) => {{
        const MAX_ATTEMPTS: u32 = 3;
        const RETRY_DELAY_MILLIS: u64 = 1500;

        let label: String = $label.into();
        let mut attempt = 1;

        loop {
            match ($operation).await {
                Ok(value) => break Ok(value),
                Err(err) if attempt >= MAX_ATTEMPTS => break Err(err),
                Err(err) => {
                    log::warn!(
                        "Attempt {}/{} to {} failed: {:#}. Retrying in {}ms.",
                        attempt,
                        MAX_ATTEMPTS,
                        label,
                        err,
                        RETRY_DELAY_MILLIS * u64::from(attempt)
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(
                        RETRY_DELAY_MILLIS * u64::from(attempt),
                    ))
                    .await;
                    attempt += 1;
                }
            }
        }
    }};
}

pub(crate) use retry_collaborator_call;
