use tokio::time::{sleep, Duration};

use crate::ai::{GenerativeApi, Operation};

/// Blocks until `operation` reports done, re-querying every `interval`.
///
/// A failed refresh retries by name; if that fails too the previous handle is
/// kept for the next round. There is no attempt limit.
pub(crate) async fn wait_for_operation<A: GenerativeApi>(
    api: &A,
    mut operation: Operation,
    interval: Duration,
) -> Operation {
    let mut polls = 0u64;
    while !operation.done {
        sleep(interval).await;
        polls += 1;
        operation = match api.refresh_operation(&operation).await {
            Ok(refreshed) => refreshed,
            Err(err) => {
                log::warn!("refreshing {} failed: {err:#}", operation.name);
                match api.get_operation(&operation.name).await {
                    Ok(fetched) => fetched,
                    Err(err) => {
                        log::warn!("fetching {} by name failed: {err:#}", operation.name);
                        operation
                    }
                }
            }
        };
        log::debug!("poll {polls}: {} done={}", operation.name, operation.done);
    }
    log::info!("operation {} finished after {polls} polls", operation.name);
    operation
}
