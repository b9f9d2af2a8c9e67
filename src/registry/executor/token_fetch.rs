use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::token_record::{Settlement, TokenRecord};
use crate::helpers::time::get_instant;
use crate::observability::metrics::get_metrics;
use crate::registry::executor::{SlotGuard, CANCELLED_MSG, INITIAL_FETCH_MSG, TRANSPORT_MSG};
use crate::registry::TokenRegistry;

/// Initial fetch of a freshly created record. The record already owns its refresh
/// slot; the fetch is retried until it succeeds or the registry shuts down.
pub(crate) async fn fetch_initial_token(registry: TokenRegistry, record: Arc<TokenRecord>) {
    let token_type = record.token_type().to_owned();
    let metrics = get_metrics();
    let slot = SlotGuard::new(record, INITIAL_FETCH_MSG);

    let token = registry
        .settings
        .initial_fetch_retry
        .run_until_success(&registry.cancel, || {
            let auth = registry.auth.clone();
            let token_type = token_type.clone();
            async move {
                let start = get_instant();
                metrics
                    .token_fetch_requests
                    .with_label_values(&[token_type.as_str(), INITIAL_FETCH_MSG])
                    .inc();
                let fetched = auth.fetch_initial(&token_type).await;
                metrics
                    .token_fetch_duration
                    .with_label_values(&[token_type.as_str(), INITIAL_FETCH_MSG])
                    .observe(start.elapsed().as_secs_f64());
                if fetched.is_err() {
                    metrics
                        .token_fetch_failures
                        .with_label_values(&[token_type.as_str(), INITIAL_FETCH_MSG, TRANSPORT_MSG])
                        .inc();
                }
                fetched
            }
        })
        .await;

    let settled = match token {
        Some(token) => {
            info!(token_type = %token_type, expires_at = %token.expires_at, "initial token fetched");
            let settled = slot.settle(Settlement::Refreshed(token));
            registry.request_snapshot();
            settled
        }
        None => {
            warn!(token_type = %token_type, "initial fetch cancelled");
            metrics
                .token_fetch_failures
                .with_label_values(&[token_type.as_str(), INITIAL_FETCH_MSG, CANCELLED_MSG])
                .inc();
            slot.settle(Settlement::Failed)
        }
    };
    settled.notify(&token_type);
}
