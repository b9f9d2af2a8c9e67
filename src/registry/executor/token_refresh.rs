use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::token_record::{Settlement, TokenRecord};
use crate::helpers::time::get_instant;
use crate::observability::metrics::get_metrics;
use crate::registry::executor::{SlotGuard, CANCELLED_MSG, REFRESH_MSG, REFUSED_MSG, TRANSPORT_MSG};
use crate::registry::TokenRegistry;
use crate::sources::RefreshOutcome;

/// One refresh attempt for a record whose slot the caller already took.
/// Never retried here: a transport failure leaves the old token in place and the
/// next access re-triggers the refresh.
pub(crate) async fn refresh_token(registry: TokenRegistry, record: Arc<TokenRecord>) {
    let token_type = record.token_type().to_owned();
    let params = record.refresh_parameters();
    let metrics = get_metrics();
    let slot = SlotGuard::new(record, REFRESH_MSG);

    metrics
        .token_fetch_requests
        .with_label_values(&[token_type.as_str(), REFRESH_MSG])
        .inc();
    let start = get_instant();
    let outcome = tokio::select! {
        _ = registry.cancel.cancelled() => None,
        outcome = registry.auth.refresh(&token_type, &params) => Some(outcome),
    };
    metrics
        .token_fetch_duration
        .with_label_values(&[token_type.as_str(), REFRESH_MSG])
        .observe(start.elapsed().as_secs_f64());

    let failure = |reason: &str| {
        metrics
            .token_fetch_failures
            .with_label_values(&[token_type.as_str(), REFRESH_MSG, reason])
            .inc();
    };

    let settlement = match outcome {
        Some(Ok(RefreshOutcome::Refreshed(token))) => {
            info!(token_type = %token_type, expires_at = %token.expires_at, "token refreshed");
            Settlement::Refreshed(token)
        }
        Some(Ok(RefreshOutcome::Refused)) => {
            warn!(token_type = %token_type, "refresh refused, token invalidated");
            failure(REFUSED_MSG);
            Settlement::Refused
        }
        Some(Err(e)) => {
            warn!(token_type = %token_type, error = %e, "refresh failed, keeping current token");
            failure(TRANSPORT_MSG);
            Settlement::Failed
        }
        None => {
            info!(token_type = %token_type, "refresh cancelled");
            failure(CANCELLED_MSG);
            Settlement::Failed
        }
    };

    let refreshed = matches!(settlement, Settlement::Refreshed(_));
    let settled = slot.settle(settlement);
    if refreshed {
        registry.request_snapshot();
    }
    settled.notify(&token_type);
}
