use std::sync::Arc;

use tracing::error;

use crate::cache::token_record::{Settled, Settlement, TokenRecord};
use crate::observability::metrics::get_metrics;

pub mod token_fetch;
pub mod token_refresh;

static INITIAL_FETCH_MSG: &str = "initial_fetch";
static REFRESH_MSG: &str = "refresh";
static TRANSPORT_MSG: &str = "transport";
static REFUSED_MSG: &str = "refused";
static CANCELLED_MSG: &str = "cancelled";
static ABANDONED_MSG: &str = "abandoned";

/// Holds the refresh slot of a record for one operation. If the operation never
/// settles (it panicked or its task was dropped) the record is settled as failed
/// and its listeners are notified, so the slot is never leaked.
pub(crate) struct SlotGuard {
    record: Arc<TokenRecord>,
    operation: &'static str,
    armed: bool,
}

impl SlotGuard {
    pub(crate) fn new(record: Arc<TokenRecord>, operation: &'static str) -> Self {
        Self { record, operation, armed: true }
    }

    pub(crate) fn settle(mut self, settlement: Settlement) -> Settled {
        self.armed = false;
        self.record.settle(settlement)
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let token_type = self.record.token_type().to_owned();
        error!(token_type = %token_type, operation = self.operation, "operation abandoned, settling as failed");
        get_metrics()
            .token_fetch_failures
            .with_label_values(&[token_type.as_str(), self.operation, ABANDONED_MSG])
            .inc();
        self.record.settle(Settlement::Failed).notify(&token_type);
    }
}
