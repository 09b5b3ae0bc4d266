use crate::domain::envelope::TaskEnvelope;
use crate::domain::order::{OrderStatus, Payment};
use crate::domain::ports::{OrderStoreRef, PaymentGatewayRef, PaymentStoreRef, TaskHandler};
use crate::error::HandlerError;
use async_trait::async_trait;
use std::time::Instant;
use tracing::{info, warn};

/// Settles the payment for one order task.
///
/// Marks the order `processing`, charges the gateway and stores the terminal
/// status. A declined charge is a normal outcome and is acknowledged; only
/// store or gateway errors are returned for retry. The payment record is
/// best effort.
pub struct PaymentProcessor {
    orders: OrderStoreRef,
    payments: PaymentStoreRef,
    gateway: PaymentGatewayRef,
}

impl PaymentProcessor {
    pub fn new(orders: OrderStoreRef, payments: PaymentStoreRef, gateway: PaymentGatewayRef) -> Self {
        Self {
            orders,
            payments,
            gateway,
        }
    }
}

#[async_trait]
impl TaskHandler for PaymentProcessor {
    async fn handle(&self, task: &TaskEnvelope) -> Result<(), HandlerError> {
        let started = Instant::now();
        info!(order_id = %task.order_id, amount = %task.amount, "Processing payment");

        self.orders
            .update_status(&task.order_id, OrderStatus::Processing)
            .await
            .map_err(HandlerError::Store)?;

        let outcome = self.gateway.charge(&task.order_id, task.amount).await?;

        self.orders
            .update_status(&task.order_id, outcome.order_status())
            .await
            .map_err(HandlerError::Store)?;

        let payment = Payment::new(task.order_id.clone(), task.amount, outcome);
        if let Err(e) = self.payments.record_attempt(payment).await {
            warn!(order_id = %task.order_id, error = %e, "Failed to create payment record");
        }

        info!(
            order_id = %task.order_id,
            outcome = %outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Payment resolved"
        );
        Ok(())
    }
}
