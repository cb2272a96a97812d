use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::rt::task::JoinHandle;
use actix_web::rt::time::{sleep, timeout};
use actix_web::web;
use bigdecimal::{BigDecimal, Signed};
use diesel::{Connection, PgConnection};
use tracing::{error, info, instrument, warn};

use crate::accrual::{AccrualClient, AccrualError, AccrualOrderInfo, AccrualStatus};
use crate::database::connect::DbPool;
use crate::database::models::OrderStatus;
use crate::database::{balance, orders};
use crate::errors::{LedgerError, Result};

#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Upper bound for the whole poll of one order.
    pub lifetime: Duration,
    /// Upper bound for a single call to the accrual service.
    pub request_timeout: Duration,
    /// Pause between attempts when the service has nothing final yet.
    pub retry_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Processed,
    Invalid,
    AlreadyFinal,
    Missing,
    Expired,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ApplyResult {
    Updated(OrderStatus),
    AlreadyFinal,
    UnknownOrder,
}

enum Attempt {
    Done(PollOutcome),
    RetryAfter(Duration),
    Expired,
}

/// Stores one accrual service answer: the order status change and the owner's
/// credit commit together or not at all.
pub fn apply_accrual(conn: &mut PgConnection, req_number: &str, info: &AccrualOrderInfo) -> Result<ApplyResult> {
    conn.transaction::<_, LedgerError, _>(|conn| {
        let Some(order) = orders::lock_order(conn, req_number)? else {
            return Ok(ApplyResult::UnknownOrder);
        };
        let current = order.status().map_err(LedgerError::Internal)?;
        if current.is_terminal() {
            return Ok(ApplyResult::AlreadyFinal);
        }

        match info.status {
            AccrualStatus::Registered | AccrualStatus::Processing => {
                if current == OrderStatus::Pending {
                    orders::update_order_result(conn, req_number, OrderStatus::Processing, None)?;
                }
                Ok(ApplyResult::Updated(OrderStatus::Processing))
            }
            AccrualStatus::Invalid => {
                orders::update_order_result(conn, req_number, OrderStatus::Invalid, None)?;
                Ok(ApplyResult::Updated(OrderStatus::Invalid))
            }
            AccrualStatus::Processed => {
                let accrual = info.accrual.clone().unwrap_or_else(|| BigDecimal::from(0));
                if accrual.is_negative() {
                    return Err(LedgerError::InvalidAmount(accrual.to_string()));
                }
                orders::update_order_result(conn, req_number, OrderStatus::Processed, Some(accrual.clone()))?;
                if accrual.is_positive() {
                    balance::credit(conn, order.user_id, &accrual)?;
                }
                Ok(ApplyResult::Updated(OrderStatus::Processed))
            }
        }
    })
}

/// Background accrual lookups, one task per order.
#[derive(Clone)]
pub struct AccrualPoller {
    db: DbPool,
    client: Arc<dyn AccrualClient>,
    settings: PollSettings,
}

impl AccrualPoller {
    pub fn new(db: DbPool, client: Arc<dyn AccrualClient>, settings: PollSettings) -> Self {
        Self { db, client, settings }
    }

    /// Detaches the poll from the caller; the handle yields the outcome.
    pub fn spawn(&self, order_number: String) -> JoinHandle<PollOutcome> {
        let poller = self.clone();
        actix_web::rt::spawn(async move { poller.poll(&order_number).await })
    }

    /// Restarts polling for orders left unfinished by a previous run.
    pub async fn resume_unfinished(&self) -> Result<Vec<JoinHandle<PollOutcome>>> {
        let db = self.db.clone();
        let numbers = web::block(move || {
            let mut conn = db.get()?;
            orders::unfinished_orders(&mut conn)
        })
        .await??;
        info!(count = numbers.len(), "resuming accrual polls");
        Ok(numbers.into_iter().map(|number| self.spawn(number)).collect())
    }

    #[instrument(skip(self), fields(order = %order_number))]
    pub async fn poll(&self, order_number: &str) -> PollOutcome {
        let deadline = Instant::now() + self.settings.lifetime;
        loop {
            match self.attempt(order_number, deadline).await {
                Attempt::Done(outcome) => {
                    info!(?outcome, "accrual poll finished");
                    return outcome;
                }
                Attempt::RetryAfter(delay) if delay < deadline.saturating_duration_since(Instant::now()) => {
                    sleep(delay).await
                }
                Attempt::RetryAfter(_) | Attempt::Expired => {
                    warn!(lifetime = ?self.settings.lifetime, "accrual poll expired, order left for a later poll");
                    return PollOutcome::Expired;
                }
            }
        }
    }

    async fn attempt(&self, order_number: &str, deadline: Instant) -> Attempt {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Attempt::Expired;
        }
        let retry = Attempt::RetryAfter(self.settings.retry_interval);
        let request_timeout = self.settings.request_timeout.min(remaining);

        let response = match timeout(request_timeout, self.client.order_info(order_number)).await {
            Ok(response) => response,
            Err(_) => Err(AccrualError::Timeout(request_timeout)),
        };
        let order_info = match response {
            Ok(Some(order_info)) => order_info,
            Ok(None) => {
                info!("order not registered in accrual service yet");
                return retry;
            }
            Err(AccrualError::RateLimited { retry_after }) => {
                warn!(?retry_after, "accrual service rate limit");
                return Attempt::RetryAfter(retry_after.unwrap_or(self.settings.retry_interval));
            }
            Err(e) => {
                warn!(error = %e, "accrual service unavailable");
                return retry;
            }
        };

        // the store write is not cut by the lifetime: once started, its result is reported
        if Instant::now() >= deadline {
            return Attempt::Expired;
        }

        let db = self.db.clone();
        let number = order_number.to_string();
        let applied = web::block(move || {
            let mut conn = db.get()?;
            apply_accrual(&mut conn, &number, &order_info)
        })
        .await
        .map_err(LedgerError::from)
        .and_then(|res| res);

        match applied {
            Ok(ApplyResult::Updated(OrderStatus::Processed)) => Attempt::Done(PollOutcome::Processed),
            Ok(ApplyResult::Updated(OrderStatus::Invalid)) => Attempt::Done(PollOutcome::Invalid),
            Ok(ApplyResult::Updated(_)) => retry,
            Ok(ApplyResult::AlreadyFinal) => Attempt::Done(PollOutcome::AlreadyFinal),
            Ok(ApplyResult::UnknownOrder) => {
                error!("polled order does not exist in the ledger");
                Attempt::Done(PollOutcome::Missing)
            }
            Err(e) => {
                warn!(error = %e, "failed to store accrual result, rolled back");
                retry
            }
        }
    }
}
