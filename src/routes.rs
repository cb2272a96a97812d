use std::ops::DerefMut;

use actix_request_identifier::RequestId;
use actix_web::{get, post, web, HttpResponse};
use tracing::{info, instrument};

use crate::auth::{self, AuthenticatedUser, TokenKeys};
use crate::database::connect::DbPool;
use crate::database::orders::{self, SubmitOrderResult};
use crate::database::withdrawals::{self, WithdrawResult};
use crate::database::{balance, users};
use crate::errors::{LedgerError, Result};
use crate::poller::AccrualPoller;
use crate::responses::{self, BalanceData, Credentials, OrderData, WithdrawInput, WithdrawalData};

#[derive(Debug, Clone, Copy)]
pub struct PasswordCost(pub u32);

fn parse_credentials(body: &[u8]) -> Result<Credentials> {
    let creds: Credentials =
        serde_json::from_slice(body).map_err(|e| LedgerError::BadRequest(format!("invalid credentials: {e}")))?;
    if creds.login.trim().is_empty() || creds.password.is_empty() {
        return Err(LedgerError::BadRequest("login and password are required".to_string()));
    }
    Ok(creds)
}

#[post("/api/user/register")]
#[instrument(skip(db, keys, cost, body), fields(request_id = request_id.as_str()))]
pub async fn register_handler(
    db: web::Data<DbPool>,
    keys: web::Data<TokenKeys>,
    cost: web::Data<PasswordCost>,
    request_id: RequestId,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let creds = parse_credentials(&body)?;
    let mut conn = db.get()?;
    let cost = cost.0;

    let user_id = web::block(move || {
        let password_hash = auth::hash_password(&creds.password, cost)?;
        users::register(conn.deref_mut(), &creds.login, &password_hash)
    })
    .await??;

    info!(user_id, "user registered");
    Ok(responses::token_http_response(&keys.issue(user_id)?, keys.ttl(), "User registered successfully"))
}

#[post("/api/user/login")]
#[instrument(skip(db, keys, body), fields(request_id = request_id.as_str()))]
pub async fn login_handler(
    db: web::Data<DbPool>,
    keys: web::Data<TokenKeys>,
    request_id: RequestId,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let creds = parse_credentials(&body)?;
    let mut conn = db.get()?;

    let user_id = web::block(move || {
        let Some(user) = users::find_by_username(conn.deref_mut(), &creds.login)? else {
            return Err(LedgerError::InvalidCredentials);
        };
        if !auth::verify_password(&creds.password, &user.password_hash)? {
            return Err(LedgerError::InvalidCredentials);
        }
        Ok(user.id)
    })
    .await??;

    Ok(responses::token_http_response(&keys.issue(user_id)?, keys.ttl(), "Login successful"))
}

#[post("/api/user/orders")]
#[instrument(skip(db, poller, body), fields(request_id = request_id.as_str(), user_id = user.user_id))]
pub async fn submit_order_handler(
    db: web::Data<DbPool>,
    poller: web::Data<AccrualPoller>,
    request_id: RequestId,
    user: AuthenticatedUser,
    body: web::Bytes,
) -> Result<HttpResponse> {
    if body.is_empty() {
        return Err(LedgerError::BadRequest("order number is required".to_string()));
    }
    let number = std::str::from_utf8(&body)
        .map_err(|_| LedgerError::InvalidOrderNumber)?
        .to_string();
    // rejected before a connection is even checked out
    if !crate::order_number::is_valid(&number) {
        return Err(LedgerError::InvalidOrderNumber);
    }

    let mut conn = db.get()?;
    let number1 = number.clone();
    let res = web::block(move || orders::submit_order(conn.deref_mut(), &number1, user.user_id)).await??;

    match res {
        SubmitOrderResult::Accepted => {
            info!(order = %number, "order accepted");
            // fire and forget, the poll outlives this request
            drop(poller.spawn(number));
            Ok(HttpResponse::Accepted().json(serde_json::json!({ "message": "Order accepted for processing" })))
        }
        SubmitOrderResult::AlreadySubmitted => {
            Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Order was already submitted by this user" })))
        }
        SubmitOrderResult::Conflict => Err(LedgerError::OrderConflict),
    }
}

#[get("/api/user/orders")]
#[instrument(skip(db), fields(request_id = request_id.as_str(), user_id = user.user_id))]
pub async fn list_orders_handler(
    db: web::Data<DbPool>,
    request_id: RequestId,
    user: AuthenticatedUser,
) -> Result<HttpResponse> {
    let mut conn = db.get()?;
    let user_orders = web::block(move || orders::list_orders(conn.deref_mut(), user.user_id)).await??;
    Ok(responses::list_http_response(
        user_orders.into_iter().map(OrderData::from).collect(),
    ))
}

#[get("/api/user/balance")]
#[instrument(skip(db), fields(request_id = request_id.as_str(), user_id = user.user_id))]
pub async fn balance_handler(
    db: web::Data<DbPool>,
    request_id: RequestId,
    user: AuthenticatedUser,
) -> Result<HttpResponse> {
    let mut conn = db.get()?;
    let user_balance = web::block(move || balance::get_balance(conn.deref_mut(), user.user_id))
        .await??
        .ok_or_else(|| LedgerError::Internal(format!("no balance row for user {}", user.user_id)))?;
    Ok(HttpResponse::Ok().json(BalanceData::from(user_balance)))
}

#[post("/api/user/balance/withdraw")]
#[instrument(skip(db, body), fields(request_id = request_id.as_str(), user_id = user.user_id))]
pub async fn withdraw_handler(
    db: web::Data<DbPool>,
    request_id: RequestId,
    user: AuthenticatedUser,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let input: WithdrawInput =
        serde_json::from_slice(&body).map_err(|e| LedgerError::BadRequest(format!("invalid withdrawal: {e}")))?;
    // format failures never open a transaction
    withdrawals::validate_request(&input.order, &input.sum)?;

    let mut conn = db.get()?;
    let res = web::block(move || withdrawals::withdraw(conn.deref_mut(), user.user_id, &input.order, input.sum)).await??;

    match res {
        WithdrawResult::Completed => Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Withdrawal completed" }))),
        WithdrawResult::InsufficientFunds => Err(LedgerError::InsufficientFunds),
    }
}

#[get("/api/user/withdrawals")]
#[instrument(skip(db), fields(request_id = request_id.as_str(), user_id = user.user_id))]
pub async fn withdrawals_handler(
    db: web::Data<DbPool>,
    request_id: RequestId,
    user: AuthenticatedUser,
) -> Result<HttpResponse> {
    let mut conn = db.get()?;
    let records = web::block(move || withdrawals::list_withdrawals(conn.deref_mut(), user.user_id)).await??;
    Ok(responses::list_http_response(
        records.into_iter().map(WithdrawalData::from).collect(),
    ))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(register_handler)
        .service(login_handler)
        .service(submit_order_handler)
        .service(list_orders_handler)
        .service(balance_handler)
        .service(withdraw_handler)
        .service(withdrawals_handler);
}
