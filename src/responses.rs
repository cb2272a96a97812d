use actix_web::cookie::{time, Cookie};
use actix_web::http::header;
use actix_web::HttpResponse;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::TOKEN_COOKIE;
use crate::database::models::{Balance, Order, Withdrawal};

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawInput {
    pub order: String,
    #[serde(deserialize_with = "crate::amount::deserialize")]
    pub sum: BigDecimal,
}

#[derive(Debug, Serialize)]
pub struct OrderData {
    pub number: String,
    pub status: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "crate::amount::serialize_option"
    )]
    pub accrual: Option<BigDecimal>,
    pub uploaded_at: DateTime<Utc>,
}

impl From<Order> for OrderData {
    fn from(order: Order) -> Self {
        Self {
            number: order.number,
            status: order.status,
            accrual: order.accrual,
            uploaded_at: order.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceData {
    #[serde(serialize_with = "crate::amount::serialize")]
    pub current: BigDecimal,
    #[serde(serialize_with = "crate::amount::serialize")]
    pub withdrawn: BigDecimal,
}

impl From<Balance> for BalanceData {
    fn from(balance: Balance) -> Self {
        Self {
            current: balance.current,
            withdrawn: balance.withdrawn,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WithdrawalData {
    pub order: String,
    #[serde(serialize_with = "crate::amount::serialize")]
    pub sum: BigDecimal,
    pub processed_at: DateTime<Utc>,
}

impl From<Withdrawal> for WithdrawalData {
    fn from(withdrawal: Withdrawal) -> Self {
        Self {
            order: withdrawal.order_number,
            sum: withdrawal.sum,
            processed_at: withdrawal.processed_at,
        }
    }
}

// token goes out both as a header and as an http-only cookie
pub fn token_http_response(token: &str, ttl: std::time::Duration, message: &str) -> HttpResponse {
    let cookie = Cookie::build(TOKEN_COOKIE, token.to_string())
        .path("/")
        .http_only(true)
        .max_age(time::Duration::seconds(ttl.as_secs() as i64))
        .finish();
    HttpResponse::Ok()
        .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
        .cookie(cookie)
        .json(serde_json::json!({ "message": message }))
}

// empty collections are answered with 204, not an empty array
pub fn list_http_response<T: Serialize>(items: Vec<T>) -> HttpResponse {
    if items.is_empty() {
        HttpResponse::NoContent().finish()
    } else {
        HttpResponse::Ok().json(items)
    }
}
