use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Processing,
    Processed,
    Invalid,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Processed => "PROCESSED",
            OrderStatus::Invalid => "INVALID",
        }
    }

    // no transitions out of terminal states
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Processed | OrderStatus::Invalid)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "PROCESSED" => Ok(OrderStatus::Processed),
            "INVALID" => Ok(OrderStatus::Invalid),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

// only what login needs
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: i64,
    pub password_hash: String,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser<'a> {
    pub id: i64,
    pub username: &'a str,
    pub password_hash: &'a str,
    pub created_at: DateTime<Utc>,
}

#[derive(Queryable, Debug, Clone, PartialEq)]
pub struct Balance {
    pub user_id: i64,
    pub current: BigDecimal,
    pub withdrawn: BigDecimal,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::orders)]
pub struct Order {
    pub number: String,
    pub user_id: i64,
    pub status: String,
    pub accrual: Option<BigDecimal>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn status(&self) -> Result<OrderStatus, String> {
        self.status.parse()
    }
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::orders)]
pub struct NewOrder<'a> {
    pub number: &'a str,
    pub user_id: i64,
    pub status: &'a str,
    pub accrual: Option<BigDecimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::withdrawal)]
pub struct Withdrawal {
    pub order_number: String,
    pub sum: BigDecimal,
    pub processed_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::withdrawal)]
pub struct NewWithdrawal<'a> {
    pub id: i64,
    pub user_id: i64,
    pub order_number: &'a str,
    pub sum: BigDecimal,
    pub processed_at: DateTime<Utc>,
}
