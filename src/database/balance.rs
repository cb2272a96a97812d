use bigdecimal::{BigDecimal, Signed};
use diesel::{ExpressionMethods, OptionalExtension, PgConnection, QueryDsl, RunQueryDsl};

use crate::database::models::Balance;
use crate::errors::{LedgerError, Result};

#[derive(Debug, PartialEq, Eq)]
pub enum DebitResult {
    Debited,
    InsufficientFunds,
}

// creates the zero balance; runs in the same transaction as the user insert
pub fn create_for_user(conn: &mut PgConnection, req_user_id: i64) -> Result<()> {
    use crate::schema::user_balance::dsl::*;
    diesel::insert_into(user_balance)
        .values((
            user_id.eq(req_user_id),
            current.eq(BigDecimal::from(0)),
            withdrawn.eq(BigDecimal::from(0)),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn get_balance(conn: &mut PgConnection, req_user_id: i64) -> Result<Option<Balance>> {
    use crate::schema::user_balance::dsl::*;
    let balance = user_balance
        .filter(user_id.eq(req_user_id))
        .first::<Balance>(conn)
        .optional()?;
    Ok(balance)
}

// load user balance record and lock for update
fn lock_balance(conn: &mut PgConnection, req_user_id: i64) -> Result<Balance> {
    use crate::schema::user_balance::dsl::*;
    let balance = user_balance
        .filter(user_id.eq(req_user_id))
        .for_update()
        .first::<Balance>(conn)?;
    Ok(balance)
}

// must run inside the transaction that marks the paying order PROCESSED
pub fn credit(conn: &mut PgConnection, req_user_id: i64, amount: &BigDecimal) -> Result<Balance> {
    if amount.is_negative() {
        return Err(LedgerError::InvalidAmount(amount.to_string()));
    }
    let balance = lock_balance(conn, req_user_id)?;
    let current_after = &balance.current + amount;
    {
        use crate::schema::user_balance::dsl::*;
        diesel::update(user_balance.filter(user_id.eq(req_user_id)))
            .set(current.eq(&current_after))
            .execute(conn)?;
    }
    Ok(Balance {
        current: current_after,
        ..balance
    })
}

// must run inside the transaction that records the withdrawal
pub fn debit(conn: &mut PgConnection, req_user_id: i64, amount: &BigDecimal) -> Result<DebitResult> {
    if !amount.is_positive() {
        return Err(LedgerError::InvalidAmount(amount.to_string()));
    }
    let balance = lock_balance(conn, req_user_id)?;
    if &balance.current < amount {
        return Ok(DebitResult::InsufficientFunds);
    }
    {
        use crate::schema::user_balance::dsl::*;
        diesel::update(user_balance.filter(user_id.eq(req_user_id)))
            .set((
                current.eq(&balance.current - amount),
                withdrawn.eq(&balance.withdrawn + amount),
            ))
            .execute(conn)?;
    }
    Ok(DebitResult::Debited)
}
