use bigdecimal::BigDecimal;
use diesel::{Connection, ExpressionMethods, OptionalExtension, PgConnection, QueryDsl, RunQueryDsl, SelectableHelper};

use crate::database::models::{NewOrder, Order, OrderStatus};
use crate::errors::{LedgerError, Result};

#[derive(Debug, PartialEq, Eq)]
pub enum SubmitOrderResult {
    Accepted,
    AlreadySubmitted,
    Conflict,
}

fn classify(owner_id: i64, req_user_id: i64) -> SubmitOrderResult {
    if owner_id == req_user_id {
        SubmitOrderResult::AlreadySubmitted
    } else {
        SubmitOrderResult::Conflict
    }
}

fn find_owner(conn: &mut PgConnection, req_number: &str) -> Result<Option<i64>> {
    use crate::schema::orders::dsl::*;
    let owner = orders
        .filter(number.eq(req_number))
        .select(user_id)
        .first::<i64>(conn)
        .optional()?;
    Ok(owner)
}

// registers a new PENDING order; the primary key decides who owns a contested number
pub fn submit_order(conn: &mut PgConnection, req_number: &str, req_user_id: i64) -> Result<SubmitOrderResult> {
    if !crate::order_number::is_valid(req_number) {
        return Err(LedgerError::InvalidOrderNumber);
    }

    conn.transaction::<_, LedgerError, _>(|conn| {
        // fast path: the number is already known
        if let Some(owner_id) = find_owner(conn, req_number)? {
            return Ok(classify(owner_id, req_user_id));
        }

        let now = chrono::Utc::now();
        let inserted = {
            use crate::schema::orders::dsl::*;
            diesel::insert_into(orders)
                .values(&NewOrder {
                    number: req_number,
                    user_id: req_user_id,
                    status: OrderStatus::Pending.as_str(),
                    accrual: None,
                    created_at: now,
                    updated_at: now,
                })
                .on_conflict(number)
                .do_nothing()
                .execute(conn)?
        };
        if inserted == 1 {
            return Ok(SubmitOrderResult::Accepted);
        }

        // a concurrent submission won the insert, see who owns it now
        let owner_id = find_owner(conn, req_number)?
            .ok_or_else(|| LedgerError::Internal(format!("order {req_number} vanished after conflicting insert")))?;
        Ok(classify(owner_id, req_user_id))
    })
}

// loads the order and locks its row until the enclosing transaction ends
pub fn lock_order(conn: &mut PgConnection, req_number: &str) -> Result<Option<Order>> {
    use crate::schema::orders::dsl::*;
    let order = orders
        .filter(number.eq(req_number))
        .select(Order::as_select())
        .for_update()
        .first(conn)
        .optional()?;
    Ok(order)
}

// must run inside the same transaction as the matching balance credit
pub fn update_order_result(
    conn: &mut PgConnection,
    req_number: &str,
    req_status: OrderStatus,
    req_accrual: Option<BigDecimal>,
) -> Result<()> {
    use crate::schema::orders::dsl::*;
    let updated = diesel::update(orders.filter(number.eq(req_number)))
        .set((
            status.eq(req_status.as_str()),
            accrual.eq(req_accrual),
            updated_at.eq(chrono::Utc::now()),
        ))
        .execute(conn)?;
    if updated != 1 {
        return Err(LedgerError::Database(diesel::result::Error::NotFound));
    }
    Ok(())
}

pub fn list_orders(conn: &mut PgConnection, req_user_id: i64) -> Result<Vec<Order>> {
    use crate::schema::orders::dsl::*;
    let user_orders = orders
        .filter(user_id.eq(req_user_id))
        .order((updated_at.desc(), number.desc()))
        .select(Order::as_select())
        .load(conn)?;
    Ok(user_orders)
}

// numbers still waiting for a final accrual result
pub fn unfinished_orders(conn: &mut PgConnection) -> Result<Vec<String>> {
    use crate::schema::orders::dsl::*;
    let numbers = orders
        .filter(status.eq_any([OrderStatus::Pending.as_str(), OrderStatus::Processing.as_str()]))
        .order(created_at.asc())
        .select(number)
        .load::<String>(conn)?;
    Ok(numbers)
}
