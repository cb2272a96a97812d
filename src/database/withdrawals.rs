use bigdecimal::{BigDecimal, Signed};
use diesel::{Connection, ExpressionMethods, PgConnection, QueryDsl, RunQueryDsl, SelectableHelper};

use crate::database::balance::{self, DebitResult};
use crate::database::idgen;
use crate::database::models::{NewWithdrawal, Withdrawal};
use crate::errors::{LedgerError, Result};

#[derive(Debug, PartialEq, Eq)]
pub enum WithdrawResult {
    Completed,
    InsufficientFunds,
}

// format checks that run before any transaction is opened
pub fn validate_request(req_order_number: &str, req_sum: &BigDecimal) -> Result<()> {
    if !crate::order_number::is_valid(req_order_number) {
        return Err(LedgerError::InvalidOrderNumber);
    }
    if !req_sum.is_positive() {
        return Err(LedgerError::InvalidAmount(req_sum.to_string()));
    }
    Ok(())
}

pub fn withdraw(
    conn: &mut PgConnection,
    req_user_id: i64,
    req_order_number: &str,
    req_sum: BigDecimal,
) -> Result<WithdrawResult> {
    validate_request(req_order_number, &req_sum)?;

    let res = conn.transaction::<_, LedgerError, _>(|conn| {
        if balance::debit(conn, req_user_id, &req_sum)? == DebitResult::InsufficientFunds {
            // nothing written yet, the error only drives the rollback
            return Err(LedgerError::InsufficientFunds);
        }
        use crate::schema::withdrawal::dsl::*;
        diesel::insert_into(withdrawal)
            .values(&NewWithdrawal {
                id: idgen::next(),
                user_id: req_user_id,
                order_number: req_order_number,
                sum: req_sum.clone(),
                processed_at: chrono::Utc::now(),
            })
            .execute(conn)?;
        Ok(())
    });

    match res {
        Ok(()) => Ok(WithdrawResult::Completed),
        Err(LedgerError::InsufficientFunds) => Ok(WithdrawResult::InsufficientFunds),
        Err(e) => Err(e),
    }
}

pub fn list_withdrawals(conn: &mut PgConnection, req_user_id: i64) -> Result<Vec<Withdrawal>> {
    use crate::schema::withdrawal::dsl::*;
    let records = withdrawal
        .filter(user_id.eq(req_user_id))
        .order((processed_at.desc(), id.desc()))
        .select(Withdrawal::as_select())
        .load(conn)?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::testing;
    use std::str::FromStr;

    #[test]
    fn test_validate_request() {
        let hundred = BigDecimal::from(100);
        assert!(validate_request("12345678903", &hundred).is_ok());
        assert!(matches!(
            validate_request("1234567890asdf", &hundred),
            Err(LedgerError::InvalidOrderNumber)
        ));
        // digit sum 21, fails the checksum
        assert!(matches!(validate_request("123456", &hundred), Err(LedgerError::InvalidOrderNumber)));
        assert!(matches!(
            validate_request("12345678903", &BigDecimal::from(0)),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            validate_request("12345678903", &BigDecimal::from_str("-0.01").unwrap()),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_withdraw_full_balance() {
        let Some(pool) = testing::db_pool() else { return };
        let mut conn = pool.get().unwrap();
        conn.test_transaction::<_, LedgerError, _>(|conn| {
            let user = testing::create_user(conn)?;
            testing::set_balance(conn, user, 100, 100)?;

            let res = withdraw(conn, user, "12345678903", BigDecimal::from_str("100.0").unwrap())?;
            assert_eq!(res, WithdrawResult::Completed);

            let balance = balance::get_balance(conn, user)?.unwrap();
            assert_eq!(balance.current, BigDecimal::from(0));
            assert_eq!(balance.withdrawn, BigDecimal::from(200));

            let records = list_withdrawals(conn, user)?;
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].order_number, "12345678903");
            assert_eq!(records[0].sum, BigDecimal::from(100));
            Ok(())
        });
    }

    #[test]
    fn test_insufficient_funds_leaves_no_trace() {
        let Some(pool) = testing::db_pool() else { return };
        let mut conn = pool.get().unwrap();
        conn.test_transaction::<_, LedgerError, _>(|conn| {
            let user = testing::create_user(conn)?;
            testing::set_balance(conn, user, 10, 0)?;

            let res = withdraw(conn, user, "2377225624", BigDecimal::from_str("10.01").unwrap())?;
            assert_eq!(res, WithdrawResult::InsufficientFunds);

            let balance = balance::get_balance(conn, user)?.unwrap();
            assert_eq!(balance.current, BigDecimal::from(10));
            assert_eq!(balance.withdrawn, BigDecimal::from(0));
            assert!(list_withdrawals(conn, user)?.is_empty());
            Ok(())
        });
    }

    #[test]
    fn test_withdrawals_most_recent_first() {
        let Some(pool) = testing::db_pool() else { return };
        let mut conn = pool.get().unwrap();
        conn.test_transaction::<_, LedgerError, _>(|conn| {
            let user = testing::create_user(conn)?;
            testing::set_balance(conn, user, 30, 0)?;
            for number in ["12345678903", "2377225624", "79927398713"] {
                assert_eq!(withdraw(conn, user, number, BigDecimal::from(10))?, WithdrawResult::Completed);
                std::thread::sleep(std::time::Duration::from_millis(5));
            }
            let numbers: Vec<String> = list_withdrawals(conn, user)?.into_iter().map(|w| w.order_number).collect();
            assert_eq!(numbers, vec!["79927398713", "2377225624", "12345678903"]);
            assert_eq!(withdraw(conn, user, "12345678903", BigDecimal::from(1))?, WithdrawResult::InsufficientFunds);
            Ok(())
        });
    }

    #[test]
    fn test_concurrent_withdrawals_stop_at_zero() {
        let Some(pool) = testing::db_pool() else { return };
        let user = {
            let mut conn = pool.get().unwrap();
            let user = testing::create_user(&mut conn).unwrap();
            testing::set_balance(&mut conn, user, 100, 0).unwrap();
            user
        };

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    let mut conn = pool.get().unwrap();
                    withdraw(&mut conn, user, "12345678903", BigDecimal::from(10)).unwrap()
                })
            })
            .collect();
        let completed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|res| *res == WithdrawResult::Completed)
            .count();
        assert_eq!(completed, 10);

        let mut conn = pool.get().unwrap();
        let balance = balance::get_balance(&mut conn, user).unwrap().unwrap();
        assert_eq!(balance.current, BigDecimal::from(0));
        assert_eq!(balance.withdrawn, BigDecimal::from(100));
        assert_eq!(list_withdrawals(&mut conn, user).unwrap().len(), 10);
    }
}
