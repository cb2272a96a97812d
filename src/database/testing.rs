//! Fixtures for tests that talk to Postgres. They run against `DATABASE_URL`
//! (read through dotenvy) and skip themselves when it is not set.

use std::time::Duration;

use bigdecimal::BigDecimal;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::{ExpressionMethods, PgConnection, QueryDsl, RunQueryDsl};
use once_cell::sync::Lazy;

use crate::database::connect::{create_db_connection_pool, run_migrations, DbPool};
use crate::database::users;
use crate::errors::Result;

static TEST_POOL: Lazy<Option<DbPool>> = Lazy::new(|| {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").ok()?;
    let pool = create_db_connection_pool(&database_url, 16).expect("Failed to create test db pool");
    run_migrations(&pool).expect("Failed to run test migrations");
    Some(pool)
});

pub fn db_pool() -> Option<DbPool> {
    TEST_POOL.clone()
}

// never connects: any storage access fails fast with a pool error
pub fn unreachable_pool() -> DbPool {
    let manager = ConnectionManager::<PgConnection>::new("postgres://nobody@127.0.0.1:1/none");
    Pool::builder()
        .min_idle(Some(0))
        .connection_timeout(Duration::from_millis(200))
        .build_unchecked(manager)
}

// user with a fresh zero balance; the hash is never checked
pub fn create_user(conn: &mut PgConnection) -> Result<i64> {
    let username = format!("test_user_{}", fastrand::u64(..));
    users::register(conn, &username, "not-a-real-hash")
}

pub fn set_balance(conn: &mut PgConnection, req_user_id: i64, req_current: i64, req_withdrawn: i64) -> Result<()> {
    use crate::schema::user_balance::dsl::*;
    diesel::update(user_balance.filter(user_id.eq(req_user_id)))
        .set((current.eq(BigDecimal::from(req_current)), withdrawn.eq(BigDecimal::from(req_withdrawn))))
        .execute(conn)?;
    Ok(())
}

// random luhn-valid order number, unique enough to share one database between runs
pub fn random_order_number() -> String {
    let mut digits: Vec<u32> = (0..15).map(|_| fastrand::u32(0..10)).collect();
    for check in 0..10 {
        digits.push(check);
        let number: String = digits.iter().map(|d| char::from(b'0' + *d as u8)).collect();
        if crate::order_number::is_valid(&number) {
            return number;
        }
        digits.pop();
    }
    unreachable!("one check digit always completes a luhn number")
}

#[test]
fn test_random_order_number_is_valid() {
    for _ in 0..100 {
        assert!(crate::order_number::is_valid(&random_order_number()));
    }
}
