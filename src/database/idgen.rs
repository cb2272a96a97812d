use snowflake::SnowflakeIdGenerator;
use std::sync::Mutex;
use std::time::{Duration, UNIX_EPOCH};

const SNOWFLAKE_EPOCH: u64 = 1669205840566;

// ids for users and withdrawals; orders are keyed by their number
static GENERATOR: once_cell::sync::Lazy<Mutex<SnowflakeIdGenerator>> = once_cell::sync::Lazy::new(|| {
    let epoch = UNIX_EPOCH + Duration::from_millis(SNOWFLAKE_EPOCH);
    let machine_id = fastrand::i32(0..32);
    let node_id = fastrand::i32(0..32);
    Mutex::new(SnowflakeIdGenerator::with_epoch(machine_id, node_id, epoch))
});

pub fn next() -> i64 {
    match GENERATOR.lock() {
        Ok(mut generator) => generator.generate(),
        Err(poisoned) => poisoned.into_inner().generate(),
    }
}
