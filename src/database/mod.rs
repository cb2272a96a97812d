pub mod balance;
pub mod connect;
pub mod idgen;
pub mod models;
pub mod orders;
pub mod users;
pub mod withdrawals;

#[cfg(test)]
pub mod testing;
