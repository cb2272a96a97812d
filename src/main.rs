use std::sync::Arc;

use actix_request_identifier::{IdReuse, RequestIdentifier};
use actix_web::web::Data;
use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_actix_web::TracingLogger;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

use crate::accrual::HttpAccrualClient;
use crate::auth::TokenKeys;
use crate::config::{Config, Flags};
use crate::database::connect::{create_db_connection_pool, run_migrations};
use crate::poller::AccrualPoller;
use crate::routes::PasswordCost;

mod accrual;
mod amount;
mod auth;
mod config;
mod database;
mod errors;
mod order_number;
mod poller;
mod responses;
mod routes;
mod schema;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env(&Flags::parse())?;

    // setup tracing and use bunyan formatter
    let max_level = config.log_level;
    let formatting_layer = BunyanFormattingLayer::new("points-ledger".into(), std::io::stdout);
    let subscriber = Registry::default()
        .with(filter_fn(move |metadata| *metadata.level() <= max_level))
        .with(JsonStorageLayer)
        .with(formatting_layer);
    tracing::subscriber::set_global_default(subscriber).context("failed to install tracing subscriber")?;

    let db = create_db_connection_pool(&config.database_url, config.database_pool_size)
        .context("failed to create database connection pool")?;
    run_migrations(&db)?;

    let accrual_client = HttpAccrualClient::new(&config.accrual_system_address, config.poll.request_timeout)
        .context("failed to build accrual client")?;
    let poller = AccrualPoller::new(db.clone(), Arc::new(accrual_client), config.poll.clone());
    let resumed = poller.resume_unfinished().await?;
    info!(count = resumed.len(), "startup polls scheduled");

    let keys = TokenKeys::new(&config.jwt_secret, config.token_ttl);
    let cost = PasswordCost(config.bcrypt_cost);

    let server = actix_web::HttpServer::new(move || {
        actix_web::App::new()
            .wrap(TracingLogger::default())
            .wrap(RequestIdentifier::with_uuid().use_incoming_id(IdReuse::UseIncoming))
            .app_data(Data::new(db.clone()))
            .app_data(Data::new(poller.clone()))
            .app_data(Data::new(keys.clone()))
            .app_data(Data::new(cost))
            .configure(routes::configure)
    });

    info!(address = %config.run_address, "starting server");
    server
        .bind(&config.run_address)
        .with_context(|| format!("failed to bind {}", config.run_address))?
        .run()
        .await?;
    Ok(())
}
