use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::auth::TokenKeys;
use storefront::config::Config;
use storefront::gateway::alipay::AlipayClient;
use storefront::store::postgres::PgStore;
use storefront::{api, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let gateway = Arc::new(AlipayClient::new(config.alipay.clone())?);
    let tokens = TokenKeys::new(&config.jwt_secret, config.jwt_ttl);
    let mut state = AppState::new(PgStore::new(pool), gateway, tokens);
    state.echo_sms_codes = config.echo_sms_codes;

    let app = api::create_app(state);
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("storefront listening on {addr}");
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}
