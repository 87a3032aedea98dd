use user_accounts::{app, config::AppConfig, state::AppState, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    telemetry::init();

    let config = AppConfig::from_env()?;
    tracing::info!(
        registration = ?config.policy.registration,
        update = ?config.policy.update,
        token_ttl_minutes = config.jwt.ttl_minutes,
        "configuration loaded"
    );

    let (host, port) = (config.host.clone(), config.port);
    let state = AppState::init(config).await?;
    state.bootstrap().await?;

    app::serve(app::build_app(state), &host, port).await
}
