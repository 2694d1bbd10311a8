use anyhow::Result;

use fundflow::config::AppConfig;
use fundflow::{logging, schema, server};

#[tokio::main]
async fn main() -> Result<()> {
    let role = std::env::args().nth(1).unwrap_or_else(|| "all".to_string());
    let env = std::env::var("FF_ENV").unwrap_or_else(|_| "dev".to_string());

    let config = AppConfig::load(&env)?;
    let _guard = logging::init_logging(&config, &role);

    tracing::info!(
        "fundflow starting (role={}, env={}, build={})",
        role,
        env,
        env!("GIT_HASH")
    );

    let pool = server::connect_pool(&config).await?;
    schema::init_schema(&pool).await?;

    match role.as_str() {
        "coordinator" => {
            let (router, sweeper) = server::coordinator_app(&config, pool);
            tokio::spawn(sweeper.run());
            server::serve(router, &config.gateway.host, config.gateway.port, "coordinator").await
        }
        "participant" => {
            let router = server::participant_app(&config, pool);
            server::serve(
                router,
                &config.participant.host,
                config.participant.port,
                "participant",
            )
            .await
        }
        "all" => {
            let (coordinator_router, sweeper) = server::coordinator_app(&config, pool.clone());
            let participant_router = server::participant_app(&config, pool);
            tokio::spawn(sweeper.run());

            let gateway = config.gateway.clone();
            let participant = config.participant.clone();
            tokio::try_join!(
                server::serve(coordinator_router, &gateway.host, gateway.port, "coordinator"),
                server::serve(
                    participant_router,
                    &participant.host,
                    participant.port,
                    "participant"
                )
            )?;
            Ok(())
        }
        other => anyhow::bail!("unknown role '{}': expected coordinator|participant|all", other),
    }
}
