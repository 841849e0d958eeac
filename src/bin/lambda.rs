use image_inquiry::{config::log_level_from_env, create_state, init_tracing, router, Config};
use lambda_http::{run, Error};

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing(&log_level_from_env());
    let config = Config::from_env();

    let state = create_state(config).await?;

    run(router(state)).await
}
