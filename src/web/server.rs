use actix_web::{web, App, HttpServer};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::player::playback::PlaybackCoordinator;
use crate::shutdown::Shutdown;
use crate::web::handlers::{clip_info, index, play};

pub async fn run_player_server(
    config: Arc<Config>,
    player: PlaybackCoordinator,
    shutdown: Shutdown,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port).parse::<SocketAddr>()?;

    let config_data = web::Data::from(config);
    let player_data = web::Data::new(player);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(config_data.clone())
            .app_data(player_data.clone())
            .service(index)
            .service(clip_info)
            .service(play)
    })
    .bind(addr)?;

    info!("Starting player server on: {addr}");

    let server = server.run();
    let handle = server.handle();

    tokio::select! {
        result = server => result?,
        _ = shutdown.wait() => {
            info!("Shutdown signal received, stopping player server");
            handle.stop(true).await;
        }
    }

    Ok(())
}
