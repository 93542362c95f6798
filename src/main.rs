use actix_web::{web, App, HttpServer};
use book_capture::app_state::AppState;
use book_capture::config::Config;
use book_capture::metrics::RenderMetrics;
use book_capture::{logging, routes};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(e) = logging::init() {
        eprintln!("Failed to initialise logging: {}", e);
    }

    let cfg = Config::load();

    let engine = Arc::new(cfg.create_engine());
    let orchestrator = cfg
        .build_orchestrator(engine, Arc::new(RenderMetrics::new()))
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    log::info!("Capture pipeline initialized:");
    log::info!("  Frontend: {}", orchestrator.origin());
    log::info!("  Max concurrent renders: {}", cfg.render.max_concurrent_renders);
    log::info!("  Navigation timeout: {}s", cfg.render.navigation_timeout_secs);
    log::info!("  Readiness timeout: {}s", cfg.render.readiness_timeout_secs);
    log::info!("  Headless: {}", cfg.browser.headless);

    let data = web::Data::new(AppState::new(orchestrator));

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .configure(routes::configure)
    });
    if let Some(workers) = cfg.server.workers {
        server = server.workers(workers);
    }

    let addr = (cfg.server.host.clone(), cfg.server.port);
    let server = server.bind(&addr)?;
    log::info!("Listening on {}:{}", addr.0, addr.1);
    server.run().await
}
