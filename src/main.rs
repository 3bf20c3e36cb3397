use std::sync::Arc;

use rocket::launch;

use musicflow::config::Config;
use musicflow::handlers::build_rocket;
use musicflow::services::gateway::HttpGateway;

#[launch]
fn rocket() -> rocket::Rocket<rocket::Build> {
    // Initialize logging
    env_logger::init();

    let config = Config::from_env();

    println!("============================================================");
    println!("MusicFlow - music search, streaming and download companion");
    println!("============================================================");
    println!("Data directory:   {}", config.data_dir.display());
    println!("Search gateway:   {}", config.gateway_search_url);
    println!("Download gateway: {}", config.gateway_download_url);
    println!(
        "Stream resolution timeout: {}s, search memo capacity: {}",
        config.resolve_timeout_secs, config.search_cache_capacity
    );
    println!("🌐 Server starting at: http://{}:{}", config.host, config.port);
    println!("============================================================");

    let gateway = match HttpGateway::new(&config) {
        Ok(gateway) => Arc::new(gateway),
        Err(e) => {
            eprintln!("Failed to initialize the upstream HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    build_rocket(config, gateway)
}
