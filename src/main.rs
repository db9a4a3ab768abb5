use std::io;
use std::sync::Arc;

use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};

use honey_kitchen::db::MongoStore;
use honey_kitchen::middleware::AuthMiddleware;
use honey_kitchen::store::{MemoryStore, Store};
use honey_kitchen::{routes, seed, AppState, Config};

fn to_io(err: honey_kitchen::ShopError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let config = Config::from_env().map_err(|e| {
        log::error!("Failed to load configuration: {e}");
        to_io(e)
    })?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => Arc::new(
            MongoStore::connect(url, &config.database_name)
                .await
                .map_err(to_io)?,
        ),
        None => {
            log::warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    if let Some(path) = &config.seed_file {
        let catalog = seed::read(path).map_err(to_io)?;
        seed::apply(store.as_ref(), catalog).await.map_err(to_io)?;
    }

    let address = config.bind_address();
    let jwt_secret = config.jwt_secret.clone();
    let state = AppState::new(store, config);

    log::info!("Starting storefront on {address}");
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(AuthMiddleware::new(jwt_secret.clone()))
            .wrap(Logger::default())
            .configure(routes::configure)
    })
    .bind(&address)?
    .run()
    .await
}
