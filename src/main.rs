mod database;
mod engine;
mod error;
mod handlers;
mod models;

use axum::{
    routing::{delete, get, post},
    Router,
};
use dotenvy::dotenv;
use std::env;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use database::{create_database_pool, Database};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    // Initialize database
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let db = create_database_pool(&database_url)
        .await
        .expect("Failed to connect to database");

    // Build the application router
    let app = create_router(db);

    // Get port from environment or use default
    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{}", port);

    println!("🚀 Boomerang returns service starting on http://{}", addr);

    // Start the server
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

fn create_router(db: Database) -> Router {
    Router::new()
        // Return lifecycle
        .route("/returns", post(handlers::returns::create_return))
        .route("/returns", get(handlers::returns::list_returns))
        .route("/returns/:id", get(handlers::returns::get_return))
        .route("/returns/:id/validate", post(handlers::returns::validate_return))
        .route("/returns/:id/process", post(handlers::returns::process_return))
        .route("/returns/:id/cancel", post(handlers::returns::cancel_return))
        .route("/returns/:id/totals", get(handlers::returns::get_return_totals))
        // Draft line edits
        .route("/returns/:id/lines", post(handlers::returns::add_line))
        .route("/returns/:id/lines/:line_id", delete(handlers::returns::remove_line))
        // Quality inspection
        .route("/return-lines/:id/inspect", post(handlers::returns::inspect_line))
        // Ledger reads
        .route("/sold-lines/:id/returnable", get(handlers::returns::sold_line_returnable))
        // Stock and scrap
        .route("/products/:id/sellable", get(handlers::stock::product_sellable))
        .route("/products/:id/stock", get(handlers::stock::product_stock_levels))
        .route("/scrap-items", get(handlers::stock::list_scrap_items))
        .route("/scrap-items/:id/receive", post(handlers::stock::receive_scrap))
        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(db)
}
