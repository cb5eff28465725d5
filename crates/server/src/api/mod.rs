pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod scraper;
pub mod ws;

pub use routes::create_router;
