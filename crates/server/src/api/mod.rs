pub mod handlers;
pub mod history;
pub mod middleware;
pub mod routes;

pub use routes::create_router;
