pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod routes;

pub use error::{ApiError, ErrorResponse};
pub use handlers::AppState;
pub use routes::create_api_router;
