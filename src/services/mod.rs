pub mod external_api_service;
pub mod user_service;

pub use external_api_service::{ExternalApiError, ExternalApiService, ExternalResponse};
pub use user_service::{NewUser, UserError, UserService};
