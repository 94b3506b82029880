pub mod manager;
pub mod models;
pub mod router;

pub use manager::{DatabaseError, DatabaseManager};
pub use router::{SessionCheck, TenantConnectionRouter};
