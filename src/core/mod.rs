// Core domain layer
pub mod interfaces;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod session;
pub mod steps;

pub use interfaces::*;
pub use models::*;
pub use pipeline::*;
pub use services::*;
pub use session::*;
