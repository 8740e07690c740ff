// Infrastructure layer
pub mod file_system;
pub mod processors;
pub mod server;
pub mod watch;

pub use file_system::*;
pub use processors::*;
pub use server::*;
pub use watch::*;
