// Processors module
pub mod bundler;
pub mod helpers;
pub mod minifier;

pub use bundler::*;
pub use minifier::*;
