// kiln: build pipeline and live-reload dev server for browser games

pub mod cli;
pub mod core;
pub mod infrastructure;
pub mod utils;
