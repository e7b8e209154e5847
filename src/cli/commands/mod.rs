//! CLI command implementations

pub mod backup;
pub mod config;
pub mod flush;
pub mod get;
pub mod large;
pub mod set;
pub mod status;

pub use backup::execute as backup;
pub use config::execute as config;
pub use flush::execute as flush;
pub use get::execute as get;
pub use large::execute as large;
pub use set::execute as set;
pub use status::execute as status;
