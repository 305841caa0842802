pub mod import;
pub mod utils;
