pub mod admin;
pub mod logging;
