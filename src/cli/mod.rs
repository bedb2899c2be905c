pub mod client;
pub mod rates;
pub mod setup;
pub mod ui;
