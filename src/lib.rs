pub mod db;
pub mod error;
mod migrations;
pub mod notification;
pub mod state;
pub mod sync;
pub mod types;
