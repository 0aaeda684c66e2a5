pub mod client_controller;
pub mod config;
pub mod matchmaking;
pub mod poller;
pub mod remote;
pub mod store;
pub mod sync;
pub mod turn;
