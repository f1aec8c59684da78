pub mod exec;
pub mod health;
pub mod heartbeat;
pub mod screens;
pub mod selection;
