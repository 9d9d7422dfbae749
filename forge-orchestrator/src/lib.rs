pub mod bootstrap;
pub mod config;
pub mod github;
pub mod launcher;
pub mod poller;
pub mod run;
pub mod teardown;
