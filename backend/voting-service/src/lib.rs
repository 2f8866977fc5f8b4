pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod repository;
pub mod services;
pub mod state;
pub mod workers;

pub use config::Config;
pub use error::{ServiceError, ServiceResult};
pub use state::{Stores, VotingCore};
