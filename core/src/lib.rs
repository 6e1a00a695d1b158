pub mod clock;
pub mod config;
pub mod crop_subsystem;
pub mod data;
pub mod economics_subsystem;
pub mod energy_subsystem;
pub mod engine;
pub mod error;
pub mod event;
pub mod inventory_subsystem;
pub mod metrics;
pub mod policy;
pub mod rng;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod synthetic_data;
pub mod types;
pub mod water_subsystem;
