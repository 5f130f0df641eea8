pub mod config;
pub mod controller;
pub mod engine;
pub mod errors;
pub mod ip_range;
pub mod ip_range_set;
pub mod logging;
pub mod packet_dropper;
pub mod platform;
pub mod profile;
pub mod route_policy;
pub mod settings_writer;
pub mod status;
pub mod tunnel_builder;

#[cfg(test)]
mod ip_range_set_test;
#[cfg(test)]
mod testing;
