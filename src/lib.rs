pub mod acquisition;
pub mod channel;
pub mod command;
pub mod device;
pub mod reading;
pub mod store;
pub mod telemetry;
