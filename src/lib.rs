pub mod codec;
pub mod config;
pub mod controller;
pub mod error;
pub mod logger;
pub mod protocol;
pub mod registry;
pub mod sensors;
pub mod server;

mod broadcast;
mod dispatcher;

pub use codec::{DecodeError, PacketType, Request, Slot};
pub use config::ServerConfig;
pub use error::ServerError;
pub use sensors::{FixedSensors, IioSensors, SensorProvider, SensorSnapshot};
pub use server::DsuServer;
