pub mod assembly;
pub mod bitfield;
pub mod config;
pub mod error;
pub mod metainfo;
pub mod session;
pub mod utils;

pub mod peer {
    pub mod connection;
    pub mod extension;
    pub mod handshake;
    pub mod message;
}

pub use config::Config;
pub use error::{Error, Result};
pub use session::{Session, State};
