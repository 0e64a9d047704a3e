use std::io::{self, ErrorKind};
use std::net::{SocketAddr, ToSocketAddrs};

use crate::assembly::Assembly;
use crate::config::Config;
use crate::error::{ExtensionError, PieceError, Result};
use crate::peer::connection::Connection;
use crate::peer::extension::{self, ExtensionParameters};
use crate::peer::handshake;
use crate::peer::message::{extended, Message, MetadataMessage};

/// Where a session is in its single connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Connecting,
    Handshaking,
    ExtensionHandshaking,
    RequestingPieces,
    Assembling,
    Done,
    Failed,
}

/// Fetches the info dictionary of one torrent from one peer over one
/// connection. A session runs once: any failure ends it, retrying means
/// creating a new one.
#[derive(Debug)]
pub struct Session {
    addr: String,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    config: Config,
    state: State,
    params: Option<ExtensionParameters>,
    remote_peer_id: Option<[u8; 20]>,
}

impl Session {
    pub fn new(
        addr: impl Into<String>,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
        config: Config,
    ) -> Session {
        Session {
            addr: addr.into(),
            info_hash,
            peer_id,
            config,
            state: State::Idle,
            params: None,
            remote_peer_id: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// What the peer announced in its extension handshake, once known.
    pub fn parameters(&self) -> Option<ExtensionParameters> {
        self.params
    }

    pub fn remote_peer_id(&self) -> Option<[u8; 20]> {
        self.remote_peer_id
    }

    /// Runs the whole exchange and returns the verified metadata bytes. The
    /// connection is closed on every exit path.
    pub fn fetch(&mut self) -> Result<Vec<u8>> {
        if self.state != State::Idle {
            return Err(io::Error::new(ErrorKind::Other, "session has already run").into());
        }
        if self.config.local_metadata_id == 0 {
            self.state = State::Failed;
            return Err(ExtensionError::InvalidUtMetadata(0).into());
        }

        let result = self.run();
        match &result {
            Ok(metadata) => {
                self.state = State::Done;
                log::info!("Fetched {} bytes of metadata from {}", metadata.len(), self.addr);
            }
            Err(e) => {
                log::warn!("Metadata session with {} failed in {:?}: {}", self.addr, self.state, e);
                self.state = State::Failed;
            }
        }
        result
    }

    fn run(&mut self) -> Result<Vec<u8>> {
        self.state = State::Connecting;
        let addrs = resolve(&self.addr)?;
        let mut connection = dial(&addrs, &self.config)?;
        let addr = connection.addr();

        self.state = State::Handshaking;
        connection.set_deadline(self.config.handshake_timeout);
        let reply = handshake::exchange(&mut connection, self.info_hash, self.peer_id)?;
        self.remote_peer_id = Some(reply.peer_id);

        self.state = State::ExtensionHandshaking;
        connection.set_deadline(self.config.handshake_timeout);
        let params = extension::negotiate(&mut connection, self.config.local_metadata_id)?;
        self.params = Some(params);

        self.state = State::RequestingPieces;
        connection.set_deadline(self.config.metadata_timeout);
        let mut assembly = Assembly::new(params);
        for index in 0..assembly.piece_count() {
            let request = MetadataMessage::request(index)
                .serialize()
                .map_err(|e| PieceError::Malformed(e.to_string()))?;
            connection.write_frame(&extended(params.peer_metadata_id, &request))?;
        }
        log::debug!("Requested {} pieces from {}", assembly.piece_count(), addr);

        self.state = State::Assembling;
        while !assembly.is_complete() {
            match Message::deserialize(connection.read_frame()?) {
                Message::Extended { id, payload } if id == self.config.local_metadata_id => {
                    let msg = MetadataMessage::deserialize(&payload)?;
                    let index = assembly.store(msg)?;
                    log::debug!(
                        "Stored piece {} ({}/{})",
                        index,
                        assembly.received(),
                        assembly.piece_count()
                    );
                }
                other => log::trace!("Skipping {:?}", other),
            }
        }

        let metadata = assembly.finish(&self.info_hash)?;
        if let Err(e) = connection.close() {
            log::warn!("Failed to close connection to {}: {}", addr, e);
        }
        Ok(metadata)
    }
}

fn resolve(addr: &str) -> io::Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = addr.to_socket_addrs()?.collect();
    if addrs.is_empty() {
        return Err(io::Error::new(
            ErrorKind::AddrNotAvailable,
            format!("{} resolved to no address", addr),
        ));
    }
    Ok(addrs)
}

/// Tries every address in order, each with the full dial timeout. The last
/// failure is returned when none of them connects.
fn dial(addrs: &[SocketAddr], config: &Config) -> io::Result<Connection> {
    let mut last_err = io::Error::new(ErrorKind::AddrNotAvailable, "no address to dial");
    for &addr in addrs {
        match Connection::connect(addr, config.dial_timeout, config.max_frame_len) {
            Ok(connection) => return Ok(connection),
            Err(e) => {
                log::debug!("Dialing {} failed: {}", addr, e);
                last_err = e;
            }
        }
    }
    Err(last_err)
}
