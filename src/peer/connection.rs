use byteorder::{BigEndian, ByteOrder};
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};
use std::io::{Error, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

const PEER: Token = Token(0);

/// Blocking, deadline-bound access to one peer. The socket is non-blocking
/// underneath, every wait goes through `poll` with whatever time is left
/// until the deadline.
pub struct Connection {
    stream: TcpStream,
    poll: Poll,
    events: Events,
    addr: SocketAddr,
    deadline: Option<Instant>,
    max_frame_len: usize,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("addr", &self.addr)
            .field("deadline", &self.deadline)
            .field("max_frame_len", &self.max_frame_len)
            .finish()
    }
}

impl Connection {
    /// Dials `addr`, failing with `TimedOut` if the connection is not
    /// established within `timeout`.
    pub fn connect(
        addr: SocketAddr,
        timeout: Duration,
        max_frame_len: usize,
    ) -> Result<Connection, Error> {
        let poll = Poll::new()?;
        let mut stream = TcpStream::connect(addr)?;
        poll.registry()
            .register(&mut stream, PEER, Interest::READABLE | Interest::WRITABLE)?;

        let mut connection = Connection {
            stream,
            poll,
            events: Events::with_capacity(16),
            addr,
            deadline: None,
            max_frame_len,
        };
        connection.set_deadline(timeout);

        loop {
            connection.wait()?;
            if let Some(err) = connection.stream.take_error()? {
                return Err(err);
            }
            match connection.stream.peer_addr() {
                Ok(_) => break,
                Err(e) if e.kind() == ErrorKind::NotConnected => continue,
                Err(e) => return Err(e),
            }
        }

        log::info!("Connected to {}", addr);
        Ok(connection)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Every following read and write must finish within `timeout` from now.
    pub fn set_deadline(&mut self, timeout: Duration) {
        self.deadline = Some(Instant::now() + timeout);
    }

    /// Writes `payload` behind its 4-byte big-endian length.
    pub fn write_frame(&mut self, payload: &[u8]) -> Result<(), Error> {
        let len = u32::try_from(payload.len())
            .map_err(|_| Error::new(ErrorKind::InvalidInput, "frame too long"))?;
        let mut frame = vec![0; 4 + payload.len()];
        BigEndian::write_u32(&mut frame[..4], len);
        frame[4..].copy_from_slice(payload);
        self.write_all(&frame)?;

        log::trace!("Sent {} byte frame to {}", payload.len(), self.addr);
        Ok(())
    }

    /// Reads one length-prefixed frame, an empty payload is a keep-alive.
    pub fn read_frame(&mut self) -> Result<Vec<u8>, Error> {
        let mut header = [0u8; 4];
        self.read_exact(&mut header)?;
        let len = BigEndian::read_u32(&header) as usize;
        if len > self.max_frame_len {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("frame of {} bytes exceeds limit of {}", len, self.max_frame_len),
            ));
        }

        let mut payload = vec![0; len];
        self.read_exact(&mut payload)?;

        log::trace!("Received {} byte frame from {}", len, self.addr);
        Ok(payload)
    }

    pub fn write_all(&mut self, mut buf: &[u8]) -> Result<(), Error> {
        self.check_deadline()?;
        while !buf.is_empty() {
            match self.stream.write(buf) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(n) => buf = &buf[n..],
                Err(e) if e.kind() == ErrorKind::WouldBlock => self.wait()?,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        self.check_deadline()?;
        let mut filled = 0;
        while filled < buf.len() {
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(Error::new(
                        ErrorKind::UnexpectedEof,
                        format!("peer closed after {} of {} bytes", filled, buf.len()),
                    ))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => self.wait()?,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Closes the connection to the peer
    pub fn close(&mut self) -> Result<(), Error> {
        match self.stream.shutdown(std::net::Shutdown::Both) {
            Err(e) if e.kind() != ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        }
    }

    fn check_deadline(&self) -> Result<(), Error> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(timed_out()),
            _ => Ok(()),
        }
    }

    /// Blocks until the socket reports any readiness or the deadline passes.
    fn wait(&mut self) -> Result<(), Error> {
        loop {
            let timeout = match self.deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(timed_out());
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            match self.poll.poll(&mut self.events, timeout) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
            if !self.events.is_empty() {
                return Ok(());
            }
        }
    }
}

fn timed_out() -> Error {
    Error::new(ErrorKind::TimedOut, "deadline exceeded")
}
