use std::io;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, trace};

use crate::protocol::{
    codec, Command, CommandFrame, HandshakePacket, HandshakeResponse, OkPacket, SCRAMBLE_LEN,
};
use crate::server::connection::ConnectionError;
use crate::server::context::ServerContext;

/// Non-blocking socket seam the state machine drives.
///
/// Would-block must surface as `io::ErrorKind::WouldBlock`; it is the
/// machine's suspension signal, never an error.
pub trait Transport {
    /// Attempts one read into `buf`. `Ok(0)` means the peer closed the
    /// connection.
    fn try_read_buf(&mut self, buf: &mut BytesMut) -> io::Result<usize>;

    /// Attempts one write, returning the number of bytes accepted.
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

impl Transport for tokio::net::TcpStream {
    fn try_read_buf(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        tokio::net::TcpStream::try_read_buf(self, buf)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        tokio::net::TcpStream::try_write(self, buf)
    }
}

/// Protocol phase of one connection. Exactly one value at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Populate the handshake context. Never suspends.
    Init,
    /// Flush the initial handshake packet to the client.
    HandshakeWrite,
    /// Read and validate the client's handshake response.
    HandshakeRead,
    /// Flush the ready-for-command acknowledgement.
    HandshakeDone,
    /// Read one command frame.
    PrepareCommand,
    /// Flush a command's result, then return to `PrepareCommand`.
    WritePending,
    /// Terminal.
    Closed,
}

/// Readiness direction a suspended machine is waiting on. The driver must
/// hold exactly one subscription at a time; a new suspension replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// Why a connection reached `Phase::Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent a QUIT command.
    ClientQuit,
    /// The peer hung up or reset the connection.
    ConnectionLost,
    /// The server is shutting down.
    ServerShutdown,
}

/// Outcome of one `advance` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Blocked on the socket; retry `advance` after the given readiness
    /// fires.
    Suspended(Direction),
    /// The connection is finished and may be torn down.
    Closed(CloseReason),
}

/// Session parameters fixed when the handshake starts, plus the client's
/// negotiated settings once its response has been read.
#[derive(Debug, Clone)]
pub struct HandshakeContext {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    pub scramble: [u8; SCRAMBLE_LEN],
    pub capabilities: u32,
    pub charset: u8,
    pub status_flags: u16,
    pub max_packet_size: u32,
    /// Populated after the handshake response has been validated.
    pub client: Option<HandshakeResponse>,
}

/// Outcome of one blocking-capable sub-step.
enum Step<T> {
    Ready(T),
    Blocked,
    PeerClosed,
}

/// One connection's protocol state machine.
///
/// The machine owns the connection's buffers and handshake context and is
/// driven through a single re-entrant operation, [`StateMachine::advance`],
/// which runs until the transport would block or the connection closes.
/// Suspension points are exactly the codec read/write calls; buffered bytes
/// are the resume point, so a retried call re-attempts the blocked
/// operation without re-issuing completed steps.
pub struct StateMachine {
    context: Arc<ServerContext>,
    connection_id: u32,
    scramble: [u8; SCRAMBLE_LEN],
    phase: Phase,
    close_reason: Option<CloseReason>,
    handshake: Option<HandshakeContext>,
    read_buf: BytesMut,
    write_buf: BytesMut,
    /// Sequence id for the next outbound packet.
    sequence: u8,
}

impl StateMachine {
    pub fn new(context: Arc<ServerContext>, connection_id: u32) -> Self {
        let mut rng = rand::thread_rng();
        let mut scramble = [0u8; SCRAMBLE_LEN];
        for byte in &mut scramble {
            *byte = rng.sample(Alphanumeric);
        }
        Self::with_scramble(context, connection_id, scramble)
    }

    /// Like [`StateMachine::new`] with a caller-chosen scramble, for
    /// deterministic exchanges.
    pub fn with_scramble(
        context: Arc<ServerContext>,
        connection_id: u32,
        scramble: [u8; SCRAMBLE_LEN],
    ) -> Self {
        Self {
            context,
            connection_id,
            scramble,
            phase: Phase::Init,
            close_reason: None,
            handshake: None,
            read_buf: BytesMut::with_capacity(4096),
            write_buf: BytesMut::with_capacity(4096),
            sequence: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The handshake context, once `Init` has run.
    pub fn handshake(&self) -> Option<&HandshakeContext> {
        self.handshake.as_ref()
    }

    /// Drives the connection forward until the transport would block or the
    /// connection closes.
    ///
    /// Re-entrant: may be called any number of times; each call either makes
    /// progress or re-attempts exactly the operation that previously
    /// blocked. Fatal errors (protocol violations, unexpected I/O failures)
    /// move the machine to `Closed` before returning.
    pub fn advance(&mut self, io: &mut impl Transport) -> Result<Progress, ConnectionError> {
        let result = self.drive(io);
        if result.is_err() {
            self.phase = Phase::Closed;
        }
        result
    }

    fn drive(&mut self, io: &mut impl Transport) -> Result<Progress, ConnectionError> {
        loop {
            match self.phase {
                Phase::Init => self.initialize(),

                Phase::HandshakeWrite => {
                    if self.write_buf.is_empty() {
                        self.stage_handshake();
                    }
                    match self.flush(io)? {
                        Step::Ready(()) => {
                            trace!(id = self.connection_id, "handshake written");
                            self.phase = Phase::HandshakeRead;
                        }
                        Step::Blocked => return Ok(Progress::Suspended(Direction::Write)),
                        Step::PeerClosed => return Ok(self.close(CloseReason::ConnectionLost)),
                    }
                }

                Phase::HandshakeRead => match self.read_packet(io)? {
                    Step::Ready((seq, mut payload)) => {
                        let response = HandshakeResponse::decode(&mut payload)?;
                        debug!(
                            id = self.connection_id,
                            user = %response.username,
                            "handshake response"
                        );
                        self.sequence = seq.wrapping_add(1);
                        if let Some(handshake) = self.handshake.as_mut() {
                            handshake.client = Some(response);
                        }
                        self.phase = Phase::HandshakeDone;
                    }
                    Step::Blocked => return Ok(Progress::Suspended(Direction::Read)),
                    Step::PeerClosed => return Ok(self.close(CloseReason::ConnectionLost)),
                },

                Phase::HandshakeDone => {
                    if self.write_buf.is_empty() {
                        self.stage_result(self.sequence);
                    }
                    match self.flush(io)? {
                        Step::Ready(()) => {
                            debug!(id = self.connection_id, "handshake complete");
                            self.phase = Phase::PrepareCommand;
                        }
                        Step::Blocked => return Ok(Progress::Suspended(Direction::Write)),
                        Step::PeerClosed => return Ok(self.close(CloseReason::ConnectionLost)),
                    }
                }

                Phase::PrepareCommand => match self.read_packet(io)? {
                    Step::Ready((seq, payload)) => {
                        let frame = CommandFrame::decode(payload)?;
                        match frame.command {
                            Command::Quit => {
                                return Ok(self.close(CloseReason::ClientQuit));
                            }
                            Command::Query => {
                                debug!(
                                    id = self.connection_id,
                                    query = %String::from_utf8_lossy(&frame.payload),
                                    "query"
                                );
                                self.stage_result(seq.wrapping_add(1));
                                self.phase = Phase::WritePending;
                            }
                            command => {
                                trace!(
                                    id = self.connection_id,
                                    code = command.code(),
                                    "non-query command"
                                );
                                self.stage_result(seq.wrapping_add(1));
                                self.phase = Phase::WritePending;
                            }
                        }
                    }
                    Step::Blocked => return Ok(Progress::Suspended(Direction::Read)),
                    Step::PeerClosed => return Ok(self.close(CloseReason::ConnectionLost)),
                },

                Phase::WritePending => match self.flush(io)? {
                    Step::Ready(()) => self.phase = Phase::PrepareCommand,
                    Step::Blocked => return Ok(Progress::Suspended(Direction::Write)),
                    Step::PeerClosed => return Ok(self.close(CloseReason::ConnectionLost)),
                },

                Phase::Closed => {
                    let reason = self.close_reason.unwrap_or(CloseReason::ConnectionLost);
                    return Ok(Progress::Closed(reason));
                }
            }
        }
    }

    /// Populates the handshake context from the server context. The one
    /// state entitled to assume first entry; it cannot suspend.
    fn initialize(&mut self) {
        self.handshake = Some(HandshakeContext {
            protocol_version: self.context.protocol_version,
            server_version: self.context.server_version.clone(),
            connection_id: self.connection_id,
            scramble: self.scramble,
            capabilities: self.context.capabilities,
            charset: self.context.charset,
            status_flags: self.context.status_flags,
            max_packet_size: self.context.max_packet_size,
            client: None,
        });
        trace!(id = self.connection_id, "session initialized");
        self.phase = Phase::HandshakeWrite;
    }

    fn stage_handshake(&mut self) {
        let handshake = self.handshake.as_ref().expect("initialized in Init");
        let packet = HandshakePacket {
            protocol_version: handshake.protocol_version,
            server_version: handshake.server_version.clone(),
            connection_id: handshake.connection_id,
            scramble: handshake.scramble,
            capabilities: handshake.capabilities,
            charset: handshake.charset,
            status_flags: handshake.status_flags,
        };
        let mut payload = BytesMut::new();
        packet.encode(&mut payload);
        codec::write_packet(&mut self.write_buf, 0, &payload);
    }

    /// Stages the generic acknowledgement / empty result.
    fn stage_result(&mut self, seq: u8) {
        let mut payload = BytesMut::new();
        OkPacket::default().encode(&mut payload);
        codec::write_packet(&mut self.write_buf, seq, &payload);
    }

    /// Decodes one packet from the read buffer, pulling from the transport
    /// as needed.
    fn read_packet(
        &mut self,
        io: &mut impl Transport,
    ) -> Result<Step<(u8, BytesMut)>, ConnectionError> {
        loop {
            if let Some(packet) = codec::read_packet(&mut self.read_buf)? {
                return Ok(Step::Ready(packet));
            }
            match io.try_read_buf(&mut self.read_buf) {
                Ok(0) => return Ok(Step::PeerClosed),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Step::Blocked),
                Err(e) if is_disconnect(&e) => return Ok(Step::PeerClosed),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Writes out the staged bytes. Consumed bytes are gone from the buffer,
    /// so a retry after would-block resumes mid-packet without duplication.
    fn flush(&mut self, io: &mut impl Transport) -> Result<Step<()>, ConnectionError> {
        while !self.write_buf.is_empty() {
            match io.try_write(&self.write_buf) {
                Ok(0) => return Ok(Step::PeerClosed),
                Ok(n) => self.write_buf.advance(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Step::Blocked),
                Err(e) if is_disconnect(&e) => return Ok(Step::PeerClosed),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Step::Ready(()))
    }

    fn close(&mut self, reason: CloseReason) -> Progress {
        trace!(id = self.connection_id, ?reason, "closing");
        self.phase = Phase::Closed;
        self.close_reason = Some(reason);
        Progress::Closed(reason)
    }
}

/// Peer reset and hangup are normal closes, not errors.
fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
