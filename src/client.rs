//! Client-side session: connect, handshake, send commands, read results.
//!
//! This is the library behind `mizzle-query` and the integration tests. It
//! speaks the same codec as the server but over plain buffered async I/O;
//! the client has no would-block choreography to manage.

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::protocol::{
    capability, codec, CommandFrame, ErrPacket, HandshakePacket, HandshakeResponse, OkPacket,
    ProtocolError, ResultPacket,
};

/// Client-side errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server closed the connection")]
    ConnectionClosed,
    #[error("server error {} ({}): {}", .0.code, .0.sql_state, .0.message)]
    Server(ErrPacket),
}

/// One established client session.
pub struct Session {
    stream: TcpStream,
    buf: BytesMut,
    handshake: HandshakePacket,
}

impl Session {
    /// Connects and completes the handshake. No password is sent; the
    /// server does not verify credentials.
    pub async fn connect(host: &str, port: u16, username: &str) -> Result<Self, ClientError> {
        let mut stream = TcpStream::connect((host, port)).await?;
        let mut buf = BytesMut::with_capacity(4096);

        let (seq, mut payload) = read_packet(&mut stream, &mut buf).await?;
        let handshake = HandshakePacket::decode(&mut payload)?;
        debug!(
            server = %handshake.server_version,
            connection_id = handshake.connection_id,
            "received handshake"
        );

        let mut capabilities = capability::PROTOCOL_41 | capability::SECURE_CONNECTION;
        if handshake.capabilities & capability::PLUGIN_AUTH != 0 {
            capabilities |= capability::PLUGIN_AUTH;
        }
        let response = HandshakeResponse {
            capabilities,
            max_packet_size: 16_777_215,
            charset: handshake.charset,
            username: username.to_string(),
            auth_response: Vec::new(),
            database: None,
        };
        let mut out = BytesMut::new();
        response.encode(&mut out);
        write_packet(&mut stream, seq.wrapping_add(1), &out).await?;

        let mut session = Self {
            stream,
            buf,
            handshake,
        };

        // The server acknowledges the handshake before accepting commands.
        let (_, payload) = session.read_result_payload().await?;
        match ResultPacket::decode(payload)? {
            ResultPacket::Ok(_) => Ok(session),
            ResultPacket::Err(err) => Err(ClientError::Server(err)),
        }
    }

    /// The server version string announced in the handshake.
    pub fn server_version(&self) -> &str {
        &self.handshake.server_version
    }

    /// The protocol version announced in the handshake.
    pub fn protocol_version(&self) -> u8 {
        self.handshake.protocol_version
    }

    /// Sends a text query and returns its result summary.
    pub async fn query(&mut self, sql: &str) -> Result<OkPacket, ClientError> {
        self.execute(&CommandFrame::query(sql)).await
    }

    /// Sends a ping and returns its acknowledgement.
    pub async fn ping(&mut self) -> Result<OkPacket, ClientError> {
        self.execute(&CommandFrame::ping()).await
    }

    /// Sends one command frame and reads its result.
    pub async fn execute(&mut self, frame: &CommandFrame) -> Result<OkPacket, ClientError> {
        self.send_command(frame).await?;
        let (_, payload) = self.read_result_payload().await?;
        match ResultPacket::decode(payload)? {
            ResultPacket::Ok(ok) => Ok(ok),
            ResultPacket::Err(err) => Err(ClientError::Server(err)),
        }
    }

    /// Sends the termination command and closes the session. The server
    /// does not respond to QUIT.
    pub async fn quit(mut self) -> Result<(), ClientError> {
        self.send_command(&CommandFrame::quit()).await?;
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Sends one command frame without waiting for its result.
    pub async fn send_command(&mut self, frame: &CommandFrame) -> Result<(), ClientError> {
        let mut payload = BytesMut::new();
        frame.encode(&mut payload);
        // Every command starts a fresh packet exchange.
        write_packet(&mut self.stream, 0, &payload).await?;
        Ok(())
    }

    /// Reads one packet, for use after a command has been sent.
    pub async fn read_result_payload(&mut self) -> Result<(u8, BytesMut), ClientError> {
        read_packet(&mut self.stream, &mut self.buf).await
    }
}

async fn read_packet(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
) -> Result<(u8, BytesMut), ClientError> {
    loop {
        if let Some(packet) = codec::read_packet(buf)? {
            return Ok(packet);
        }
        if stream.read_buf(buf).await? == 0 {
            return Err(ClientError::ConnectionClosed);
        }
    }
}

async fn write_packet(
    stream: &mut TcpStream,
    seq: u8,
    payload: &[u8],
) -> Result<(), ClientError> {
    let mut out = BytesMut::with_capacity(codec::PACKET_HEADER_LEN + payload.len());
    codec::write_packet(&mut out, seq, payload);
    stream.write_all(&out).await?;
    Ok(())
}
