//! Remote console client.
//!
//! Login is a salted challenge: the server hands out a 32-byte salt and
//! expects `hex(md5(salt ++ password))` back. Only then is a command
//! accepted. Each step is one Huffman datagram and one reply.

use std::net::SocketAddr;
use std::time::Duration;

use doomhost_transport::{HuffmanSocket, TransportError};
use md5::{Digest, Md5};

use crate::RconError;

/// RCON protocol revision we speak.
pub const PROTOCOL_VERSION: u8 = 3;

/// Length of the login salt.
pub const SALT_LEN: usize = 32;

/// Opcodes the server sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerCode {
    OldProtocol = 32,
    Banned = 33,
    Salt = 34,
    LoggedIn = 35,
    InvalidPassword = 36,
    Message = 37,
    Update = 38,
}

impl TryFrom<u8> for ServerCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        Ok(match value {
            32 => Self::OldProtocol,
            33 => Self::Banned,
            34 => Self::Salt,
            35 => Self::LoggedIn,
            36 => Self::InvalidPassword,
            37 => Self::Message,
            38 => Self::Update,
            other => return Err(other),
        })
    }
}

/// Opcodes the client sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientCode {
    BeginConnection = 52,
    Password = 53,
    Command = 54,
    Pong = 55,
    Disconnect = 56,
}

/// Computes the login token for `salt` and `password`.
pub fn login_token(salt: &[u8], password: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// An RCON session with one engine instance.
pub struct RconClient {
    socket: HuffmanSocket,
    addr: SocketAddr,
}

impl RconClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self, RconError> {
        let socket = HuffmanSocket::connect(addr).await?;
        Ok(Self { socket, addr })
    }

    /// Overrides the per-reply timeout (5 seconds by default).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.socket = self.socket.with_timeout(timeout);
        self
    }

    /// Runs the salt handshake and logs in.
    ///
    /// # Errors
    /// [`RconError::Banned`], [`RconError::InvalidPassword`] and
    /// [`RconError::OldProtocol`] mirror the server's refusals; any other
    /// opcode is [`RconError::UnexpectedReply`].
    pub async fn login(&self, password: &str) -> Result<(), RconError> {
        let reply = self
            .exchange(&[ClientCode::BeginConnection as u8, PROTOCOL_VERSION])
            .await?;
        let salt = match expect_code(&reply, "salt")? {
            ServerCode::Salt => reply
                .get(1..=SALT_LEN)
                .ok_or(RconError::MalformedSalt(reply.len().saturating_sub(1)))?,
            other => return Err(refusal(other, "salt")),
        };

        let mut packet = vec![ClientCode::Password as u8];
        packet.extend_from_slice(login_token(salt, password).as_bytes());
        let reply = self.exchange(&packet).await?;
        match expect_code(&reply, "login")? {
            ServerCode::LoggedIn => {
                tracing::debug!(addr = %self.addr, "rcon login accepted");
                Ok(())
            }
            other => Err(refusal(other, "login")),
        }
    }

    /// Sends one console command. The server does not acknowledge it.
    pub async fn command(&self, command: &str) -> Result<(), RconError> {
        let mut packet = vec![ClientCode::Command as u8];
        packet.extend_from_slice(command.as_bytes());
        self.socket.send(&packet).await?;
        tracing::info!(addr = %self.addr, command, "rcon command sent");
        Ok(())
    }

    async fn exchange(&self, packet: &[u8]) -> Result<Vec<u8>, RconError> {
        self.socket.exchange(packet).await.map_err(|e| match e {
            TransportError::Timeout(d) => RconError::Timeout(d),
            other => RconError::Transport(other),
        })
    }
}

/// Logs in to `addr` and sends `command`.
pub async fn send_command(addr: SocketAddr, password: &str, command: &str) -> Result<(), RconError> {
    let client = RconClient::connect(addr).await?;
    client.login(password).await?;
    client.command(command).await
}

fn expect_code(reply: &[u8], stage: &'static str) -> Result<ServerCode, RconError> {
    let &code = reply.first().ok_or(RconError::EmptyReply(stage))?;
    ServerCode::try_from(code).map_err(|code| RconError::UnexpectedReply { stage, code })
}

fn refusal(code: ServerCode, stage: &'static str) -> RconError {
    match code {
        ServerCode::Banned => RconError::Banned,
        ServerCode::InvalidPassword => RconError::InvalidPassword,
        ServerCode::OldProtocol => RconError::OldProtocol,
        other => RconError::UnexpectedReply {
            stage,
            code: other as u8,
        },
    }
}
