//! Launcher server query.
//!
//! A query is one datagram out and one datagram back. The request names
//! the fields we want through a flags word; the reply repeats the flags it
//! actually filled and then carries those fields in a fixed order, each
//! present only when its bit is set. There are no lengths or tags in the
//! reply, so it must be read strictly front to back.

use std::fmt;
use std::net::SocketAddr;
use std::ops::BitOr;
use std::time::Duration;

use doomhost_protocol::{ByteBuffer, Endian};
use doomhost_transport::{HuffmanSocket, TransportError};
use serde::Serialize;

use crate::QueryError;

/// Challenge word that opens every launcher request.
pub const LAUNCHER_CHALLENGE: u32 = 199;

/// First word of a genuine reply. Anything else means the server is
/// ignoring us (flood protection or a ban).
pub const REPLY_MAGIC: i32 = 5_660_023;

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

/// Set of fields requested from, or present in, a query reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct QueryFlags(u32);

impl QueryFlags {
    pub const NAME: Self = Self(0x1);
    pub const URL: Self = Self(0x2);
    pub const EMAIL: Self = Self(0x4);
    pub const MAPNAME: Self = Self(0x8);
    pub const MAXCLIENTS: Self = Self(0x10);
    pub const MAXPLAYERS: Self = Self(0x20);
    pub const PWADS: Self = Self(0x40);
    pub const GAMETYPE: Self = Self(0x80);
    pub const GAMENAME: Self = Self(0x100);
    pub const IWAD: Self = Self(0x200);
    pub const FORCEPASSWORD: Self = Self(0x400);
    pub const FORCEJOINPASSWORD: Self = Self(0x800);
    pub const GAMESKILL: Self = Self(0x1000);
    pub const BOTSKILL: Self = Self(0x2000);
    /// Deprecated by the engine; still parsed when present.
    pub const DMFLAGS: Self = Self(0x4000);
    pub const LIMITS: Self = Self(0x10000);
    pub const TEAMDAMAGE: Self = Self(0x20000);
    /// Deprecated by the engine; still parsed when present.
    pub const TEAMSCORES: Self = Self(0x40000);
    pub const NUMPLAYERS: Self = Self(0x80000);
    pub const PLAYERDATA: Self = Self(0x100000);
    pub const TEAMINFO_NUMBER: Self = Self(0x200000);
    pub const TEAMINFO_NAME: Self = Self(0x400000);
    pub const TEAMINFO_COLOR: Self = Self(0x800000);
    pub const TEAMINFO_SCORE: Self = Self(0x1000000);
    pub const TESTING_SERVER: Self = Self(0x2000000);
    pub const DATA_MD5SUM: Self = Self(0x4000000);
    pub const ALL_DMFLAGS: Self = Self(0x8000000);
    pub const SECURITY_SETTINGS: Self = Self(0x10000000);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for QueryFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl Default for QueryFlags {
    /// The fields a launcher listing needs.
    fn default() -> Self {
        Self::MAPNAME
            | Self::MAXCLIENTS
            | Self::MAXPLAYERS
            | Self::PWADS
            | Self::GAMETYPE
            | Self::GAMENAME
            | Self::IWAD
            | Self::GAMESKILL
            | Self::BOTSKILL
            | Self::LIMITS
    }
}

impl fmt::Display for QueryFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Reply model
// ---------------------------------------------------------------------------

/// Game mode as numbered on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameMode {
    Cooperative,
    Survival,
    Invasion,
    Deathmatch,
    Teamplay,
    Duel,
    Terminator,
    LastManStanding,
    TeamLms,
    Possession,
    TeamPossession,
    TeamGame,
    Ctf,
    OneFlagCtf,
    Skulltag,
    Domination,
    Unknown(u8),
}

impl From<u8> for GameMode {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Cooperative,
            1 => Self::Survival,
            2 => Self::Invasion,
            3 => Self::Deathmatch,
            4 => Self::Teamplay,
            5 => Self::Duel,
            6 => Self::Terminator,
            7 => Self::LastManStanding,
            8 => Self::TeamLms,
            9 => Self::Possession,
            10 => Self::TeamPossession,
            11 => Self::TeamGame,
            12 => Self::Ctf,
            13 => Self::OneFlagCtf,
            14 => Self::Skulltag,
            15 => Self::Domination,
            other => Self::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GameType {
    pub mode: GameMode,
    pub instagib: bool,
    pub buckshot: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Limits {
    pub fraglimit: u16,
    pub timelimit: u16,
    /// Only sent when `timelimit` is non-zero.
    pub time_left: Option<u16>,
    pub duellimit: u16,
    pub pointlimit: u16,
    pub winlimit: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerInfo {
    pub name: String,
    pub score: i16,
    pub ping: i16,
    pub spectator: bool,
    pub bot: bool,
    pub team: u8,
    pub minutes: u8,
}

/// One team record. Each part is present only if its flag was set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeamInfo {
    pub name: Option<String>,
    pub color: Option<i32>,
    pub score: Option<i16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestingServer {
    pub enabled: bool,
    pub binary: String,
}

/// A decoded query reply. `None` fields were not in the reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServerInfo {
    pub version: String,
    pub flags: Option<QueryFlags>,
    pub name: Option<String>,
    pub url: Option<String>,
    pub email: Option<String>,
    pub map_name: Option<String>,
    pub max_clients: Option<u8>,
    pub max_players: Option<u8>,
    pub pwads: Option<Vec<String>>,
    pub game_type: Option<GameType>,
    pub game_name: Option<String>,
    pub iwad: Option<String>,
    pub force_password: Option<bool>,
    pub force_join_password: Option<bool>,
    pub skill: Option<u8>,
    pub bot_skill: Option<u8>,
    pub dmflags: Option<[i32; 3]>,
    pub limits: Option<Limits>,
    pub team_damage: Option<f32>,
    pub team_scores: Option<[i16; 2]>,
    pub num_players: Option<u8>,
    pub players: Vec<PlayerInfo>,
    pub num_teams: Option<u8>,
    pub teams: Vec<TeamInfo>,
    pub testing_server: Option<TestingServer>,
    pub data_md5sum: Option<String>,
    pub all_dmflags: Option<Vec<i32>>,
    pub security_settings: Option<bool>,
}

// ---------------------------------------------------------------------------
// Request / reply codec
// ---------------------------------------------------------------------------

/// Builds the (un-encoded) request payload.
pub fn build_request(flags: QueryFlags) -> Vec<u8> {
    let mut buf = ByteBuffer::new(Endian::Little);
    buf.put_u32(LAUNCHER_CHALLENGE);
    buf.put_u32(flags.bits());
    buf.put_u32(0);
    buf.get_all_bytes()
}

/// Parses a Huffman-decoded reply.
///
/// Returns `Ok(None)` when the magic word is wrong: the server answered,
/// but not with server info.
///
/// # Errors
/// [`QueryError::Truncated`] if the reply ends in the middle of a field.
pub fn parse_reply(bytes: &[u8]) -> Result<Option<ServerInfo>, QueryError> {
    let mut buf = ByteBuffer::from_bytes(Endian::Little, bytes);
    if buf.get_i32()? != REPLY_MAGIC {
        return Ok(None);
    }
    let _timestamp = buf.get_i32()?;

    let mut info = ServerInfo {
        version: buf.get_string_null_terminated()?,
        ..ServerInfo::default()
    };
    let flags = QueryFlags::from_bits(buf.get_u32()?);
    info.flags = Some(flags);

    let string = |buf: &mut ByteBuffer| buf.get_string_null_terminated();
    let boolean = |buf: &mut ByteBuffer| buf.get_u8().map(|b| b != 0);

    if flags.contains(QueryFlags::NAME) {
        info.name = Some(string(&mut buf)?);
    }
    if flags.contains(QueryFlags::URL) {
        info.url = Some(string(&mut buf)?);
    }
    if flags.contains(QueryFlags::EMAIL) {
        info.email = Some(string(&mut buf)?);
    }
    if flags.contains(QueryFlags::MAPNAME) {
        info.map_name = Some(string(&mut buf)?);
    }
    if flags.contains(QueryFlags::MAXCLIENTS) {
        info.max_clients = Some(buf.get_u8()?);
    }
    if flags.contains(QueryFlags::MAXPLAYERS) {
        info.max_players = Some(buf.get_u8()?);
    }
    if flags.contains(QueryFlags::PWADS) {
        let count = buf.get_u8()?;
        let pwads = (0..count)
            .map(|_| string(&mut buf))
            .collect::<Result<Vec<_>, _>>()?;
        info.pwads = Some(pwads);
    }
    if flags.contains(QueryFlags::GAMETYPE) {
        info.game_type = Some(GameType {
            mode: GameMode::from(buf.get_u8()?),
            instagib: boolean(&mut buf)?,
            buckshot: boolean(&mut buf)?,
        });
    }
    if flags.contains(QueryFlags::GAMENAME) {
        info.game_name = Some(string(&mut buf)?);
    }
    if flags.contains(QueryFlags::IWAD) {
        info.iwad = Some(string(&mut buf)?);
    }
    if flags.contains(QueryFlags::FORCEPASSWORD) {
        info.force_password = Some(boolean(&mut buf)?);
    }
    if flags.contains(QueryFlags::FORCEJOINPASSWORD) {
        info.force_join_password = Some(boolean(&mut buf)?);
    }
    if flags.contains(QueryFlags::GAMESKILL) {
        info.skill = Some(buf.get_u8()?);
    }
    if flags.contains(QueryFlags::BOTSKILL) {
        info.bot_skill = Some(buf.get_u8()?);
    }
    if flags.contains(QueryFlags::DMFLAGS) {
        info.dmflags = Some([buf.get_i32()?, buf.get_i32()?, buf.get_i32()?]);
    }
    if flags.contains(QueryFlags::LIMITS) {
        let fraglimit = buf.get_u16()?;
        let timelimit = buf.get_u16()?;
        let time_left = if timelimit > 0 {
            Some(buf.get_u16()?)
        } else {
            None
        };
        info.limits = Some(Limits {
            fraglimit,
            timelimit,
            time_left,
            duellimit: buf.get_u16()?,
            pointlimit: buf.get_u16()?,
            winlimit: buf.get_u16()?,
        });
    }
    if flags.contains(QueryFlags::TEAMDAMAGE) {
        info.team_damage = Some(buf.get_f32()?);
    }
    if flags.contains(QueryFlags::TEAMSCORES) {
        info.team_scores = Some([buf.get_i16()?, buf.get_i16()?]);
    }
    if flags.contains(QueryFlags::NUMPLAYERS) {
        info.num_players = Some(buf.get_u8()?);
    }
    if flags.contains(QueryFlags::PLAYERDATA) {
        if let Some(count) = info.num_players {
            for _ in 0..count {
                info.players.push(PlayerInfo {
                    name: string(&mut buf)?,
                    score: buf.get_i16()?,
                    ping: buf.get_i16()?,
                    spectator: boolean(&mut buf)?,
                    bot: boolean(&mut buf)?,
                    team: buf.get_u8()?,
                    minutes: buf.get_u8()?,
                });
            }
        }
    }
    if flags.contains(QueryFlags::TEAMINFO_NUMBER) {
        info.num_teams = Some(buf.get_u8()?);
    }
    if let Some(count) = info.num_teams {
        let wants_name = flags.contains(QueryFlags::TEAMINFO_NAME);
        let wants_color = flags.contains(QueryFlags::TEAMINFO_COLOR);
        let wants_score = flags.contains(QueryFlags::TEAMINFO_SCORE);
        if wants_name || wants_color || wants_score {
            for _ in 0..count {
                let mut team = TeamInfo::default();
                if wants_name {
                    team.name = Some(string(&mut buf)?);
                }
                if wants_color {
                    team.color = Some(buf.get_i32()?);
                }
                if wants_score {
                    team.score = Some(buf.get_i16()?);
                }
                info.teams.push(team);
            }
        }
    }
    if flags.contains(QueryFlags::TESTING_SERVER) {
        info.testing_server = Some(TestingServer {
            enabled: boolean(&mut buf)?,
            binary: string(&mut buf)?,
        });
    }
    if flags.contains(QueryFlags::DATA_MD5SUM) {
        info.data_md5sum = Some(string(&mut buf)?);
    }
    if flags.contains(QueryFlags::ALL_DMFLAGS) {
        let count = buf.get_u8()?;
        let values = (0..count)
            .map(|_| buf.get_i32())
            .collect::<Result<Vec<_>, _>>()?;
        info.all_dmflags = Some(values);
    }
    if flags.contains(QueryFlags::SECURITY_SETTINGS) {
        info.security_settings = Some(boolean(&mut buf)?);
    }

    Ok(Some(info))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Queries the server at `addr` with the default 5 second timeout.
pub async fn query(addr: SocketAddr, flags: QueryFlags) -> Result<Option<ServerInfo>, QueryError> {
    query_with_timeout(addr, flags, doomhost_transport::DEFAULT_TIMEOUT).await
}

/// Queries the server at `addr`, waiting at most `timeout` for the reply.
///
/// # Errors
/// [`QueryError::Timeout`] when nothing comes back; no retry is made.
pub async fn query_with_timeout(
    addr: SocketAddr,
    flags: QueryFlags,
    timeout: Duration,
) -> Result<Option<ServerInfo>, QueryError> {
    let socket = HuffmanSocket::connect(addr).await?.with_timeout(timeout);
    let reply = socket
        .exchange(&build_request(flags))
        .await
        .map_err(|e| match e {
            TransportError::Timeout(d) => QueryError::Timeout(d),
            other => QueryError::Transport(other),
        })?;
    let info = parse_reply(&reply)?;
    if info.is_none() {
        tracing::debug!(%addr, "query reply had the wrong magic, treating as no response");
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_header(flags: QueryFlags) -> ByteBuffer {
        let mut buf = ByteBuffer::new(Endian::Little);
        buf.put_i32(REPLY_MAGIC);
        buf.put_i32(123_456);
        buf.put_string("3.1-r123", true);
        buf.put_u32(flags.bits());
        buf
    }

    #[test]
    fn test_build_request_layout() {
        let bytes = build_request(QueryFlags::NAME | QueryFlags::LIMITS);
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[..4], &199u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &0x10001u32.to_le_bytes());
        assert_eq!(&bytes[8..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_default_flags_value() {
        assert_eq!(QueryFlags::default().bits(), 0x133F8);
    }

    #[test]
    fn test_parse_reply_wrong_magic_is_none() {
        let mut buf = ByteBuffer::new(Endian::Little);
        buf.put_i32(5_660_024);
        buf.put_i32(0);
        assert_eq!(parse_reply(&buf.get_all_bytes()).unwrap(), None);
    }

    #[test]
    fn test_parse_reply_default_fields() {
        let mut buf = reply_header(QueryFlags::default());
        buf.put_string("MAP07", true);
        buf.put_u8(16);
        buf.put_u8(8);
        buf.put_u8(2);
        buf.put_string("zvox.pk3", true);
        buf.put_string("dwango5.wad", true);
        buf.put_u8(3);
        buf.put_u8(1);
        buf.put_u8(0);
        buf.put_string("DOOM", true);
        buf.put_string("doom2.wad", true);
        buf.put_u8(4);
        buf.put_u8(2);
        // LIMITS with timelimit 0: no time-left field
        for v in [30u16, 0, 5, 0, 0] {
            buf.put_u16(v);
        }

        let info = parse_reply(&buf.get_all_bytes()).unwrap().unwrap();
        assert_eq!(info.version, "3.1-r123");
        assert_eq!(info.map_name.as_deref(), Some("MAP07"));
        assert_eq!(info.max_clients, Some(16));
        assert_eq!(info.max_players, Some(8));
        assert_eq!(
            info.pwads,
            Some(vec!["zvox.pk3".to_string(), "dwango5.wad".to_string()])
        );
        assert_eq!(
            info.game_type,
            Some(GameType {
                mode: GameMode::Deathmatch,
                instagib: true,
                buckshot: false
            })
        );
        assert_eq!(info.iwad.as_deref(), Some("doom2.wad"));
        assert_eq!(info.skill, Some(4));
        assert_eq!(info.bot_skill, Some(2));
        let limits = info.limits.unwrap();
        assert_eq!(limits.fraglimit, 30);
        assert_eq!(limits.time_left, None);
        assert_eq!(limits.duellimit, 5);
        assert!(info.name.is_none());
    }

    #[test]
    fn test_parse_reply_limits_with_timelimit_reads_time_left() {
        let mut buf = reply_header(QueryFlags::LIMITS);
        for v in [0u16, 20, 13, 1, 2, 3] {
            buf.put_u16(v);
        }
        let info = parse_reply(&buf.get_all_bytes()).unwrap().unwrap();
        assert_eq!(
            info.limits,
            Some(Limits {
                fraglimit: 0,
                timelimit: 20,
                time_left: Some(13),
                duellimit: 1,
                pointlimit: 2,
                winlimit: 3,
            })
        );
    }

    #[test]
    fn test_parse_reply_players_and_teams() {
        let flags = QueryFlags::NUMPLAYERS
            | QueryFlags::PLAYERDATA
            | QueryFlags::TEAMINFO_NUMBER
            | QueryFlags::TEAMINFO_NAME
            | QueryFlags::TEAMINFO_SCORE;
        let mut buf = reply_header(flags);
        buf.put_u8(2);
        for (name, score) in [("Alice", 12i16), ("Bot", -1)] {
            buf.put_string(name, true);
            buf.put_i16(score);
            buf.put_i16(48);
            buf.put_u8(0);
            buf.put_u8(u8::from(name == "Bot"));
            buf.put_u8(1);
            buf.put_u8(7);
        }
        buf.put_u8(2);
        buf.put_string("Blue", true);
        buf.put_i16(3);
        buf.put_string("Red", true);
        buf.put_i16(5);

        let info = parse_reply(&buf.get_all_bytes()).unwrap().unwrap();
        assert_eq!(info.players.len(), 2);
        assert_eq!(info.players[0].name, "Alice");
        assert_eq!(info.players[0].score, 12);
        assert!(info.players[1].bot);
        assert_eq!(info.teams.len(), 2);
        assert_eq!(info.teams[1].name.as_deref(), Some("Red"));
        assert_eq!(info.teams[1].score, Some(5));
        assert_eq!(info.teams[1].color, None);
    }

    #[test]
    fn test_parse_reply_player_data_without_count_is_skipped() {
        let mut buf = reply_header(QueryFlags::PLAYERDATA | QueryFlags::SECURITY_SETTINGS);
        buf.put_u8(1);
        let info = parse_reply(&buf.get_all_bytes()).unwrap().unwrap();
        assert!(info.players.is_empty());
        assert_eq!(info.security_settings, Some(true));
    }

    #[test]
    fn test_parse_reply_trailing_flags() {
        let flags = QueryFlags::TESTING_SERVER
            | QueryFlags::DATA_MD5SUM
            | QueryFlags::ALL_DMFLAGS
            | QueryFlags::TEAMDAMAGE;
        let mut buf = reply_header(flags);
        buf.put_f32(0.5);
        buf.put_u8(1);
        buf.put_string("zandronum-dev", true);
        buf.put_string("d41d8cd98f00b204e9800998ecf8427e", true);
        buf.put_u8(2);
        buf.put_i32(4);
        buf.put_i32(-8);

        let info = parse_reply(&buf.get_all_bytes()).unwrap().unwrap();
        assert_eq!(info.team_damage, Some(0.5));
        assert_eq!(
            info.testing_server,
            Some(TestingServer {
                enabled: true,
                binary: "zandronum-dev".into()
            })
        );
        assert_eq!(info.all_dmflags, Some(vec![4, -8]));
    }

    #[test]
    fn test_parse_reply_truncated_field_fails() {
        let mut buf = reply_header(QueryFlags::MAPNAME | QueryFlags::MAXCLIENTS);
        buf.put_string("MAP01", true);
        let err = parse_reply(&buf.get_all_bytes()).unwrap_err();
        assert!(matches!(err, QueryError::Truncated(_)));
    }

    #[test]
    fn test_game_mode_from_number() {
        assert_eq!(GameMode::from(0), GameMode::Cooperative);
        assert_eq!(GameMode::from(12), GameMode::Ctf);
        assert_eq!(GameMode::from(15), GameMode::Domination);
        assert_eq!(GameMode::from(99), GameMode::Unknown(99));
    }
}
