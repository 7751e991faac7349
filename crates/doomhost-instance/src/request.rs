//! Typed host requests.
//!
//! The control listener hands over the raw JSON object of a `host`
//! request; [`HostRequest::from_fields`] validates it once and produces a
//! value whose every field has a concrete type and default.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::RequestError;

/// Skill used when a request does not name one.
pub const DEFAULT_SKILL: i64 = 4;

/// Skill used for cooperative modes when a request does not name one.
pub const COOPERATIVE_SKILL: i64 = 3;

pub const DEFAULT_MAX_CLIENTS: i64 = 32;
pub const DEFAULT_MAX_PLAYERS: i64 = 32;

// ---------------------------------------------------------------------------
// GameMode
// ---------------------------------------------------------------------------

/// Gamemodes a host request may ask for. The lowercase name doubles as the
/// engine console variable that enables the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Deathmatch,
    Cooperative,
    Teamplay,
    Terminator,
    Possession,
    TeamPossession,
    LastManStanding,
    Ctf,
    OneFlagCtf,
    Skulltag,
    Duel,
    TeamGame,
    Domination,
    Survival,
    Invasion,
}

impl GameMode {
    pub const ALL: [GameMode; 15] = [
        Self::Deathmatch,
        Self::Cooperative,
        Self::Teamplay,
        Self::Terminator,
        Self::Possession,
        Self::TeamPossession,
        Self::LastManStanding,
        Self::Ctf,
        Self::OneFlagCtf,
        Self::Skulltag,
        Self::Duel,
        Self::TeamGame,
        Self::Domination,
        Self::Survival,
        Self::Invasion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deathmatch => "deathmatch",
            Self::Cooperative => "cooperative",
            Self::Teamplay => "teamplay",
            Self::Terminator => "terminator",
            Self::Possession => "possession",
            Self::TeamPossession => "teampossession",
            Self::LastManStanding => "lastmanstanding",
            Self::Ctf => "ctf",
            Self::OneFlagCtf => "oneflagctf",
            Self::Skulltag => "skulltag",
            Self::Duel => "duel",
            Self::TeamGame => "teamgame",
            Self::Domination => "domination",
            Self::Survival => "survival",
            Self::Invasion => "invasion",
        }
    }

    /// Modes where players fight monsters together. These default to a
    /// lower skill.
    pub fn is_cooperative(&self) -> bool {
        matches!(self, Self::Cooperative | Self::Survival | Self::Invasion)
    }
}

impl FromStr for GameMode {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| RequestError::InvalidGameMode(s.to_string()))
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FieldPolicy
// ---------------------------------------------------------------------------

/// What to do with an optional field of the wrong JSON type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldPolicy {
    /// Substitute the default and log a warning.
    #[default]
    Lenient,
    /// Reject the request.
    Strict,
}

// ---------------------------------------------------------------------------
// HostRequest
// ---------------------------------------------------------------------------

/// A validated request to host one engine instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostRequest {
    pub hostname: String,
    pub iwad: String,
    pub gamemode: GameMode,

    pub wads: Vec<String>,
    /// Additional iwads loaded as plain files.
    pub extraiwads: Vec<String>,
    pub skill: i64,
    /// Load the bundled actors and data files in front of `wads`.
    pub data: bool,
    /// Config file executed at startup.
    pub config: Option<String>,
    pub autorestart: bool,

    pub dmflags: i64,
    pub dmflags2: i64,
    pub dmflags3: i64,
    pub compatflags: i64,
    pub compatflags2: i64,
    pub zadmflags: i64,
    pub zacompatflags: i64,

    pub instagib: bool,
    pub buckshot: bool,
    pub textcolors: bool,

    pub fraglimit: i64,
    pub pointlimit: i64,
    pub duellimit: i64,
    pub timelimit: i64,

    pub maxclients: i64,
    pub maxplayers: i64,
    pub maxlives: i64,
    pub suddendeath: bool,

    /// Connect password.
    pub password: Option<String>,
    pub joinpassword: Option<String>,
}

impl HostRequest {
    /// A request with every optional field at its default.
    pub fn new(hostname: impl Into<String>, iwad: impl Into<String>, gamemode: GameMode) -> Self {
        Self {
            hostname: hostname.into(),
            iwad: iwad.into(),
            gamemode,
            wads: Vec::new(),
            extraiwads: Vec::new(),
            skill: if gamemode.is_cooperative() {
                COOPERATIVE_SKILL
            } else {
                DEFAULT_SKILL
            },
            data: false,
            config: None,
            autorestart: false,
            dmflags: 0,
            dmflags2: 0,
            dmflags3: 0,
            compatflags: 0,
            compatflags2: 0,
            zadmflags: 0,
            zacompatflags: 0,
            instagib: false,
            buckshot: false,
            textcolors: true,
            fraglimit: 0,
            pointlimit: 0,
            duellimit: 0,
            timelimit: 0,
            maxclients: DEFAULT_MAX_CLIENTS,
            maxplayers: DEFAULT_MAX_PLAYERS,
            maxlives: 0,
            suddendeath: false,
            password: None,
            joinpassword: None,
        }
    }

    /// Validates the fields of a `host` request.
    ///
    /// `hostname`, `iwad` and `gamemode` must be present strings and the
    /// gamemode must be known. A JSON `null` counts as absent. Optional
    /// fields of the wrong type are handled according to `policy`. File
    /// names are checked with [`is_plain_file_name`] under both policies.
    pub fn from_fields(fields: &Map<String, Value>, policy: FieldPolicy) -> Result<Self, RequestError> {
        let reader = FieldReader { fields, policy };

        let hostname = reader.required_str("hostname")?;
        let iwad = reader.required_str("iwad")?;
        let gamemode: GameMode = reader.required_str("gamemode")?.parse()?;
        check_file_name("iwad", &iwad)?;

        let mut request = Self::new(hostname, iwad, gamemode);

        request.wads = reader.list("wads")?;
        request.extraiwads = reader.list("extraiwads")?;
        for wad in &request.wads {
            check_file_name("wads", wad)?;
        }
        for iwad in &request.extraiwads {
            check_file_name("extraiwads", iwad)?;
        }

        // A cooperative request that names no skill keeps the lower default.
        if reader.get("skill").is_some() || !gamemode.is_cooperative() {
            request.skill = reader.int("skill", DEFAULT_SKILL)?;
        }

        request.data = reader.flag("data", false)?;
        request.config = reader.text("config")?;
        if let Some(config) = &request.config {
            check_file_name("config", config)?;
        }
        request.autorestart = reader.flag("autorestart", false)?;

        request.dmflags = reader.int("dmflags", 0)?;
        request.dmflags2 = reader.int("dmflags2", 0)?;
        request.dmflags3 = reader.int("dmflags3", 0)?;
        request.compatflags = reader.int("compatflags", 0)?;
        request.compatflags2 = reader.int("compatflags2", 0)?;
        request.zadmflags = reader.int("zadmflags", 0)?;
        request.zacompatflags = reader.int("zacompatflags", 0)?;

        request.instagib = reader.flag("instagib", false)?;
        request.buckshot = reader.flag("buckshot", false)?;
        request.textcolors = reader.flag("textcolors", true)?;

        request.fraglimit = reader.int("fraglimit", 0)?;
        request.pointlimit = reader.int("pointlimit", 0)?;
        request.duellimit = reader.int("duellimit", 0)?;
        request.timelimit = reader.int("timelimit", 0)?;

        request.maxclients = reader.int("maxclients", DEFAULT_MAX_CLIENTS)?;
        request.maxplayers = reader.int("maxplayers", DEFAULT_MAX_PLAYERS)?;
        request.maxlives = reader.int("maxlives", 0)?;
        request.suddendeath = reader.flag("suddendeath", false)?;

        request.password = reader.text("password")?;
        request.joinpassword = reader.text("joinpassword")?;

        Ok(request)
    }
}

/// Returns `true` if `name` names a file directly inside a directory:
/// non-empty, no path separators, no `..`, no NUL.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && !name.contains(['/', '\\', '\0']) && !name.contains("..")
}

fn check_file_name(field: &'static str, name: &str) -> Result<(), RequestError> {
    if is_plain_file_name(name) {
        Ok(())
    } else {
        Err(RequestError::InvalidFileName {
            field,
            name: name.to_string(),
        })
    }
}

struct FieldReader<'a> {
    fields: &'a Map<String, Value>,
    policy: FieldPolicy,
}

impl FieldReader<'_> {
    fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|value| !value.is_null())
    }

    fn required_str(&self, name: &'static str) -> Result<String, RequestError> {
        match self.get(name) {
            None => Err(RequestError::MissingField(name)),
            Some(Value::String(text)) => Ok(text.clone()),
            Some(_) => Err(RequestError::InvalidField {
                field: name,
                expected: "a string",
            }),
        }
    }

    fn int(&self, name: &'static str, default: i64) -> Result<i64, RequestError> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => match value.as_i64() {
                Some(number) => Ok(number),
                None => self.mismatch(name, "an integer", default),
            },
        }
    }

    fn flag(&self, name: &'static str, default: bool) -> Result<bool, RequestError> {
        match self.get(name) {
            None => Ok(default),
            Some(Value::Bool(flag)) => Ok(*flag),
            Some(_) => self.mismatch(name, "a boolean", default),
        }
    }

    fn text(&self, name: &'static str) -> Result<Option<String>, RequestError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::String(text)) => Ok(Some(text.clone())),
            Some(_) => self.mismatch(name, "a string", None),
        }
    }

    fn list(&self, name: &'static str) -> Result<Vec<String>, RequestError> {
        let items = match self.get(name) {
            None => return Ok(Vec::new()),
            Some(Value::Array(items)) => items,
            Some(_) => return self.mismatch(name, "a list of strings", Vec::new()),
        };
        let strings: Option<Vec<String>> = items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect();
        match strings {
            Some(strings) => Ok(strings),
            None => self.mismatch(name, "a list of strings", Vec::new()),
        }
    }

    fn mismatch<T>(&self, field: &'static str, expected: &'static str, default: T) -> Result<T, RequestError> {
        match self.policy {
            FieldPolicy::Lenient => {
                tracing::warn!(field, expected, "wrongly typed host field, using default");
                Ok(default)
            }
            FieldPolicy::Strict => Err(RequestError::InvalidField { field, expected }),
        }
    }
}
