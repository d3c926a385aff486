//! Small shared value types used across the data model.

/// Which domain a record belongs to — drives which store, optimizer and
/// configuration knobs apply to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Session,
    Fpc,
}

impl Domain {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Domain::Session => "session",
            Domain::Fpc => "fpc",
        }
    }
}

/// User-agent class a record is attributed to, which selects one of the four
/// LRU chains an optimizer maintains per domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserAgentClass {
    Unknown,
    Bot,
    Warmer,
    User,
}

impl UserAgentClass {
    pub const ALL: [UserAgentClass; 4] = [
        UserAgentClass::Unknown,
        UserAgentClass::Bot,
        UserAgentClass::Warmer,
        UserAgentClass::User,
    ];

    #[must_use]
    pub fn index(self) -> usize {
        match self {
            UserAgentClass::Unknown => 0,
            UserAgentClass::Bot => 1,
            UserAgentClass::Warmer => 2,
            UserAgentClass::User => 3,
        }
    }

    #[must_use]
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % Self::ALL.len()]
    }
}

impl From<UserAgentClass> for u8 {
    fn from(value: UserAgentClass) -> Self {
        value.index() as u8
    }
}

/// Eviction strategy an optimizer's garbage collector walks its chains with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GcMode {
    StrictExpirationLru,
    #[default]
    ExpirationLru,
    Lru,
    StrictLru,
}

/// How a tag-manager `Clean` request selects which records to invalidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanMode {
    All,
    Old,
    MatchingAllTags,
    MatchingAnyTag,
    NotMatchingAnyTag,
}
