/// Length of a server-generated identifier.
pub const ID_LENGTH: usize = 26;

/// Well-known implicit channel role identifiers.
pub const CHANNEL_GUEST_ROLE_ID: &str = "channel_guest";
pub const CHANNEL_USER_ROLE_ID: &str = "channel_user";
pub const CHANNEL_ADMIN_ROLE_ID: &str = "channel_admin";

/// Channel field limits.
pub const CHANNEL_NAME_MAX_LENGTH: usize = 64;
pub const CHANNEL_DISPLAY_NAME_MAX_RUNES: usize = 64;
pub const CHANNEL_HEADER_MAX_RUNES: usize = 1024;
pub const CHANNEL_PURPOSE_MAX_RUNES: usize = 250;

/// Role/scheme field limits.
pub const ROLE_NAME_MAX_LENGTH: usize = 64;
pub const SCHEME_NAME_MAX_LENGTH: usize = 64;
pub const EMOJI_NAME_MAX_LENGTH: usize = 64;

/// Default cache capacities.
pub const CHANNEL_CACHE_SIZE: usize = 25_000;
pub const SESSION_CACHE_SIZE: usize = 35_000;
pub const ROLE_CACHE_SIZE: usize = 20_000;
pub const SCHEME_CACHE_SIZE: usize = 20_000;
pub const REACTION_CACHE_SIZE: usize = 20_000;

/// Default cache lifetimes, in seconds.
pub const CHANNEL_CACHE_SEC: u64 = 900;
pub const ALL_CHANNEL_MEMBERS_FOR_USER_CACHE_SEC: u64 = 900;
pub const ALL_CHANNEL_MEMBERS_NOTIFY_PROPS_FOR_CHANNEL_CACHE_SEC: u64 = 1800;
pub const CHANNEL_MEMBERS_COUNTS_CACHE_SEC: u64 = 1800;
pub const ROLE_CACHE_SEC: u64 = 1800;
pub const SCHEME_CACHE_SEC: u64 = 1800;
pub const REACTION_CACHE_SEC: u64 = 1800;

/// Cache names, used as metric labels and for `CacheRegistry::purge`.
pub const CACHE_CHANNEL: &str = "Channel";
pub const CACHE_CHANNEL_BY_NAME: &str = "Channel By Name";
pub const CACHE_CHANNEL_MEMBER_COUNTS: &str = "Channel Member Counts";
pub const CACHE_ALL_CHANNEL_MEMBERS_FOR_USER: &str = "All Channel Members for User";
pub const CACHE_ALL_CHANNEL_MEMBERS_NOTIFY_PROPS: &str = "All Channel Members Notify Props for Channel";
pub const CACHE_ROLE: &str = "Role";
pub const CACHE_SCHEME: &str = "Scheme";
pub const CACHE_REACTION: &str = "Reaction";

/// Error id returned when a save collides with a live channel of the same name.
pub const CHANNEL_EXISTS_ERROR: &str = "store.sql_channel.save_channel.exists.app_error";
pub const MISSING_CHANNEL_ERROR: &str = "store.sql_channel.get_by_name.missing.app_error";
pub const MISSING_CHANNEL_MEMBER_ERROR: &str = "store.sql_channel.get_member.missing.app_error";
