//! Well-known WS method names, client → server.

// chat
pub const SEND_MESSAGE: &str = "send_message";
pub const RECOVER_MESSAGE: &str = "recover_message";
pub const UPDATE_SESSION_MODEL: &str = "update_session_model";
pub const TYPING_START: &str = "typing_start";
pub const TYPING_STOP: &str = "typing_stop";

// sessions
pub const SESSIONS_LIST: &str = "sessions.list";
pub const SESSIONS_GET: &str = "sessions.get";

// lists (saved queries)
pub const LISTS_LIST: &str = "lists.list";
pub const LISTS_GET: &str = "lists.get";

// handshake
pub const CONNECT: &str = "connect";

// housekeeping
pub const PING: &str = "ping";
