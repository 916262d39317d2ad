// On-disk layout of the data directory.
//
// Every entity type owns one directory below the data root and every record
// is one pretty-printed JSON file inside it.

pub const SYSTEM_FILE: &str = "system.json";

pub mod users {
    pub const DIR: &str = "users";
    pub const ID_PREFIX: &str = "user_";
}

pub mod todos {
    pub const DIR: &str = "todos";
    pub const ID_PREFIX: &str = "todo_";
}

/// Chats and their messages share one directory.
///
/// `<chat_id>_info.json` holds the chat metadata and
/// `<chat_id>_<message_id>.json` holds each message.
pub mod chats {
    pub const DIR: &str = "chats";
    pub const ID_PREFIX: &str = "chat_";
    pub const MESSAGE_ID_PREFIX: &str = "msg_";
    pub const INFO_SUFFIX: &str = "_info";
}

pub mod notifications {
    pub const DIR: &str = "notifications";
    pub const ID_PREFIX: &str = "notification_";
}

pub mod applications {
    pub const DIR: &str = "applications";
    pub const ID_PREFIX: &str = "app_";
}

pub mod sessions {
    pub const DIR: &str = "sessions";
}

/// Generates a fresh id for a record of the given prefix.
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}{}", uuid::Uuid::new_v4().simple())
}
