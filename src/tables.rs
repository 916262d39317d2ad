use crate::schema;
use crate::store::Entity;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Username of the sentinel account that implicitly holds every capability.
pub const ADMIN_USERNAME: &str = "admin";

pub fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

// * Capabilities ..............................................................

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    UserCreate,
    UserEdit,
    UserDelete,
    UserView,
    TodoManage,
    TodoCheck,
    ChatSend,
    ChatDelete,
    ChatGroup,
    ApplicationCreate,
    ApplicationDelete,
    ApplicationApprove,
    ApplicationManage,
    PermissionAssign,
    SystemConfig,
    NotificationView,
    NotificationDelete,
}

impl Capability {
    pub const ALL: [Capability; 17] = [
        Capability::UserCreate,
        Capability::UserEdit,
        Capability::UserDelete,
        Capability::UserView,
        Capability::TodoManage,
        Capability::TodoCheck,
        Capability::ChatSend,
        Capability::ChatDelete,
        Capability::ChatGroup,
        Capability::ApplicationCreate,
        Capability::ApplicationDelete,
        Capability::ApplicationApprove,
        Capability::ApplicationManage,
        Capability::PermissionAssign,
        Capability::SystemConfig,
        Capability::NotificationView,
        Capability::NotificationDelete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::UserCreate => "user_create",
            Capability::UserEdit => "user_edit",
            Capability::UserDelete => "user_delete",
            Capability::UserView => "user_view",
            Capability::TodoManage => "todo_manage",
            Capability::TodoCheck => "todo_check",
            Capability::ChatSend => "chat_send",
            Capability::ChatDelete => "chat_delete",
            Capability::ChatGroup => "chat_group",
            Capability::ApplicationCreate => "application_create",
            Capability::ApplicationDelete => "application_delete",
            Capability::ApplicationApprove => "application_approve",
            Capability::ApplicationManage => "application_manage",
            Capability::PermissionAssign => "permission_assign",
            Capability::SystemConfig => "system_config",
            Capability::NotificationView => "notification_view",
            Capability::NotificationDelete => "notification_delete",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Capability::UserCreate => "Create users",
            Capability::UserEdit => "Edit users",
            Capability::UserDelete => "Delete users",
            Capability::UserView => "View users",
            Capability::TodoManage => "Manage todos",
            Capability::TodoCheck => "Check off todos",
            Capability::ChatSend => "Send messages",
            Capability::ChatDelete => "Delete messages",
            Capability::ChatGroup => "Group chats",
            Capability::ApplicationCreate => "Create applications",
            Capability::ApplicationDelete => "Delete applications",
            Capability::ApplicationApprove => "Approve applications",
            Capability::ApplicationManage => "Manage applications",
            Capability::PermissionAssign => "Assign permissions",
            Capability::SystemConfig => "System configuration",
            Capability::NotificationView => "View notifications",
            Capability::NotificationDelete => "Delete notifications",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown capability: {0}")]
pub struct UnknownCapability(pub String);

impl FromStr for Capability {
    type Err = UnknownCapability;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|cap| cap.as_str() == s)
            .ok_or_else(|| UnknownCapability(s.to_string()))
    }
}

// * Users .....................................................................

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub code: String,
    pub username: String,
    pub password_hash: String,
    pub position: String,
    #[serde(default)]
    pub permissions: Vec<Capability>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub subordinates: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_department: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    #[serde(default)]
    pub last_login: Option<NaiveDateTime>,
}

fn default_true() -> bool {
    true
}

impl User {
    pub fn new(
        name: String,
        code: String,
        username: String,
        password_hash: String,
        position: String,
        permissions: Vec<Capability>,
    ) -> Self {
        let created_at = now();
        Self {
            id: schema::new_id(schema::users::ID_PREFIX),
            name,
            code,
            username,
            password_hash,
            position,
            permissions,
            parent_id: None,
            subordinates: Vec::new(),
            is_active: true,
            is_department: false,
            created_at,
            updated_at: created_at,
            last_login: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.username == ADMIN_USERNAME
    }

    pub fn touch(&mut self) {
        self.updated_at = now();
    }
}

impl Entity for User {
    const DIR: &'static str = schema::users::DIR;

    fn file_stem(&self) -> String {
        self.id.clone()
    }

    fn index_keys(&self) -> Vec<String> {
        vec![format!("username:{}", self.username)]
    }
}

// * Todos .....................................................................

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TodoStatus::Pending => "pending",
            TodoStatus::InProgress => "in_progress",
            TodoStatus::Completed => "completed",
        }
    }
}

impl FromStr for TodoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TodoStatus::Pending),
            "in_progress" => Ok(TodoStatus::InProgress),
            "completed" => Ok(TodoStatus::Completed),
            other => Err(format!("unknown todo status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoPriority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub creator_id: String,
    pub assignee_id: String,
    #[serde(default)]
    pub status: TodoStatus,
    #[serde(default)]
    pub priority: TodoPriority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    #[serde(default)]
    pub completed_at: Option<NaiveDateTime>,
}

impl Todo {
    pub fn new(
        title: String,
        description: String,
        creator_id: String,
        assignee_id: String,
        priority: TodoPriority,
        due_date: Option<NaiveDate>,
    ) -> Self {
        let created_at = now();
        Self {
            id: schema::new_id(schema::todos::ID_PREFIX),
            title,
            description,
            creator_id,
            assignee_id,
            status: TodoStatus::Pending,
            priority,
            due_date,
            created_at,
            updated_at: created_at,
            completed_at: None,
        }
    }
}

impl Entity for Todo {
    const DIR: &'static str = schema::todos::DIR;

    fn file_stem(&self) -> String {
        self.id.clone()
    }

    fn index_keys(&self) -> Vec<String> {
        vec![
            format!("creator:{}", self.creator_id),
            format!("assignee:{}", self.assignee_id),
        ]
    }
}

// * Chats .....................................................................

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Private,
    Group,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ChatKind,
    pub participants: Vec<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Chat {
    pub fn new(kind: ChatKind, participants: Vec<String>, name: Option<String>) -> Self {
        Self {
            id: schema::new_id(schema::chats::ID_PREFIX),
            kind,
            participants,
            name,
            created_at: now(),
        }
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }
}

/// Index key under which a private chat between two users is found,
/// independent of argument order.
pub fn private_pair_key(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("pair:{first}:{second}")
}

impl Entity for Chat {
    const DIR: &'static str = schema::chats::DIR;
    const GLOB: &'static str = "*_info.json";

    fn file_stem(&self) -> String {
        format!("{}{}", self.id, schema::chats::INFO_SUFFIX)
    }

    fn accepts_stem(stem: &str) -> bool {
        stem.ends_with(schema::chats::INFO_SUFFIX)
    }

    fn index_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .participants
            .iter()
            .map(|p| format!("participant:{p}"))
            .collect();
        if self.kind == ChatKind::Private && self.participants.len() == 2 {
            keys.push(private_pair_key(&self.participants[0], &self.participants[1]));
        }
        keys
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "type", default)]
    pub mime_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub status: MessageStatus,
    pub created_at: NaiveDateTime,
}

impl Message {
    pub fn new(
        chat_id: String,
        sender_id: String,
        content: String,
        attachments: Vec<Attachment>,
    ) -> Self {
        Self {
            id: schema::new_id(schema::chats::MESSAGE_ID_PREFIX),
            chat_id,
            sender_id,
            content,
            attachments,
            status: MessageStatus::Sent,
            created_at: now(),
        }
    }

    pub fn stem_for(chat_id: &str, message_id: &str) -> String {
        format!("{chat_id}_{message_id}")
    }
}

impl Entity for Message {
    const DIR: &'static str = schema::chats::DIR;

    fn file_stem(&self) -> String {
        Message::stem_for(&self.chat_id, &self.id)
    }

    fn accepts_stem(stem: &str) -> bool {
        !stem.ends_with(schema::chats::INFO_SUFFIX)
    }

    fn index_keys(&self) -> Vec<String> {
        vec![format!("chat:{}", self.chat_id)]
    }
}

// * Notifications .............................................................

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    System,
    Todo,
    Chat,
    Application,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub related_id: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

impl Notification {
    pub fn new(
        user_id: String,
        kind: NotificationKind,
        title: String,
        content: String,
        related_id: Option<String>,
    ) -> Self {
        Self {
            id: schema::new_id(schema::notifications::ID_PREFIX),
            user_id,
            kind,
            title,
            content,
            related_id,
            is_read: false,
            created_at: now(),
        }
    }
}

impl Entity for Notification {
    const DIR: &'static str = schema::notifications::DIR;

    fn file_stem(&self) -> String {
        self.id.clone()
    }

    fn index_keys(&self) -> Vec<String> {
        vec![format!("recipient:{}", self.user_id)]
    }
}

// * Applications ..............................................................

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationKind {
    Account,
    Permission,
    Resource,
    #[default]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type", default)]
    pub kind: ApplicationKind,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub status: ApplicationStatus,
    #[serde(default)]
    pub approver_id: Option<String>,
    #[serde(default)]
    pub decided_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Application {
    pub fn new(user_id: String, kind: ApplicationKind, title: String, content: String) -> Self {
        let created_at = now();
        Self {
            id: schema::new_id(schema::applications::ID_PREFIX),
            user_id,
            kind,
            title,
            content,
            status: ApplicationStatus::Pending,
            approver_id: None,
            decided_at: None,
            rejection_reason: None,
            created_at,
            updated_at: created_at,
        }
    }
}

impl Entity for Application {
    const DIR: &'static str = schema::applications::DIR;

    fn file_stem(&self) -> String {
        self.id.clone()
    }

    fn index_keys(&self) -> Vec<String> {
        vec![
            format!("requester:{}", self.user_id),
            format!("status:{}", self.status.as_str()),
        ]
    }
}

// * Sessions and system state .................................................

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// SHA-256 of the bearer token, hex encoded. The token itself is never stored.
    pub id: String,
    pub user_id: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= now()
    }
}

impl Entity for Session {
    const DIR: &'static str = schema::sessions::DIR;

    fn file_stem(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    #[serde(default)]
    pub initialized: bool,
    #[serde(default)]
    pub admin_created: bool,
    #[serde(default)]
    pub init_time: Option<NaiveDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_round_trips_through_str() {
        for cap in Capability::ALL {
            assert_eq!(cap.as_str().parse::<Capability>().unwrap(), cap);
            assert_eq!(
                serde_json::to_value(cap).unwrap(),
                serde_json::Value::String(cap.as_str().to_string())
            );
        }
        assert!("fly_plane".parse::<Capability>().is_err());
    }

    #[test]
    fn test_private_pair_key_ignores_order() {
        assert_eq!(private_pair_key("user_b", "user_a"), private_pair_key("user_a", "user_b"));
    }

    #[test]
    fn test_chat_serializes_kind_as_type() {
        let chat = Chat::new(ChatKind::Group, vec!["user_a".into()], Some("ops".into()));
        let value = serde_json::to_value(&chat).unwrap();
        assert_eq!(value["type"], "group");
        assert!(chat.file_stem().ends_with("_info"));
    }

    #[test]
    fn test_admin_sentinel_is_identified_by_username() {
        let mut user = User::new(
            "Root".into(),
            "ADMIN001".into(),
            ADMIN_USERNAME.into(),
            String::new(),
            "Administrator".into(),
            vec![],
        );
        assert!(user.is_admin());
        user.username = "alice".into();
        assert!(!user.is_admin());
    }
}
