pub mod api;
pub mod applications;
pub mod auth;
pub mod chats;
pub mod client;
pub mod config;
pub mod context;
pub mod dashboard;
pub mod notifications;
pub mod permissions;
pub mod schema;
pub mod store;
pub mod tables;
pub mod todos;
pub mod users;

pub const BASE_URL: &str = "http://localhost:37240";
pub const SYSTEM_API: &str = "system";
pub const AUTH_API: &str = "auth";
pub const PERMISSIONS_API: &str = "permissions";
pub const USERS_API: &str = "users";
pub const TODOS_API: &str = "todos";
pub const CHATS_API: &str = "chats";
pub const NOTIFICATIONS_API: &str = "notifications";
pub const APPLICATIONS_API: &str = "applications";
pub const DASHBOARD_API: &str = "dashboard";
