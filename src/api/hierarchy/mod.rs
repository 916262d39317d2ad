pub mod generics;
pub mod users;
