use crate::tables::{Capability, User};

/// The authenticated actor of one request.
///
/// Built by the auth gate for every request and passed explicitly to every
/// domain operation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub actor: User,
    /// Id of the session the request was authenticated with, if any.
    pub session_id: Option<String>,
}

impl RequestContext {
    pub fn new(actor: User) -> Self {
        Self {
            actor,
            session_id: None,
        }
    }

    pub fn with_session(actor: User, session_id: String) -> Self {
        Self {
            actor,
            session_id: Some(session_id),
        }
    }

    pub fn actor_id(&self) -> &str {
        &self.actor.id
    }

    pub fn is_admin(&self) -> bool {
        self.actor.is_admin()
    }

    pub fn has(&self, capability: Capability) -> bool {
        crate::permissions::has_permission(&self.actor, capability)
    }
}
