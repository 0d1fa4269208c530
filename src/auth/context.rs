use uuid::Uuid;

use crate::domain::{Role, User};
use crate::workflow::Caller;

/// Authenticated user resolved from an access token
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl AuthContext {
    pub fn caller(&self) -> Caller {
        Caller::new(self.user_id, self.role)
    }
}

impl From<&User> for AuthContext {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
        }
    }
}
