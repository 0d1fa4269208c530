//! Shared fixtures for integration tests
#![allow(dead_code)]

use chrono::Utc;
use rfp_backend::dispatch::RetryPolicy;
use rfp_backend::domain::{Role, User};
use rfp_backend::store::RfpStore;
use rfp_backend::workflow::Caller;
use std::time::Duration;
use uuid::Uuid;

/// Retries quickly so failure paths finish within a test
pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_interval: Duration::from_millis(5),
        max_interval: Duration::from_millis(20),
    }
}

/// Insert an active user and return it as a caller.
pub async fn user(store: &dyn RfpStore, email: &str, role: Role) -> Caller {
    let user = User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        password_hash: "unused".to_string(),
        role,
        active: true,
        created_at: Utc::now(),
    };
    store.insert_user(&user).await.expect("insert user");
    Caller::new(user.id, role)
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
