//! User account mutations triggered by webhooks.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;

/// A user account as the webhooks see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Identity provider user id
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub is_pro: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pro_since: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lemon_squeezy_customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lemon_squeezy_order_id: Option<String>,
}

/// Payment details that upgrade an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProUpgrade {
    pub email: String,
    pub customer_id: String,
    pub order_id: String,
    pub amount: u64,
    /// Epoch milliseconds recorded as `pro_since`
    pub upgraded_at: i64,
}

/// Account store the webhook handlers write to.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Create the account if it does not exist yet. Existing accounts are left as they are.
    async fn sync_user(&self, user_id: &str, email: &str, name: &str) -> Result<()>;

    /// Mark the account with `upgrade.email` as pro. Returns `false` when no
    /// account has that email.
    async fn upgrade_to_pro(&self, upgrade: &ProUpgrade) -> Result<bool>;

    async fn find_user(&self, user_id: &str) -> Result<Option<UserRecord>>;
}

/// In-process user directory keyed by user id.
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: DashMap<String, UserRecord>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn sync_user(&self, user_id: &str, email: &str, name: &str) -> Result<()> {
        let mut created = false;
        self.users.entry(user_id.to_string()).or_insert_with(|| {
            created = true;
            UserRecord {
                user_id: user_id.to_string(),
                email: email.to_string(),
                name: name.to_string(),
                is_pro: false,
                pro_since: None,
                lemon_squeezy_customer_id: None,
                lemon_squeezy_order_id: None,
            }
        });

        if created {
            info!(user_id = %user_id, "User created");
        } else {
            debug!(user_id = %user_id, "User already exists");
        }
        Ok(())
    }

    async fn upgrade_to_pro(&self, upgrade: &ProUpgrade) -> Result<bool> {
        for mut user in self.users.iter_mut() {
            if user.email == upgrade.email {
                user.is_pro = true;
                user.pro_since = Some(upgrade.upgraded_at);
                user.lemon_squeezy_customer_id = Some(upgrade.customer_id.clone());
                user.lemon_squeezy_order_id = Some(upgrade.order_id.clone());
                info!(
                    user_id = %user.user_id,
                    order_id = %upgrade.order_id,
                    amount = upgrade.amount,
                    "User upgraded to pro"
                );
                return Ok(true);
            }
        }

        debug!(email = %upgrade.email, "No user found for pro upgrade");
        Ok(false)
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.get(user_id).map(|u| u.value().clone()))
    }
}
