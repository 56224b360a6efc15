use thiserror::Error;
use tracing::info;

use super::store::{AccountUpdate, UserStore};

const MAX_NAME_LENGTH: usize = 255;

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("{0} must be at most 255 characters")]
    NameTooLong(&'static str),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// 校验并写入账户字段，缺省字段保持不变
pub async fn update_account(users: &UserStore, user_id: &str, update: AccountUpdate) -> Result<(), AccountError> {
    let update = validate(update)?;
    info!(
        user_id,
        email = update.email.is_some(),
        first_name = update.first_name.is_some(),
        last_name = update.last_name.is_some(),
        "更新账户设置"
    );
    users.update_account(user_id, update).await?;
    Ok(())
}

/// 只做最基本的形状检查：恰好一个 `@` 且两侧非空
pub fn looks_like_email(value: &str) -> bool {
    match value.trim().split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

fn validate(mut update: AccountUpdate) -> Result<AccountUpdate, AccountError> {
    if let Some(email) = update.email.as_mut() {
        if !looks_like_email(email) {
            return Err(AccountError::InvalidEmail);
        }
        *email = email.trim().to_lowercase();
    }
    for (field, value) in [("first_name", &mut update.first_name), ("last_name", &mut update.last_name)] {
        if let Some(value) = value {
            *value = value.trim().to_string();
            if value.chars().count() > MAX_NAME_LENGTH {
                return Err(AccountError::NameTooLong(field));
            }
        }
    }
    Ok(update)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::database::setup_memory_database;

    #[test]
    fn test_email_validation() {
        for bad in ["", "plain", "@example.com", "ada@", "a@b@c"] {
            let update = AccountUpdate {
                email: Some(bad.to_string()),
                ..Default::default()
            };
            assert_matches!(validate(update), Err(AccountError::InvalidEmail), "{}", bad);
        }
        let ok = validate(AccountUpdate {
            email: Some(" Ada@Example.com ".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(ok.email.as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn test_name_length_limit() {
        let update = AccountUpdate {
            last_name: Some("x".repeat(256)),
            ..Default::default()
        };
        assert_matches!(validate(update), Err(AccountError::NameTooLong("last_name")));

        let update = AccountUpdate {
            first_name: Some("é".repeat(255)),
            ..Default::default()
        };
        assert!(validate(update).is_ok());
    }

    #[tokio::test]
    async fn test_rejected_update_writes_nothing() {
        let users = UserStore::new(setup_memory_database().await);
        let update = AccountUpdate {
            email: Some("nope".to_string()),
            first_name: Some("Ada".to_string()),
            ..Default::default()
        };
        assert!(update_account(&users, "u1", update).await.is_err());
        assert!(users.find_account("u1").await.unwrap().is_none());
    }
}
