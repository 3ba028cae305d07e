use cartkeeper_core::UserId;
use cartkeeper_db::{CartRepository, SqlCartRepository};
use serde_json::json;

use crate::commands::{execute, open_pool, storage_failure, to_data, CommandResult, Failure};

/// Shows one user's stored cart, or lists users with a stored cart.
///
/// Reads storage only: no allocation and no session state.
pub fn run(user_id: Option<&str>) -> CommandResult {
    let user_id = user_id.map(str::trim).filter(|id| !id.is_empty()).map(UserId::from);

    execute("cart", |config| async move {
        let pool = open_pool(&config).await?;
        let repository = SqlCartRepository::new(pool.clone());

        let result = match user_id {
            None => {
                let users = repository.list_users().await.map_err(storage_failure)?;
                let message = format!("{} stored cart(s)", users.len());
                CommandResult::success_with_data("cart", message, Some(to_data(&users)?))
            }
            Some(user_id) => match repository.find_by_user(&user_id).await {
                Ok(Some(cart)) => {
                    let meta = repository.record_meta(&user_id).await.map_err(storage_failure)?;
                    let data = json!({
                        "user_id": user_id,
                        "cart_id": cart.cart_id,
                        "allocation_error": cart.allocation_error,
                        "version": meta.as_ref().map(|meta| meta.version),
                        "stored_at": meta.map(|meta| meta.updated_at.to_rfc3339()),
                        "view": to_data(&cart.view())?,
                    });
                    let message = format!("cart for {user_id} has {} line(s)", cart.items().len());
                    CommandResult::success_with_data("cart", message, Some(data))
                }
                Ok(None) => CommandResult::success("cart", format!("no stored cart for {user_id}")),
                Err(error) if error.is_decode() => CommandResult::failure(
                    "cart",
                    "corrupt_record",
                    format!("stored cart for {user_id} is unreadable: {error}"),
                    7,
                ),
                Err(error) => return Err(storage_failure(error)),
            },
        };

        pool.close().await;
        Ok::<_, Failure>(result)
    })
}
