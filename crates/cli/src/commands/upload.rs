use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cartkeeper_agent::{HttpCommerceClient, OrderResult, OrderSubmissionPipeline};
use cartkeeper_core::config::AppConfig;
use cartkeeper_core::{ApplicationError, Cart, DomainError, UserId};
use cartkeeper_db::{DbPool, SqlCartRepository};

use crate::commands::{execute, open_pool, storage_failure, to_data, CommandResult, Failure};

/// Where the cart to upload comes from.
#[derive(Debug, Clone)]
pub enum UploadSource {
    /// The cart document currently stored for a user.
    Stored(String),
    /// A cart document exported to a JSON file.
    File(PathBuf),
}

/// Sends one cart to the order endpoint, exactly once.
///
/// Exit codes: 7 submission rejected or failed, 8 input problem.
pub fn run(source: UploadSource) -> CommandResult {
    execute("upload", |config| async move {
        config
            .commerce
            .require_order_url()
            .map_err(|error| ("config_validation", error.to_string(), 2u8))?;

        let pool = open_pool(&config).await?;
        let outcome = submit(&config, &pool, source).await;
        pool.close().await;

        let result = match outcome? {
            OrderResult::Submitted(receipt) => CommandResult::success_with_data(
                "upload",
                format!("order for cart {} accepted", receipt.cart_id),
                Some(to_data(&receipt)?),
            ),
            OrderResult::Failed(failure) => {
                let class = if failure.retryable { "submission_retryable" } else { "submission" };
                CommandResult::failure("upload", class, failure.error, 7)
            }
        };
        Ok::<_, Failure>(result)
    })
}

async fn submit(
    config: &AppConfig,
    pool: &DbPool,
    source: UploadSource,
) -> Result<OrderResult, Failure> {
    let client = HttpCommerceClient::from_config(&config.commerce)
        .map_err(|error| ("commerce_client", error.to_string(), 3u8))?;
    let timeout = Duration::from_secs(config.commerce.request_timeout_secs);
    let pipeline = OrderSubmissionPipeline::new(
        Arc::new(client),
        Arc::new(SqlCartRepository::new(pool.clone())),
        timeout,
    );

    let submitted = match source {
        UploadSource::Stored(user_id) => {
            let user_id = UserId::from(user_id.trim());
            if user_id.as_str().is_empty() {
                return Err(("invalid_input", "user id is required".to_string(), 8));
            }
            pipeline.upload_cart(&user_id).await
        }
        UploadSource::File(path) => {
            let cart = read_cart_file(&path)?;
            pipeline.submit(&cart).await
        }
    };
    submitted.map_err(classify)
}

fn read_cart_file(path: &Path) -> Result<Cart, Failure> {
    let raw = fs::read_to_string(path).map_err(|error| {
        ("invalid_input", format!("could not read `{}`: {error}", path.display()), 8u8)
    })?;
    serde_json::from_str(&raw).map_err(|error| {
        ("invalid_input", format!("`{}` is not a cart document: {error}", path.display()), 8u8)
    })
}

fn classify(error: ApplicationError) -> Failure {
    match error {
        ApplicationError::Domain(DomainError::EmptyCart) => {
            ("empty_cart", DomainError::EmptyCart.to_string(), 8)
        }
        ApplicationError::Domain(error) => ("invalid_cart", error.to_string(), 8),
        ApplicationError::Storage(message) => storage_failure(message),
        other => ("submission", other.to_string(), 7),
    }
}
