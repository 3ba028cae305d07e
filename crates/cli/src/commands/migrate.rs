use crate::commands::{execute, open_pool, CommandResult, Failure};

pub fn run() -> CommandResult {
    execute("migrate", |config| async move {
        let pool = open_pool(&config).await?;
        pool.close().await;
        Ok::<_, Failure>(CommandResult::success("migrate", "applied pending migrations"))
    })
}
