use crate::commands::{finish, open_pool, prepare, CommandResult, StepFailure};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("migrate") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        pool.close().await;
        Ok::<(), StepFailure>(())
    });

    finish("migrate", result, |()| CommandResult::success("migrate", "applied pending migrations"))
}
