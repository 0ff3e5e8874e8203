use std::thread;
use std::time::Duration;

use anyhow::Result;

use policy_language_server::config::Config;
use policy_language_server::lsp::server;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = Config::from_args_and_env()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();

    // If running under the integration test, exit after a short delay so the test can read stdout to EOF.
    if std::env::var("POLICY_LS_TEST_EXIT").as_deref() == Ok("1") {
        thread::spawn(|| {
            thread::sleep(Duration::from_secs(1));
            std::process::exit(0);
        });
    }

    server::serve(config).await
}
