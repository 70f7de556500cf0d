use http_agent::{join_results, HttpAgent};
use tracing_subscriber::EnvFilter;

/// Fetches every URL given on the command line in parallel and pipes the
/// bodies, in argument order, to stdout.
///
/// `HTTP_AGENT_*` variables tune the agent, `RUST_LOG` the log output.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        anyhow::bail!("usage: fetch_group <url>...");
    }

    let agent = HttpAgent::from_env()?;
    tracing::info!("{}", agent.options());

    let mut writers = vec![tokio::io::stdout()];
    let results = agent.get_to_writer_group(&mut writers, &urls).await;
    join_results(results)?;

    Ok(())
}
