use clap::{Parser, Subcommand};
use forge_orchestrator::config::Config;
use forge_orchestrator::github::GithubRegistry;
use forge_orchestrator::run;
use forge_providers::scaleway::ScalewayProvider;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "forge-runner",
    about = "Provisions an ephemeral GitHub Actions runner on a cloud instance and tears it down"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Launch an instance and wait for its runner to come online
    Start,
    /// Terminate the instance and de-register its runner
    Stop,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let provider = ScalewayProvider::new(
        config.provider.project_id.clone(),
        config.provider.secret_key.clone(),
        config.provider.zone.clone(),
    );
    let registry = GithubRegistry::new(
        config.github.token.clone(),
        config.github.owner.clone(),
        config.github.repo.clone(),
    );

    match cli.command {
        Command::Start => {
            config.validate_start()?;
            let outcome = run::start_runner(&config, &provider, &registry).await?;
            info!(
                "runner '{}' ready on instance {} ({} segment(s) skipped)",
                outcome.label,
                outcome.instance.id,
                outcome.segment_failures.len()
            );
            // Machine-readable outputs for the invoking pipeline.
            println!("label={}", outcome.label);
            println!("instance-id={}", outcome.instance.id);
        }
        Command::Stop => {
            config.validate_stop()?;
            run::stop_runner(&config, &provider, &registry).await?;
            info!("teardown complete");
        }
    }

    Ok(())
}
