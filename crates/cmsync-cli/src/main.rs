use std::path::PathBuf;
use std::time::Duration;

use clap::{value_parser, ArgAction, Parser, ValueEnum};
use cmsync_core::{run_loop, ErrorPolicy, KubeConfigMaps, SyncSettings};
use color_eyre::{eyre::eyre, Result};
use kube::Client;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = CmsyncCli::parse();
    init_tracing(cli.trace, cli.verbose, cli.quiet);

    // In-cluster credentials first, kubeconfig fallback.
    let client = Client::try_default()
        .await
        .map_err(|err| eyre!("failed to initialize cluster client: {err}"))?;
    tracing::info!("cluster client ready");

    let provider = KubeConfigMaps::new(client);
    let settings = SyncSettings {
        namespace: cli.namespace,
        selector: cli.label_selector,
        output_dir: cli.output_dir,
        interval: Duration::from_secs(cli.sleep),
        on_error: cli.on_error.into(),
    };

    run_loop(&provider, &settings).await?;
    Ok(())
}

fn init_tracing(trace: bool, verbose: u8, quiet: bool) {
    let level = if trace {
        "trace"
    } else if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("cmsync={level},cmsync_core={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Mirror labeled ConfigMaps onto a local directory tree",
    long_about = "Polls the cluster for ConfigMaps matching a label selector and keeps \
<output-dir>/<name>/<key> convergent with their data, removing anything stale.",
    after_help = "Examples:\n  cmsync --label-selector app=web --namespace prod --output-dir /etc/mirrored\n  cmsync --label-selector tier=config --sleep 10 --on-error retry -v\n"
)]
struct CmsyncCli {
    #[arg(
        long,
        env = "KUBERNETES_LABEL_SELECTOR",
        help = "Label selector filtering which ConfigMaps are mirrored"
    )]
    label_selector: String,
    #[arg(
        long,
        env = "KUBERNETES_NAMESPACE",
        default_value = "default",
        help = "Namespace the ConfigMaps are listed in"
    )]
    namespace: String,
    #[arg(
        long,
        env = "CMSYNC_OUTPUT_DIR",
        value_parser = value_parser!(PathBuf),
        help = "Directory to write config files (created if absent)"
    )]
    output_dir: PathBuf,
    #[arg(
        long,
        env = "CMSYNC_SLEEP",
        default_value_t = 30,
        value_parser = value_parser!(u64).range(1..),
        help = "Seconds to sleep between sync cycles"
    )]
    sleep: u64,
    #[arg(
        long,
        value_enum,
        default_value_t = OnErrorCli::Fail,
        help = "Whether a failed cycle exits the process or retries next interval"
    )]
    on_error: OnErrorCli,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)")]
    verbose: u8,
    #[arg(
        short,
        long,
        help = "Suppress routine output (warnings still print)",
        conflicts_with = "verbose"
    )]
    quiet: bool,
    #[arg(long, help = "Force trace logging regardless of -v/-q")]
    trace: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum OnErrorCli {
    Fail,
    Retry,
}

impl From<OnErrorCli> for ErrorPolicy {
    fn from(value: OnErrorCli) -> Self {
        match value {
            OnErrorCli::Fail => ErrorPolicy::Fail,
            OnErrorCli::Retry => ErrorPolicy::Retry,
        }
    }
}
