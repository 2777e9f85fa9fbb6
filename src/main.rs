use anyhow::{bail, Context, Result};
use platewatch::{logging, AppConfig, Query, Service};

#[derive(Debug)]
struct Cli {
    config_path: String,
    query: Query,
    watch: bool,
    recent: bool,
}

impl Cli {
    fn parse() -> Result<Self> {
        let mut args = std::env::args().skip(1);
        let mut config_path: Option<String> = None;
        let mut query = Query::default();
        let mut watch = false;
        let mut recent = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--config requires a path"))?;
                    config_path = Some(value);
                }
                "--plate" => {
                    query.plate = Some(
                        args.next()
                            .ok_or_else(|| anyhow::anyhow!("--plate requires a value"))?,
                    );
                }
                "--region" => {
                    query.region = Some(
                        args.next()
                            .ok_or_else(|| anyhow::anyhow!("--region requires a value"))?,
                    );
                }
                "--date" => {
                    query.date = Some(
                        args.next()
                            .ok_or_else(|| anyhow::anyhow!("--date requires a prefix"))?,
                    );
                }
                "--watch" => watch = true,
                "--recent" => recent = true,
                "--help" | "-h" => {
                    println!(
                        "Usage: platewatch [--config <path>] [--plate <text>] [--region <name>] [--date <prefix>] [--recent] [--watch]\n\
                         --config <path>    Path to TOML configuration (default: config/platewatch.toml)\n\
                         --plate <text>     Case-insensitive plate substring\n\
                         --region <name>    Region name, 'todos' for all\n\
                         --date <prefix>    Prefix of the raw detection datetime\n\
                         --recent           Print the newest records instead of the dashboard\n\
                         --watch            Keep the feed fresh until ctrl-c"
                    );
                    std::process::exit(0);
                }
                other => {
                    if config_path.is_none() && !other.starts_with("--") {
                        config_path = Some(other.to_string());
                    } else {
                        bail!("unknown argument '{other}'");
                    }
                }
            }
        }

        Ok(Self {
            config_path: config_path.unwrap_or_else(|| AppConfig::default_path().into()),
            query,
            watch,
            recent,
        })
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse()?;

    let config = AppConfig::load(&cli.config_path)
        .with_context(|| format!("unable to load configuration from {}", cli.config_path))?;

    let _log_guard = logging::init(&config)?;
    let service = Service::new(config)?;

    if cli.watch {
        return service.run().await;
    }

    let output = if cli.recent {
        serde_json::to_string_pretty(&serde_json::json!({
            "registros": service.recent_records()?,
        }))?
    } else {
        serde_json::to_string_pretty(&service.dashboard(&cli.query)?)?
    };
    println!("{output}");
    Ok(())
}
