use anyhow::{bail, Context};
use autopipe::config::ConfigManager;
use autopipe::data::CsvConnector;
use autopipe::{AutoPipeline, Task};
use log::info;

const USAGE: &str = "usage: autopipe <config.toml> <data.csv> <target> <classification|regression>";

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [config_path, data_path, target, task] = args.as_slice() else {
        bail!(USAGE);
    };
    let task = match task.as_str() {
        "classification" => Task::Classification,
        "regression" => Task::Regression,
        other => bail!("unknown task '{}'\n{}", other, USAGE),
    };

    let manager = ConfigManager::new();
    manager
        .load_from_file(config_path)
        .with_context(|| format!("loading {}", config_path))?;
    let config = manager.get()?;

    let df = CsvConnector::load(data_path)?;
    info!("loaded {} rows x {} columns from {}", df.height(), df.width(), data_path);

    let mut automl = AutoPipeline::new(task, config)?;
    let report = automl.fit_dataframe(&df, target)?;
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
