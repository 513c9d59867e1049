use std::sync::Arc;

use anyhow::Context;
use breezometer_core::{BreezometerClient, Config, LogCrateLogger, Report};
use clap::{Args, Parser, Subcommand, ValueEnum};
use inquire::{Password, Text};
use serde_json::{Value, json};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "breezometer", version, about = "Breezometer air quality CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the API key and connection settings.
    Configure,

    /// Current air quality conditions.
    Current {
        #[command(flatten)]
        location: LocationArgs,

        /// Data fields to include, e.g. "breezometer_aqi". Repeatable.
        #[arg(long = "feature")]
        features: Vec<String>,
    },

    /// Hourly air quality in the past.
    Historical {
        #[command(flatten)]
        location: LocationArgs,

        #[command(flatten)]
        window: WindowArgs,

        #[arg(long = "feature")]
        features: Vec<String>,
    },

    /// Hourly air quality forecast.
    Forecast {
        #[command(flatten)]
        location: LocationArgs,

        #[command(flatten)]
        window: WindowArgs,

        #[arg(long = "feature")]
        features: Vec<String>,
    },

    /// Daily pollen forecast.
    Pollen {
        #[command(flatten)]
        location: LocationArgs,

        /// Number of days to forecast (1-3).
        #[arg(long, default_value_t = 1)]
        days: u32,

        #[arg(long = "feature")]
        features: Vec<String>,
    },

    /// Active fires around a location.
    Fire {
        #[command(flatten)]
        location: LocationArgs,

        #[arg(long, value_enum)]
        units: Option<UnitsArg>,

        /// Search radius in km (metric) or miles (imperial).
        #[arg(long)]
        radius: Option<f64>,
    },
}

#[derive(Debug, Args)]
pub struct LocationArgs {
    /// WGS84 latitude.
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    /// WGS84 longitude.
    #[arg(long, allow_hyphen_values = true)]
    lon: f64,

    /// Response language, e.g. "en" or "fr".
    #[arg(long)]
    lang: Option<String>,

    /// Include request metadata in the response.
    #[arg(long)]
    metadata: bool,
}

#[derive(Debug, Args)]
pub struct WindowArgs {
    /// A single instant (RFC 3339, or YYYY-MM-DDTHH:MM:SS in UTC).
    #[arg(long)]
    at: Option<String>,

    /// Start of a range; requires --end.
    #[arg(long)]
    start: Option<String>,

    /// End of a range; requires --start.
    #[arg(long)]
    end: Option<String>,

    /// Number of hours from (or before) now.
    #[arg(long)]
    hours: Option<u32>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum UnitsArg {
    Metric,
    Imperial,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let output = match self.command {
            Command::Configure => return configure(),
            Command::Current { location, features } => {
                let params = location.params(&features);
                render(connect()?.current_conditions(&params).await?)?
            }
            Command::Historical {
                location,
                window,
                features,
            } => {
                let mut params = location.params(&features);
                window.apply(&mut params);
                render(connect()?.historical_hourly(&params).await?)?
            }
            Command::Forecast {
                location,
                window,
                features,
            } => {
                let mut params = location.params(&features);
                window.apply(&mut params);
                render(connect()?.forecast_hourly(&params).await?)?
            }
            Command::Pollen {
                location,
                days,
                features,
            } => {
                let mut params = location.params(&features);
                params["days"] = json!(days);
                render(connect()?.daily_pollen_forecast(&params).await?)?
            }
            Command::Fire {
                location,
                units,
                radius,
            } => {
                let mut params = location.params(&[]);
                if let Some(units) = units {
                    params["units"] = json!(units.as_str());
                }
                if let Some(radius) = radius {
                    params["radius"] = json!(radius);
                }
                render(connect()?.current_fire_conditions(&params).await?)?
            }
        };

        println!("{output}");
        Ok(())
    }
}

impl UnitsArg {
    fn as_str(&self) -> &'static str {
        match self {
            UnitsArg::Metric => "metric",
            UnitsArg::Imperial => "imperial",
        }
    }
}

impl LocationArgs {
    fn params(&self, features: &[String]) -> Value {
        let mut params = json!({ "lat": self.lat, "lon": self.lon });
        if let Some(lang) = &self.lang {
            params["lang"] = json!(lang);
        }
        if self.metadata {
            params["metadata"] = json!(true);
        }
        if !features.is_empty() {
            params["features"] = json!(features);
        }
        params
    }
}

impl WindowArgs {
    fn apply(&self, params: &mut Value) {
        if let Some(at) = &self.at {
            params["datetime"] = json!(at);
        }
        if let Some(start) = &self.start {
            params["start_datetime"] = json!(start);
        }
        if let Some(end) = &self.end {
            params["end_datetime"] = json!(end);
        }
        if let Some(hours) = self.hours {
            params["hours"] = json!(hours);
        }
    }
}

fn connect() -> anyhow::Result<BreezometerClient> {
    let config = Config::load()?;
    log::debug!("Using Breezometer at {}", config.base_url());
    BreezometerClient::from_config(&config, Arc::new(LogCrateLogger::default()))
}

fn render<T: serde::Serialize>(report: Option<Report<T>>) -> anyhow::Result<String> {
    match report {
        Some(report) => {
            serde_json::to_string_pretty(&report).context("Failed to format Breezometer report")
        }
        None => Ok("Location not supported by Breezometer.".to_string()),
    }
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    let api_key = Password::new("Breezometer API key:")
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;
    config.set_api_key(api_key.trim().to_string());

    let base_url = Text::new("Base URL:")
        .with_default(config.base_url())
        .prompt()
        .context("Failed to read base URL")?;
    config.base_url = Some(base_url);

    config.save()?;
    println!(
        "Configuration saved to {}",
        Config::config_file_path()?.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Command {
        let mut argv = vec!["breezometer"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("arguments should parse").command
    }

    #[test]
    fn current_builds_params_with_features() {
        let Command::Current { location, features } = parse(&[
            "current", "--lat", "43.07", "--lon", "-89.39", "--feature", "local_aqi",
            "--feature", "breezometer_aqi", "--metadata",
        ]) else {
            panic!("expected current");
        };

        let params = location.params(&features);
        assert_eq!(
            params,
            json!({
                "lat": 43.07,
                "lon": -89.39,
                "metadata": true,
                "features": ["local_aqi", "breezometer_aqi"]
            })
        );
    }

    #[test]
    fn historical_window_maps_to_api_fields() {
        let Command::Historical {
            location,
            window,
            features,
        } = parse(&[
            "historical", "--lat", "1", "--lon", "2", "--start", "2024-05-01T00:00:00Z", "--end",
            "2024-05-02T00:00:00Z",
        ])
        else {
            panic!("expected historical");
        };

        let mut params = location.params(&features);
        window.apply(&mut params);
        assert_eq!(params["start_datetime"], json!("2024-05-01T00:00:00Z"));
        assert_eq!(params["end_datetime"], json!("2024-05-02T00:00:00Z"));
        assert!(params.get("datetime").is_none());
        assert!(params.get("features").is_none());
    }

    #[test]
    fn fire_units_are_lowercase() {
        let Command::Fire { units, .. } =
            parse(&["fire", "--lat", "1", "--lon", "2", "--units", "imperial"])
        else {
            panic!("expected fire");
        };
        assert_eq!(units.map(|u| u.as_str()), Some("imperial"));
    }

    #[test]
    fn unsupported_location_renders_message() {
        let out = render::<Value>(None).unwrap();
        assert!(out.contains("not supported"));
    }
}
