use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use std::sync::Arc;
use tabled::{Table, Tabled};

use airthings_rs::auth::OAUTH2_TOKEN;
use airthings_rs::client::API_URL;
use airthings_rs::config::{self, Config, ConfigTokenStore};
use airthings_rs::sensor::{self, SensorEntity};
use airthings_rs::{AirthingsClient, LocationService, OAuthSession, TokenRefreshCallback};

#[derive(Parser)]
#[command(name = "airthings")]
#[command(about = "A CLI for polling Airthings air quality sensors")]
#[command(version)]
struct Cli {
    /// Base URL of the Airthings API
    #[arg(long, env = "AIRTHINGS_API_URL", default_value = API_URL, hide = true)]
    api_url: String,

    /// OAuth2 token endpoint
    #[arg(long, env = "AIRTHINGS_TOKEN_URL", default_value = OAUTH2_TOKEN, hide = true)]
    token_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store API client credentials and a refresh token
    Login {
        /// OAuth client ID of your Airthings API client
        #[arg(long, env = "AIRTHINGS_CLIENT_ID")]
        client_id: String,
        /// OAuth client secret of your Airthings API client
        #[arg(long, env = "AIRTHINGS_CLIENT_SECRET")]
        client_secret: String,
        /// Refresh token obtained from the Airthings authorization flow
        #[arg(long, env = "AIRTHINGS_REFRESH_TOKEN")]
        refresh_token: String,
        /// Organization to scope every request to
        #[arg(long, env = "AIRTHINGS_ORGANIZATION_ID")]
        organization_id: Option<String>,
        /// Polling interval in seconds
        #[arg(long, default_value_t = 300)]
        scan_interval: u64,
    },
    /// Remove stored credentials
    Logout,
    /// List all locations of the account
    Locations,
    /// Show the latest readings of every sensor
    Sensors,
    /// Poll the API on the scan interval and print readings
    Watch,
}

#[derive(Tabled)]
struct LocationRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Devices")]
    devices: usize,
    #[tabled(rename = "Status")]
    status: String,
}

#[derive(Tabled)]
struct SensorRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Sensor")]
    sensor: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Last synced")]
    last_synced: String,
}

impl From<&SensorEntity> for SensorRow {
    fn from(entity: &SensorEntity) -> Self {
        let sensor_type = sensor::get_sensor_type(&entity.field);
        Self {
            device: entity.device_name.clone(),
            model: entity.model.clone(),
            sensor: sensor_type.name.into_owned(),
            value: entity.display_state(),
            last_synced: entity
                .last_synced
                .clone()
                .unwrap_or_else(|| "Never".to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Login {
            client_id,
            client_secret,
            refresh_token,
            organization_id,
            scan_interval,
        } => {
            let mut config = Config {
                client_id,
                client_secret,
                organization_id,
                scan_interval_secs: scan_interval,
                access_token: String::new(),
                refresh_token,
                expires_at: None,
            };
            config.validate()?;

            info!("Validating credentials with Airthings...");
            let session = OAuthSession::new_with_token_url(
                config.client_id.clone(),
                config.client_secret.clone(),
                config.tokens(),
                None,
                cli.token_url,
            );
            let tokens = session
                .force_refresh()
                .await
                .context("Failed to obtain an access token")?;
            config.set_tokens(&tokens);

            config::save_config(&config)?;
            println!("Logged in. Credentials saved to ~/.airthings.yml");
        }
        Commands::Logout => {
            config::clear_config()?;
            println!("Logged out.");
        }
        Commands::Locations => {
            let mut service = build_service(&cli.api_url, &cli.token_url)?;
            service.force_initialize_locations().await?;

            if service.locations().is_empty() {
                println!("No locations found for this account.");
                return Ok(());
            }

            let rows: Vec<LocationRow> = service
                .locations()
                .iter()
                .map(|location| LocationRow {
                    name: location.name().to_string(),
                    id: location.id().to_string(),
                    devices: location.devices().len(),
                    status: if location.is_initialized() {
                        "Online".to_string()
                    } else {
                        "Unavailable".to_string()
                    },
                })
                .collect();

            println!("{}", Table::new(&rows));
        }
        Commands::Sensors => {
            let mut service = build_service(&cli.api_url, &cli.token_url)?;
            let report = service.force_initialize_locations().await?;
            if report.failed > 0 {
                warn!("{} locations could not be refreshed", report.failed);
            }

            print_sensors(&service);
        }
        Commands::Watch => {
            let mut service = build_service(&cli.api_url, &cli.token_url)?;

            // A failed first listing is retried on the next tick
            if let Err(e) = service.force_initialize_locations().await {
                warn!("Cannot update locations: {}", e);
            }
            print_sensors(&service);

            let mut interval = tokio::time::interval(service.scan_interval());
            interval.tick().await;

            loop {
                interval.tick().await;

                if service.locations().is_empty() {
                    if let Err(e) = service.force_initialize_locations().await {
                        warn!("Cannot update locations: {}", e);
                        continue;
                    }
                } else {
                    let report = service.force_update_all().await;
                    debug!("Refresh cycle: {:?}", report);
                }

                print_sensors(&service);
            }
        }
    }

    Ok(())
}

fn build_service(api_url: &str, token_url: &str) -> Result<LocationService> {
    let config_path = config::get_config_path()?;
    let config = config::load_config_from(&config_path)?;

    let store: Arc<dyn TokenRefreshCallback> =
        Arc::new(ConfigTokenStore::new(config_path, config.clone()));
    let session = OAuthSession::new_with_token_url(
        config.client_id.clone(),
        config.client_secret.clone(),
        config.tokens(),
        Some(store),
        token_url.to_string(),
    );

    let client = AirthingsClient::new_with_base_url(
        Arc::new(session),
        config.organization_id.clone(),
        api_url.to_string(),
    );
    Ok(LocationService::new_with_scan_interval(
        client,
        config.scan_interval(),
    ))
}

fn print_sensors(service: &LocationService) {
    let entities = sensor::entities(service);
    if entities.is_empty() {
        println!("No sensor readings available.");
        return;
    }

    let rows: Vec<SensorRow> = entities.iter().map(SensorRow::from).collect();
    println!("{}", Table::new(&rows));
}
