// CLI integration tests
// These test the actual command-line interface using the compiled binary

use std::fs;
use std::path::Path;
use tokio::process::Command;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CLI_BINARY: &str = env!("CARGO_BIN_EXE_airthings");

fn write_config(home: &Path) {
    let config = "client_id: client-id\n\
                  client_secret: client-secret\n\
                  scan_interval_secs: 300\n\
                  access_token: access123\n\
                  refresh_token: refresh456\n";
    fs::write(home.join(".airthings.yml"), config).unwrap();
}

#[tokio::test]
async fn test_cli_sensors_command_not_logged_in() {
    let home = tempfile::tempdir().unwrap();
    let output = Command::new(CLI_BINARY)
        .arg("sensors")
        .env("HOME", home.path())
        .output()
        .await
        .expect("Failed to execute CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Not logged in"));
}

#[tokio::test]
async fn test_cli_help_command() {
    let output = Command::new(CLI_BINARY)
        .arg("--help")
        .output()
        .await
        .expect("Failed to execute CLI");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("A CLI for polling Airthings air quality sensors"));
    assert!(stdout.contains("login"));
    assert!(stdout.contains("logout"));
    assert!(stdout.contains("locations"));
    assert!(stdout.contains("sensors"));
    assert!(stdout.contains("watch"));
    assert!(!stdout.contains("--api-url"));
}

#[tokio::test]
async fn test_cli_version_command() {
    let output = Command::new(CLI_BINARY)
        .arg("--version")
        .output()
        .await
        .expect("Failed to execute CLI");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("airthings"));
}

#[tokio::test]
async fn test_cli_invalid_command() {
    let output = Command::new(CLI_BINARY)
        .arg("invalid-command")
        .output()
        .await
        .expect("Failed to execute CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error:") || stderr.contains("unrecognized"));
}

#[tokio::test]
async fn test_cli_login_command_help() {
    let output = Command::new(CLI_BINARY)
        .args(["login", "--help"])
        .output()
        .await
        .expect("Failed to execute CLI");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Store API client credentials and a refresh token"));
    assert!(stdout.contains("--client-id"));
    assert!(stdout.contains("--client-secret"));
    assert!(stdout.contains("--refresh-token"));
    assert!(stdout.contains("--organization-id"));
}

#[tokio::test]
async fn test_cli_login_stores_refreshed_tokens() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(include_str!("fixtures/token_refresh.json")),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let home = tempfile::tempdir().unwrap();
    let output = Command::new(CLI_BINARY)
        .args([
            "login",
            "--client-id",
            "client-id",
            "--client-secret",
            "client-secret",
            "--refresh-token",
            "refresh456",
        ])
        .env("HOME", home.path())
        .env("AIRTHINGS_TOKEN_URL", format!("{}/v1/token", mock_server.uri()))
        .output()
        .await
        .expect("Failed to execute CLI");

    assert!(output.status.success());
    let saved = fs::read_to_string(home.path().join(".airthings.yml")).unwrap();
    assert!(saved.contains("access_token: refreshed-access-token"));
    assert!(saved.contains("refresh_token: rotated-refresh-token"));
}

#[tokio::test]
async fn test_cli_logout_command() {
    let home = tempfile::tempdir().unwrap();
    write_config(home.path());

    let output = Command::new(CLI_BINARY)
        .arg("logout")
        .env("HOME", home.path())
        .output()
        .await
        .expect("Failed to execute CLI");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Logged out."));
    assert!(!home.path().join(".airthings.yml").exists());
}

#[tokio::test]
async fn test_cli_sensors_command_prints_readings() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/locations"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"locations":[{"id":"L1","name":"Home","labels":{}}]}"#,
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/locations/L1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(include_str!("fixtures/location_devices.json")),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/locations/L1/latest-samples"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(include_str!("fixtures/latest_samples.json")),
        )
        .mount(&mock_server)
        .await;

    let home = tempfile::tempdir().unwrap();
    write_config(home.path());

    let output = Command::new(CLI_BINARY)
        .arg("sensors")
        .env("HOME", home.path())
        .env("AIRTHINGS_API_URL", mock_server.uri())
        .output()
        .await
        .expect("Failed to execute CLI");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Home Bedroom"));
    assert!(stdout.contains("WAVE_PLUS"));
    assert!(stdout.contains("21.5 °C"));
    assert!(stdout.contains("Radon Short term average"));
    assert!(stdout.contains("2023-11-14T22:13:20+00:00"));
}
