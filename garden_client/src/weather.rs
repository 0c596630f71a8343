use serde::Deserialize;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

pub const WEATHER_POLL_SECS: u64 = 10;

/// Ambient weather shown alongside the garden. Purely decorative; the
/// sync core never reads it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct Weather {
    pub temperature: f64,
    pub humidity: f64,
}

/// Polls `{api_base}/api/weather` on a fixed cadence and publishes the
/// latest reading. A failed poll keeps the previous values in place.
pub fn spawn_weather_poller(
    client: reqwest::Client,
    api_base: String,
) -> watch::Receiver<Weather> {
    let (tx, rx) = watch::channel(Weather::default());

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(WEATHER_POLL_SECS));
        loop {
            ticker.tick().await;
            match fetch_weather(&client, &api_base).await {
                Ok(weather) => {
                    if tx.send(weather).is_err() {
                        // Nobody is watching anymore.
                        break;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "weather poll failed; keeping previous reading");
                }
            }
        }
    });

    rx
}

async fn fetch_weather(client: &reqwest::Client, api_base: &str) -> Result<Weather, reqwest::Error> {
    client
        .get(format!("{api_base}/api/weather"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
}
