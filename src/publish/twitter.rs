//! X API client: credential verification, media upload, and tweet posting.
//!
//! Every failure here is terminal for the publish run. There is no retry
//! policy; the next scheduled run simply publishes again.

use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{CaptureConfig, RadarLocation, TwitterConfig};
use crate::paths;
use crate::publish::oauth;

const USERS_ME_URL: &str = "https://api.twitter.com/2/users/me";
const MEDIA_UPLOAD_URL: &str = "https://upload.twitter.com/1.1/media/upload.json";
const TWEETS_URL: &str = "https://api.twitter.com/2/tweets";

/// The authenticated account, as reported by `/2/users/me`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    data: UserInfo,
}

#[derive(Debug, Deserialize)]
struct MediaUploadResponse {
    media_id_string: String,
}

#[derive(Debug, Deserialize)]
struct TweetEnvelope {
    data: TweetData,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
}

/// A successfully created tweet.
#[derive(Debug, Clone, Serialize)]
pub struct PostedTweet {
    pub id: String,
    pub url: String,
}

/// Outcome of one publish run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    pub success: bool,
    pub tweet_id: Option<String>,
    pub tweet_url: Option<String>,
    pub file_name: Option<String>,
}

pub struct TwitterPublisher {
    http: reqwest::Client,
    config: TwitterConfig,
}

impl TwitterPublisher {
    pub fn new(config: TwitterConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn auth_header(&self, method: &str, url: &str, params: &[(&str, &str)]) -> String {
        oauth::authorization_header(
            &self.config.credentials,
            method,
            url,
            params,
            &oauth::nonce(),
            oauth::timestamp(),
        )
    }

    /// Checks the credentials by fetching the authenticated account.
    pub async fn verify_credentials(&self) -> Result<UserInfo> {
        let response = self
            .http
            .get(USERS_ME_URL)
            .header(AUTHORIZATION, self.auth_header("GET", USERS_ME_URL, &[]))
            .send()
            .await
            .context("credential check request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("credential check rejected: HTTP {status}: {body}");
        }

        let envelope: UserEnvelope = response
            .json()
            .await
            .context("unexpected /2/users/me response shape")?;
        Ok(envelope.data)
    }

    /// Uploads a PNG and returns the opaque media id.
    pub async fn upload_media(&self, path: &Path) -> Result<String> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "capture.png".to_string());
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;

        info!(file = %file_name, size = bytes.len(), "uploading media");

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("image/png")
            .context("invalid media mime type")?;
        let form = multipart::Form::new().part("media", part);

        // Multipart bodies are excluded from the OAuth signature.
        let response = self
            .http
            .post(MEDIA_UPLOAD_URL)
            .header(AUTHORIZATION, self.auth_header("POST", MEDIA_UPLOAD_URL, &[]))
            .multipart(form)
            .send()
            .await
            .context("media upload request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("media upload rejected: HTTP {status}: {body}");
        }

        let upload: MediaUploadResponse = response
            .json()
            .await
            .context("unexpected media upload response shape")?;
        Ok(upload.media_id_string)
    }

    /// Posts `text` with the uploaded media attached, optionally as a reply.
    pub async fn post_tweet(
        &self,
        text: &str,
        media_id: &str,
        reply_to: Option<&str>,
    ) -> Result<PostedTweet> {
        let mut body = serde_json::json!({
            "text": text,
            "media": { "media_ids": [media_id] },
        });
        if let Some(id) = reply_to {
            body["reply"] = serde_json::json!({ "in_reply_to_tweet_id": id });
        }

        let response = self
            .http
            .post(TWEETS_URL)
            .header(AUTHORIZATION, self.auth_header("POST", TWEETS_URL, &[]))
            .json(&body)
            .send()
            .await
            .context("tweet request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("tweet rejected: HTTP {status}: {body}");
        }

        let envelope: TweetEnvelope = response
            .json()
            .await
            .context("unexpected tweet response shape")?;
        let id = envelope.data.id;
        let url = format!("https://twitter.com/i/web/status/{id}");
        Ok(PostedTweet { id, url })
    }
}

/// Builds the tweet text: header, optional map link, capture time localized
/// to Madrid, and the hashtag trailer. A configured custom message replaces
/// the whole template.
pub fn compose_message(
    config: &TwitterConfig,
    location: &RadarLocation,
    now: DateTime<Utc>,
) -> String {
    if let Some(custom) = &config.custom_message {
        return custom.clone();
    }

    let local = now.with_timezone(&chrono_tz::Europe::Madrid);
    let mut message = String::from("Radar meteorológico en tiempo real 🌧️\n\n");
    if config.include_link {
        message.push_str(&format!("🗺️ {}\n\n", location.windy_url()));
    }
    message.push_str(&format!(
        "Captura: {}\n\n",
        local.format("%d/%m/%Y %H:%M")
    ));
    message.push_str("#DANA #Lluvias #Tormentas #Meteorología");
    message
}

/// Finds the newest capture and posts it.
pub async fn publish_latest(
    twitter: &TwitterConfig,
    capture: &CaptureConfig,
) -> Result<PublishResult> {
    let latest = paths::find_latest_capture(&capture.captures_dir)?;
    info!(file = %latest.file_name, size = latest.size, "latest capture found");

    if latest.size < capture.min_valid_bytes {
        bail!(
            "latest capture {} is only {} bytes (minimum {}), refusing to publish",
            latest.file_name,
            latest.size,
            capture.min_valid_bytes
        );
    }

    let publisher = TwitterPublisher::new(twitter.clone());
    let user = publisher.verify_credentials().await?;
    info!(username = %user.username, "authenticated");

    let message = compose_message(twitter, &capture.location, Utc::now());
    info!(chars = message.chars().count(), "tweet text composed");

    let media_id = publisher.upload_media(&latest.path).await?;
    let tweet = publisher
        .post_tweet(&message, &media_id, twitter.reply_to.as_deref())
        .await?;

    Ok(PublishResult {
        success: true,
        tweet_id: Some(tweet.id),
        tweet_url: Some(tweet.url),
        file_name: Some(latest.file_name),
    })
}
