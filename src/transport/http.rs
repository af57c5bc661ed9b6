// VideoCache - Video Download Cache for Mobile Playback
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! HTTP transport backed by reqwest

use super::{Transport, TransferResponse};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tracing::debug;

/// Streams video bodies over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &CacheConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &str) -> Result<TransferResponse> {
        let response = self.client.get(url).send().await.map_err(|e| {
            CacheError::network_error(
                format!("Request failed: {}", e),
                e.is_timeout() || e.is_connect(),
            )
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::UnexpectedStatusCode {
                status_code: status.as_u16(),
                url: url.to_string(),
            });
        }

        let total_bytes = response.content_length();
        debug!(url, ?total_bytes, "transfer opened");

        let body = response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| CacheError::network_error(format!("Stream error: {}", e), true))
            })
            .boxed();

        Ok(TransferResponse { total_bytes, body })
    }
}
