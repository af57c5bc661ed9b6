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


//! Network transport
//!
//! Download tasks only see a stream of byte chunks and an optional total.
//! Socket-level retries and range handling belong to the transport.

pub mod http;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

pub use http::HttpTransport;

/// Stream of body chunks
pub type ChunkStream = BoxStream<'static, Result<Bytes>>;

/// An opened transfer
pub struct TransferResponse {
    /// Content length, when the server announced one
    pub total_bytes: Option<u64>,

    pub body: ChunkStream,
}

impl std::fmt::Debug for TransferResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferResponse")
            .field("total_bytes", &self.total_bytes)
            .finish_non_exhaustive()
    }
}

/// Source of remote video bytes
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a transfer for a normalized URL
    async fn fetch(&self, url: &str) -> Result<TransferResponse>;
}
