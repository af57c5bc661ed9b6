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


//! Tracing subscriber setup

use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Directive used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "video_cache_core=info";

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins over `directive`. Returns `false` when a subscriber was
/// already installed, which makes repeated bridge initialization harmless.
pub fn init_logging(directive: Option<&str>) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive.unwrap_or(DEFAULT_FILTER)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok()
}
