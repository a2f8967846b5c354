// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Small helpers shared by the built-in nodes.

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch as a float, the timestamp convention used
/// by streaming chunk payloads.
pub(crate) fn unix_now_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}
