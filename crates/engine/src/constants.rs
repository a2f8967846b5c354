// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Engine-wide tuning constants.

/// Upper bound on recursive template rendering passes. Templates may expand
/// to further templates; rendering stops at a fixpoint or at this cap,
/// whichever comes first.
pub const MAX_TEMPLATE_ITERATIONS: usize = 10;
