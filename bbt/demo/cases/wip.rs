// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use bbt_runner::{Case, CaseFailure};

pub fn main() -> Case {
    Case::new(|_ctx| Err(CaseFailure::msg("replication checks are not written yet")))
        .tags(["replication"])
        .skip(true)
}
