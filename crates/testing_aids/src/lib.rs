// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! An unpublished crate containing testing utilities for use within this repo.

mod journal;
mod log;

pub use journal::*;
pub use log::*;
