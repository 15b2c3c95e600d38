// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Distribution archives: a gzipped tar of a project's hashchain and patches,
//! enough to rebuild every published tree elsewhere.

pub mod archive;
pub mod error;

pub use archive::{apply, create};
pub use error::{DistError, Result};
