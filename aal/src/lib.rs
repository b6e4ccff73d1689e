// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use thiserror::Error;

mod match_action;
pub use match_action::*;

mod operation;
pub use operation::*;

/// A specialized Result type for operations on the table IR
pub type IrResult<T> = Result<T, IrError>;

/// Error type conveying additional information about IR and table errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IrError {
    /// An argument is invalid or inappropriate.  This indicates misbehavior
    /// from the caller.
    #[error("Invalid argument: {}", .0)]
    InvalidArg(String),
    /// The IR layer detected some internal inconsistency, such as a key that
    /// doesn't convert back to its declared type.
    #[error("Internal error: {}",.0)]
    Internal(String),
    /// A general indication that a caller is trying to create something that
    /// already exists.
    #[error("Already exists: {}", .0)]
    Exists(String),
    /// A general indication that a caller is trying to modify something that
    /// is not present.
    #[error("Missing: {}", .0)]
    Missing(String),
}
