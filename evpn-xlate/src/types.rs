// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! General types used throughout the translation layer.

use std::convert;

use aal::IrError;
use common::network::VlanError;

pub type XlateResult<T> = Result<T, XlateError>;

#[derive(Debug, thiserror::Error)]
pub enum XlateError {
    /// A referenced object or pool entry does not exist
    #[error("Not found: {0}")]
    NotFound(String),
    /// An index pool has no free ids left
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
    /// A value does not fit the field it is destined for, or a set of
    /// objects cannot be expressed in the pipeline
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Some external dependency, such as a router MAC, has not been learned
    /// yet.  The decoders turn this into an empty operation list.
    #[error("Unresolved: {0}")]
    Unresolved(String),
    #[error("Table IR error: {0}")]
    Ir(IrError),
    #[error("I/O error: {0:?}")]
    Io(std::io::Error),
    #[error("Error: {0}")]
    Other(String),
}

impl convert::From<IrError> for XlateError {
    fn from(err: IrError) -> Self {
        XlateError::Ir(err)
    }
}

impl convert::From<VlanError> for XlateError {
    fn from(err: VlanError) -> Self {
        XlateError::InvalidConfiguration(err.to_string())
    }
}

impl convert::From<std::io::Error> for XlateError {
    fn from(err: std::io::Error) -> Self {
        XlateError::Io(err)
    }
}

impl convert::From<toml::de::Error> for XlateError {
    fn from(err: toml::de::Error) -> Self {
        XlateError::InvalidConfiguration(err.to_string())
    }
}

impl convert::From<serde_json::Error> for XlateError {
    fn from(err: serde_json::Error) -> Self {
        XlateError::Other(err.to_string())
    }
}

/// Narrow a value to a 16-bit pipeline field
pub(crate) fn narrow16(what: &str, v: u32) -> XlateResult<u16> {
    u16::try_from(v).map_err(|_| {
        XlateError::InvalidConfiguration(format!(
            "{what} {v} does not fit in 16 bits"
        ))
    })
}

/// Largest VNI carried in a VXLAN header
pub const MAX_VNI: u32 = (1 << 24) - 1;

pub(crate) fn validate_vni(vni: u32) -> XlateResult<u32> {
    if vni > MAX_VNI {
        Err(XlateError::InvalidConfiguration(format!(
            "vni {vni} is wider than 24 bits"
        )))
    } else {
        Ok(vni)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrow() {
        assert_eq!(narrow16("vsi", 65535).unwrap(), 65535);
        assert!(matches!(
            narrow16("vsi", 65536),
            Err(XlateError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_vni() {
        assert_eq!(validate_vni(100).unwrap(), 100);
        assert_eq!(validate_vni(MAX_VNI).unwrap(), MAX_VNI);
        assert!(validate_vni(MAX_VNI + 1).is_err());
    }

    #[test]
    fn test_vlan_error() {
        let e: XlateError = VlanError::Reserved(4089).into();
        assert!(matches!(e, XlateError::InvalidConfiguration(_)));
    }
}
