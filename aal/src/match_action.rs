// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

/// The translators describe each pipeline table entry they want to program
/// using high-level types such as IP prefixes and mac addresses, captured in
/// annotated Rust structs:
///     #[derive(MatchParse, Debug, Hash)]
///     struct NeighborKey {
///         neighbor: u16,
///         #[match_xlate(type = "lpm")]
///         dst_ip: Ipv4Net,
///     }
///     #[derive(ActionParse, Debug)]
///     enum Action {
///         #[action_xlate(name = "evpn_gw_control.set_neighbor")]
///         SetNeighbor { neighbor: u16, ecmp_on: u16 },
///     }
/// These structs are meaningful to the translators, but not to the pipeline.
/// Before an entry leaves the translation layer it is marshalled into the
/// intermediate representation defined here: an ordered list of named fields,
/// each carrying its match kind and a value of a fixed bit width.  The
/// protocol client sending the entries to the dataplane only ever sees this
/// representation, so new key and action types can be added without touching
/// it.  The annotations shown above allow the macros in the aal_macros library
/// to generate the conversion code.
///
use std::convert::TryFrom;
use std::convert::TryInto;
use std::fmt;
use std::net::Ipv4Addr;

use common::network::MacAddr;
use oxnet::Ipv4Net;
use serde::Serialize;
use serde::Serializer;

use crate::IrError;
use crate::IrResult;

/// The intermediate representation of a single field in a Match key
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct MatchEntryField {
    pub name: String,
    pub value: MatchEntryValue,
}

/// The intermediate representation of a Match key.  Fields are kept in the
/// order in which they are declared in the key struct.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct MatchData {
    pub fields: Vec<MatchEntryField>,
}

impl MatchData {
    pub fn field_by_name<'a>(
        &'a self,
        field: &str,
    ) -> IrResult<&'a MatchEntryField> {
        self.fields
            .iter()
            .find(|f| f.name == field)
            .ok_or(IrError::Internal(format!("no such field: {field}")))
    }
}

impl fmt::Display for MatchData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|field| format!("{}={}", field.name, field.value))
            .collect();
        write!(f, "{}", fields.join(","))
    }
}

/// The MatchParse trait defines the behavior needed to convert a high-level
/// Match field into our intermediate representation.
pub trait MatchParse {
    /// Convert the key Struct to a MatchData struct
    fn key_to_ir(&self) -> IrResult<MatchData>;
    /// Convert a MatchData struct back into the original match key format
    fn ir_to_key(matchdata: &MatchData) -> IrResult<Self>
    where
        Self: Sized;
}

/// The intermediate representation of a table Action, along with the arguments
/// for that Action.  Arguments are positional on the wire, so their order is
/// significant.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ActionData {
    pub action: String,
    pub args: Vec<ActionArg>,
}

impl ActionData {
    pub fn arg_by_name<'a>(&'a self, arg: &str) -> IrResult<&'a ActionArg> {
        self.args
            .iter()
            .find(|a| a.name == arg)
            .ok_or(IrError::Internal(format!("no such argument: {arg}")))
    }
}

/// The intermediate representation of a single argument to an Action
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ActionArg {
    pub name: String,
    pub value: ValueTypes,
}

/// The ActionParse trait defines the behavior needed to convert a high-level
/// Action Enum into our intermediate representation.
pub trait ActionParse {
    /// Convert an Action enum into the ActionData format
    fn action_to_ir(&self) -> IrResult<ActionData>;
    /// Convert an ActionData struct back into the original Action enum
    fn ir_to_action(actiondata: &ActionData) -> IrResult<Self>
    where
        Self: Sized;
}

/// The different kinds of Match keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Lpm,
    Ternary,
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MatchKind::Exact => write!(f, "exact"),
            MatchKind::Lpm => write!(f, "lpm"),
            MatchKind::Ternary => write!(f, "ternary"),
        }
    }
}

/// The contents of a single field in a Match key
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchEntryValue {
    Exact(ValueTypes),
    Lpm(MatchLpm),
    Ternary(MatchTernary),
}

impl MatchEntryValue {
    pub fn kind(&self) -> MatchKind {
        match self {
            MatchEntryValue::Exact(_) => MatchKind::Exact,
            MatchEntryValue::Lpm(_) => MatchKind::Lpm,
            MatchEntryValue::Ternary(_) => MatchKind::Ternary,
        }
    }
}

impl fmt::Display for MatchEntryValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MatchEntryValue::Exact(v) => write!(f, "{v}"),
            MatchEntryValue::Lpm(l) => write!(f, "{}/{}", l.prefix, l.len),
            MatchEntryValue::Ternary(t) => write!(f, "{t}"),
        }
    }
}

// Build the code to extract an exact value from a MatchEntryValue
macro_rules! unwrap_value_entry {
    ($t:ident) => {
        impl TryFrom<&MatchEntryValue> for $t {
            type Error = String;

            fn try_from(m: &MatchEntryValue) -> Result<Self, Self::Error> {
                match m {
                    MatchEntryValue::Exact(v) => {
                        v.try_into().map_err(|e| format!("{e:?}"))
                    }
                    x => Err(format!("Expected exact value, found {x:?}")),
                }
            }
        }
    };
}

/// A single value of a fixed bit width.  Every variant is carried on the wire
/// as big-endian bytes of its natural width.
#[derive(Debug, Hash, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValueTypes {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Ptr(Vec<u8>),
}

impl ValueTypes {
    /// Return the value as big-endian bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            ValueTypes::U8(v) => vec![*v],
            ValueTypes::U16(v) => v.to_be_bytes().to_vec(),
            ValueTypes::U32(v) => v.to_be_bytes().to_vec(),
            ValueTypes::U64(v) => v.to_be_bytes().to_vec(),
            ValueTypes::Ptr(v) => v.clone(),
        }
    }

    /// Width of the value in bits
    pub fn bits(&self) -> usize {
        match self {
            ValueTypes::U8(_) => 8,
            ValueTypes::U16(_) => 16,
            ValueTypes::U32(_) => 32,
            ValueTypes::U64(_) => 64,
            ValueTypes::Ptr(v) => v.len() * 8,
        }
    }
}

impl fmt::Display for ValueTypes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x")?;
        for b in self.to_bytes() {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl Serialize for ValueTypes {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl From<Ipv4Addr> for ValueTypes {
    fn from(v: Ipv4Addr) -> ValueTypes {
        ValueTypes::U32(u32::from(v))
    }
}

impl TryFrom<&ValueTypes> for Ipv4Addr {
    type Error = &'static str;

    fn try_from(v: &ValueTypes) -> Result<Self, Self::Error> {
        u32::try_from(v).map(Ipv4Addr::from)
    }
}

impl TryFrom<ValueTypes> for Ipv4Addr {
    type Error = &'static str;

    fn try_from(v: ValueTypes) -> Result<Self, Self::Error> {
        (&v).try_into()
    }
}
unwrap_value_entry!(Ipv4Addr);

impl From<MacAddr> for ValueTypes {
    fn from(v: MacAddr) -> ValueTypes {
        ValueTypes::Ptr(v.to_vec())
    }
}

impl From<&MacAddr> for ValueTypes {
    fn from(v: &MacAddr) -> ValueTypes {
        ValueTypes::Ptr(v.to_vec())
    }
}

impl TryFrom<&ValueTypes> for MacAddr {
    type Error = &'static str;

    fn try_from(v: &ValueTypes) -> Result<Self, Self::Error> {
        match v {
            ValueTypes::Ptr(b) if b.len() == 6 => Ok(MacAddr::new(
                b[0], b[1], b[2], b[3], b[4], b[5],
            )),
            _ => Err("value not a 6-byte mac address"),
        }
    }
}
unwrap_value_entry!(MacAddr);

impl From<Vec<u8>> for ValueTypes {
    fn from(v: Vec<u8>) -> ValueTypes {
        ValueTypes::Ptr(v)
    }
}

impl From<u64> for ValueTypes {
    fn from(v: u64) -> ValueTypes {
        ValueTypes::U64(v)
    }
}

impl TryFrom<&ValueTypes> for u64 {
    type Error = &'static str;

    fn try_from(v: &ValueTypes) -> Result<Self, Self::Error> {
        match v {
            ValueTypes::U64(v) => Ok(*v),
            _ => Err("value not 64 bits"),
        }
    }
}

impl From<u32> for ValueTypes {
    fn from(v: u32) -> ValueTypes {
        ValueTypes::U32(v)
    }
}

impl TryFrom<&ValueTypes> for u32 {
    type Error = &'static str;

    fn try_from(v: &ValueTypes) -> Result<Self, Self::Error> {
        match v {
            ValueTypes::U32(v) => Ok(*v),
            _ => Err("value not 32 bits"),
        }
    }
}

impl TryFrom<ValueTypes> for u32 {
    type Error = &'static str;

    fn try_from(v: ValueTypes) -> Result<Self, Self::Error> {
        (&v).try_into()
    }
}
unwrap_value_entry!(u32);

impl From<u16> for ValueTypes {
    fn from(v: u16) -> ValueTypes {
        ValueTypes::U16(v)
    }
}

impl TryFrom<&ValueTypes> for u16 {
    type Error = &'static str;

    fn try_from(v: &ValueTypes) -> Result<Self, Self::Error> {
        match v {
            ValueTypes::U16(v) => Ok(*v),
            ValueTypes::Ptr(_) => Err("found a ptr - not a u16"),
            _ => Err("value not 16 bits"),
        }
    }
}

impl TryFrom<ValueTypes> for u16 {
    type Error = &'static str;

    fn try_from(v: ValueTypes) -> Result<Self, Self::Error> {
        (&v).try_into()
    }
}
unwrap_value_entry!(u16);

impl From<u8> for ValueTypes {
    fn from(v: u8) -> ValueTypes {
        ValueTypes::U8(v)
    }
}

impl TryFrom<&ValueTypes> for u8 {
    type Error = &'static str;

    fn try_from(v: &ValueTypes) -> Result<Self, Self::Error> {
        match v {
            ValueTypes::U8(v) => Ok(*v),
            _ => Err("value not 8 bits"),
        }
    }
}
unwrap_value_entry!(u8);

impl From<bool> for ValueTypes {
    fn from(v: bool) -> ValueTypes {
        ValueTypes::U8(u8::from(v))
    }
}

impl TryFrom<&ValueTypes> for bool {
    type Error = &'static str;

    fn try_from(v: &ValueTypes) -> Result<Self, Self::Error> {
        match v {
            ValueTypes::U8(0) => Ok(false),
            ValueTypes::U8(1) => Ok(true),
            _ => Err("value not a boolean"),
        }
    }
}

/// A longest-prefix-match key: the address and the number of significant
/// leading bits.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct MatchLpm {
    pub prefix: ValueTypes,
    pub len: u16,
}

impl From<Ipv4Net> for MatchLpm {
    fn from(cidr: Ipv4Net) -> Self {
        MatchLpm {
            prefix: cidr.addr().into(),
            len: cidr.width() as u16,
        }
    }
}

impl TryFrom<&MatchLpm> for Ipv4Net {
    type Error = &'static str;

    fn try_from(m: &MatchLpm) -> Result<Self, Self::Error> {
        let prefix = (&m.prefix).try_into()?;
        let prefix_len = m.len as u8;
        Ipv4Net::new(prefix, prefix_len)
            .map_err(|_| "Ipv4Net conversion failed")
    }
}

impl TryFrom<&MatchEntryValue> for Ipv4Net {
    type Error = &'static str;

    fn try_from(m: &MatchEntryValue) -> Result<Self, Self::Error> {
        if let MatchEntryValue::Lpm(lpm) = m {
            lpm.try_into()
        } else {
            Err("key must be an lpm value")
        }
    }
}

/// A ternary key: only the bits set in the mask take part in the match.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct MatchTernary {
    pub value: ValueTypes,
    pub mask: ValueTypes,
}

impl MatchTernary {
    /// A ternary key with every bit of the 32-bit value significant
    pub fn exact_u32(value: u32) -> Self {
        MatchTernary {
            value: ValueTypes::U32(value),
            mask: ValueTypes::U32(u32::MAX),
        }
    }
}

impl From<u32> for MatchTernary {
    fn from(value: u32) -> Self {
        MatchTernary::exact_u32(value)
    }
}

impl fmt::Display for MatchTernary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}&&&{}", self.value, self.mask)
    }
}

impl TryFrom<&MatchEntryValue> for MatchTernary {
    type Error = &'static str;

    fn try_from(m: &MatchEntryValue) -> Result<Self, Self::Error> {
        if let MatchEntryValue::Ternary(t) = m {
            Ok(t.clone())
        } else {
            Err("key must be a ternary value")
        }
    }
}
