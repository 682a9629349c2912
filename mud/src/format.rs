// Copyright 2024 Peter Williams and collaborators
// Licensed under the MIT License.

/*!

Identifiers and layout constants of the MUD container.

A MUD file is a tree of *sections*. Every section begins with a 12-byte core
header holding three little-endian `u32` values: the size of the body that
follows, the section type ("sec ID"), and an instance number. Group sections
collect other sections; their bodies start with a member count, the size of
the member area, and one `(offset, sec ID, instance)` index entry per member,
with offsets counted from the start of the member area.

The top of the tree is a single group whose instance number identifies the
kind of container (TD-muSR or I-muSR data). Its members are the run
description and one group per repeated family.

*/

use std::fmt;

/// Size of the header that starts every section, in bytes.
pub const CORE_HEADER_SIZE: usize = 12;

/// Size of one entry in a group's member index, in bytes.
pub const INDEX_ENTRY_SIZE: usize = 12;

pub const SEC_GROUP: u32 = 3;
pub const SEC_EOF: u32 = 4;
pub const SEC_COMMENT: u32 = 5;

pub const SEC_GEN_RUN_DESC: u32 = 0x0100_0001;
pub const SEC_GEN_HIST_HDR: u32 = 0x0100_0002;
pub const SEC_GEN_HIST_DAT: u32 = 0x0100_0003;
pub const SEC_GEN_SCALER: u32 = 0x0100_0004;
pub const SEC_GEN_IND_VAR: u32 = 0x0100_0005;
pub const SEC_GEN_ARRAY: u32 = 0x0100_0007;

/// Optional per-histogram time data: a `u32` count followed by that many
/// `u32` values. It shares its instance number with the histogram header.
pub const SEC_GEN_HIST_TIME: u32 = 0x0100_0008;

pub const GRP_CMT: u32 = 0x0000_1005;
pub const GRP_GEN_HIST: u32 = 0x0100_1002;
pub const GRP_GEN_SCALER: u32 = 0x0100_1004;
pub const GRP_GEN_IND_VAR: u32 = 0x0100_1005;
pub const GRP_GEN_IND_VAR_ARR: u32 = 0x0100_1007;
pub const GRP_TRI_TD_HIST: u32 = 0x0301_1002;
pub const GRP_TRI_TD_SCALER: u32 = 0x0301_1004;
pub const GRP_TRI_TI_HIST: u32 = 0x0302_1002;

pub const FMT_TRI_TD: u32 = 0x0301_0000;
pub const FMT_TRI_TI: u32 = 0x0302_0000;

/// The instance number of the (single) run description section.
pub const RUN_DESC_INSTANCE: u32 = 1;

/// The kind of data a container holds, as recorded in the instance number of
/// its top-level group.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum ContainerKind {
    /// Time-differential muSR data from TRIUMF.
    TriumfTd,

    /// Integral muSR data from TRIUMF.
    TriumfTi,

    /// Some other kind of data; the raw identifier is preserved.
    Other(u32),
}

impl ContainerKind {
    pub fn from_u32(id: u32) -> Self {
        match id {
            FMT_TRI_TD => ContainerKind::TriumfTd,
            FMT_TRI_TI => ContainerKind::TriumfTi,
            other => ContainerKind::Other(other),
        }
    }

    pub fn id(&self) -> u32 {
        match *self {
            ContainerKind::TriumfTd => FMT_TRI_TD,
            ContainerKind::TriumfTi => FMT_TRI_TI,
            ContainerKind::Other(id) => id,
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ContainerKind::TriumfTd => f.pad("TRIUMF TD-muSR"),
            ContainerKind::TriumfTi => f.pad("TRIUMF I-muSR"),
            ContainerKind::Other(id) => write!(f, "unknown ({id:#010x})"),
        }
    }
}

/// One of the repeated, indexable groups of records in a container.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Family {
    Comments,
    Histograms,
    Scalers,
    IndependentVariables,
}

impl Family {
    pub const ALL: [Family; 4] = [
        Family::Comments,
        Family::Histograms,
        Family::Scalers,
        Family::IndependentVariables,
    ];

    /// The group instance numbers under which this family may be stored.
    pub fn group_kinds(&self) -> &'static [u32] {
        match *self {
            Family::Comments => &[GRP_CMT],
            Family::Histograms => &[GRP_GEN_HIST, GRP_TRI_TD_HIST, GRP_TRI_TI_HIST],
            Family::Scalers => &[GRP_GEN_SCALER, GRP_TRI_TD_SCALER],
            Family::IndependentVariables => &[GRP_GEN_IND_VAR, GRP_GEN_IND_VAR_ARR],
        }
    }

    /// The section type of the record that is counted for this family. Some
    /// families have companion sections (histogram data, variable arrays)
    /// that share the instance number but are not counted.
    pub fn member_sec_id(&self) -> u32 {
        match *self {
            Family::Comments => SEC_COMMENT,
            Family::Histograms => SEC_GEN_HIST_HDR,
            Family::Scalers => SEC_GEN_SCALER,
            Family::IndependentVariables => SEC_GEN_IND_VAR,
        }
    }

    /// The family stored in a group with the given instance number, if any.
    pub fn from_group_kind(kind: u32) -> Option<Self> {
        Family::ALL
            .iter()
            .copied()
            .find(|f| f.group_kinds().contains(&kind))
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(match *self {
            Family::Comments => "comment",
            Family::Histograms => "histogram",
            Family::Scalers => "scaler",
            Family::IndependentVariables => "independent variable",
        })
    }
}

/// The element type of an independent variable's historical data array.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum HistoricalDataType {
    Integer = 1,
    Real = 2,
    Text = 3,
}

impl HistoricalDataType {
    pub fn try_from_u32(code: u32) -> Option<Self> {
        match code {
            1 => Some(HistoricalDataType::Integer),
            2 => Some(HistoricalDataType::Real),
            3 => Some(HistoricalDataType::Text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_kinds_are_unambiguous() {
        for fam in Family::ALL.iter() {
            for kind in fam.group_kinds() {
                assert_eq!(Family::from_group_kind(*kind), Some(*fam));
            }
        }

        assert_eq!(Family::from_group_kind(SEC_GEN_SCALER), None);
    }

    #[test]
    fn container_kind_ids() {
        assert_eq!(ContainerKind::from_u32(FMT_TRI_TD), ContainerKind::TriumfTd);
        assert_eq!(ContainerKind::from_u32(7).id(), 7);
        assert_eq!(format!("{}", ContainerKind::TriumfTi), "TRIUMF I-muSR");
    }
}
