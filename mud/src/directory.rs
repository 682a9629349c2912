// Copyright 2024 Peter Williams and collaborators
// Licensed under the MIT License.

/*!

The block directory: where every section of a container lives.

The directory is built once, when a file is opened, by walking the group
indices. After that, finding a record is a lookup and a single seek.

*/

use byteorder::{LittleEndian, ReadBytesExt};
use rubbl_core::io::EofReadExactExt;
use std::io::{Read, Seek, SeekFrom};

use crate::format::{
    ContainerKind, Family, CORE_HEADER_SIZE, INDEX_ENTRY_SIZE, RUN_DESC_INSTANCE, SEC_GEN_RUN_DESC,
    SEC_GROUP,
};
use crate::MudError;

/// The location of one section's body within the file.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SectionEntry {
    pub sec_id: u32,
    pub instance: u32,
    /// Absolute file offset of the first byte after the core header.
    pub body_offset: u64,
    pub size: u32,
}

/// The members of one group section.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GroupDirectory {
    pub kind: u32,
    pub members: Vec<SectionEntry>,
}

impl GroupDirectory {
    pub fn find(&self, sec_id: u32, instance: u32) -> Option<&SectionEntry> {
        self.members
            .iter()
            .find(|m| m.sec_id == sec_id && m.instance == instance)
    }

    pub fn count(&self, sec_id: u32) -> usize {
        self.members.iter().filter(|m| m.sec_id == sec_id).count()
    }
}

/// The kind and size of one family of records.
///
/// A family that is missing from the file has no kind and a count of zero;
/// that is not an error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FamilyInfo {
    pub kind: Option<u32>,
    pub count: usize,
}

#[derive(Clone, Debug)]
pub struct Directory {
    container: ContainerKind,
    top: GroupDirectory,
    groups: Vec<GroupDirectory>,
}

impl Directory {
    /// Walk the section tree of a container.
    ///
    /// Any structural inconsistency (sections running past their parents, an
    /// index that disagrees with the section it points to) is an error: we
    /// cannot trust any offsets in such a file.
    pub fn read<R: Read + Seek>(stream: &mut R) -> Result<Self, MudError> {
        let file_size = stream.seek(SeekFrom::End(0))?;
        stream.seek(SeekFrom::Start(0))?;

        let size = match stream.eof_read_le_u32::<MudError>()? {
            Some(s) => s,
            None => return muderr!("file is empty"),
        };
        let sec_id = stream.read_u32::<LittleEndian>()?;
        let instance = stream.read_u32::<LittleEndian>()?;

        if sec_id != SEC_GROUP {
            return muderr!("file does not begin with a MUD group section (found type {sec_id:#x})");
        }

        let top_entry = SectionEntry {
            sec_id,
            instance,
            body_offset: CORE_HEADER_SIZE as u64,
            size,
        };

        if top_entry.body_offset + size as u64 > file_size {
            return muderr!(
                "top-level group claims {size} bytes but the file only has {}",
                file_size - top_entry.body_offset
            );
        }

        let top = read_group(stream, &top_entry)?;
        let mut groups = Vec::new();

        for member in &top.members {
            if member.sec_id == SEC_GROUP {
                groups.push(read_group(stream, member)?);
            }
        }

        Ok(Directory {
            container: ContainerKind::from_u32(instance),
            top,
            groups,
        })
    }

    pub fn container_kind(&self) -> ContainerKind {
        self.container
    }

    pub fn run_description(&self) -> Option<&SectionEntry> {
        self.top.find(SEC_GEN_RUN_DESC, RUN_DESC_INSTANCE)
    }

    pub fn family(&self, family: Family) -> Option<&GroupDirectory> {
        self.groups
            .iter()
            .find(|g| family.group_kinds().contains(&g.kind))
    }

    pub fn family_info(&self, family: Family) -> FamilyInfo {
        match self.family(family) {
            Some(g) => FamilyInfo {
                kind: Some(g.kind),
                count: g.count(family.member_sec_id()),
            },
            None => FamilyInfo {
                kind: None,
                count: 0,
            },
        }
    }

    /// Find the group holding record *index* (1-based) of *family*, and the
    /// record's primary section.
    pub fn locate(
        &self,
        family: Family,
        index: usize,
    ) -> Result<(&GroupDirectory, &SectionEntry), MudError> {
        let count = self.family_info(family).count;

        if index == 0 || index > count {
            return Err(MudError::IndexOutOfRange {
                family,
                index,
                count,
            });
        }

        // The count is nonzero, so the group exists.
        let group = match self.family(family) {
            Some(g) => g,
            None => return muderr!("{family} group vanished from the directory"),
        };

        match group.find(family.member_sec_id(), index as u32) {
            Some(entry) => Ok((group, entry)),
            None => muderr!("{family} {index} is counted but has no section of its own"),
        }
    }

    /// Top-level sections and groups that this crate does not interpret.
    pub fn unrecognized(&self) -> impl Iterator<Item = &SectionEntry> {
        self.top.members.iter().filter(|m| {
            if m.sec_id == SEC_GROUP {
                Family::from_group_kind(m.instance).is_none()
            } else {
                m.sec_id != SEC_GEN_RUN_DESC
            }
        })
    }
}

fn read_group<R: Read + Seek>(
    stream: &mut R,
    entry: &SectionEntry,
) -> Result<GroupDirectory, MudError> {
    let group_end = entry.body_offset + entry.size as u64;

    if entry.size < 8 {
        return muderr!("group {:#x} is too small to hold its own index", entry.instance);
    }

    stream.seek(SeekFrom::Start(entry.body_offset))?;
    let num = stream.read_u32::<LittleEndian>()? as u64;
    let mem_size = stream.read_u32::<LittleEndian>()? as u64;
    let members_start = entry.body_offset + 8 + num * INDEX_ENTRY_SIZE as u64;

    if members_start + mem_size > group_end {
        return muderr!(
            "group {:#x} lists {num} members in {mem_size} bytes, overrunning its {} byte body",
            entry.instance,
            entry.size
        );
    }

    let mut index = Vec::with_capacity(num as usize);

    for _ in 0..num {
        let offset = stream.read_u32::<LittleEndian>()? as u64;
        let sec_id = stream.read_u32::<LittleEndian>()?;
        let instance = stream.read_u32::<LittleEndian>()?;
        index.push((offset, sec_id, instance));
    }

    let mut members = Vec::with_capacity(index.len());

    for (offset, sec_id, instance) in index {
        if offset + CORE_HEADER_SIZE as u64 > mem_size {
            return muderr!(
                "member {sec_id:#x}/{instance} of group {:#x} lies outside the group",
                entry.instance
            );
        }

        stream.seek(SeekFrom::Start(members_start + offset))?;
        let size = stream.read_u32::<LittleEndian>()?;
        let found_id = stream.read_u32::<LittleEndian>()?;
        let found_instance = stream.read_u32::<LittleEndian>()?;

        if found_id != sec_id || found_instance != instance {
            return muderr!(
                "group {:#x} indexes {sec_id:#x}/{instance} but the section there is \
                 {found_id:#x}/{found_instance}",
                entry.instance
            );
        }

        if offset + CORE_HEADER_SIZE as u64 + size as u64 > mem_size {
            return muderr!(
                "member {sec_id:#x}/{instance} of group {:#x} runs past the end of the group",
                entry.instance
            );
        }

        members.push(SectionEntry {
            sec_id,
            instance,
            body_offset: members_start + offset + CORE_HEADER_SIZE as u64,
            size,
        });
    }

    Ok(GroupDirectory {
        kind: entry.instance,
        members,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{group_bytes, section_bytes};
    use crate::format::*;
    use std::io::Cursor;

    fn sample() -> Vec<u8> {
        let scalers = group_bytes(
            GRP_GEN_SCALER,
            &[
                section_bytes(SEC_GEN_SCALER, 1, b"one"),
                section_bytes(SEC_GEN_SCALER, 2, b"two"),
            ],
        );
        group_bytes(
            FMT_TRI_TD,
            &[
                section_bytes(SEC_GEN_RUN_DESC, RUN_DESC_INSTANCE, b"desc"),
                scalers,
                section_bytes(0x0999_0001, 1, b""),
            ],
        )
    }

    #[test]
    fn walks_nested_groups() {
        let mut c = Cursor::new(sample());
        let dir = Directory::read(&mut c).unwrap();
        assert_eq!(dir.container_kind(), ContainerKind::TriumfTd);
        assert!(dir.run_description().is_some());

        let info = dir.family_info(Family::Scalers);
        assert_eq!(info.kind, Some(GRP_GEN_SCALER));
        assert_eq!(info.count, 2);

        let (_, second) = dir.locate(Family::Scalers, 2).unwrap();
        let body = &c.get_ref()[second.body_offset as usize..][..second.size as usize];
        assert_eq!(body, b"two");

        assert_eq!(dir.unrecognized().count(), 1);
    }

    #[test]
    fn missing_family_is_empty_not_an_error() {
        let dir = Directory::read(&mut Cursor::new(sample())).unwrap();
        assert_eq!(
            dir.family_info(Family::Histograms),
            FamilyInfo {
                kind: None,
                count: 0
            }
        );
    }

    #[test]
    fn index_bounds() {
        let dir = Directory::read(&mut Cursor::new(sample())).unwrap();

        for &bad in &[0, 3] {
            match dir.locate(Family::Scalers, bad) {
                Err(MudError::IndexOutOfRange { index, count, .. }) => {
                    assert_eq!(index, bad);
                    assert_eq!(count, 2);
                }
                other => panic!("unexpected {:?}", other),
            }
        }

        assert!(matches!(
            dir.locate(Family::Comments, 1),
            Err(MudError::IndexOutOfRange { count: 0, .. })
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(Directory::read(&mut Cursor::new(Vec::new())).is_err());
        assert!(Directory::read(&mut Cursor::new(b"not a MUD file at all".to_vec())).is_err());

        let mut truncated = sample();
        truncated.truncate(truncated.len() - 5);
        assert!(Directory::read(&mut Cursor::new(truncated)).is_err());
    }

    #[test]
    fn rejects_inconsistent_index() {
        let mut data = sample();
        // Corrupt the instance number in the first index entry of the
        // top-level group.
        let ofs = CORE_HEADER_SIZE + 8 + 8;
        data[ofs] = 9;
        assert!(Directory::read(&mut Cursor::new(data)).is_err());
    }
}
