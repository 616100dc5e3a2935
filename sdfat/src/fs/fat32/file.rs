// SPDX-License-Identifier: MIT

use alloc::{string::String, vec::Vec};

use log::{debug, trace};
use sdio::prelude::*;

use crate::{
    core::{errors::*, utils::time_utils::FatTimestamp},
    fs::fat32::{attr::*, dir::DirRecord, types::Fat32Entry, volume::VolumeManager},
};

bitflags::bitflags! {
    /// `open` flags, with the classic POSIX/SdFat values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const O_RDONLY  = 0x0000;
        const O_WRONLY  = 0x0001;
        const O_RDWR    = 0x0002;
        const O_ACCMODE = 0x0003;
        const O_APPEND  = 0x0008;
        const O_CREAT   = 0x0200;
        const O_TRUNC   = 0x0400;
        const O_EXCL    = 0x0800;
        const O_AT_END  = 0x4000;
    }
}

impl OpenFlags {
    #[inline]
    fn access(&self) -> u32 {
        self.bits() & Self::O_ACCMODE.bits()
    }

    /// `false` for the undefined access mode `O_WRONLY | O_RDWR`.
    #[inline]
    pub fn is_valid_access(&self) -> bool {
        self.access() != Self::O_ACCMODE.bits()
    }

    #[inline]
    pub fn is_readable(&self) -> bool {
        matches!(self.access(), 0x0000 | 0x0002)
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        matches!(self.access(), 0x0001 | 0x0002)
    }
}

/// Where the short entry of an open file lives, and what it must still hold
/// there for the handle to write through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EntryRef {
    offset: u64,
    name: [u8; 11],
    /// `(time, date, tenth)` creation stamp.
    created: (u16, u16, u8),
    /// First cluster as last written to the entry.
    first_cluster: u32,
}

impl EntryRef {
    fn of(offset: u64, entry: &Fat32Entry) -> Self {
        Self {
            offset,
            name: entry.name,
            created: (entry.creation_time, entry.creation_date, entry.creation_time_tenth),
            first_cluster: entry.first_cluster(),
        }
    }

    /// `false` once the slot was tombstoned or reused by another entry.
    fn matches(&self, entry: &Fat32Entry) -> bool {
        !entry.is_deleted()
            && entry.name == self.name
            && (entry.creation_time, entry.creation_date, entry.creation_time_tenth) == self.created
            && entry.first_cluster() == self.first_cluster
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Open,
    Closed,
}

/// Cursor over the cluster chain of one open file or directory.
///
/// The recorded `file_size` is authoritative: reads never go past it, even
/// when the chain holds more clusters. Handles are plain values; every
/// operation takes the owning [`VolumeManager`].
#[derive(Debug, Clone)]
pub struct FileHandle {
    name: String,
    attr: Fat32Attributes,
    flags: OpenFlags,
    state: HandleState,

    first_cluster: u32,
    /// Last resolved `(cluster index, cluster)` pair.
    cached: Option<(u32, u32)>,
    position: u32,
    file_size: u32,
    contiguous: bool,
    dirty: bool,

    /// Short entry location and identity; `None` for the root directory.
    entry: Option<EntryRef>,
}

impl FileHandle {
    pub(crate) fn root(root_cluster: u32) -> Self {
        Self {
            name: String::from("/"),
            attr: Fat32Attributes::ROOT32 | Fat32Attributes::DIRECTORY,
            flags: OpenFlags::O_RDONLY,
            state: HandleState::Open,
            first_cluster: root_cluster,
            cached: None,
            position: 0,
            file_size: 0,
            contiguous: false,
            dirty: false,
            entry: None,
        }
    }

    pub(crate) fn from_record(
        record: &DirRecord,
        flags: OpenFlags,
        contiguous: bool,
    ) -> Self {
        let sfn = record.sfn();
        Self {
            name: record.name.clone(),
            attr: sfn.attributes(),
            flags,
            state: HandleState::Open,
            first_cluster: sfn.first_cluster(),
            cached: None,
            position: 0,
            file_size: if sfn.is_dir() { 0 } else { sfn.file_size },
            contiguous,
            dirty: false,
            entry: Some(EntryRef::of(record.sfn_offset(), sfn)),
        }
    }

    /// Positions the handle at end of file (`O_AT_END`).
    pub(crate) fn at_end(mut self) -> Self {
        self.position = self.file_size;
        self
    }

    // === Accessors ===

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn attributes(&self) -> Fat32Attributes {
        self.attr
    }

    #[inline]
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    #[inline]
    pub fn state(&self) -> HandleState {
        self.state
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.state == HandleState::Open
    }

    #[inline]
    pub fn file_size(&self) -> u32 {
        self.file_size
    }

    #[inline]
    pub fn position(&self) -> u32 {
        self.position
    }

    #[inline]
    pub fn first_cluster(&self) -> u32 {
        self.first_cluster
    }

    /// `true` while every cluster of the chain follows its predecessor.
    #[inline]
    pub fn is_contiguous(&self) -> bool {
        self.contiguous
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.attr.is_dir()
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.attr.contains(Fat32Attributes::ROOT32)
    }

    /// Bytes left between the position and the end of file.
    #[inline]
    pub fn available(&self) -> u32 {
        self.file_size.saturating_sub(self.position)
    }

    #[inline]
    fn ensure_open(&self) -> FsFileResult {
        crate::ensure!(self.is_open(), FsFileError::Closed);
        Ok(())
    }

    /// Reads the short entry back and checks it still belongs to this
    /// handle. `Ok(None)` for the root directory.
    fn live_entry<S: SectorStore>(
        &self,
        vol: &mut VolumeManager<S>,
    ) -> FsFileResult<Option<(EntryRef, Fat32Entry)>> {
        let Some(entry_ref) = self.entry else {
            return Ok(None);
        };
        let entry = vol.read_entry(entry_ref.offset)?;
        crate::ensure!(entry_ref.matches(&entry), FsFileError::EntryDeleted);
        Ok(Some((entry_ref, entry)))
    }

    // === Positioning ===

    fn seek_to(&mut self, target: i64) -> FsFileResult<u32> {
        self.ensure_open()?;
        crate::ensure!(
            (0..=self.file_size as i64).contains(&target),
            FsFileError::SeekOutOfRange
        );
        self.position = target as u32;
        Ok(self.position)
    }

    /// Moves to absolute offset `pos`.
    pub fn seek_set(&mut self, pos: u32) -> FsFileResult<u32> {
        self.seek_to(pos as i64)
    }

    pub fn seek_cur(&mut self, delta: i64) -> FsFileResult<u32> {
        self.seek_to(self.position as i64 + delta)
    }

    pub fn seek_end(&mut self, delta: i64) -> FsFileResult<u32> {
        self.seek_to(self.file_size as i64 + delta)
    }

    /// Cluster holding cluster index `index` of the chain, or `None` when the
    /// chain is shorter. `shortcut` trusts the contiguous flag.
    fn cluster_at<S: SectorStore>(
        &mut self,
        vol: &mut VolumeManager<S>,
        index: u32,
        shortcut: bool,
    ) -> FsFileResult<Option<u32>> {
        if self.first_cluster == 0 {
            return Ok(None);
        }
        if shortcut && self.contiguous {
            return Ok(Some(self.first_cluster + index));
        }

        let (mut i, mut cluster) = match self.cached {
            Some((ci, cc)) if ci <= index => (ci, cc),
            _ => (0, self.first_cluster),
        };
        while i < index {
            match vol.next_cluster(cluster)? {
                Some(next) => {
                    i += 1;
                    cluster = next;
                }
                None => {
                    self.cached = Some((i, cluster));
                    return Ok(None);
                }
            }
        }
        self.cached = Some((i, cluster));
        Ok(Some(cluster))
    }

    // === I/O ===

    /// Reads up to `max_bytes` from the current position.
    ///
    /// The length is clamped to `file_size - position`; at end of file the
    /// result is empty.
    pub fn read<S: SectorStore>(
        &mut self,
        vol: &mut VolumeManager<S>,
        max_bytes: usize,
    ) -> FsFileResult<Vec<u8>> {
        self.ensure_open()?;
        crate::ensure!(self.flags.is_readable(), FsFileError::NotReadable);

        let len = max_bytes.min(self.available() as usize);
        let bpc = vol.meta().bytes_per_cluster;
        let mut out = vec![0u8; len];
        let mut done = 0usize;

        while done < len {
            let index = self.position / bpc;
            let offset = self.position % bpc;
            let cluster = self
                .cluster_at(vol, index, true)?
                .ok_or(FsFileError::Invalid("cluster chain shorter than file size"))?;
            let n = ((bpc - offset) as usize).min(len - done);
            vol.read_cluster_bytes(cluster, offset, &mut out[done..done + n])?;
            done += n;
            self.position += n as u32;
        }
        trace!("file: {:?} read {len} byte(s)", self.name);
        Ok(out)
    }

    /// Writes `data` at the current position (or at end of file with
    /// `O_APPEND`), extending the chain as needed, then syncs the entry.
    ///
    /// On a full volume the bytes that fit are kept and recorded and
    /// `NoSpace` is returned.
    pub fn write<S: SectorStore>(
        &mut self,
        vol: &mut VolumeManager<S>,
        data: &[u8],
    ) -> FsFileResult<usize> {
        self.ensure_open()?;
        crate::ensure!(
            self.flags.is_writable() && !self.is_dir(),
            FsFileError::NotWritable
        );
        if self.flags.contains(OpenFlags::O_APPEND) {
            self.position = self.file_size;
        }
        if data.is_empty() {
            return Ok(0);
        }
        self.live_entry(vol)?;
        let room = (u32::MAX - self.position) as usize;
        crate::ensure!(room > 0, FsFileError::Invalid("file size limit reached"));
        let data = &data[..data.len().min(room)];

        let bpc = vol.meta().bytes_per_cluster;
        let mut written = 0usize;
        while written < data.len() {
            let index = self.position / bpc;
            let offset = self.position % bpc;

            let cluster = match self.cluster_at(vol, index, false)? {
                Some(cluster) => cluster,
                None => match self.extend(vol, index)? {
                    Some(cluster) => cluster,
                    None => {
                        self.sync(vol)?;
                        debug!("file: {:?} volume full after {written} byte(s)", self.name);
                        return Err(FsFileError::NoSpace);
                    }
                },
            };

            let n = ((bpc - offset) as usize).min(data.len() - written);
            vol.write_cluster_bytes(cluster, offset, &data[written..written + n])?;
            written += n;
            self.position += n as u32;
            if self.position > self.file_size {
                self.file_size = self.position;
            }
            self.dirty = true;
        }

        self.sync(vol)?;
        trace!("file: {:?} wrote {written} byte(s)", self.name);
        Ok(written)
    }

    /// Appends the cluster for chain index `index` (the chain currently
    /// ends at `index - 1`).
    fn extend<S: SectorStore>(
        &mut self,
        vol: &mut VolumeManager<S>,
        index: u32,
    ) -> FsFileResult<Option<u32>> {
        let previous = if index == 0 {
            None
        } else {
            Some(
                self.cluster_at(vol, index - 1, false)?
                    .ok_or(FsFileError::Invalid("gap in cluster chain"))?,
            )
        };
        let Some(cluster) = vol.allocate_cluster(previous)? else {
            return Ok(None);
        };

        match previous {
            None => {
                self.first_cluster = cluster;
                self.contiguous = true;
            }
            Some(prev) if cluster != prev + 1 => self.contiguous = false,
            Some(_) => {}
        }
        self.cached = Some((index, cluster));
        self.dirty = true;
        trace!("file: {:?} chain index {index} -> cluster {cluster}", self.name);
        Ok(Some(cluster))
    }

    /// Reserves a contiguous run covering `len` bytes for an empty file.
    /// The size stays 0.
    pub fn preallocate<S: SectorStore>(
        &mut self,
        vol: &mut VolumeManager<S>,
        len: u32,
    ) -> FsFileResult {
        self.ensure_open()?;
        crate::ensure!(
            self.flags.is_writable() && !self.is_dir(),
            FsFileError::NotWritable
        );
        crate::ensure!(
            self.file_size == 0 && self.first_cluster == 0,
            FsFileError::Invalid("preallocation requires an empty file")
        );

        let count = len.div_ceil(vol.meta().bytes_per_cluster);
        if count == 0 {
            return Ok(());
        }
        self.live_entry(vol)?;
        let first = vol
            .allocate_contiguous(count)?
            .ok_or(FsFileError::NoSpace)?;

        self.first_cluster = first;
        self.contiguous = true;
        self.cached = None;
        self.dirty = true;
        debug!("file: {:?} preallocated {count} cluster(s) at {first}", self.name);
        self.sync(vol)
    }

    /// Flushes first cluster, size, attributes and write time into the
    /// directory entry. A no-op for the root and for unchanged handles.
    pub fn sync<S: SectorStore>(&mut self, vol: &mut VolumeManager<S>) -> FsFileResult {
        self.ensure_open()?;
        if self.entry.is_none() || !self.dirty {
            return Ok(());
        }
        let Some((entry_ref, mut entry)) = self.live_entry(vol)? else {
            return Ok(());
        };

        entry.set_first_cluster(self.first_cluster);
        if !self.is_dir() {
            entry.file_size = self.file_size;
            self.attr |= Fat32Attributes::ARCHIVE;
        }
        entry.attr = (self.attr - Fat32Attributes::ROOT32).bits();
        entry.touch(FatTimestamp::now());
        vol.write_entry(entry_ref.offset, &entry)?;

        self.entry = Some(EntryRef::of(entry_ref.offset, &entry));
        self.dirty = false;
        trace!("file: {:?} synced (size {})", self.name, self.file_size);
        Ok(())
    }

    /// Syncs and closes. Any later call, including a second `close`, fails
    /// with [`FsFileError::Closed`].
    pub fn close<S: SectorStore>(&mut self, vol: &mut VolumeManager<S>) -> FsFileResult {
        self.sync(vol)?;
        self.state = HandleState::Closed;
        Ok(())
    }
}
