// SPDX-License-Identifier: MIT

//! Read-only consistency check of a mounted volume.

use alloc::{string::String, vec::Vec};

use log::info;
use sdio::prelude::*;

pub use crate::core::checker::*;

use crate::{
    core::errors::*,
    fs::fat32::{
        constant::*,
        dir::DirListing,
        fsinfo::FsInfoCache,
        meta::Fat32Meta,
        table::FatTable,
        types::*,
        volume::VolumeManager,
    },
};

#[derive(Clone, Debug)]
pub struct Fat32CheckOptions {
    /// Compare every FAT copy with FAT1.
    pub compare_fat_copies: bool,
    /// Walk the directory tree: chains, cross-links, sizes, lost clusters.
    pub walk_tree: bool,
    /// Compare the cached free count with a full recount.
    pub check_fsinfo: bool,
}

impl Default for Fat32CheckOptions {
    fn default() -> Self {
        Self {
            compare_fat_copies: true,
            walk_tree: true,
            check_fsinfo: true,
        }
    }
}

pub struct Fat32Checker<'a, S: SectorStore + ?Sized> {
    store: &'a mut S,
    meta: &'a Fat32Meta,
    table: &'a FatTable,
    fsinfo: &'a FsInfoCache,
}

impl<'a, S: SectorStore + ?Sized> Fat32Checker<'a, S> {
    pub fn new(
        store: &'a mut S,
        meta: &'a Fat32Meta,
        table: &'a FatTable,
        fsinfo: &'a FsInfoCache,
    ) -> Self {
        Self {
            store,
            meta,
            table,
            fsinfo,
        }
    }

    pub fn run(&mut self, opts: &Fat32CheckOptions) -> FsCheckerResult<VerifyReport> {
        let mut rep = VerifyReport::default();
        self.check_boot(&mut rep)?;
        self.check_fsinfo_sectors(&mut rep)?;
        self.check_reserved_entries(&mut rep)?;
        if opts.compare_fat_copies {
            self.check_mirrors(&mut rep)?;
        }

        let fat = self.table.entries(&mut *self.store, 0)?;
        if opts.walk_tree {
            let used = self.walk_tree(&mut rep)?;
            self.check_lost(&fat, &used, &mut rep);
        }
        if opts.check_fsinfo {
            self.check_free_count(&fat, &mut rep);
        }

        info!(
            "check: {} error(s), {} warning(s)",
            rep.count(Severity::Error),
            rep.count(Severity::Warn)
        );
        Ok(rep)
    }

    fn check_boot(&mut self, rep: &mut VerifyReport) -> FsCheckerResult {
        let mut main = [0u8; SECTOR_SIZE];
        let mut backup = [0u8; SECTOR_SIZE];
        self.store.read_sector(FAT_VBR_SECTOR, &mut main)?;
        self.store.read_sector(FAT_VBR_BACKUP_SECTOR, &mut backup)?;

        let vbr: Fat32Vbr = self.store.read_struct(FAT_VBR_SECTOR as u64 * SECTOR_SIZE as u64)?;
        match vbr.validate() {
            Ok(()) => rep.push(Finding::info("VBR.OK", "boot sector validated")),
            Err(e) => rep.push(Finding::err("VBR.INVALID", e.msg())),
        }
        if main == backup {
            rep.push(Finding::info("VBR.MIRROR", "backup boot sector matches"));
        } else {
            rep.push(Finding::warn("VBR.MIRROR", "backup boot sector differs"));
        }
        Ok(())
    }

    fn check_fsinfo_sectors(&mut self, rep: &mut VerifyReport) -> FsCheckerResult {
        for sector in [FAT_FSINFO_SECTOR, FAT_FSINFO_BACKUP_SECTOR] {
            let raw: Fat32FsInfo = self.store.read_struct(sector as u64 * SECTOR_SIZE as u64)?;
            if let Err(e) = raw.validate() {
                rep.push(Finding::err("FSINFO.SIG", format!("sector {sector}: {}", e.msg())));
            }
        }
        Ok(())
    }

    fn check_reserved_entries(&mut self, rep: &mut VerifyReport) -> FsCheckerResult {
        for fat_index in 0..self.table.num_fats() {
            let e0 = self.table.read_raw(&mut *self.store, 0, fat_index)? & FAT_ENTRY_MASK;
            let e1 = self.table.read_raw(&mut *self.store, 1, fat_index)? & FAT_ENTRY_MASK;
            if e0 != FAT_ENTRY0 & FAT_ENTRY_MASK {
                rep.push(Finding::err(
                    "FAT.RESERVED",
                    format!("FAT{} entry 0 is {e0:#010X}", fat_index + 1),
                ));
            }
            if e1 < FAT_EOC_MIN {
                rep.push(Finding::err(
                    "FAT.RESERVED",
                    format!("FAT{} entry 1 is {e1:#010X}", fat_index + 1),
                ));
            }
        }
        Ok(())
    }

    fn check_mirrors(&mut self, rep: &mut VerifyReport) -> FsCheckerResult {
        for fat_index in 1..self.table.num_fats() {
            let diff = self.table.mirror_mismatches(&mut *self.store, fat_index)?;
            match diff.first() {
                None => rep.push(Finding::info(
                    "FAT.MIRROR",
                    format!("FAT{} matches FAT1", fat_index + 1),
                )),
                Some(first) => rep.push(Finding::err(
                    "FAT.MIRROR",
                    format!(
                        "FAT{} differs from FAT1 at {} entr(ies), first at {first}",
                        fat_index + 1,
                        diff.len()
                    ),
                )),
            }
        }
        Ok(())
    }

    /// Marks every cluster reachable from the root. Returns the ownership
    /// map indexed by cluster.
    fn walk_tree(&mut self, rep: &mut VerifyReport) -> FsCheckerResult<Vec<bool>> {
        let bpc = self.meta.bytes_per_cluster;
        let mut used = vec![false; self.meta.last_cluster() as usize + 1];
        let root = self.meta.root_cluster;
        // (path, first cluster, parent cluster as stored in `..`)
        let mut pending: Vec<(String, u32, u32)> = Vec::new();

        if self.claim_chain("/", root, None, &mut used, rep)?.is_some() {
            pending.push((String::from("/"), root, 0));
        }

        while let Some((path, cluster, parent)) = pending.pop() {
            let listing = match DirListing::load(&mut *self.store, self.meta, self.table, cluster) {
                Ok(listing) => listing,
                Err(e) => {
                    rep.push(Finding::err("DIR.READ", format!("{path}: {}", e.msg())));
                    continue;
                }
            };
            let records = match listing.records(self.meta) {
                Ok(records) => records,
                Err(e) => {
                    rep.push(Finding::err("DIR.PARSE", format!("{path}: {}", e.msg())));
                    continue;
                }
            };

            for record in records {
                let sfn = record.sfn();
                let first = sfn.first_cluster();
                if sfn.is_label() {
                    continue;
                }
                if sfn.is_dot_or_dotdot() {
                    let expected = if sfn.name == *FAT_DOT_NAME { cluster } else { parent };
                    if first != expected {
                        rep.push(Finding::warn(
                            "DIR.DOT",
                            format!("{path}: {:?} points to {first}, expected {expected}", record.name),
                        ));
                    }
                    continue;
                }

                let child = if path == "/" {
                    format!("/{}", record.name)
                } else {
                    format!("{path}/{}", record.name)
                };

                let size = sfn.file_size;
                if first == 0 {
                    if sfn.is_dir() {
                        rep.push(Finding::err("DIR.NOCLUSTER", format!("{child}: directory without cluster")));
                    } else if size > 0 {
                        rep.push(Finding::err(
                            "CHAIN.SHORT",
                            format!("{child}: {size} byte(s) but no cluster"),
                        ));
                    }
                    continue;
                }

                let expected = if sfn.is_dir() {
                    None
                } else {
                    Some(size.div_ceil(bpc) as usize)
                };
                let Some(len) = self.claim_chain(&child, first, expected, &mut used, rep)? else {
                    continue;
                };
                if sfn.is_dir() && len > 0 {
                    let dotdot = if cluster == root { 0 } else { cluster };
                    pending.push((child, first, dotdot));
                }
            }
        }
        Ok(used)
    }

    /// Walks one chain and marks its clusters. Returns the chain length, or
    /// `None` when the chain is broken or cross-linked.
    fn claim_chain(
        &mut self,
        path: &str,
        first: u32,
        expected: Option<usize>,
        used: &mut [bool],
        rep: &mut VerifyReport,
    ) -> FsCheckerResult<Option<usize>> {
        let chain = match self.table.chain(&mut *self.store, first) {
            Ok(chain) => chain,
            Err(e) => {
                rep.push(Finding::err("CHAIN.BROKEN", format!("{path}: {e}")));
                return Ok(None);
            }
        };

        for &cluster in &chain {
            let slot = &mut used[cluster as usize];
            if *slot {
                rep.push(Finding::err(
                    "CHAIN.XLINK",
                    format!("{path}: cluster {cluster} already in use"),
                ));
                return Ok(None);
            }
            *slot = true;
        }

        if let Some(expected) = expected {
            if chain.len() < expected {
                rep.push(Finding::err(
                    "CHAIN.SHORT",
                    format!("{path}: {} cluster(s), size needs {expected}", chain.len()),
                ));
            } else if chain.len() > expected {
                rep.push(Finding::info(
                    "CHAIN.LONG",
                    format!("{path}: {} cluster(s) beyond size", chain.len() - expected),
                ));
            }
        }
        Ok(Some(chain.len()))
    }

    fn check_lost(&self, fat: &[u32], used: &[bool], rep: &mut VerifyReport) {
        let lost: Vec<u32> = (FAT_FIRST_CLUSTER..=self.meta.last_cluster())
            .filter(|&c| {
                let value = fat[c as usize];
                value != FAT_FREE && value != FAT_BAD && !used[c as usize]
            })
            .collect();
        if let Some(first) = lost.first() {
            rep.push(Finding::warn(
                "FAT.LOST",
                format!("{} allocated cluster(s) unreachable, first {first}", lost.len()),
            ));
        }
    }

    fn check_free_count(&self, fat: &[u32], rep: &mut VerifyReport) {
        let counted = fat
            .iter()
            .skip(FAT_FIRST_CLUSTER as usize)
            .filter(|&&v| v == FAT_FREE)
            .count() as u32;
        let cached = self.fsinfo.free_count();
        if counted == cached {
            rep.push(Finding::info("FSINFO.FREE", format!("{counted} free cluster(s)")));
        } else {
            rep.push(Finding::warn(
                "FSINFO.FREE",
                format!("cached free count {cached}, recount {counted}"),
            ));
        }
    }
}

impl<S: SectorStore> VolumeManager<S> {
    /// Runs every check with default options.
    pub fn check(&mut self) -> FsCheckerResult<VerifyReport> {
        self.check_with(&Fat32CheckOptions::default())
    }

    pub fn check_with(&mut self, opts: &Fat32CheckOptions) -> FsCheckerResult<VerifyReport> {
        Fat32Checker::new(&mut self.store, &self.meta, &self.table, &self.fsinfo).run(opts)
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::fs::fat32::{file::OpenFlags, options::FormatOptions};

    fn populated() -> VolumeManager<MemSectorStore> {
        let store = MemSectorStore::with_megabytes(64).unwrap();
        let mut vol = VolumeManager::format(store, &FormatOptions::new()).unwrap();
        vol.mkdir("a/b").unwrap();
        let mut f = vol
            .open("a/b/data file.bin", OpenFlags::O_RDWR | OpenFlags::O_CREAT)
            .unwrap()
            .unwrap();
        f.write(&mut vol, &[0x5A; 2000]).unwrap();
        f.close(&mut vol).unwrap();
        vol
    }

    #[test]
    fn test_clean_volume() {
        let mut vol = populated();
        let rep = vol.check().unwrap();
        assert!(rep.ok(), "{rep}");
        assert_eq!(rep.with_code("FAT.LOST").count(), 0);
        assert_eq!(rep.with_code("FSINFO.FREE").next().unwrap().sev, Severity::Info);
    }

    #[test]
    fn test_mirror_divergence_is_reported() {
        let mut vol = populated();
        let offset = vol.meta().fat_entry_offset(500, 1);
        vol.store_mut().write_u32_at(offset, 0x0FFF_FFFF).unwrap();

        let rep = vol.check().unwrap();
        let finding = rep.with_code("FAT.MIRROR").next().unwrap();
        assert_eq!(finding.sev, Severity::Error);
        assert!(finding.msg.contains("first at 500"));
    }

    #[test]
    fn test_lost_cluster_and_drift() {
        let mut vol = populated();
        // Allocated behind the directory tree's back.
        vol.set_fat_entry(900, FAT_EOC).unwrap();

        let rep = vol.check().unwrap();
        assert!(rep.ok());
        assert_eq!(rep.with_code("FAT.LOST").next().unwrap().sev, Severity::Warn);
        assert_eq!(rep.with_code("FSINFO.FREE").next().unwrap().sev, Severity::Warn);
    }

    #[test]
    fn test_short_chain_is_an_error() {
        let mut vol = populated();
        let f = vol.open("a/b/data file.bin", OpenFlags::O_RDONLY).unwrap().unwrap();
        let first = f.first_cluster();
        vol.set_fat_entry(first, FAT_EOC).unwrap();

        let rep = vol.check().unwrap();
        assert!(rep.has_error());
        assert!(rep.with_code("CHAIN.SHORT").next().is_some());
    }

    #[test]
    fn test_cross_link_is_an_error() {
        let mut vol = populated();
        let mut g = vol.create_file("other.bin").unwrap();
        g.write(&mut vol, &[1u8; 10]).unwrap();
        let b = vol.open("a/b", OpenFlags::O_RDONLY).unwrap().unwrap();
        // Point the second file at the directory's cluster.
        let first = g.first_cluster();
        vol.set_fat_entry(first, b.first_cluster()).unwrap();

        let rep = vol.check().unwrap();
        assert!(rep.with_code("CHAIN.XLINK").next().is_some());
    }
}
