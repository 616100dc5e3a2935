// SPDX-License-Identifier: MIT

use crate::{Sector, SectorIOResult, SectorStore};

/// Simple counters, no_std friendly.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct IoStats {
    pub reads: u64,
    pub writes: u64,
    pub flushes: u64,

    // Useful to spot access patterns (e.g. FAT mirror writes)
    pub last_read: Option<u32>,
    pub last_write: Option<u32>,
    pub max_lba_written: u32,
}

impl IoStats {
    #[inline]
    pub fn reset(&mut self) {
        *self = IoStats::default();
    }
}

/// Transparent instrumentation wrapper.
pub struct IOCounter<'a, S: SectorStore + ?Sized> {
    inner: &'a mut S,
    pub stats: IoStats,
}

impl<'a, S: SectorStore + ?Sized> IOCounter<'a, S> {
    #[inline]
    pub fn new(inner: &'a mut S) -> Self {
        Self {
            inner,
            stats: IoStats::default(),
        }
    }

    #[inline]
    pub fn snapshot(&self) -> IoStats {
        self.stats
    }

    #[inline]
    pub fn into_inner(self) -> &'a mut S {
        self.inner
    }
}

impl<'a, S: SectorStore + ?Sized> SectorStore for IOCounter<'a, S> {
    #[inline]
    fn read_sector(&mut self, lba: u32, buf: &mut Sector) -> SectorIOResult {
        self.stats.reads += 1;
        self.stats.last_read = Some(lba);
        self.inner.read_sector(lba, buf)
    }

    #[inline]
    fn write_sector(&mut self, lba: u32, data: &Sector) -> SectorIOResult {
        self.stats.writes += 1;
        self.stats.last_write = Some(lba);
        self.stats.max_lba_written = self.stats.max_lba_written.max(lba);
        self.inner.write_sector(lba, data)
    }

    #[inline]
    fn sector_count(&self) -> u32 {
        self.inner.sector_count()
    }

    #[inline]
    fn flush(&mut self) -> SectorIOResult {
        self.stats.flushes += 1;
        self.inner.flush()
    }
}

/// Per-access callbacks for [`TracingStore`].
pub trait IOTracer {
    fn on_read(&mut self, _lba: u32) {}
    fn on_write(&mut self, _lba: u32) {}
    fn on_flush(&mut self) {}
}

/// Wrapper forwarding every access to an [`IOTracer`] before the inner store.
pub struct TracingStore<'a, S: SectorStore + ?Sized, Tr: IOTracer> {
    inner: &'a mut S,
    tracer: Tr,
}

impl<'a, S: SectorStore + ?Sized, Tr: IOTracer> TracingStore<'a, S, Tr> {
    #[inline]
    pub fn new(inner: &'a mut S, tracer: Tr) -> Self {
        Self { inner, tracer }
    }

    #[inline]
    pub fn tracer(&self) -> &Tr {
        &self.tracer
    }

    #[inline]
    pub fn tracer_mut(&mut self) -> &mut Tr {
        &mut self.tracer
    }

    #[inline]
    pub fn into_tracer(self) -> Tr {
        self.tracer
    }
}

impl<'a, S: SectorStore + ?Sized, Tr: IOTracer> SectorStore for TracingStore<'a, S, Tr> {
    fn read_sector(&mut self, lba: u32, buf: &mut Sector) -> SectorIOResult {
        self.tracer.on_read(lba);
        self.inner.read_sector(lba, buf)
    }

    fn write_sector(&mut self, lba: u32, data: &Sector) -> SectorIOResult {
        self.tracer.on_write(lba);
        self.inner.write_sector(lba, data)
    }

    fn sector_count(&self) -> u32 {
        self.inner.sector_count()
    }

    fn flush(&mut self) -> SectorIOResult {
        self.tracer.on_flush();
        self.inner.flush()
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::prelude::*;

    #[derive(Default)]
    struct WriteLog(Vec<u32>);

    impl IOTracer for WriteLog {
        fn on_write(&mut self, lba: u32) {
            self.0.push(lba);
        }
    }

    #[test]
    fn test_counter_counts_sector_traffic() {
        let mut store = MemSectorStore::new(4);
        let mut counter = IOCounter::new(&mut store);

        // A partial write is a read-modify-write of one sector.
        counter.write_bytes(10, &[1, 2, 3]).unwrap();
        counter.flush().unwrap();

        let stats = counter.snapshot();
        assert_eq!(stats.reads, 1);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.last_write, Some(0));

        counter.stats.reset();
        assert_eq!(counter.snapshot(), IoStats::default());
    }

    #[test]
    fn test_tracer_sees_every_write() {
        let mut store = MemSectorStore::new(4);
        let mut traced = TracingStore::new(&mut store, WriteLog::default());
        traced.zero_sectors(1, 3).unwrap();
        assert_eq!(traced.into_tracer().0, vec![1, 2, 3]);
    }
}
