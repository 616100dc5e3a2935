// SPDX-License-Identifier: MIT

/// Implements little-endian read/write helpers for primitive types on a
/// `SectorStore`, addressed by absolute byte offset.
#[macro_export]
macro_rules! sector_store_impl_primitive_rw {
    ($($ty:ty),+ $(,)?) => {
        $(
            paste::paste! {
                #[inline(always)]
                fn [<write_ $ty _at>](&mut self, offset: u64, value: $ty) -> SectorIOResult {
                    let buf = value.to_le_bytes();
                    self.write_bytes(offset, &buf)
                }

                #[inline(always)]
                fn [<read_ $ty _at>](&mut self, offset: u64) -> SectorIOResult<$ty> {
                    let mut buf = [0u8; core::mem::size_of::<$ty>()];
                    self.read_bytes(offset, &mut buf)?;
                    Ok(<$ty>::from_le_bytes(buf))
                }
            }
        )+
    };
}
