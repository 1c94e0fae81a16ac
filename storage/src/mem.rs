use crate::{Backing, BackingInfo};
use anyhow::Result;

/// In-memory `Backing`, standing in for a real image the way the teacher's
/// `MemoryDiskDriver` stood in for a real disk. Used by `core::*` unit tests
/// and by the integration tests under `tests/`.
pub struct MemBacking {
    info: BackingInfo,
    mem: Vec<u8>,
}

impl Backing for MemBacking {
    fn open(_path: &str, len: u64, _create: bool) -> Result<Self> {
        Ok(Self {
            info: BackingInfo {
                stats: Default::default(),
                size: len,
            },
            mem: vec![0u8; len as usize],
        })
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = offset as usize;
        buf.copy_from_slice(&self.mem[start..start + buf.len()]);
        self.info.stats.read_cnt += 1;
        Ok(())
    }

    fn write(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let start = offset as usize;
        self.mem[start..start + buf.len()].copy_from_slice(buf);
        self.info.stats.write_cnt += 1;
        Ok(())
    }

    fn flush_range(&mut self, _offset: u64, _len: u64) -> Result<()> {
        self.info.stats.flush_cnt += 1;
        Ok(())
    }

    fn info(&self) -> &BackingInfo {
        &self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_back_round_trip() -> Result<()> {
        let mut b = MemBacking::open("mem", 4096, true)?;
        b.write(0, b"hello")?;
        let mut out = [0u8; 5];
        b.read(0, &mut out)?;
        assert_eq!(&out, b"hello");
        assert_eq!(b.info().stats.write_cnt, 1);
        assert_eq!(b.info().stats.read_cnt, 1);
        Ok(())
    }
}
