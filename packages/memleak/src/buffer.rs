use rand::RngCore;

pub const MIB: usize = 1024 * 1024;

/// Counters describing how much the demo has leaked so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeakStats {
    pub iterations: u64,
    pub leaked_bytes: u64,
}

impl LeakStats {
    pub fn leaked_mb(&self) -> u64 {
        self.leaked_bytes / MIB as u64
    }
}

/// Chunks that are appended and never released while the buffer lives.
#[derive(Debug)]
pub struct LeakBuffer {
    chunks: Vec<Vec<u8>>,
    chunk_size: usize,
    stats: LeakStats,
}

impl LeakBuffer {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunks: Vec::new(),
            chunk_size,
            stats: LeakStats::default(),
        }
    }

    /// Append one chunk of random bytes.
    ///
    /// The bytes are random so the pages are actually touched and cannot be
    /// shared or compressed away.
    pub fn leak_once<R: RngCore>(&mut self, rng: &mut R) -> LeakStats {
        let mut chunk = vec![0u8; self.chunk_size];
        rng.fill_bytes(&mut chunk);
        self.chunks.push(chunk);

        self.stats.iterations += 1;
        self.stats.leaked_bytes += self.chunk_size as u64;
        self.stats
    }

    pub fn stats(&self) -> LeakStats {
        self.stats
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}
