//! Fixed-size re-framing of a continuous sample stream.
//!
//! Device callbacks arrive in whatever size the host picks; the uplink sends
//! exactly `block_size` samples per message. [`BlockFramer`] carries the
//! remainder between pushes and never drops or reorders samples.
//!
//! ```rust
//! use guide_voice::audio::BlockFramer;
//!
//! let mut framer = BlockFramer::new(4);
//! assert!(framer.push(&[1.0, 2.0, 3.0]).is_empty());
//! let blocks = framer.push(&[4.0, 5.0]);
//! assert_eq!(blocks, vec![vec![1.0, 2.0, 3.0, 4.0]]);
//! assert_eq!(framer.flush(), Some(vec![5.0]));
//! ```

/// Accumulates samples and emits full blocks of `block_size`.
#[derive(Debug)]
pub struct BlockFramer {
    block_size: usize,
    pending: Vec<f32>,
}

impl BlockFramer {
    /// Create a framer.
    ///
    /// # Panics
    ///
    /// Panics if `block_size == 0`.
    pub fn new(block_size: usize) -> Self {
        assert!(block_size > 0, "BlockFramer block size must be > 0");
        Self {
            block_size,
            pending: Vec::with_capacity(block_size),
        }
    }

    /// Append `samples` and return every block that is now complete, oldest
    /// first.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        let mut blocks = Vec::new();
        let mut rest = samples;

        while !rest.is_empty() {
            let room = self.block_size - self.pending.len();
            let take = room.min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == self.block_size {
                let full = std::mem::replace(&mut self.pending, Vec::with_capacity(self.block_size));
                blocks.push(full);
            }
        }

        blocks
    }

    /// Take the trailing partial block, if any.
    pub fn flush(&mut self) -> Option<Vec<f32>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    /// Samples waiting for the next full block.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_blocks_pass_straight_through() {
        let mut framer = BlockFramer::new(4096);
        let blocks = framer.push(&vec![0.5; 4096]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].len(), 4096);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn large_push_splits_into_many_blocks() {
        let mut framer = BlockFramer::new(3);
        let input: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let blocks = framer.push(&input);

        assert_eq!(
            blocks,
            vec![
                vec![0.0, 1.0, 2.0],
                vec![3.0, 4.0, 5.0],
                vec![6.0, 7.0, 8.0]
            ]
        );
        assert_eq!(framer.flush(), Some(vec![9.0]));
        assert_eq!(framer.flush(), None);
    }

    #[test]
    fn samples_keep_their_order_across_pushes() {
        let mut framer = BlockFramer::new(5);
        let mut out = Vec::new();
        for i in 0..7 {
            let chunk: Vec<f32> = (0..3).map(|j| (i * 3 + j) as f32).collect();
            out.extend(framer.push(&chunk).into_iter().flatten());
        }
        out.extend(framer.flush().unwrap_or_default());

        let expected: Vec<f32> = (0..21).map(|i| i as f32).collect();
        assert_eq!(out, expected);
    }

    #[test]
    #[should_panic(expected = "block size must be > 0")]
    fn zero_block_size_panics() {
        let _ = BlockFramer::new(0);
    }
}
