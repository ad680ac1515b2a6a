/// Where a global parameter index lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterLocation {
    /// Local index `local` of parameter block `block`.
    Block { block: usize, local: usize },
    /// Entry of the hidden-parameter block.
    Hidden(usize),
}

/// Offset table of a concatenated parameter vector: the blocks of every
/// sub-model in order, followed by the hidden block.
///
/// # Examples
///
/// ```rust
/// use motifmix_core::mixture::{ParameterLayout, ParameterLocation};
///
/// let layout = ParameterLayout::new(&[3, 0, 2], 1);
/// assert_eq!(layout.total(), 6);
/// assert_eq!(layout.locate(4), Some(ParameterLocation::Block { block: 2, local: 1 }));
/// assert_eq!(layout.locate(5), Some(ParameterLocation::Hidden(0)));
/// assert_eq!(layout.locate(6), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterLayout {
    offsets: Vec<usize>,
    hidden_count: usize,
}

impl ParameterLayout {
    pub fn new(block_counts: &[usize], hidden_count: usize) -> Self {
        let mut offsets = Vec::with_capacity(block_counts.len() + 1);
        let mut total = 0;
        for &count in block_counts {
            offsets.push(total);
            total += count;
        }
        offsets.push(total);
        Self {
            offsets,
            hidden_count,
        }
    }

    pub fn blocks(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn block_offset(&self, block: usize) -> usize {
        self.offsets[block]
    }

    pub fn block_len(&self, block: usize) -> usize {
        self.offsets[block + 1] - self.offsets[block]
    }

    pub fn hidden_offset(&self) -> usize {
        self.offsets[self.blocks()]
    }

    pub fn hidden_count(&self) -> usize {
        self.hidden_count
    }

    pub fn total(&self) -> usize {
        self.hidden_offset() + self.hidden_count
    }

    pub fn locate(&self, index: usize) -> Option<ParameterLocation> {
        let hidden = self.hidden_offset();
        if index >= hidden {
            return (index < self.total()).then(|| ParameterLocation::Hidden(index - hidden));
        }
        // last block whose offset is <= index; empty blocks share offsets
        let block = self.offsets[..self.blocks()].partition_point(|&offset| offset <= index) - 1;
        Some(ParameterLocation::Block {
            block,
            local: index - self.offsets[block],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_blocks_are_skipped() {
        let layout = ParameterLayout::new(&[0, 2, 0, 1], 2);
        assert_eq!(
            layout.locate(0),
            Some(ParameterLocation::Block { block: 1, local: 0 })
        );
        assert_eq!(
            layout.locate(2),
            Some(ParameterLocation::Block { block: 3, local: 0 })
        );
        assert_eq!(layout.locate(4), Some(ParameterLocation::Hidden(1)));
        assert_eq!(layout.block_len(2), 0);
    }

    #[test]
    fn test_no_hidden_parameters() {
        let layout = ParameterLayout::new(&[2], 0);
        assert_eq!(layout.total(), 2);
        assert_eq!(layout.locate(2), None);
    }
}
