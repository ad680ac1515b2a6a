//! Symbol encoding and sequence containers.
//!
//! Text is mapped onto dense ranks `0..alphabet.size()` through
//! [`bio::alphabets::RankTransform`]; every model in the crate works on those
//! ranks only.

use bio::alphabets::{self, RankTransform};

use crate::types::MixtureError;

/// A finite symbol alphabet with dense rank encoding.
///
/// Ranks follow the byte order of the symbols, so `Alphabet::dna()` maps
/// `A, C, G, T` to `0, 1, 2, 3`.
///
/// # Examples
///
/// ```rust
/// use motifmix_core::sequence::Alphabet;
///
/// let dna = Alphabet::dna();
/// let sequence = dna.encode(b"GATTACA")?;
/// assert_eq!(sequence.symbols(), &[2, 0, 3, 3, 0, 1, 0]);
/// assert_eq!(dna.decode(&sequence), "GATTACA");
/// # Ok::<(), motifmix_core::types::MixtureError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Alphabet {
    inner: alphabets::Alphabet,
    ranks: RankTransform,
    symbols: Vec<u8>,
}

impl Alphabet {
    pub fn new(symbols: &[u8]) -> Self {
        let inner = alphabets::Alphabet::new(symbols);
        let ranks = RankTransform::new(&inner);
        let mut sorted: Vec<u8> = symbols.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        Self {
            inner,
            ranks,
            symbols: sorted,
        }
    }

    /// Upper-case DNA alphabet `ACGT`.
    pub fn dna() -> Self {
        Self::new(b"ACGT")
    }

    pub fn size(&self) -> usize {
        self.symbols.len()
    }

    /// Encodes text into ranks.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::InvalidSymbol`] for the first byte that is not
    /// part of the alphabet.
    pub fn encode(&self, text: &[u8]) -> Result<Sequence, MixtureError> {
        let mut symbols = Vec::with_capacity(text.len());
        for (position, &byte) in text.iter().enumerate() {
            if !self.inner.is_word([byte]) {
                return Err(MixtureError::InvalidSymbol {
                    symbol: char::from(byte),
                    position,
                });
            }
            symbols.push(self.ranks.get(byte));
        }
        Ok(Sequence { symbols })
    }

    pub fn decode(&self, sequence: &Sequence) -> String {
        sequence
            .symbols
            .iter()
            .map(|&rank| {
                self.symbols
                    .get(usize::from(rank))
                    .map_or('?', |&byte| char::from(byte))
            })
            .collect()
    }

    /// Encodes several texts into a [`DataSet`].
    ///
    /// # Errors
    ///
    /// Propagates the first encoding error.
    pub fn encode_all<T: AsRef<[u8]>>(&self, texts: &[T]) -> Result<DataSet, MixtureError> {
        let sequences = texts
            .iter()
            .map(|text| self.encode(text.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        DataSet::new(self.size(), sequences)
    }
}

/// A rank-encoded sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sequence {
    symbols: Vec<u8>,
}

impl Sequence {
    /// Wraps already encoded ranks without checking them.
    ///
    /// Every rank must be below the alphabet size of the models scoring the
    /// sequence; an out-of-range rank panics on the table lookup while
    /// scoring. [`DataSet::new`] and [`Sequence::from_ranks_checked`] verify
    /// the ranks.
    pub fn from_ranks(symbols: Vec<u8>) -> Self {
        Self { symbols }
    }

    /// Wraps encoded ranks after checking them against `alphabet_size`.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::Configuration`] for a rank outside the
    /// alphabet.
    pub fn from_ranks_checked(symbols: Vec<u8>, alphabet_size: usize) -> Result<Self, MixtureError> {
        let sequence = Self { symbols };
        match sequence.rank_outside(alphabet_size) {
            Some(rank) => Err(MixtureError::Configuration(format!(
                "rank {rank} outside an alphabet of size {alphabet_size}"
            ))),
            None => Ok(sequence),
        }
    }

    fn rank_outside(&self, alphabet_size: usize) -> Option<u8> {
        self.symbols
            .iter()
            .copied()
            .find(|&rank| usize::from(rank) >= alphabet_size)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbols(&self) -> &[u8] {
        &self.symbols
    }

    /// Rank at `position`, as an index into probability tables.
    #[inline]
    pub fn symbol_at(&self, position: usize) -> usize {
        usize::from(self.symbols[position])
    }

    /// Copies `[start, end)` into a new sequence.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::LengthMismatch`] if the range exceeds the
    /// sequence.
    pub fn subsequence(&self, start: usize, end: usize) -> Result<Sequence, MixtureError> {
        if start > end || end > self.symbols.len() {
            return Err(MixtureError::LengthMismatch {
                expected: end,
                actual: self.symbols.len(),
            });
        }
        Ok(Self {
            symbols: self.symbols[start..end].to_vec(),
        })
    }
}

/// An ordered collection of sequences over one alphabet.
#[derive(Debug, Clone)]
pub struct DataSet {
    sequences: Vec<Sequence>,
    alphabet_size: usize,
}

impl DataSet {
    /// # Errors
    ///
    /// Returns [`MixtureError::Configuration`] if a rank does not fit the
    /// alphabet.
    pub fn new(alphabet_size: usize, sequences: Vec<Sequence>) -> Result<Self, MixtureError> {
        for (index, sequence) in sequences.iter().enumerate() {
            if let Some(rank) = sequence.rank_outside(alphabet_size) {
                return Err(MixtureError::Configuration(format!(
                    "sequence {index} contains rank {rank} outside an alphabet of size {alphabet_size}"
                )));
            }
        }
        Ok(Self {
            sequences,
            alphabet_size,
        })
    }

    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Sequence> {
        self.sequences.get(index)
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sequence> {
        self.sequences.iter()
    }

    /// Length of the shortest sequence, 0 for an empty data set.
    pub fn min_length(&self) -> usize {
        self.sequences.iter().map(Sequence::len).min().unwrap_or(0)
    }
}

impl<'a> IntoIterator for &'a DataSet {
    type Item = &'a Sequence;
    type IntoIter = std::slice::Iter<'a, Sequence>;

    fn into_iter(self) -> Self::IntoIter {
        self.sequences.iter()
    }
}

/// A weighted half-open window `[start, end)` of a sequence.
///
/// The unit of data handed to component re-estimation.
#[derive(Debug, Clone, Copy)]
pub struct WeightedSegment<'a> {
    pub sequence: &'a Sequence,
    pub start: usize,
    pub end: usize,
    pub weight: f64,
}

impl<'a> WeightedSegment<'a> {
    pub fn new(sequence: &'a Sequence, start: usize, end: usize, weight: f64) -> Self {
        Self {
            sequence,
            start,
            end,
            weight,
        }
    }

    /// The whole sequence with the given weight.
    pub fn whole(sequence: &'a Sequence, weight: f64) -> Self {
        Self::new(sequence, 0, sequence.len(), weight)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Resolves optional sequence weights to one weight per sequence.
///
/// # Errors
///
/// See [`check_weights`].
pub fn resolve_weights(data: &DataSet, weights: Option<&[f64]>) -> Result<Vec<f64>, MixtureError> {
    match weights {
        None => Ok(vec![1.0; data.len()]),
        Some(weights) => {
            check_weights(data, weights)?;
            Ok(weights.to_vec())
        }
    }
}

/// Checks that `weights` holds one finite, non-negative weight per sequence
/// and that at least one of them is positive.
///
/// # Errors
///
/// Returns [`MixtureError::LengthMismatch`] for a wrongly sized vector and
/// [`MixtureError::InvalidWeights`] otherwise.
pub fn check_weights(data: &DataSet, weights: &[f64]) -> Result<(), MixtureError> {
    if weights.len() != data.len() {
        return Err(MixtureError::LengthMismatch {
            expected: data.len(),
            actual: weights.len(),
        });
    }
    if let Some((index, weight)) = weights
        .iter()
        .enumerate()
        .find(|(_, weight)| !weight.is_finite() || **weight < 0.0)
    {
        return Err(MixtureError::InvalidWeights(format!(
            "weight {weight} of sequence {index} is not a finite non-negative number"
        )));
    }
    if !data.is_empty() && weights.iter().all(|weight| *weight == 0.0) {
        return Err(MixtureError::InvalidWeights(
            "every sequence has weight 0".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_dna_ranks() {
        let dna = Alphabet::dna();
        let sequence = dna.encode(b"ACGT").unwrap();
        assert_eq!(sequence.symbols(), &[0, 1, 2, 3]);
        assert_eq!(dna.size(), 4);
    }

    #[test]
    fn test_encode_rejects_unknown_symbol() {
        let dna = Alphabet::dna();
        let error = dna.encode(b"ACNGT").unwrap_err();
        match error {
            MixtureError::InvalidSymbol { symbol, position } => {
                assert_eq!(symbol, 'N');
                assert_eq!(position, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_binary_alphabet() {
        let binary = Alphabet::new(b"01");
        let data = binary.encode_all(&["0110", "1"]).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.alphabet_size(), 2);
        assert_eq!(data.min_length(), 1);
        assert_eq!(data.get(0).unwrap().symbols(), &[0, 1, 1, 0]);
    }

    #[test]
    fn test_subsequence_bounds() {
        let sequence = Sequence::from_ranks(vec![0, 1, 2, 3]);
        assert_eq!(sequence.subsequence(1, 3).unwrap().symbols(), &[1, 2]);
        assert!(sequence.subsequence(2, 5).is_err());
    }

    #[test]
    fn test_dataset_rejects_large_rank() {
        let result = DataSet::new(2, vec![Sequence::from_ranks(vec![0, 2])]);
        assert!(matches!(result, Err(MixtureError::Configuration(_))));
    }

    #[test]
    fn test_checked_ranks() {
        let sequence = Sequence::from_ranks_checked(vec![0, 3, 1], 4).unwrap();
        assert_eq!(sequence.symbols(), &[0, 3, 1]);
        assert!(matches!(
            Sequence::from_ranks_checked(vec![0, 4], 4),
            Err(MixtureError::Configuration(_))
        ));
    }

    #[test]
    fn test_resolve_weights() {
        let data = DataSet::new(2, vec![Sequence::from_ranks(vec![0]); 3]).unwrap();
        assert_eq!(resolve_weights(&data, None).unwrap(), vec![1.0; 3]);
        assert!(resolve_weights(&data, Some(&[1.0, 2.0])).is_err());
        assert_eq!(
            resolve_weights(&data, Some(&[0.0, 2.0, 0.5])).unwrap(),
            vec![0.0, 2.0, 0.5]
        );
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let data = DataSet::new(2, vec![Sequence::from_ranks(vec![0]); 3]).unwrap();
        for weights in [
            [1.0, -0.5, 1.0],
            [1.0, f64::NAN, 1.0],
            [f64::INFINITY, 1.0, 1.0],
            [0.0, 0.0, 0.0],
        ] {
            assert!(matches!(
                check_weights(&data, &weights),
                Err(MixtureError::InvalidWeights(_))
            ));
        }
        assert!(matches!(
            check_weights(&data, &[1.0]),
            Err(MixtureError::LengthMismatch {
                expected: 3,
                actual: 1
            })
        ));
    }
}
