use bytes::Bytes;

use crate::error::EntryError;

/// Sample type of a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    U8,
    U16,
    I16,
    I32,
    F32,
    F64,
}

impl SampleType {
    /// Width of one sample in bits.
    pub fn bits(self) -> u32 {
        match self {
            SampleType::U8 => 8,
            SampleType::U16 | SampleType::I16 => 16,
            SampleType::I32 | SampleType::F32 => 32,
            SampleType::F64 => 64,
        }
    }

    /// Width of one sample in bytes.
    pub fn bytes(self) -> usize {
        (self.bits() / 8) as usize
    }
}

/// Pixel data of one tile.
///
/// A buffer is one or more equally sized banks of raw samples. The cache
/// treats the contents as opaque and only uses the layout to weigh the tile.
/// Cloning is cheap: banks are reference-counted [`Bytes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    sample_type: SampleType,
    banks: Vec<Bytes>,
}

impl PixelBuffer {
    /// Create a buffer from raw banks.
    pub fn new(sample_type: SampleType, banks: Vec<Bytes>) -> Self {
        Self { sample_type, banks }
    }

    /// Create a single-bank buffer.
    pub fn single_bank(sample_type: SampleType, data: impl Into<Bytes>) -> Self {
        Self::new(sample_type, vec![data.into()])
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    pub fn banks(&self) -> &[Bytes] {
        &self.banks
    }

    pub fn num_banks(&self) -> usize {
        self.banks.len()
    }

    /// Number of samples per bank.
    ///
    /// Fails if the buffer layout is inconsistent.
    pub fn bank_len(&self) -> Result<usize, EntryError> {
        let first = self.banks.first().ok_or(EntryError::NoBanks)?;
        let sample_bytes = self.sample_type.bytes();

        for bank in &self.banks[1..] {
            if bank.len() != first.len() {
                return Err(EntryError::UnequalBanks {
                    expected: first.len(),
                    actual: bank.len(),
                });
            }
        }

        if first.len() % sample_bytes != 0 {
            return Err(EntryError::MisalignedBank {
                len: first.len(),
                sample_bytes,
            });
        }

        Ok(first.len() / sample_bytes)
    }

    /// Memory cost of this buffer: `bits / 8 * bank_len * num_banks`.
    pub fn byte_weight(&self) -> Result<u64, EntryError> {
        let bank_len = self.bank_len()? as u64;
        let sample_bytes = u64::from(self.sample_type.bits() / 8);
        Ok(sample_bytes * bank_len * self.banks.len() as u64)
    }
}
