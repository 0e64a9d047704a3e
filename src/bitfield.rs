/// Fixed-length set of bits, most significant bit first like the wire bitfield.
#[derive(Debug, Clone, PartialEq)]
pub struct BitField {
    pub payload: Vec<u8>,
    /// number of bits, not bytes
    pub len: usize,
}

impl BitField {
    /// Creates a bitfield of `len` bits, all unset.
    pub fn with_len(len: usize) -> BitField {
        BitField {
            payload: vec![0; (len + 7) / 8],
            len,
        }
    }

    /// Returns true if the bit at the given index is set.
    pub fn is_set(&self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        let byte = index / 8;
        let bit = index % 8;
        let mask = 1 << (7 - bit);
        self.payload[byte] & mask != 0
    }

    pub fn set(&mut self, index: usize) {
        if index >= self.len {
            return;
        }
        let byte = index / 8;
        let bit = index % 8;
        let mask = 1 << (7 - bit);
        self.payload[byte] |= mask;
    }

    pub fn iter(&self) -> BitfieldIter {
        BitfieldIter {
            bitfield: self,
            index: 0,
        }
    }

    pub fn count_set(&self) -> usize {
        self.iter().filter(|&b| b).count()
    }

    /// Indices of the bits that are still unset
    pub fn missing(&self) -> Vec<usize> {
        self.iter()
            .enumerate()
            .filter(|&(_, b)| !b)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.iter().all(|b| b)
    }
}

pub struct BitfieldIter<'a> {
    bitfield: &'a BitField,
    index: usize,
}

impl<'a> Iterator for BitfieldIter<'a> {
    type Item = bool;

    fn next(&mut self) -> Option<bool> {
        if self.index >= self.bitfield.len {
            return None;
        }
        let bit = self.bitfield.is_set(self.index);
        self.index += 1;
        Some(bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitfield_with_len() {
        let bitfield = BitField::with_len(10);
        assert_eq!(bitfield.len, 10);
        assert_eq!(bitfield.payload, vec![0, 0]);
        assert!(!bitfield.is_complete());
    }

    #[test]
    fn bitfield_set() {
        let mut bf = BitField::with_len(9);
        bf.set(0);
        bf.set(8);
        bf.set(8);
        assert_eq!(bf.payload, vec![0b1000_0000, 0b1000_0000]);
        assert!(bf.is_set(0));
        assert!(!bf.is_set(1));
        assert!(bf.is_set(8));
        assert_eq!(bf.count_set(), 2);
        assert_eq!(bf.missing(), vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn out_of_range_bits_are_ignored() {
        let mut bf = BitField::with_len(3);
        bf.set(7);
        assert!(!bf.is_set(7));
        assert_eq!(bf.payload, vec![0]);
    }

    #[test]
    fn empty_bitfield_is_complete() {
        let bf = BitField::with_len(0);
        assert_eq!(bf.len, 0);
        assert!(bf.is_complete());
    }
}
