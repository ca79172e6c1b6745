//! Bit-packed 2D buffer for boolean masks.
//!
//! Uses 1 bit per element instead of 1 byte. Bits are stored row-major in
//! LSB order, without row padding.

/// Number of bits per storage word.
const BITS_PER_WORD: usize = 64;

/// A 2D buffer storing boolean values packed as bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitBuffer2 {
    words: Vec<u64>,
    width: usize,
    height: usize,
    /// Total number of bits (width * height).
    len: usize,
}

impl BitBuffer2 {
    /// Create a new bit buffer filled with the given value.
    pub fn new_filled(width: usize, height: usize, value: bool) -> Self {
        let len = width * height;
        let fill = if value { !0u64 } else { 0u64 };
        let mut buf = Self {
            words: vec![fill; len.div_ceil(BITS_PER_WORD)],
            width,
            height,
            len,
        };
        buf.clear_tail();
        buf
    }

    /// Create a new bit buffer with all bits set to false.
    pub fn new_default(width: usize, height: usize) -> Self {
        Self::new_filled(width, height, false)
    }

    /// Build a mask by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> bool) -> Self {
        let mut buf = Self::new_default(width, height);
        for y in 0..height {
            for x in 0..width {
                if f(x, y) {
                    buf.set_xy(x, y, true);
                }
            }
        }
        buf
    }

    /// Create a new bit buffer from a slice of booleans.
    pub fn from_slice(width: usize, height: usize, data: &[bool]) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length {} does not match dimensions {}x{}",
            data.len(),
            width,
            height
        );
        Self::from_fn(width, height, |x, y| data[y * width + x])
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get a bit value at the given linear index.
    #[inline]
    pub fn get(&self, idx: usize) -> bool {
        debug_assert!(idx < self.len);
        (self.words[idx / BITS_PER_WORD] >> (idx % BITS_PER_WORD)) & 1 != 0
    }

    /// Set a bit value at the given linear index.
    #[inline]
    pub fn set(&mut self, idx: usize, value: bool) {
        debug_assert!(idx < self.len);
        let bit = 1u64 << (idx % BITS_PER_WORD);
        if value {
            self.words[idx / BITS_PER_WORD] |= bit;
        } else {
            self.words[idx / BITS_PER_WORD] &= !bit;
        }
    }

    #[inline]
    pub fn get_xy(&self, x: usize, y: usize) -> bool {
        debug_assert!(x < self.width && y < self.height);
        self.get(y * self.width + x)
    }

    #[inline]
    pub fn set_xy(&mut self, x: usize, y: usize, value: bool) {
        debug_assert!(x < self.width && y < self.height);
        self.set(y * self.width + x, value);
    }

    /// Count the number of set bits.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Clear every bit outside the half-open rectangle `[x0, x1) × [y0, y1)`.
    pub fn retain_rect(&mut self, x0: usize, y0: usize, x1: usize, y1: usize) {
        for y in 0..self.height {
            for x in 0..self.width {
                if x < x0 || x >= x1 || y < y0 || y >= y1 {
                    self.set_xy(x, y, false);
                }
            }
        }
    }

    fn clear_tail(&mut self) {
        let used = self.len % BITS_PER_WORD;
        if used == 0 {
            return;
        }
        if let Some(last) = self.words.last_mut() {
            *last &= (1u64 << used) - 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_filled() {
        let buf = BitBuffer2::new_filled(10, 7, true);
        assert_eq!(buf.len(), 70);
        assert_eq!(buf.count_ones(), 70);

        let buf = BitBuffer2::new_filled(10, 7, false);
        assert_eq!(buf.count_ones(), 0);
    }

    #[test]
    fn test_set_get_across_word_boundary() {
        let mut buf = BitBuffer2::new_default(64, 3);
        buf.set(63, true);
        buf.set(64, true);
        buf.set_xy(5, 2, true);

        assert!(buf.get(63));
        assert!(buf.get(64));
        assert!(!buf.get(62));
        assert!(buf.get_xy(5, 2));
        assert_eq!(buf.count_ones(), 3);
    }

    #[test]
    fn test_retain_rect() {
        let mut buf = BitBuffer2::new_filled(6, 6, true);
        buf.retain_rect(1, 2, 4, 5);
        assert_eq!(buf.count_ones(), 9);
        assert!(buf.get_xy(1, 2));
        assert!(!buf.get_xy(0, 2));
        assert!(!buf.get_xy(4, 4));
    }
}
