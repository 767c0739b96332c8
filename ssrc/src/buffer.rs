//! Grow-on-write byte buffer backing the resampler's pending input and
//! output.

const INITIAL_CAPACITY: usize = 1024;

/// A byte queue that starts at 1 KiB and doubles its capacity whenever a
/// write would overflow. Reads consume from the front.
#[derive(Debug, Default)]
pub struct Buffer {
    data: Vec<u8>,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes`, doubling the backing capacity until it fits.
    pub fn write(&mut self, bytes: &[u8]) {
        let needed = self.data.len() + bytes.len();

        if self.data.capacity() < needed {
            let mut capacity = self.data.capacity().max(INITIAL_CAPACITY);
            while capacity < needed {
                capacity <<= 1;
            }

            self.data.reserve_exact(capacity - self.data.len());
        }

        self.data.extend_from_slice(bytes);
    }

    /// Removes `size` bytes from the front.
    pub fn read(&mut self, size: usize) {
        if size != 0 {
            self.data.drain(..size);
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_front() {
        let mut buf = Buffer::new();
        buf.write(&[1, 2, 3, 4, 5]);
        buf.write(&[6, 7]);

        assert_eq!(buf.len(), 7);
        buf.read(3);
        assert_eq!(buf.as_slice(), &[4, 5, 6, 7]);

        buf.read(4);
        assert!(buf.is_empty());
    }

    #[test]
    fn capacity_doubles_past_initial() {
        let mut buf = Buffer::new();
        buf.write(&[0u8; 1500]);

        assert!(buf.data.capacity() >= 2048);
        assert_eq!(buf.len(), 1500);
    }

    #[test]
    fn zero_read_is_noop() {
        let mut buf = Buffer::new();
        buf.write(&[9, 9]);
        buf.read(0);
        assert_eq!(buf.len(), 2);
    }
}
