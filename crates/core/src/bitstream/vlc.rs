/// MSB-first bit cursor over a byte slice, with the VC2 variable-length codes.
///
/// Reading past the end of the slice yields `1` bits instead of failing.
/// A `1` terminates every unsigned code, so a grammar always runs to
/// completion; callers check [`overrun`](Self::overrun) once at the end.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    offset: usize,
    /// Next bit to read within `data[offset]`, 7 (MSB) down to 0.
    bit: u8,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            bit: 7,
        }
    }

    pub fn read_bit(&mut self) -> u8 {
        let Some(&byte) = self.data.get(self.offset) else {
            return 1;
        };

        let d = (byte >> self.bit) & 0x1;
        if self.bit == 0 {
            self.offset += 1;
            self.bit = 7;
        } else {
            self.bit -= 1;
        }
        d
    }

    pub fn read_bool(&mut self) -> bool {
        self.read_bit() != 0
    }

    /// Decode an interleaved exp-Golomb unsigned integer.
    ///
    /// Each `0` bit is followed by one data bit; a `1` ends the code.
    pub fn read_uint(&mut self) -> u32 {
        let mut d: u32 = 1;
        while self.read_bit() == 0 {
            d <<= 1;
            d |= self.read_bit() as u32;
        }
        d.wrapping_sub(1)
    }

    /// True once the cursor has reached the end of the input.
    pub fn overrun(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// Whole bytes consumed, counting a partially read byte.
    pub fn length(&self) -> usize {
        if self.bit == 7 {
            self.offset
        } else {
            self.offset + 1
        }
    }
}

/// Writer for the codes read by [`BitReader`].
///
/// Used to synthesize sequence headers and transform parameters.
/// [`finish`](Self::finish) pads the last byte with zero bits.
#[derive(Debug, Default)]
pub struct VlcWriter {
    out: Vec<u8>,
    current: u8,
    n: u8,
}

impl VlcWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bit(&mut self, bit: bool) {
        self.current = (self.current << 1) | bit as u8;
        self.n += 1;
        if self.n == 8 {
            self.out.push(self.current);
            self.current = 0;
            self.n = 0;
        }
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_bit(value);
    }

    pub fn write_uint(&mut self, value: u32) {
        let x = value as u64 + 1;
        let top = 63 - x.leading_zeros();
        for i in (0..top).rev() {
            self.write_bit(false);
            self.write_bit((x >> i) & 1 != 0);
        }
        self.write_bit(true);
    }

    /// Bits written so far.
    pub fn bit_len(&self) -> usize {
        self.out.len() * 8 + self.n as usize
    }

    pub fn finish(mut self) -> Vec<u8> {
        if self.n != 0 {
            self.out.push(self.current << (8 - self.n));
        }
        self.out
    }
}
