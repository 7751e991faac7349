//! Fixed Huffman transport codec used by the engine's UDP protocols.
//!
//! Every launcher and RCON datagram the engine sends or accepts passes
//! through this codec. The code table is fixed: both sides must agree on
//! it bit for bit, so it is embedded here rather than derived from data.
//!
//! # Wire format
//!
//! ```text
//! [0xFF][raw bytes...]            escape: payload did not compress
//! [padding][packed bits...]       padding = unused bits in the last byte
//! ```
//!
//! Bits are packed least significant first within each byte.

use std::sync::LazyLock;

use crate::HuffmanError;

/// Header byte marking an uncompressed payload.
pub const ESCAPE_HEADER: u8 = 0xFF;

/// Bit paths for symbols 0..=255, read left to right from the root.
const BITCODES: [&str; 256] = [
    "010", "110111", "101110010", "00100", // 0
    "10011011", "00101", "100110101", "100001100", // 4
    "100101100", "001110100", "011001001", "11001000", // 8
    "101100001", "100100111", "001111111", "101110000", // 12
    "101110001", "001111011", "11011011", "101111100", // 16
    "100001110", "110011111", "101100000", "001111100", // 20
    "0011000", "001111000", "10001100", "100101011", // 24
    "100010000", "101111011", "100100110", "100110010", // 28
    "0111", "1111000", "00010001", "00011010", // 32
    "00011000", "00010101", "00010000", "00110111", // 36
    "00110110", "00011100", "01100101", "1101001", // 40
    "00110100", "10110011", "10110100", "1111011", // 44
    "10111100", "10111010", "11001001", "11010101", // 48
    "11111110", "11111100", "10001110", "11110011", // 52
    "001101011", "10000000", "000101101", "11010000", // 56
    "001110111", "100000010", "11100111", "001100101", // 60
    "11100110", "00111001", "10001010", "00010011", // 64
    "001110110", "10001111", "000111110", "11000111", // 68
    "11010111", "11100011", "000101000", "001100111", // 72
    "11010100", "000111010", "10010111", "100000111", // 76
    "000100100", "001110001", "11111010", "100100011", // 80
    "11110100", "000110111", "001111010", "100010011", // 84
    "100110001", "11101", "110001011", "101110110", // 88
    "101111110", "100100010", "100101001", "01101", // 92
    "100100100", "101100101", "110100011", "100111100", // 96
    "110110001", "100010010", "101101101", "011001110", // 100
    "011001101", "11111101", "100010001", "100110000", // 104
    "110001000", "110110000", "0001001010", "110001010", // 108
    "101101010", "000110110", "10110001", "110001101", // 112
    "110101101", "110001100", "000111111", "110010101", // 116
    "111000100", "11011001", "110010110", "110011110", // 120
    "000101100", "001110101", "101111101", "1001110", // 124
    "0000", "1000010", "0001110111", "0001100101", // 128
    "1010", "11001110", "0110011000", "0110011001", // 132
    "1000011011", "1001100110", "0011110011", "0011001100", // 136
    "11111001", "0110010001", "0001010011", "1000011010", // 140
    "0001001011", "1001101001", "101110111", "1000001101", // 144
    "1000011111", "1100000101", "0110000010", "1011011101", // 148
    "11110101", "0001111011", "1101000101", "1101000100", // 152
    "1001000010", "0110000011", "1011001000", "100101010", // 156
    "1100110", "111100101", "1100101111", "0001100111", // 160
    "1110000", "0011111100", "11111011", "1100101110", // 164
    "101110011", "1001100111", "1001111111", "1011011100", // 168
    "111110001", "101111010", "1011010110", "1001010000", // 172
    "1001000011", "1001111110", "0011111011", "1000011110", // 176
    "1000101100", "01100001", "00010111", "1000000110", // 180
    "110000101", "0001111010", "0011001101", "0110011110", // 184
    "110010100", "111000101", "0011001001", "0011110010", // 188
    "110000001", "101101111", "0011111101", "110110100", // 192
    "11100100", "1011001001", "0011001000", "0001110110", // 196
    "111111111", "110101100", "111111110", "1000001011", // 200
    "1001011010", "110000000", "000111100", "111110000", // 204
    "011000000", "1001111010", "111001011", "011000111", // 208
    "1001000001", "1001111100", "1000110111", "1001101000", // 212
    "0110001100", "1001111011", "0011010101", "1000101101", // 216
    "0011111010", "0001100100", "01100010", "110000100", // 220
    "101101100", "0110011111", "1001011011", "1000101110", // 224
    "111100100", "1000110110", "0110001101", "1001000000", // 228
    "110110101", "1000001000", "1000001001", "1100000100", // 232
    "110001001", "1000000111", "1001111101", "111001010", // 236
    "0011010100", "1000101111", "101111111", "0001010010", // 240
    "0011100000", "0001100110", "1000001010", "0011100001", // 244
    "11000011", "1011010111", "1000001100", "100011010", // 248
    "0110010000", "100100101", "1001010001", "110000011", // 252
];

// ---------------------------------------------------------------------------
// Decoding tree
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Node {
    children: [Option<usize>; 2],
    symbol: Option<u8>,
}

/// Arena-allocated prefix tree built once from [`BITCODES`].
#[derive(Debug)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    const ROOT: usize = 0;

    fn build() -> Self {
        let mut nodes = vec![Node::default()];
        for (symbol, code) in (0..=u8::MAX).zip(BITCODES) {
            let mut at = Self::ROOT;
            for bit in code.bytes() {
                let side = usize::from(bit == b'1');
                at = match nodes[at].children[side] {
                    Some(next) => next,
                    None => {
                        nodes.push(Node::default());
                        let next = nodes.len() - 1;
                        nodes[at].children[side] = Some(next);
                        next
                    }
                };
            }
            nodes[at].symbol = Some(symbol);
        }
        Self { nodes }
    }

    fn child(&self, at: usize, bit: bool) -> Option<usize> {
        self.nodes[at].children[usize::from(bit)]
    }

    fn symbol(&self, at: usize) -> Option<u8> {
        self.nodes[at].symbol
    }
}

static TREE: LazyLock<Tree> = LazyLock::new(Tree::build);

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Compresses `data` with the engine's Huffman table.
///
/// Empty input encodes to empty output. When the packed form would not be
/// strictly smaller than the input plus its header, the escape form
/// (`0xFF` followed by `data`) is returned instead.
pub fn encode(data: &[u8]) -> Vec<u8> {
    if data.is_empty() {
        return Vec::new();
    }

    let bit_count: usize = data
        .iter()
        .map(|&b| BITCODES[usize::from(b)].len())
        .sum();
    if bit_count.div_ceil(8) + 1 >= data.len() {
        let mut out = Vec::with_capacity(data.len() + 1);
        out.push(ESCAPE_HEADER);
        out.extend_from_slice(data);
        return out;
    }

    // Always 0..=7, so it can never collide with the escape header.
    let padding = ((8 - bit_count % 8) % 8) as u8;
    let mut out = Vec::with_capacity(bit_count.div_ceil(8) + 1);
    out.push(padding);

    let mut current = 0u8;
    let mut bit_index = 0usize;
    for &byte in data {
        for bit in BITCODES[usize::from(byte)].bytes() {
            if bit == b'1' {
                current |= 1 << (bit_index % 8);
            }
            bit_index += 1;
            if bit_index % 8 == 0 {
                out.push(current);
                current = 0;
            }
        }
    }
    if bit_index % 8 != 0 {
        out.push(current);
    }
    out
}

/// Reverses [`encode`].
///
/// An escaped payload is returned verbatim without touching the tree.
/// Bits left over after the last complete symbol are ignored.
///
/// # Errors
/// - [`HuffmanError::InvalidPadding`] if the header claims more padding
///   bits than the payload holds.
/// - [`HuffmanError::InvalidCode`] if a bit path leaves the tree.
pub fn decode(data: &[u8]) -> Result<Vec<u8>, HuffmanError> {
    let Some((&header, payload)) = data.split_first() else {
        return Ok(Vec::new());
    };
    if header == ESCAPE_HEADER {
        return Ok(payload.to_vec());
    }

    let available = payload.len() * 8;
    let padding = usize::from(header);
    if padding > available {
        return Err(HuffmanError::InvalidPadding {
            padding: header,
            available,
        });
    }

    let tree = &*TREE;
    let mut out = Vec::with_capacity(payload.len() * 2);
    let mut at = Tree::ROOT;
    for bit_index in 0..available - padding {
        let bit = payload[bit_index / 8] & (1 << (bit_index % 8)) != 0;
        at = tree
            .child(at, bit)
            .ok_or(HuffmanError::InvalidCode { bit: bit_index })?;
        if let Some(symbol) = tree.symbol(at) {
            out.push(symbol);
            at = Tree::ROOT;
        }
    }
    Ok(out)
}
