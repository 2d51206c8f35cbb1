use crate::HashMap;
use crate::netlist::constant::{Bit, Const};
use crate::netlist::{Module, WireId};

/// One bit of a named wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SigBit {
    pub wire: WireId,
    pub offset: usize,
}

/// A contiguous piece of a signal: either a constant run or a slice of a
/// wire. Slices are `(wire, offset, width)`; a slice covering the whole
/// wire makes the containing signal "a wire signal".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SigChunk {
    Const(Const),
    Wire { wire: WireId, offset: usize, width: usize },
}

impl SigChunk {
    pub fn width(&self) -> usize {
        match self {
            SigChunk::Const(c) => c.width(),
            SigChunk::Wire { width, .. } => *width,
        }
    }
}

/// A reference to one bit of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitRef {
    Const(Bit),
    Wire(SigBit),
}

/// A signal: a concatenation of chunks, least significant chunk first.
/// Equality and slicing are purely structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SigSpec {
    chunks: Vec<SigChunk>,
}

impl SigSpec {
    pub fn empty() -> Self {
        SigSpec { chunks: Vec::new() }
    }

    pub fn from_chunk(chunk: SigChunk) -> Self {
        let mut sig = SigSpec::empty();
        sig.append_chunk(chunk);
        sig
    }

    pub fn from_const(constant: Const) -> Self {
        SigSpec::from_chunk(SigChunk::Const(constant))
    }

    pub fn from_bit(bit: SigBit) -> Self {
        SigSpec::from_chunk(SigChunk::Wire { wire: bit.wire, offset: bit.offset, width: 1 })
    }

    /// Appends `chunk` on the most significant side, coalescing it with
    /// the previous chunk when the two are contiguous.
    pub fn append_chunk(&mut self, chunk: SigChunk) {
        if chunk.width() == 0 {
            return;
        }
        if let Some(last) = self.chunks.last_mut() {
            match (last, &chunk) {
                (
                    SigChunk::Wire { wire: w1, offset: o1, width: n1 },
                    SigChunk::Wire { wire: w2, offset: o2, width: n2 },
                ) if w1 == w2 && *o1 + *n1 == *o2 => {
                    *n1 += *n2;
                    return;
                }
                (SigChunk::Const(c1), SigChunk::Const(c2)) => {
                    if let (Const::Bits { bits: b1, .. }, Const::Bits { bits: b2, .. }) = (&*c1, c2)
                    {
                        let mut bits = b1.clone();
                        bits.extend(b2.iter().copied());
                        *c1 = Const::from_bits(bits);
                        return;
                    }
                }
                _ => {}
            }
        }
        self.chunks.push(chunk);
    }

    pub fn append(&mut self, other: &SigSpec) {
        for chunk in &other.chunks {
            self.append_chunk(chunk.clone());
        }
    }

    pub fn chunks(&self) -> &[SigChunk] {
        &self.chunks
    }

    pub fn width(&self) -> usize {
        self.chunks.iter().map(|c| c.width()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The single chunk of a one-chunk signal.
    pub fn as_chunk(&self) -> Option<&SigChunk> {
        match self.chunks.as_slice() {
            [chunk] => Some(chunk),
            _ => None,
        }
    }

    /// The wire of a signal that is exactly one whole wire.
    pub fn as_wire(&self, module: &Module) -> Option<WireId> {
        match self.as_chunk()? {
            SigChunk::Wire { wire, offset: 0, width } if *width == module.wire(*wire).width => {
                Some(*wire)
            }
            _ => None,
        }
    }

    /// The wire bit of a single-bit, single-wire signal.
    pub fn as_bit(&self) -> Option<SigBit> {
        match self.as_chunk()? {
            SigChunk::Wire { wire, offset, width: 1 } => {
                Some(SigBit { wire: *wire, offset: *offset })
            }
            _ => None,
        }
    }

    pub fn bits(&self) -> Vec<BitRef> {
        let mut bits = Vec::with_capacity(self.width());
        for chunk in &self.chunks {
            match chunk {
                SigChunk::Const(c) => bits.extend(c.bits().into_iter().map(BitRef::Const)),
                SigChunk::Wire { wire, offset, width } => {
                    for n in 0..*width {
                        bits.push(BitRef::Wire(SigBit { wire: *wire, offset: offset + n }));
                    }
                }
            }
        }
        bits
    }

    pub fn extract(&self, offset: usize, width: usize) -> SigSpec {
        let mut out = SigSpec::empty();
        let mut pos = 0;
        for chunk in &self.chunks {
            let cw = chunk.width();
            let lo = offset.max(pos);
            let hi = (offset + width).min(pos + cw);
            if lo < hi {
                let inner = lo - pos;
                let take = hi - lo;
                match chunk {
                    SigChunk::Const(c) => {
                        let bits = c.bits()[inner..inner + take].to_vec();
                        out.append_chunk(SigChunk::Const(Const::from_bits(bits)));
                    }
                    SigChunk::Wire { wire, offset: o, .. } => {
                        out.append_chunk(SigChunk::Wire {
                            wire: *wire,
                            offset: o + inner,
                            width: take,
                        });
                    }
                }
            }
            pos += cw;
        }
        out
    }

    pub fn is_fully_const(&self) -> bool {
        self.chunks.iter().all(|c| matches!(c, SigChunk::Const(_)))
    }

    pub fn is_fully_def(&self) -> bool {
        self.chunks.iter().all(|c| match c {
            SigChunk::Const(c) => c.is_fully_def(),
            SigChunk::Wire { .. } => false,
        })
    }

    pub fn is_fully_ones(&self) -> bool {
        !self.is_empty()
            && self.chunks.iter().all(|c| match c {
                SigChunk::Const(c) => c.bits().iter().all(|b| *b == Bit::One),
                SigChunk::Wire { .. } => false,
            })
    }

    pub fn as_const(&self) -> Option<Const> {
        let mut bits = Vec::with_capacity(self.width());
        for chunk in &self.chunks {
            match chunk {
                SigChunk::Const(c) => bits.extend(c.bits()),
                SigChunk::Wire { .. } => return None,
            }
        }
        Some(Const::from_bits(bits))
    }

    /// Rebuilds the signal bit by bit through `f`, coalescing the result.
    pub fn rewritten(&self, mut f: impl FnMut(SigBit) -> SigBit) -> SigSpec {
        let mut out = SigSpec::empty();
        for bit in self.bits() {
            match bit {
                BitRef::Const(b) => out.append_chunk(SigChunk::Const(Const::from_bits(vec![b]))),
                BitRef::Wire(b) => {
                    let b = f(b);
                    out.append_chunk(SigChunk::Wire { wire: b.wire, offset: b.offset, width: 1 });
                }
            }
        }
        out
    }
}

/// Per-module canonicalization of wire bits, derived from module-level
/// connections: a bit connected to another wire's bit maps to the driver
/// side's representative.
#[derive(Debug, Default)]
pub struct SigMap {
    map: HashMap<SigBit, SigBit>,
}

impl SigMap {
    pub fn build(module: &Module) -> Self {
        let mut sigmap = SigMap { map: HashMap::default() };
        for (lhs, rhs) in &module.connections {
            let lhs_bits = lhs.bits();
            let rhs_bits = rhs.bits();
            for (l, r) in lhs_bits.iter().zip(rhs_bits.iter()) {
                if let (BitRef::Wire(l), BitRef::Wire(r)) = (l, r) {
                    let l = sigmap.bit(*l);
                    let r = sigmap.bit(*r);
                    if l != r {
                        sigmap.map.insert(l, r);
                    }
                }
            }
        }
        sigmap
    }

    pub fn bit(&self, mut bit: SigBit) -> SigBit {
        while let Some(next) = self.map.get(&bit) {
            bit = *next;
        }
        bit
    }

    pub fn map(&self, sig: &SigSpec) -> SigSpec {
        sig.rewritten(|bit| self.bit(bit))
    }
}
