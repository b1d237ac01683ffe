//! Growable bitset used as a component-id or event-id membership mask.
//!
//! A [`BitSet`] keeps its first [`INLINE_BITS`] bits in an inline block of
//! words and spills every bit past that into a heap-allocated vector. The
//! spill grows on demand when bits are written and never shrinks, so masks
//! that only ever mention low ids stay allocation-free.
//!
//! Combining two sets with `|=`, `&=` or `-=` requires both to own the same
//! number of words. A mismatch is a programming error and panics; resize all
//! masks that take part in an operation first. [`BitSet::intersects`] is the
//! one exception: it reports `false` on a mismatch.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Sub, SubAssign};

/// Number of bits held in the inline block.
pub const INLINE_BITS: usize = 512;

const WORD_BITS: usize = u64::BITS as usize;
const INLINE_WORDS: usize = INLINE_BITS / WORD_BITS;

// ---------------------------------------------------------------------------
// BitIndex
// ---------------------------------------------------------------------------

/// An unsigned index type that can address bits of a [`BitSet`].
///
/// Index types are never wider than the 64-bit storage word.
pub trait BitIndex: Copy {
    /// The bit position this index addresses.
    fn to_bit(self) -> usize;
    /// Rebuild an index from a bit position.
    fn from_bit(bit: usize) -> Self;
}

macro_rules! impl_bit_index {
    ($($ty:ty),* $(,)?) => {
        $(
            impl BitIndex for $ty {
                #[inline]
                fn to_bit(self) -> usize {
                    self as usize
                }

                #[inline]
                fn from_bit(bit: usize) -> Self {
                    bit as $ty
                }
            }
        )*
    };
}

impl_bit_index!(u8, u16, u32, u64, usize);

// ---------------------------------------------------------------------------
// BitSet
// ---------------------------------------------------------------------------

/// A bitset with a fixed inline block and a growable spill.
///
/// Layout: bit `b` lives in `direct[b / 64]` when `b < INLINE_BITS`, otherwise
/// in `spill[(b - INLINE_BITS) / 64]`.
pub struct BitSet<I = u32> {
    direct: [u64; INLINE_WORDS],
    spill: Vec<u64>,
    _index: PhantomData<fn(I) -> I>,
}

impl<I: BitIndex> BitSet<I> {
    /// Create an empty set with only the inline block.
    pub fn new() -> Self {
        Self {
            direct: [0; INLINE_WORDS],
            spill: Vec::new(),
            _index: PhantomData,
        }
    }

    /// Create an empty set able to hold at least `bits` bits without growing.
    pub fn with_capacity(bits: usize) -> Self {
        let mut set = Self::new();
        set.resize(bits);
        set
    }

    /// Build a set with every listed bit set.
    pub fn create(bits: impl IntoIterator<Item = I>) -> Self {
        let mut set = Self::new();
        for bit in bits {
            set.set(bit);
        }
        set
    }

    /// Whether `bit` is set. Bits past the current capacity read as `false`.
    #[inline]
    pub fn test(&self, bit: I) -> bool {
        let bit = bit.to_bit();
        match self.word_at(bit / WORD_BITS) {
            Some(word) => word & mask(bit) != 0,
            None => false,
        }
    }

    /// Set `bit`, growing the spill if needed.
    #[inline]
    pub fn set(&mut self, bit: I) {
        self.mutate(bit.to_bit(), true);
    }

    /// Clear `bit`, growing the spill if needed.
    #[inline]
    pub fn reset(&mut self, bit: I) {
        self.mutate(bit.to_bit(), false);
    }

    /// Toggle `bit`.
    #[inline]
    pub fn flip(&mut self, bit: I) {
        let bit = bit.to_bit();
        *self.locate_mut(bit) ^= mask(bit);
    }

    /// Clear every bit. Capacity is kept.
    pub fn clear(&mut self) {
        self.direct.fill(0);
        self.spill.fill(0);
    }

    /// Grow the set so it owns at least `bits` bits. Never shrinks.
    pub fn resize(&mut self, bits: usize) {
        if bits <= INLINE_BITS {
            return;
        }
        let words = (bits - INLINE_BITS).div_ceil(WORD_BITS);
        if words > self.spill.len() {
            self.spill.resize(words, 0);
        }
    }

    /// Grow this set to the capacity of `other` if `other` is larger.
    pub fn match_capacity(&mut self, other: &Self) {
        self.resize(other.capacity());
    }

    /// Whether at least one bit is set.
    #[inline]
    pub fn any(&self) -> bool {
        !self.none()
    }

    /// Whether no bit is set.
    pub fn none(&self) -> bool {
        self.words().all(|word| word == 0)
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.words().map(|word| word.count_ones() as usize).sum()
    }

    /// Whether both sets share at least one bit.
    ///
    /// Returns `false` when the sets own different word counts instead of
    /// asserting.
    pub fn intersects(&self, other: &Self) -> bool {
        if self.word_count() != other.word_count() {
            return false;
        }
        self.words().zip(other.words()).any(|(a, b)| a & b != 0)
    }

    /// Number of 64-bit words currently owned (inline + spill).
    #[inline]
    pub fn word_count(&self) -> usize {
        INLINE_WORDS + self.spill.len()
    }

    /// Number of bits addressable without growing.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.word_count() * WORD_BITS
    }

    /// Iterate set bits in ascending order.
    pub fn iter(&self) -> Iter<'_, I> {
        Iter {
            set: self,
            word_index: 0,
            current: self.direct[0],
        }
    }

    fn words(&self) -> impl Iterator<Item = u64> + '_ {
        self.direct.iter().chain(self.spill.iter()).copied()
    }

    #[inline]
    fn word_at(&self, index: usize) -> Option<u64> {
        if index < INLINE_WORDS {
            Some(self.direct[index])
        } else {
            self.spill.get(index - INLINE_WORDS).copied()
        }
    }

    #[inline]
    fn word_mut(&mut self, index: usize) -> &mut u64 {
        if index < INLINE_WORDS {
            &mut self.direct[index]
        } else {
            &mut self.spill[index - INLINE_WORDS]
        }
    }

    fn locate_mut(&mut self, bit: usize) -> &mut u64 {
        if bit < INLINE_BITS {
            return &mut self.direct[bit / WORD_BITS];
        }
        let word = (bit - INLINE_BITS) / WORD_BITS;
        if word >= self.spill.len() {
            self.spill.resize(word + 1, 0);
        }
        &mut self.spill[word]
    }

    #[inline]
    fn mutate(&mut self, bit: usize, value: bool) {
        let word = self.locate_mut(bit);
        if value {
            *word |= mask(bit);
        } else {
            *word &= !mask(bit);
        }
    }

    fn combine(&mut self, other: &Self, op: &str, f: impl Fn(u64, u64) -> u64) {
        assert_eq!(
            self.word_count(),
            other.word_count(),
            "bitset word counts differ in `{op}`; resize all masks first"
        );
        for index in 0..self.word_count() {
            let rhs = other.word_at(index).unwrap_or(0);
            let lhs = self.word_mut(index);
            *lhs = f(*lhs, rhs);
        }
    }
}

#[inline]
fn mask(bit: usize) -> u64 {
    1u64 << (bit % WORD_BITS)
}

impl<I: BitIndex> Default for BitSet<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> Clone for BitSet<I> {
    fn clone(&self) -> Self {
        Self {
            direct: self.direct,
            spill: self.spill.clone(),
            _index: PhantomData,
        }
    }
}

/// Equality is logical: trailing zero words in the spill do not matter.
impl<I: BitIndex> PartialEq for BitSet<I> {
    fn eq(&self, other: &Self) -> bool {
        let words = self.word_count().max(other.word_count());
        (0..words).all(|i| self.word_at(i).unwrap_or(0) == other.word_at(i).unwrap_or(0))
    }
}

impl<I: BitIndex> Eq for BitSet<I> {}

impl<I: BitIndex + fmt::Debug> fmt::Debug for BitSet<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<I: BitIndex> FromIterator<I> for BitSet<I> {
    fn from_iter<It: IntoIterator<Item = I>>(iter: It) -> Self {
        Self::create(iter)
    }
}

impl<I: BitIndex> Extend<I> for BitSet<I> {
    fn extend<It: IntoIterator<Item = I>>(&mut self, iter: It) {
        for bit in iter {
            self.set(bit);
        }
    }
}

impl<'a, I: BitIndex> IntoIterator for &'a BitSet<I> {
    type Item = I;
    type IntoIter = Iter<'a, I>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// -- operators ----------------------------------------------------------------

impl<I: BitIndex> BitOrAssign<&BitSet<I>> for BitSet<I> {
    fn bitor_assign(&mut self, rhs: &BitSet<I>) {
        self.combine(rhs, "|=", |a, b| a | b);
    }
}

impl<I: BitIndex> BitAndAssign<&BitSet<I>> for BitSet<I> {
    fn bitand_assign(&mut self, rhs: &BitSet<I>) {
        self.combine(rhs, "&=", |a, b| a & b);
    }
}

/// And-not: clears every bit of `self` that is set in `rhs`.
impl<I: BitIndex> SubAssign<&BitSet<I>> for BitSet<I> {
    fn sub_assign(&mut self, rhs: &BitSet<I>) {
        self.combine(rhs, "-=", |a, b| a & !b);
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $assign:ident) => {
        impl<I: BitIndex> $trait<&BitSet<I>> for BitSet<I> {
            type Output = BitSet<I>;

            fn $method(mut self, rhs: &BitSet<I>) -> BitSet<I> {
                self.$assign(rhs);
                self
            }
        }

        impl<I: BitIndex> $trait<&BitSet<I>> for &BitSet<I> {
            type Output = BitSet<I>;

            fn $method(self, rhs: &BitSet<I>) -> BitSet<I> {
                let mut out = self.clone();
                out.$assign(rhs);
                out
            }
        }
    };
}

impl_binary_op!(BitOr, bitor, bitor_assign);
impl_binary_op!(BitAnd, bitand, bitand_assign);
impl_binary_op!(Sub, sub, sub_assign);

// ---------------------------------------------------------------------------
// Iter
// ---------------------------------------------------------------------------

/// Iterator over the set bits of a [`BitSet`], ascending.
pub struct Iter<'a, I> {
    set: &'a BitSet<I>,
    word_index: usize,
    current: u64,
}

impl<I: BitIndex> Iterator for Iter<'_, I> {
    type Item = I;

    fn next(&mut self) -> Option<I> {
        loop {
            if self.current != 0 {
                let offset = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(I::from_bit(self.word_index * WORD_BITS + offset));
            }
            self.word_index += 1;
            self.current = self.set.word_at(self.word_index)?;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
