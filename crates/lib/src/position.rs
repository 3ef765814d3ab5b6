//! Densely ordered keys for list children.
//!
//! A [`Position`] is a string over the printable ASCII digits `'!'..='~'`,
//! read as a fraction in base 94 and compared byte-wise. Between any two
//! distinct positions there is always room for another one: when two keys are
//! adjacent at their current length, the midpoint simply gets longer.
//!
//! The [`PositionAllocator`] appends a discriminator built from the actor
//! number and a per-allocator sequence to every key it hands out. Two replicas
//! inserting between the same neighbors at the same time therefore never pick
//! the same key, and their relative order is decided by the discriminator
//! rather than by arrival time.
//!
//! # Examples
//!
//! ```
//! use livetree::position::PositionAllocator;
//!
//! let mut alloc = PositionAllocator::new(1);
//! let first = alloc.allocate(None, None);
//! let second = alloc.allocate(Some(&first), None);
//! let middle = alloc.allocate(Some(&first), Some(&second));
//!
//! assert!(first < middle);
//! assert!(middle < second);
//! ```

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Smallest digit. A position never ends with it, so there is always room below.
const ZERO: u8 = b'!';
/// Largest digit.
const MAX: u8 = b'~';
/// Number of digits in the alphabet.
const BASE: u32 = (MAX - ZERO) as u32 + 1;
/// Radix of the fixed-width and discriminator encodings, which skip the zero digit.
const NONZERO_BASE: u64 = BASE as u64 - 1;

/// Error returned when a string is not a valid [`Position`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid list position: {0:?}")]
pub struct InvalidPosition(pub String);

/// An opaque, densely orderable key for a list child.
///
/// Ordering is plain lexicographic byte order of the underlying string, which
/// is what every replica and the server compare.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Position(String);

impl Position {
    /// Parses a position, rejecting empty strings, bytes outside the digit
    /// alphabet, and a trailing zero digit.
    pub fn parse(s: impl Into<String>) -> Result<Self, InvalidPosition> {
        let s = s.into();
        let valid = !s.is_empty()
            && s.bytes().all(|b| (ZERO..=MAX).contains(&b))
            && s.as_bytes().last() != Some(&ZERO);
        if valid {
            Ok(Self(s))
        } else {
            Err(InvalidPosition(s))
        }
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the discriminator-free midpoint of two positions.
    ///
    /// This is a pure function of its inputs, so every replica computes the
    /// same key for the same neighbors. It is used to re-key a child
    /// deterministically when two siblings collide on one position.
    /// `right`, when given, must be greater than `left`.
    pub fn between(left: &Position, right: Option<&Position>) -> Position {
        let digits = match right {
            Some(right) => midpoint(left.as_bytes(), Some(right.as_bytes())),
            None => after(left.as_bytes()),
        };
        Self::from_digits(digits)
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    fn from_digits(digits: Vec<u8>) -> Self {
        Self(digits.into_iter().map(char::from).collect())
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Position {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Position {
    type Err = InvalidPosition;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Position {
    type Error = InvalidPosition;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<Position> for String {
    fn from(pos: Position) -> Self {
        pos.0
    }
}

/// Hands out list positions for a single actor.
///
/// Every allocated key ends in a discriminator encoding `(actor, sequence)`.
/// The sequence grows with each call, so repeated allocation between the
/// same two neighbors yields distinct keys in increasing order, and keys from
/// different actors at the same neighbors are ordered by actor number.
#[derive(Debug, Clone)]
pub struct PositionAllocator {
    actor: u32,
    sequence: u64,
}

impl PositionAllocator {
    /// Creates an allocator for the given actor.
    pub fn new(actor: u32) -> Self {
        Self { actor, sequence: 0 }
    }

    /// The actor number baked into every discriminator.
    pub fn actor(&self) -> u32 {
        self.actor
    }

    /// Returns a position strictly between `before` and `after`.
    ///
    /// A missing bound is unbounded on that side. When both are present
    /// `before` must be less than `after`; list neighbors always are.
    pub fn allocate(&mut self, before: Option<&Position>, after: Option<&Position>) -> Position {
        let mut digits = match (before, after) {
            (Some(lo), Some(hi)) => midpoint(lo.as_bytes(), Some(hi.as_bytes())),
            (Some(lo), None) => self::after(lo.as_bytes()),
            (None, Some(hi)) => self::before(hi.as_bytes()),
            (None, None) => midpoint(&[], None),
        };
        // The body is never a prefix of `after`, so the suffix keeps both bounds.
        push_varint(&mut digits, u64::from(self.actor));
        push_varint(&mut digits, self.sequence);
        self.sequence += 1;
        Position::from_digits(digits)
    }

    /// Returns `len` increasing positions for the children of a freshly
    /// created list.
    ///
    /// The keys are fixed width and carry no discriminator: the parent list is
    /// new, so nothing else can be inserting into it yet.
    pub fn sequence(&self, len: usize) -> PositionSequence {
        PositionSequence::new(len)
    }
}

/// Iterator over evenly numbered fixed-width positions, see
/// [`PositionAllocator::sequence`].
#[derive(Debug, Clone)]
pub struct PositionSequence {
    next: u64,
    len: u64,
    width: usize,
}

impl PositionSequence {
    fn new(len: usize) -> Self {
        let len = len as u64;
        let mut width = 1;
        let mut capacity = NONZERO_BASE;
        while capacity < len {
            capacity = capacity.saturating_mul(NONZERO_BASE);
            width += 1;
        }
        Self {
            next: 0,
            len,
            width,
        }
    }
}

impl Iterator for PositionSequence {
    type Item = Position;

    fn next(&mut self) -> Option<Position> {
        if self.next >= self.len {
            return None;
        }
        let mut value = self.next;
        self.next += 1;

        let mut digits = vec![ZERO + 1; self.width];
        for slot in digits.iter_mut().rev() {
            *slot = ZERO + 1 + (value % NONZERO_BASE) as u8;
            value /= NONZERO_BASE;
        }
        Some(Position::from_digits(digits))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.len - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PositionSequence {}

fn digit(b: u8) -> u32 {
    u32::from(b - ZERO)
}

/// Midpoint of `lo` and `hi` (or of `lo` and one when `hi` is absent).
///
/// Requires `lo < hi` and no trailing zero digit on either. The result never
/// ends in the zero digit and is never a prefix of `hi`.
fn midpoint(lo: &[u8], hi: Option<&[u8]>) -> Vec<u8> {
    let mut out = Vec::with_capacity(lo.len() + 1);
    let mut lo = lo;
    let mut hi = hi;

    loop {
        if let Some(upper) = hi {
            let shared = upper
                .iter()
                .enumerate()
                .take_while(|(i, d)| lo.get(*i).copied().unwrap_or(ZERO) == **d)
                .count();
            if shared > 0 {
                out.extend_from_slice(&upper[..shared]);
                lo = lo.get(shared..).unwrap_or(&[]);
                hi = if shared < upper.len() {
                    Some(&upper[shared..])
                } else {
                    None
                };
                continue;
            }
        }

        let d_lo = lo.first().map_or(0, |&d| digit(d));
        let d_hi = hi.and_then(|h| h.first()).map_or(BASE, |&d| digit(d));
        if d_hi > d_lo + 1 {
            out.push(ZERO + ((d_lo + d_hi) / 2) as u8);
            return out;
        }

        // Adjacent leading digits: keep the lower one and go above the rest of `lo`.
        out.push(ZERO + d_lo as u8);
        lo = lo.get(1..).unwrap_or(&[]);
        hi = None;
    }
}

/// A short key above `lo`: bump the first digit that has room.
fn after(lo: &[u8]) -> Vec<u8> {
    match lo.iter().position(|&d| d < MAX) {
        Some(i) => {
            let mut out = lo[..i].to_vec();
            out.push(lo[i] + 1);
            out
        }
        None => midpoint(lo, None),
    }
}

/// A short key below `hi`: lower the first digit that can drop without
/// becoming the zero digit.
fn before(hi: &[u8]) -> Vec<u8> {
    match hi.iter().position(|&d| d > ZERO + 1) {
        Some(i) => {
            let mut out = hi[..i].to_vec();
            out.push(hi[i] - 1);
            out
        }
        None => midpoint(&[], Some(hi)),
    }
}

/// Prefix-free encoding of `value`: one length digit followed by base-93
/// digits, none of which is the zero digit.
fn push_varint(out: &mut Vec<u8>, mut value: u64) {
    let mut digits = Vec::with_capacity(10);
    loop {
        digits.push(ZERO + 1 + (value % NONZERO_BASE) as u8);
        value /= NONZERO_BASE;
        if value == 0 {
            break;
        }
    }
    out.push(ZERO + digits.len() as u8);
    out.extend(digits.iter().rev());
}
