use std::cell::Cell;
use std::fmt;

use itertools::Itertools;

use crate::number::{self, Number};
use crate::{Shared, SharedCell};

/// A reference-counted handle to a contiguous numeric buffer.
///
/// Several views may alias the same storage; each view carries its own
/// logical length and base offset while writes through any alias are
/// immediately visible through all of them. Storage is freed when the last
/// handle is dropped, so a view held by an expression tree can never outlive
/// or free the symbol table's binding.
#[derive(Debug, Clone)]
pub struct VectorView {
    buf: Shared<SharedCell<Vec<Number>>>,
    base: usize,
    size: Cell<usize>,
}

impl VectorView {
    pub fn new(size: usize) -> Self {
        Self::from_values(vec![Number::default(); size])
    }

    pub fn from_values(values: Vec<Number>) -> Self {
        let size = values.len();
        Self {
            buf: Shared::new(SharedCell::new(values)),
            base: 0,
            size: Cell::new(size),
        }
    }

    /// Creates an aliasing view over the same storage, re-based at `offset`
    /// and clamped to `len` elements.
    pub fn rebase(&self, offset: usize, len: usize) -> Self {
        let base = self.base + offset.min(self.size.get());
        let available = self.size.get().saturating_sub(offset.min(self.size.get()));
        Self {
            buf: Shared::clone(&self.buf),
            base,
            size: Cell::new(len.min(available)),
        }
    }

    /// `true` when both views share the same underlying storage.
    pub fn aliases(&self, other: &Self) -> bool {
        Shared::ptr_eq(&self.buf, &other.buf)
    }

    pub fn len(&self) -> usize {
        self.size.get()
    }

    pub fn is_empty(&self) -> bool {
        self.size.get() == 0
    }

    /// Clamps both views to the smaller of the two logical lengths.
    /// Called before whole-vector assignment so that the operation is
    /// well-defined for differently sized operands.
    pub fn reconcile_size(&self, other: &Self) {
        let min = self.size.get().min(other.size.get());
        self.size.set(min);
        other.size.set(min);
    }

    pub fn get(&self, index: usize) -> Number {
        if index >= self.size.get() {
            return number::NAN;
        }
        self.buf.borrow()[self.base + index]
    }

    pub fn set(&self, index: usize, value: Number) {
        if index < self.size.get() {
            self.buf.borrow_mut()[self.base + index] = value;
        }
    }

    /// First element, NaN for an empty view. Whole-vector nodes evaluate to
    /// this by convention.
    pub fn front(&self) -> Number {
        self.get(0)
    }

    pub fn fill(&self, value: Number) {
        let mut buf = self.buf.borrow_mut();
        for slot in &mut buf[self.base..self.base + self.size.get()] {
            *slot = value;
        }
    }

    pub fn to_vec(&self) -> Vec<Number> {
        let buf = self.buf.borrow();
        buf[self.base..self.base + self.size.get()].to_vec()
    }

    /// Bulk copy from `src`, clamping both views to the common size first.
    /// Aliasing sources are staged through a temporary so overlapping
    /// regions copy correctly.
    pub fn assign_from(&self, src: &Self) {
        self.reconcile_size(src);
        let n = self.size.get();
        if self.aliases(src) {
            let staged = src.to_vec();
            let mut buf = self.buf.borrow_mut();
            buf[self.base..self.base + n].copy_from_slice(&staged);
        } else {
            let src_buf = src.buf.borrow();
            let mut buf = self.buf.borrow_mut();
            buf[self.base..self.base + n].copy_from_slice(&src_buf[src.base..src.base + n]);
        }
    }

    /// Applies `op` elementwise with `rhs`, writing into `self`. The main
    /// loop is unrolled four wide; bulk vector arithmetic is the hot path
    /// when the same tree is evaluated repeatedly.
    pub fn combine_from(&self, src: &Self, op: impl Fn(Number, Number) -> Number) {
        self.reconcile_size(src);
        let n = self.size.get();
        let staged = if self.aliases(src) {
            Some(src.to_vec())
        } else {
            None
        };
        let src_buf;
        let src_slice: &[Number] = match &staged {
            Some(v) => v,
            None => {
                src_buf = src.buf.borrow();
                &src_buf[src.base..src.base + n]
            }
        };
        let mut buf = self.buf.borrow_mut();
        let dst = &mut buf[self.base..self.base + n];

        let mut i = 0;
        while i + 4 <= n {
            dst[i] = op(dst[i], src_slice[i]);
            dst[i + 1] = op(dst[i + 1], src_slice[i + 1]);
            dst[i + 2] = op(dst[i + 2], src_slice[i + 2]);
            dst[i + 3] = op(dst[i + 3], src_slice[i + 3]);
            i += 4;
        }
        while i < n {
            dst[i] = op(dst[i], src_slice[i]);
            i += 1;
        }
    }

    /// Applies `op` elementwise against a scalar, writing into `self`.
    pub fn combine_scalar(&self, rhs: Number, op: impl Fn(Number, Number) -> Number) {
        let n = self.size.get();
        let mut buf = self.buf.borrow_mut();
        let dst = &mut buf[self.base..self.base + n];

        let mut i = 0;
        while i + 4 <= n {
            dst[i] = op(dst[i], rhs);
            dst[i + 1] = op(dst[i + 1], rhs);
            dst[i + 2] = op(dst[i + 2], rhs);
            dst[i + 3] = op(dst[i + 3], rhs);
            i += 4;
        }
        while i < n {
            dst[i] = op(dst[i], rhs);
            i += 1;
        }
    }

    /// Left fold over the view's elements.
    pub fn fold(&self, init: Number, op: impl Fn(Number, Number) -> Number) -> Number {
        let buf = self.buf.borrow();
        buf[self.base..self.base + self.size.get()]
            .iter()
            .fold(init, |acc, v| op(acc, *v))
    }
}

impl PartialEq for VectorView {
    fn eq(&self, other: &Self) -> bool {
        self.to_vec() == other.to_vec()
    }
}

impl fmt::Display for VectorView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.to_vec().iter().format(", "))
    }
}
