//! Collection of small utility types.

use shrinkwraprs::Shrinkwrap;

#[derive(Shrinkwrap, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
#[shrinkwrap(mutable)]
pub struct Line(pub usize);
