//! The `base` crate defines the PDP-1-related things which are useful
//! in both a simulator and other associated tools.  The idea is that
//! a tool which manipulates PDP-1 machine words or instructions (a
//! cross-assembler, say) can depend on the base crate without pulling
//! in the simulator library itself.

pub mod collections;
pub mod instruction;
pub mod prelude;

mod charptr;
mod onescomp;
mod types;

pub use crate::charptr::{BytePointer, CHAR_SHIFTS};
pub use crate::onescomp::{ConversionFailed, Word};
pub use crate::types::{Address, Channel, DeviceCode};

#[macro_export]
macro_rules! w18 {
    ($n:expr) => {
        $crate::prelude::Word::literal::<{ $n }>()
    };
}

#[test]
fn test_w18() {
    use prelude::Word;
    let m: Word = w18!(40_u32);
    let n: Word = Word::try_from(40_u32).expect("test data should be in range");
    assert_eq!(m, n);

    let p: Word = w18!(0o777777_u32);
    assert_eq!(p, Word::MINUS_ZERO);
}
