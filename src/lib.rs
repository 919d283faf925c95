//! Assembler, disassembler and binary-format library for AMD Radeon GPU
//! machine code.
//!
//! The crate is split into three cooperating cores: the expression engine
//! and symbol environment ([`expr`], [`asm`]), the GCN instruction codec
//! ([`gcn`]), and the binary-format engines ([`elf`], [`fmt`]). Instruction
//! encoding resolves symbols through the expression engine, the emitted
//! bytes land in [`section`] buffers, and the container layers package
//! those sections into ELF trees that the [`elf`] writer serializes.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic, missing_docs)]

use std::io::Write;

pub mod asm;
pub mod dasm;
pub mod elf;
pub mod error;
pub mod expr;
pub mod fmt;
pub mod gcn;
pub mod num;
pub mod section;
pub mod source;

#[macro_export]
/// Add the ability to convert a primitive to an enum
macro_rules! from_primitive {
    (
        $(#[$enum_attr:meta])*
        $vis:vis enum $enum_name:ident {
            $(
                $(#[$variant_attr:meta])*
                $variant_name:ident = $variant_value:expr,
            )*
        }
    ) => {
        $(#[$enum_attr])*
        $vis enum $enum_name {
            $(
                $(#[$variant_attr])*
                $variant_name = $variant_value,
            )*
        }

        impl num_traits::FromPrimitive for $enum_name {
            fn from_i64(n: i64) -> Option<Self> {
                match n {
                    $(
                        $variant_value => Some($enum_name::$variant_name),
                    )*
                    _ => None,
                }
            }

            fn from_u64(n: u64) -> Option<Self> {
                match n {
                    $(
                        $variant_value => Some($enum_name::$variant_name),
                    )*
                    _ => None,
                }
            }
        }
    };
}

/// Encode an instance of a type to a writer
pub trait ToWriter<W>
where
    W: Write,
    Self: Sized,
{
    /// The error type for this operation
    type Error;

    /// Encode an instance of this type to a writer
    fn to_writer(&self, writer: &mut W) -> Result<(), Self::Error>;
}

/// A type which always has a known size when written to a writer
pub trait HasWrittenSize {
    /// The size when written
    const SIZE: usize;
}
