//! Text helpers shared by the level parsers: literal and unit conversion plus
//! a small scanner for the C macro calls the decomp sources are made of.

pub mod macros;
pub mod units;

pub use macros::{MacroArg, MacroCall, brace_body, find_array_decls, find_calls};
pub use units::{
    LiteralError, angle_to_degrees, parse_int_literal, parse_uint_literal, scale_to_float,
};
