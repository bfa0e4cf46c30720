use thiserror::Error;

/// 0x10000 angle units make a full turn.
pub const ANGLE_UNITS_PER_TURN: f32 = 65536.0;

/// special object tables store yaw in 1/256 of a turn
pub const LEGACY_YAW_UNITS_PER_TURN: f32 = 256.0;

/// 0x10000 is a scale of 1.0
pub const SCALE_ONE: f64 = 65536.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LiteralError {
    #[error("{0:?} is not an integer literal")]
    NotNumeric(String),

    #[error("{0:?} does not fit the target integer type")]
    OutOfRange(String),
}

impl LiteralError {
    pub fn literal(&self) -> &str {
        match self {
            LiteralError::NotNumeric(literal) | LiteralError::OutOfRange(literal) => literal,
        }
    }
}

/// Parses a decimal or `0x` prefixed integer literal, optionally negative.
///
/// The sign is taken as written, hex literals are never reinterpreted as two's complement.
pub fn parse_int_literal(literal: &str) -> Result<i64, LiteralError> {
    let trimmed = literal.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let (radix, digits) = match unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
    {
        Some(hex) => (16, hex),
        None => (10, unsigned),
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(LiteralError::NotNumeric(trimmed.to_owned()));
    }

    let value = i64::from_str_radix(digits, radix)
        .map_err(|_| LiteralError::OutOfRange(trimmed.to_owned()))?;
    Ok(if negative { -value } else { value })
}

pub fn parse_i32_literal(literal: &str) -> Result<i32, LiteralError> {
    let value = parse_int_literal(literal)?;
    i32::try_from(value).map_err(|_| LiteralError::OutOfRange(literal.trim().to_owned()))
}

/// Behavior parameters are raw bit patterns, so only non negative literals are accepted.
pub fn parse_uint_literal(literal: &str) -> Result<u32, LiteralError> {
    let value = parse_int_literal(literal)?;
    u32::try_from(value).map_err(|_| LiteralError::OutOfRange(literal.trim().to_owned()))
}

pub fn angle_to_degrees(literal: &str) -> Result<f32, LiteralError> {
    let units = parse_int_literal(literal)?;
    Ok((units as f64 / ANGLE_UNITS_PER_TURN as f64 * 360.0) as f32)
}

pub fn scale_to_float(literal: &str) -> Result<f32, LiteralError> {
    let units = parse_int_literal(literal)?;
    Ok((units as f64 / SCALE_ONE) as f32)
}

/// Converts a raw yaw into degrees given how many raw units make a full turn.
pub fn yaw_to_degrees(raw: f32, units_per_turn: f32) -> f32 {
    raw / units_per_turn * 360.0
}
