//! Numeric fields coming back from the store are not always typed the same
//! way (`"4000"` vs `4000`). These helpers accept both forms so the rest of
//! the crate can compare plain numbers.

use std::fmt::Display;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum NumOrStr<T> {
    Num(T),
    Str(String),
}

/// Deserialize a number that may be written as a JSON number or a numeric string.
pub fn number<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
{
    match NumOrStr::<T>::deserialize(d)? {
        NumOrStr::Num(n) => Ok(n),
        NumOrStr::Str(s) => s
            .trim()
            .parse()
            .map_err(|e| D::Error::custom(format!("invalid number {s:?}: {e}"))),
    }
}

/// Like [`number`] for floats, but refuses `NaN` and infinities, which would
/// never compare equal to themselves.
pub fn finite<'de, D>(d: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let n: f64 = number(d)?;
    if n.is_finite() {
        Ok(n)
    } else {
        Err(D::Error::custom(format!("non-finite number {n}")))
    }
}
