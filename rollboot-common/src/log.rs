// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Logging front end: `defmt` on target, nothing otherwise.

#[cfg(feature = "defmt")]
pub(crate) use defmt::{debug, error, info, warn};

#[cfg(not(feature = "defmt"))]
mod noop {
    macro_rules! debug {
        ( $( $x:expr ),* ) => {{ $( let _ = &$x; )* }};
    }
    macro_rules! info {
        ( $( $x:expr ),* ) => {{ $( let _ = &$x; )* }};
    }
    macro_rules! warner {
        ( $( $x:expr ),* ) => {{ $( let _ = &$x; )* }};
    }
    macro_rules! error {
        ( $( $x:expr ),* ) => {{ $( let _ = &$x; )* }};
    }
    pub(crate) use {debug, error, info, warner};
}

#[cfg(not(feature = "defmt"))]
pub(crate) use noop::{debug, error, info, warner as warn};
