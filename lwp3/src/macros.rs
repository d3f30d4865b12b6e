//! Small helper macros shared by the message codec. Kept close to the
//! iterator-based decoding style used throughout `message.rs`: every
//! downstream/upstream body is walked once, front to back, with a `&u8`
//! iterator over the remaining payload.

/// Unwrap an `Option` produced by `FromPrimitive::from_*`, turning `None`
/// into an `InvalidFrame` error carrying the calling context.
macro_rules! ok {
    ($thing:expr) => {
        $thing.context("unrecognised discriminant")?
    };
}

/// Pull the next byte from an iterator, failing with `InvalidFrame` if the
/// payload is exhausted.
macro_rules! next {
    ($iter:ident) => {
        *$iter.next().context("insufficient length")?
    };
}

macro_rules! four_bytes {
    ($t:ty, $iter:ident) => {
        <$t>::from_le_bytes([next!($iter), next!($iter), next!($iter), next!($iter)])
    };
}

macro_rules! two_bytes {
    ($t:ty, $iter:ident) => {
        <$t>::from_le_bytes([next!($iter), next!($iter)])
    };
}

macro_rules! next_u32 {
    ($iter:ident) => {
        four_bytes!(u32, $iter)
    };
}

macro_rules! next_i32 {
    ($iter:ident) => {
        four_bytes!(i32, $iter)
    };
}

macro_rules! next_f32 {
    ($iter:ident) => {
        four_bytes!(f32, $iter)
    };
}

macro_rules! next_u16 {
    ($iter:ident) => {
        two_bytes!(u16, $iter)
    };
}

macro_rules! next_i16 {
    ($iter:ident) => {
        two_bytes!(i16, $iter)
    };
}

macro_rules! next_i8 {
    ($iter:ident) => {
        next!($iter) as i8
    };
}

pub(crate) use four_bytes;
pub(crate) use next;
pub(crate) use next_f32;
pub(crate) use next_i16;
pub(crate) use next_i32;
pub(crate) use next_i8;
pub(crate) use next_u16;
pub(crate) use next_u32;
pub(crate) use ok;
pub(crate) use two_bytes;
