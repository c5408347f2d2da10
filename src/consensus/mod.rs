// Consensus and validation logic

pub mod pow;
pub mod validation;

pub use pow::{
    CancelToken, DEV_BITS, EASY_BITS, MiningResult, PowError, Target, decode_target,
    is_below_or_equal_target,
};
pub use validation::{BlockValidator, ValidationError};
