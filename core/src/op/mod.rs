mod ops;

pub use ops::{ExprOp, num_divide, num_modulus, typval_compare, values_equal};
pub(crate) use ops::{add_blob, add_list, arith_any, arith_float, arith_nr, compare_eq_only, compare_float, compare_nr};
