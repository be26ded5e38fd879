use crate::op::{ExprOp, arith_any, arith_float, arith_nr, compare_eq_only, compare_float, compare_nr, typval_compare};
use crate::val::Value;
use crate::vm::vm::Vm;
use crate::vm::vm::frame::ExecCtx;
use crate::vm::{CompareType, VmError};

#[inline]
fn float_operand(v: &Value) -> Result<f64, VmError> {
    match v {
        Value::Float(f) => Ok(*f),
        other => other.get_number_chk().map(|n| n as f64),
    }
}

impl Vm<'_> {
    #[inline]
    pub(super) fn op_nr(&mut self, ectx: &mut ExecCtx, op: ExprOp) -> Result<(), VmError> {
        let right = ectx.stack.pop().get_number_chk()?;
        let left = ectx.stack.peek(-1).get_number_chk()?;
        ectx.stack.set_top(-1, Value::Number(arith_nr(op, left, right)?));
        Ok(())
    }

    #[inline]
    pub(super) fn op_float(&mut self, ectx: &mut ExecCtx, op: ExprOp) -> Result<(), VmError> {
        let right = float_operand(&ectx.stack.pop())?;
        let left = float_operand(&ectx.stack.peek(-1))?;
        ectx.stack.set_top(-1, Value::Float(arith_float(op, left, right)?));
        Ok(())
    }

    pub(super) fn op_any(&mut self, ectx: &mut ExecCtx, op: ExprOp) -> Result<(), VmError> {
        let right = ectx.stack.pop();
        let left = ectx.stack.peek(-1);
        let result = arith_any(op, &left, &right).inspect_err(|err| {
            tracing::trace!(
                target: "v9vm::vm::dispatch",
                %op,
                lhs = left.type_name(),
                rhs = right.type_name(),
                %err,
                "untyped arithmetic failed"
            );
        })?;
        ectx.stack.set_top(-1, result);
        Ok(())
    }

    pub(super) fn compare(&mut self, ectx: &mut ExecCtx, ty: CompareType, op: ExprOp, ic: bool) -> Result<(), VmError> {
        let right = ectx.stack.pop();
        let left = ectx.stack.peek(-1);
        let result = match ty {
            CompareType::Bool | CompareType::Special => compare_eq_only(op, &left, &right)?,
            CompareType::Number => compare_nr(op, left.get_number_chk()?, right.get_number_chk()?)?,
            CompareType::Float => compare_float(op, float_operand(&left)?, float_operand(&right)?)?,
            _ => {
                let host = &mut *self.host;
                let mut matcher = |text: &str, pattern: &str, ic: bool| {
                    host.pattern_match(text, pattern, ic)
                        .map_err(|e| VmError::Host(format!("{e:#}")))
                };
                typval_compare(&left, &right, op, ic, &mut matcher)?
            }
        };
        ectx.stack.set_top(-1, Value::Bool(result));
        Ok(())
    }
}
