use crate::val::Value;
use crate::vm::vm::Vm;
use crate::vm::vm::frame::ExecCtx;
use crate::vm::{Namespace, Op, VmError};

use super::Flow;

impl Vm<'_> {
    /// Execute one instruction.
    pub(super) fn step(&mut self, ectx: &mut ExecCtx, op: &Op, lnum: u32) -> Result<Flow, VmError> {
        match op {
            Op::Exec(cmd) => {
                self.host.set_source_line(lnum);
                self.exec_command(cmd);
            }
            Op::ExecConcat(count) => {
                self.host.set_source_line(lnum);
                let cmd: String = ectx.stack.pop_n(*count).iter().map(Value::echo_string).collect();
                self.exec_command(&cmd);
            }
            Op::Echo { count, with_white } => self.echo(ectx, *count, *with_white),
            Op::Execute(count) | Op::EchoMsg(count) | Op::EchoErr(count) => {
                self.host.set_source_line(lnum);
                self.execute_family(ectx, op, *count)?;
            }

            Op::Load(idx) => ectx.stack.push(ectx.load_var(*idx)),
            Op::LoadOuter(idx) => {
                let value = ectx.outer()?.load(*idx)?;
                ectx.stack.push(value);
            }
            Op::LoadV(name) => self.load_ns(ectx, Namespace::Vim, name)?,
            Op::LoadScript { sid, idx } => {
                let value = self
                    .host
                    .load_script_item(*sid, *idx)
                    .map_err(|e| VmError::Host(format!("{e:#}")))?;
                ectx.stack.push(value);
            }
            Op::LoadS { sid, name } => self.load_ns(ectx, Namespace::Script(*sid), name)?,
            Op::LoadG(name) => self.load_ns(ectx, Namespace::Global, name)?,
            Op::LoadB(name) => self.load_ns(ectx, Namespace::Buffer, name)?,
            Op::LoadW(name) => self.load_ns(ectx, Namespace::Window, name)?,
            Op::LoadT(name) => self.load_ns(ectx, Namespace::Tab, name)?,
            Op::LoadGDict => ectx.stack.push(self.host.namespace_dict(Namespace::Global)),
            Op::LoadBDict => ectx.stack.push(self.host.namespace_dict(Namespace::Buffer)),
            Op::LoadWDict => ectx.stack.push(self.host.namespace_dict(Namespace::Window)),
            Op::LoadTDict => ectx.stack.push(self.host.namespace_dict(Namespace::Tab)),
            Op::LoadOpt(name) => {
                let value = self
                    .host
                    .get_option(name)
                    .map_err(|e| VmError::Host(format!("{e:#}")))?;
                ectx.stack.push(value);
            }
            Op::LoadEnv(name) => {
                let value = self.host.get_env(name).unwrap_or_default();
                ectx.stack.push(Value::string(value));
            }
            Op::LoadReg(reg) => ectx.stack.push(Value::String(self.host.get_register(*reg))),

            Op::Store(idx) => {
                let value = ectx.stack.pop();
                ectx.store_var(*idx, value);
            }
            Op::StoreOuter(idx) => {
                let value = ectx.stack.pop();
                let old = ectx.outer()?.store(*idx, value)?;
                drop(old);
            }
            Op::StoreV(name) => self.store_ns(ectx, Namespace::Vim, name)?,
            Op::StoreScript { sid, idx } => {
                let value = ectx.stack.pop();
                self.host
                    .store_script_item(*sid, *idx, value)
                    .map_err(|e| VmError::Host(format!("{e:#}")))?;
            }
            Op::StoreS { sid, name } => self.store_ns(ectx, Namespace::Script(*sid), name)?,
            Op::StoreG(name) => self.store_ns(ectx, Namespace::Global, name)?,
            Op::StoreB(name) => self.store_ns(ectx, Namespace::Buffer, name)?,
            Op::StoreW(name) => self.store_ns(ectx, Namespace::Window, name)?,
            Op::StoreT(name) => self.store_ns(ectx, Namespace::Tab, name)?,
            Op::StoreOpt(name) => self.store_option(ectx, name)?,
            Op::StoreEnv(name) => {
                let value = ectx.stack.pop().echo_string();
                self.host.set_env(name, &value);
            }
            Op::StoreReg(reg) => {
                let reg = if *reg == '@' { '"' } else { *reg };
                let value = ectx.stack.pop().echo_string();
                self.host.set_register(reg, &value);
            }
            Op::StoreNr { idx, value } => ectx.store_var(*idx, Value::Number(*value)),
            Op::StoreList => self.store_list(ectx)?,
            Op::StoreDict => self.store_dict(ectx)?,
            Op::Unlet { name, force } => self
                .host
                .unlet_var(name, *force)
                .map_err(|e| VmError::Host(format!("{e:#}")))?,
            Op::UnletEnv { name, .. } => self.host.unset_env(name),

            Op::PushNr(n) => ectx.stack.push(Value::Number(*n)),
            Op::PushBool(b) => ectx.stack.push(Value::Bool(*b)),
            Op::PushSpec(s) => ectx.stack.push(Value::Special(*s)),
            Op::PushF(f) => ectx.stack.push(Value::Float(*f)),
            Op::PushS(s) => ectx.stack.push(Value::String(s.clone())),
            Op::PushBlob(bytes) => ectx.stack.push(Value::blob(bytes.clone())),
            Op::PushFunc(name) => ectx.stack.push(Value::Func(name.clone())),
            Op::PushChannel => ectx.stack.push(Value::Channel(None)),
            Op::PushJob => ectx.stack.push(Value::Job(None)),
            Op::PushExc => {
                let value = self
                    .host
                    .exceptions()
                    .current()
                    .map(|exc| exc.value.clone())
                    .ok_or_else(|| VmError::Internal("no current exception to push".into()))?;
                ectx.stack.push(Value::string(value));
            }

            Op::NewList(count) => {
                let items = ectx.stack.pop_n(*count);
                ectx.stack.push(Value::list(items));
            }
            Op::NewDict(count) => self.new_dict(ectx, *count)?,
            Op::AddList | Op::AddBlob | Op::Concat => self.concat_op(ectx, op)?,
            Op::StrIndex => self.str_index(ectx)?,
            Op::ListIndex => self.list_index(ectx)?,
            Op::Slice(count) => self.list_slice(ectx, *count)?,
            Op::GetItem(index) => self.get_item(ectx, *index)?,
            Op::Member => {
                let key = ectx.stack.pop();
                let key = key.as_str().ok_or(VmError::StringRequired)?.to_owned();
                self.member(ectx, &key)?;
            }
            Op::StringMember(key) => self.member(ectx, key)?,

            Op::DCall { func, argc } => self.call_dfunc(ectx, *func, *argc)?,
            Op::BCall { func, argc } => {
                self.host.set_source_line(lnum);
                self.call_bfunc(ectx, *func, *argc)?;
            }
            Op::PCall { argc, top } => {
                self.host.set_source_line(lnum);
                let callee = if *top {
                    ectx.stack.peek(-(*argc as isize) - 1)
                } else {
                    ectx.stack.pop()
                };
                self.call_partial(ectx, callee, *argc)?;
            }
            Op::PCallEnd => {
                let result = ectx.stack.pop();
                ectx.stack.set_top(-1, result);
            }
            Op::UCall { name, argc } => {
                self.host.set_source_line(lnum);
                self.call_eval_func(ectx, name, *argc)?;
            }
            Op::Return => return Ok(self.return_op(ectx)),
            Op::FuncRef { func, var_idx } => self.funcref(ectx, *func, *var_idx)?,
            Op::NewFunc { lambda, global } => self.new_func(lambda, global)?,

            Op::Jump { when, target } => self.jump(ectx, *when, *target),
            Op::For { idx, end } => self.for_next(ectx, *idx, *end)?,
            Op::Try { catch, finally } => self.try_begin(ectx, *catch, *finally),
            Op::Catch => self.catch_begin(ectx)?,
            Op::EndTry => return self.end_try(ectx),
            Op::Throw => self.throw(ectx)?,

            Op::OpNr(op) => self.op_nr(ectx, *op)?,
            Op::OpFloat(op) => self.op_float(ectx, *op)?,
            Op::OpAny(op) => self.op_any(ectx, *op)?,
            Op::Compare { ty, op, ic } => self.compare(ectx, *ty, *op, *ic)?,
            Op::NegateNr => {
                let value = match ectx.stack.peek(-1) {
                    Value::Float(f) => Value::Float(-f),
                    other => Value::Number(other.get_number_chk()?.wrapping_neg()),
                };
                ectx.stack.set_top(-1, value);
            }

            Op::CheckNr => {
                let value = ectx.stack.peek(-1);
                if matches!(value, Value::String(_)) {
                    return Err(VmError::StringAsNumber);
                }
                value.get_number_chk()?;
            }
            Op::CheckType { ty, off } => {
                let actual = ectx.stack.peek(*off as isize).var_type();
                if !ty.accepts(actual) {
                    return Err(VmError::TypeMismatch {
                        expected: ty.name(),
                        actual: actual.name(),
                    });
                }
            }
            Op::CheckLen { min, more_ok } => {
                let actual = match ectx.stack.peek(-1) {
                    Value::List(l) => l.map_or(0, |l| l.borrow().len()),
                    _ => return Err(VmError::ListRequired),
                };
                if actual < *min || (!*more_ok && actual > *min) {
                    return Err(VmError::ListLength {
                        expected: *min,
                        actual,
                    });
                }
            }
            Op::ToBool { invert } => {
                let b = ectx.stack.peek(-1).to_bool() != *invert;
                ectx.stack.set_top(-1, Value::Bool(b));
            }
            Op::ToString { off, any } => {
                let value = ectx.stack.peek(*off as isize);
                if !matches!(value, Value::String(_)) {
                    if *any
                        && !matches!(
                            value,
                            Value::Special(_) | Value::Bool(_) | Value::Number(_) | Value::Float(_) | Value::Blob(_)
                        )
                    {
                        return Err(VmError::CannotConvertToString(value.type_name()));
                    }
                    ectx.stack.set_top(*off as isize, Value::string(value.echo_string()));
                }
            }

            Op::Shuffle { item, up } => {
                let (item, up) = (*item, *up);
                ectx.stack.with_slice_mut(|cells| {
                    let from = cells.len().saturating_sub(item);
                    let steps = up.min(item.saturating_sub(1));
                    if from + steps < cells.len() {
                        cells[from..=from + steps].rotate_left(1);
                    }
                });
            }
            Op::Drop => drop(ectx.stack.pop()),
        }
        Ok(Flow::Next)
    }

    fn load_ns(&mut self, ectx: &mut ExecCtx, ns: Namespace, name: &str) -> Result<(), VmError> {
        match self.host.lookup_var(ns, name) {
            Some(value) => {
                ectx.stack.push(value);
                Ok(())
            }
            None => Err(VmError::UndefinedVariable(format!("{ns}{name}"))),
        }
    }

    fn store_ns(&mut self, ectx: &mut ExecCtx, ns: Namespace, name: &str) -> Result<(), VmError> {
        let value = ectx.stack.pop();
        self.host
            .store_var(ns, name, value)
            .map_err(|e| VmError::Host(format!("{e:#}")))
    }
}

