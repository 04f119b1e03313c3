//! Calling convention lowering
//!
//! Every parameter and return value of the function signature and of the
//! call signatures in the preamble gets a location: a register from the
//! convention's argument order or a stack offset. Locations written in the
//! source are honoured and claimed before anything is handed out, so stack
//! and register parameters may appear in any order.
//!
//! On targets that pass the return address in a register, the function's own
//! signature gets an extra `link` parameter and return value in that register.
//! The entry EBB receives the matching parameter and every `return` hands it
//! back.

use crate::ir::entities::{Ebb, Inst};
use crate::ir::extfunc::{AbiParam, ArgumentPurpose, Signature};
use crate::ir::function::Function;
use crate::ir::instructions::{InstructionData, Opcode};
use crate::ir::types::Type;
use crate::ir::valueloc::{RegUnit, ValueLoc};
use crate::isa::{RegClass, TargetIsa};
use ebbc_common::{CodegenError, CodegenResult};
use log::debug;
use std::collections::BTreeSet;

/// Assign locations to all signatures of `func` and bind the entry EBB
/// parameters to theirs.
pub fn legalize_signatures(func: &mut Function, isa: &dyn TargetIsa) -> CodegenResult<()> {
    assign_locations(&mut func.signature, isa, true)?;
    for sig in &mut func.dfg.signatures {
        assign_locations(sig, isa, false)?;
    }

    let entry = func
        .entry_block()
        .ok_or_else(|| CodegenError::abi(format!("function %{} has no entry block", func.name)))?;
    add_missing_entry_params(func, entry)?;
    return_link_value(func, entry);

    let params = func.dfg.ebb_params(entry).to_vec();
    for (&param, abi) in params.iter().zip(&func.signature.params) {
        func.locations.set(param, abi.location);
    }
    debug!("signature of %{} assigned", func.name);
    Ok(())
}

/// Parameters the signature gained, usually the link register, become new
/// parameters of the entry EBB.
fn add_missing_entry_params(func: &mut Function, entry: Ebb) -> CodegenResult<()> {
    let have = func.dfg.ebb_params(entry).len();
    let want = func.signature.params.len();
    if have > want {
        return Err(CodegenError::abi(format!(
            "entry block {} has {} parameters but the signature has {}",
            entry, have, want
        )));
    }
    for abi in &func.signature.params[have..] {
        if abi.purpose != ArgumentPurpose::Link {
            return Err(CodegenError::abi(format!(
                "entry block {} is missing a parameter of type {}",
                entry, abi.value_type
            )));
        }
        func.dfg.append_ebb_param(entry, abi.value_type);
    }
    for (&param, abi) in func.dfg.ebb_params(entry).iter().zip(&func.signature.params) {
        let ty = func.dfg.value_type(param);
        if ty != abi.value_type {
            return Err(CodegenError::abi(format!(
                "entry parameter {} has type {} but the signature passes {}",
                param, ty, abi.value_type
            )));
        }
    }
    Ok(())
}

/// Append the link value to returns that do not pass it yet.
fn return_link_value(func: &mut Function, entry: Ebb) {
    let returns = &func.signature.returns;
    let link_index = match returns.iter().position(|r| r.purpose == ArgumentPurpose::Link) {
        Some(index) => index,
        None => return,
    };
    let num_returns = returns.len();
    let link_value = match func
        .signature
        .params
        .iter()
        .position(|p| p.purpose == ArgumentPurpose::Link)
        .and_then(|i| func.dfg.ebb_params(entry).get(i).copied())
    {
        Some(value) => value,
        None => return,
    };

    let return_insts: Vec<Inst> = func
        .layout
        .ebbs()
        .flat_map(|ebb| func.layout.ebb_insts(ebb).iter().copied())
        .filter(|&inst| func.dfg[inst].opcode() == Opcode::Return)
        .collect();
    for inst in return_insts {
        if let InstructionData::MultiAry { args, .. } = &mut func.dfg[inst] {
            if args.len() + 1 == num_returns && args.len() == link_index {
                args.push(link_value);
            }
        }
    }
}

/// Assign a location to every parameter and return value of `sig`.
/// `with_link` adds the link slot when the target has a link register.
fn assign_locations(sig: &mut Signature, isa: &dyn TargetIsa, with_link: bool) -> CodegenResult<()> {
    let regs = isa.abi_registers(sig.call_conv)?;
    if with_link {
        if let Some(link) = isa.link_register() {
            let link_param = AbiParam::special(isa.pointer_type(), ArgumentPurpose::Link).with_location(ValueLoc::Reg(link));
            if !sig.params.iter().any(|p| p.purpose == ArgumentPurpose::Link) {
                sig.params.push(link_param);
            }
            if !sig.returns.iter().any(|p| p.purpose == ArgumentPurpose::Link) {
                sig.returns.push(link_param);
            }
        }
    }

    Assigner::new(isa, &regs.int_args, &regs.float_args, regs.positional, Some(regs.stack_base))
        .assign(&mut sig.params, "parameter")?;
    Assigner::new(isa, &regs.int_returns, &regs.float_returns, false, None)
        .assign(&mut sig.returns, "return value")
}

struct Assigner<'a> {
    isa: &'a dyn TargetIsa,
    int_regs: &'a [RegUnit],
    float_regs: &'a [RegUnit],
    positional: bool,
    /// First stack offset, or `None` when values cannot go on the stack.
    stack_base: Option<i32>,
    claimed: BTreeSet<RegUnit>,
    /// Claimed stack ranges as `[start, end)`.
    stack: Vec<(i32, i32)>,
    next_stack: i32,
}

impl<'a> Assigner<'a> {
    fn new(
        isa: &'a dyn TargetIsa,
        int_regs: &'a [RegUnit],
        float_regs: &'a [RegUnit],
        positional: bool,
        stack_base: Option<i32>,
    ) -> Self {
        Self {
            isa,
            int_regs,
            float_regs,
            positional,
            stack_base,
            claimed: BTreeSet::new(),
            stack: Vec::new(),
            next_stack: stack_base.unwrap_or(0),
        }
    }

    fn reg_name(&self, unit: RegUnit) -> String {
        self.isa.register_info().display_regunit(unit)
    }

    fn assign(&mut self, params: &mut [AbiParam], what: &str) -> CodegenResult<()> {
        for param in params.iter() {
            self.check_type(param.value_type, what)?;
            self.claim_declared(param, what)?;
        }
        for (position, param) in params.iter_mut().enumerate() {
            if param.location.is_assigned() {
                continue;
            }
            param.location = self.next_location(position, param, what)?;
        }
        Ok(())
    }

    fn check_type(&self, ty: Type, what: &str) -> CodegenResult<()> {
        if ty == Type::I64 && !self.isa.flags().is_64bit {
            return Err(CodegenError::abi(format!("{} of type i64 needs a 64-bit target", what)));
        }
        Ok(())
    }

    fn claim_declared(&mut self, param: &AbiParam, what: &str) -> CodegenResult<()> {
        match param.location {
            ValueLoc::Unassigned => Ok(()),
            ValueLoc::Reg(unit) => {
                let link = self.isa.link_register();
                if param.purpose == ArgumentPurpose::Link {
                    if link != Some(unit) {
                        return Err(CodegenError::abi(format!(
                            "link {} cannot be passed in {}",
                            what,
                            self.reg_name(unit)
                        )));
                    }
                } else if self.isa.reserved_registers().contains(&unit) || link == Some(unit) {
                    return Err(CodegenError::abi(format!("register {} is reserved", self.reg_name(unit))));
                } else if self.isa.register_info().class_of(unit) != Some(RegClass::for_type(param.value_type)) {
                    return Err(CodegenError::abi(format!(
                        "register {} cannot hold a {} {}",
                        self.reg_name(unit),
                        param.value_type,
                        what
                    )));
                }
                if !self.claimed.insert(unit) {
                    return Err(CodegenError::abi(format!(
                        "register {} is used by two {}s",
                        self.reg_name(unit),
                        what
                    )));
                }
                Ok(())
            }
            ValueLoc::Stack(offset) => {
                if self.stack_base.is_none() {
                    return Err(CodegenError::abi(format!("a {} cannot be passed on the stack", what)));
                }
                let end = offset
                    .checked_add(param.value_type.bytes() as i32)
                    .ok_or_else(|| CodegenError::abi(format!("stack slot {} for a {} is out of range", offset, what)))?;
                if self.stack.iter().any(|&(s, e)| offset < e && s < end) {
                    return Err(CodegenError::abi(format!("stack slot {} overlaps another {}", offset, what)));
                }
                self.stack.push((offset, end));
                Ok(())
            }
        }
    }

    fn next_location(&mut self, position: usize, param: &AbiParam, what: &str) -> CodegenResult<ValueLoc> {
        if param.purpose == ArgumentPurpose::Link {
            let link = self
                .isa
                .link_register()
                .ok_or_else(|| CodegenError::abi(format!("{} has no link register", self.isa.name())))?;
            self.claimed.insert(link);
            return Ok(ValueLoc::Reg(link));
        }

        let pool = match RegClass::for_type(param.value_type) {
            RegClass::Gpr => self.int_regs,
            RegClass::Fpr => self.float_regs,
        };
        let reg = if self.positional {
            pool.get(position).copied().filter(|r| !self.claimed.contains(r))
        } else {
            pool.iter().copied().find(|r| !self.claimed.contains(r))
        };
        if let Some(reg) = reg {
            self.claimed.insert(reg);
            return Ok(ValueLoc::Reg(reg));
        }
        match self.stack_base {
            Some(_) => Ok(ValueLoc::Stack(self.stack_slot(param.value_type.bytes() as i32, what)?)),
            None => Err(CodegenError::abi(format!("too many {}s for the calling convention", what))),
        }
    }

    /// Next free stack offset aligned to `size`.
    fn stack_slot(&mut self, size: i32, what: &str) -> CodegenResult<i32> {
        let align = size.max(1);
        let align_up = |x: i32| x.checked_add(align - 1).map(|x| x / align * align);
        let out_of_range = || CodegenError::abi(format!("no stack slot left for a {}", what));
        let mut offset = align_up(self.next_stack).ok_or_else(out_of_range)?;
        loop {
            let end = offset.checked_add(size).ok_or_else(out_of_range)?;
            match self.stack.iter().find(|&&(s, e)| offset < e && s < end) {
                Some(&(_, taken)) => offset = align_up(taken).ok_or_else(out_of_range)?,
                None => {
                    self.stack.push((offset, end));
                    self.next_stack = end;
                    return Ok(offset);
                }
            }
        }
    }
}
